//! Sandbox module - Per-student ephemeral database engines
//!
//! - Port allocation over a fixed host range
//! - Container lifecycle through [`RuntimeController`]
//! - Readiness, content loading, and queries through [`ConnectionExecutor`]
//! - [`SandboxOrchestrator`] owns the registry and single-flight creation
//! - [`CleanupScheduler`] reclaims aged, orphaned, and finished sandboxes

mod cleanup;
mod connection;
mod error;
mod orchestrator;
mod ports;
mod runtime;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use cleanup::{CleanupScheduler, SweepReport};
pub use connection::{
    execute_script, returns_rows, ConnectionExecutor, PgSandboxConnector, StatementRunner,
};
pub use error::{QueryErrorKind, Result as SandboxResult, SandboxError};
pub use orchestrator::SandboxOrchestrator;
pub use ports::PortAllocator;
pub use runtime::{
    parse_memory_limit, DockerRuntime, InstanceSpec, RuntimeController, RuntimeInstance,
    LABEL_DATABASE, LABEL_STUDENT,
};
pub use types::{sandbox_name, QueryRows, SandboxInfo, SandboxKey, SandboxStatus};
