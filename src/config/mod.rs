//! Configuration module - Modular configuration management
//!
//! Configuration is split into focused modules:
//! - types/mod.rs: Core configuration types (Config, LogConfig)
//! - types/sandbox.rs: Sandbox runtime, readiness, and cleanup configuration
//! - types/catalog.rs: Source-database catalog configuration
//! - io.rs: Configuration loading
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration file paths

mod io;
mod paths;
mod types;
mod validation;

// Re-export core config types
pub use types::{Config, LogConfig, LogFormat};

// Re-export sandbox types
pub use types::sandbox::{
    CleanupConfig, PortRange, ReadinessConfig, SandboxConfig, SandboxCredentials,
};

// Re-export catalog types
pub use types::catalog::CatalogConfig;

// Re-export IO and utilities
pub use io::{apply_env_overrides, load_config, load_config_from_path};
pub use paths::{config_dir, config_path};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};
