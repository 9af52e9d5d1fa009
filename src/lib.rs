//! # SQLSandbox
//!
//! Per-student ephemeral PostgreSQL sandboxes for SQL exercises.
//!
//! ## Features
//!
//! - **Isolated engines:** one disposable Docker container per (student, exercise database)
//! - **Single-flight provisioning:** concurrent requests share one creation
//! - **Content pipeline:** MySQL dumps converted to PostgreSQL, pg_dump COPY blocks rewritten
//! - **Safety validation:** deny-list for all SQL, read-only allow-list for ad-hoc queries
//! - **Deterministic cleanup:** age, per-student, and orphan sweeps

pub mod catalog;
pub mod config;
pub mod error;
pub mod sandbox;
pub mod sql;

pub use config::Config;
pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
