//! Sandbox configuration types
//!
//! Runtime image, port range, credentials, limits, readiness budget, and the
//! cleanup cadence for per-student database sandboxes.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Database engine image
    #[serde(default = "default_image")]
    pub image: String,
    /// Name prefix shared by every sandbox instance; the orphan sweep matches on it
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    /// Host interface the sandbox port is published on
    #[serde(default = "default_host")]
    pub host: String,
    /// Host port range
    #[serde(default)]
    pub ports: PortRange,
    /// Credentials configured inside every sandbox
    #[serde(default)]
    pub credentials: SandboxCredentials,
    /// Memory limit
    #[serde(default = "default_memory")]
    pub memory_limit: String,
    /// CPU limit (number of CPUs)
    #[serde(default = "default_cpu")]
    pub cpu_limit: f64,
    /// Pull the image when it is not present locally
    #[serde(default = "default_true")]
    pub pull_image: bool,
    /// Readiness polling budget
    #[serde(default)]
    pub readiness: ReadinessConfig,
    /// Cleanup scheduler
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            image: default_image(),
            name_prefix: default_name_prefix(),
            host: default_host(),
            ports: PortRange::default(),
            credentials: SandboxCredentials::default(),
            memory_limit: default_memory(),
            cpu_limit: default_cpu(),
            pull_image: true,
            readiness: ReadinessConfig::default(),
            cleanup: CleanupConfig::default(),
        }
    }
}

fn default_image() -> String {
    "postgres:15-alpine".to_string()
}

fn default_name_prefix() -> String {
    "sqlsandbox-".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_memory() -> String {
    "256m".to_string()
}

fn default_cpu() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

/// Inclusive host port range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    #[serde(default = "default_port_start")]
    pub start: u16,
    #[serde(default = "default_port_end")]
    pub end: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        PortRange {
            start: default_port_start(),
            end: default_port_end(),
        }
    }
}

impl PortRange {
    /// Number of ports in the range (0 if inverted)
    pub fn len(&self) -> usize {
        if self.start > self.end {
            0
        } else {
            (self.end - self.start) as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn default_port_start() -> u16 {
    15432
}

fn default_port_end() -> u16 {
    15532
}

/// Fixed user/password/database triple used inside sandboxes.
///
/// These are sandbox-only credentials and must never be the catalog's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxCredentials {
    #[serde(default = "default_db_value")]
    pub user: String,
    #[serde(skip_serializing, default = "default_password")]
    pub password: SecretString,
    #[serde(default = "default_db_value")]
    pub database: String,
}

impl Default for SandboxCredentials {
    fn default() -> Self {
        SandboxCredentials {
            user: default_db_value(),
            password: default_password(),
            database: default_db_value(),
        }
    }
}

fn default_db_value() -> String {
    "sandbox".to_string()
}

fn default_password() -> SecretString {
    SecretString::from("sandbox")
}

/// Readiness polling budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    #[serde(default = "default_ready_attempts")]
    pub attempts: u32,
    #[serde(with = "humantime_serde", default = "default_ready_interval")]
    pub interval: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        ReadinessConfig {
            attempts: default_ready_attempts(),
            interval: default_ready_interval(),
        }
    }
}

fn default_ready_attempts() -> u32 {
    30
}

fn default_ready_interval() -> Duration {
    Duration::from_secs(2)
}

/// Cleanup scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// How often the age and orphan sweeps run
    #[serde(with = "humantime_serde", default = "default_cleanup_interval")]
    pub interval: Duration,
    /// Sandboxes older than this are torn down
    #[serde(with = "humantime_serde", default = "default_max_age")]
    pub max_age: Duration,
    /// Remove untracked instances when the scheduler starts
    #[serde(default = "default_true")]
    pub orphan_sweep_on_start: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        CleanupConfig {
            interval: default_cleanup_interval(),
            max_age: default_max_age(),
            orphan_sweep_on_start: true,
        }
    }
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_max_age() -> Duration {
    Duration::from_secs(60 * 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_sandbox_config_default() {
        let config = SandboxConfig::default();
        assert_eq!(config.image, "postgres:15-alpine");
        assert_eq!(config.ports.len(), 101);
        assert_eq!(config.readiness.attempts, 30);
        assert_eq!(config.readiness.interval, Duration::from_secs(2));
        assert_eq!(config.cleanup.max_age, Duration::from_secs(3600));
        assert_eq!(config.credentials.password.expose_secret(), "sandbox");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: SandboxConfig = json5::from_str(
            r#"{ ports: { start: 20000 }, readiness: { interval: "500ms" }, cleanup: { max_age: "2h" } }"#,
        )
        .unwrap();
        assert_eq!(config.ports.start, 20000);
        assert_eq!(config.ports.end, 15532);
        assert!(config.ports.is_empty());
        assert_eq!(config.readiness.interval, Duration::from_millis(500));
        assert_eq!(config.cleanup.max_age, Duration::from_secs(7200));
        assert_eq!(config.credentials.user, "sandbox");
    }
}
