//! Configuration I/O - Loading configuration
//!
//! Handles reading configuration from files and environment variables.

use std::path::Path;
use std::time::Duration;

use super::types::Config;
use crate::error::{Error, Result};

/// Load configuration with layered precedence:
/// 1. Config file (config.json) if it exists, otherwise defaults
/// 2. Environment variable overrides (includes .env)
pub fn load_config() -> Result<Config> {
    let config_path = super::paths::config_path();

    let mut config = if config_path.exists() {
        load_config_from_path(&config_path)?
    } else {
        Config::default()
    };

    // Apply environment variable overrides (highest precedence)
    apply_env_overrides(&mut config);

    Ok(config)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    // Detect format by extension
    let config: Config = if path.extension().is_some_and(|ext| ext == "json") {
        // Parse as JSON5 (more lenient than strict JSON)
        json5::from_str(&content).map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?
    } else if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?
    } else {
        // Try JSON5 first, then TOML
        json5::from_str(&content)
            .or_else(|_| toml::from_str(&content).map_err(|e| Error::Config(e.to_string())))
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?
    };

    Ok(config)
}

/// Apply environment variable overrides to an existing config.
///
/// Loads `.env` first, then overlays any set environment variables.
/// Unparseable numeric or duration values are ignored.
pub fn apply_env_overrides(config: &mut Config) {
    dotenvy::dotenv().ok();
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

fn apply_overrides_from(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    use secrecy::SecretString;

    let sandbox = &mut config.sandbox;

    // Runtime overrides
    if let Some(image) = var("SANDBOX_IMAGE") {
        sandbox.image = image;
    }
    if let Some(prefix) = var("SANDBOX_NAME_PREFIX") {
        sandbox.name_prefix = prefix;
    }
    if let Some(host) = var("SANDBOX_HOST") {
        sandbox.host = host;
    }
    if let Some(v) = var("SANDBOX_PORT_START").and_then(|v| v.parse().ok()) {
        sandbox.ports.start = v;
    }
    if let Some(v) = var("SANDBOX_PORT_END").and_then(|v| v.parse().ok()) {
        sandbox.ports.end = v;
    }
    if let Some(limit) = var("SANDBOX_MEMORY_LIMIT") {
        sandbox.memory_limit = limit;
    }
    if let Some(v) = var("SANDBOX_CPU_LIMIT").and_then(|v| v.parse().ok()) {
        sandbox.cpu_limit = v;
    }

    // Credential overrides
    if let Some(user) = var("SANDBOX_DB_USER") {
        sandbox.credentials.user = user;
    }
    if let Some(password) = var("SANDBOX_DB_PASSWORD") {
        sandbox.credentials.password = SecretString::from(password);
    }
    if let Some(database) = var("SANDBOX_DB_NAME") {
        sandbox.credentials.database = database;
    }

    // Readiness and cleanup overrides
    if let Some(v) = var("SANDBOX_READY_ATTEMPTS").and_then(|v| v.parse().ok()) {
        sandbox.readiness.attempts = v;
    }
    if let Some(v) = var("SANDBOX_READY_INTERVAL").and_then(|v| parse_duration(&v)) {
        sandbox.readiness.interval = v;
    }
    if let Some(v) = var("SANDBOX_CLEANUP_INTERVAL").and_then(|v| parse_duration(&v)) {
        sandbox.cleanup.interval = v;
    }
    if let Some(v) = var("SANDBOX_MAX_AGE").and_then(|v| parse_duration(&v)) {
        sandbox.cleanup.max_age = v;
    }

    // Catalog overrides
    if let Some(url) = var("DATABASE_URL") {
        config.catalog.url = Some(SecretString::from(url));
    }
    if let Some(v) = var("DATABASE_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
        config.catalog.max_connections = v;
    }

    // Logging overrides
    if let Some(level) = var("RUST_LOG") {
        config.log.level = level;
    }
    if let Some(format) = var("LOG_FORMAT").and_then(|v| v.parse().ok()) {
        config.log.format = format;
    }
}

fn parse_duration(value: &str) -> Option<Duration> {
    humantime_serde::re::humantime::parse_duration(value).ok()
}
