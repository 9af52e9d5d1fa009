//! Configuration paths
//!
//! `SQLSANDBOX_CONFIG` names the config file outright; otherwise it is
//! `config.json` under `SQLSANDBOX_CONFIG_DIR` or the user config directory.

use std::path::PathBuf;

/// Directory holding `config.json`
pub fn config_dir() -> PathBuf {
    config_dir_from(|key| std::env::var(key).ok())
}

/// Config file the loader reads
pub fn config_path() -> PathBuf {
    config_path_from(|key| std::env::var(key).ok())
}

fn config_dir_from(var: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(dir) = var("SQLSANDBOX_CONFIG_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }

    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|d| d.join("sqlsandbox"))
        .unwrap_or_else(|| PathBuf::from(".sqlsandbox"))
}

fn config_path_from(var: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(path) = var("SQLSANDBOX_CONFIG").filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    config_dir_from(var).join("config.json")
}
