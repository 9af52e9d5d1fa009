//! Catalog configuration types
//!
//! Connection settings for the read-only store holding instructor-authored
//! source databases.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Source-database catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Database URL; `None` leaves the catalog unconfigured
    #[serde(skip_serializing, default)]
    pub url: Option<SecretString>,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Table holding `id, name, schema, seed_data`
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            url: None,
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
            table: default_table(),
        }
    }
}

impl CatalogConfig {
    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_table() -> String {
    "exercise_databases".to_string()
}
