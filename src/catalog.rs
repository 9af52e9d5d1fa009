//! Source database catalog
//!
//! Read-only access to instructor-authored schema/seed pairs. The sandbox
//! subsystem never writes to the catalog.

use async_trait::async_trait;
use regex::Regex;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::CatalogConfig;
use crate::error::{Error, Result};
use crate::sandbox::{SandboxError, SandboxResult};

static TABLE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("valid regex")
});

/// An instructor-authored database definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SourceDatabase {
    pub name: String,
    /// DDL block
    pub schema: String,
    /// DML block
    pub seed_data: String,
}

/// Lookup of source databases by id.
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    async fn get_source_database(&self, id: i64) -> SandboxResult<SourceDatabase>;
}

/// Catalog backed by a PostgreSQL table with `id, name, schema, seed_data` columns
pub struct PgSourceCatalog {
    pool: PgPool,
    query: String,
}

impl PgSourceCatalog {
    /// Connect to the catalog database
    pub async fn connect(config: &CatalogConfig) -> Result<Self> {
        let url = config
            .url
            .as_ref()
            .ok_or_else(|| Error::Config("Catalog URL not configured (set DATABASE_URL)".to_string()))?;

        info!("Initializing catalog connection pool");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(url.expose_secret())
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        Self::with_pool(pool, &config.table)
    }

    /// Use an existing pool
    pub fn with_pool(pool: PgPool, table: &str) -> Result<Self> {
        if !TABLE_NAME.is_match(table) {
            return Err(Error::Config(format!("Invalid catalog table name: {}", table)));
        }
        Ok(PgSourceCatalog {
            pool,
            query: format!("SELECT name, schema, seed_data FROM {} WHERE id = $1", table),
        })
    }
}

#[async_trait]
impl SourceCatalog for PgSourceCatalog {
    async fn get_source_database(&self, id: i64) -> SandboxResult<SourceDatabase> {
        let row: Option<SourceDatabase> = sqlx::query_as(&self.query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SandboxError::Catalog {
                reason: format!("Failed to load source database {}: {}", id, e),
            })?;

        let source = row.ok_or_else(|| not_found(id))?;
        debug!("Loaded source database {} ({})", id, source.name);
        Ok(source)
    }
}

/// In-memory catalog
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    databases: HashMap<i64, SourceDatabase>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(mut self, id: i64, database: SourceDatabase) -> Self {
        self.databases.insert(id, database);
        self
    }
}

#[async_trait]
impl SourceCatalog for StaticCatalog {
    async fn get_source_database(&self, id: i64) -> SandboxResult<SourceDatabase> {
        self.databases.get(&id).cloned().ok_or_else(|| not_found(id))
    }
}

fn not_found(id: i64) -> SandboxError {
    SandboxError::Catalog {
        reason: format!("Source database {} not found", id),
    }
}
