//! Sandbox registry types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a sandbox: one per (student, source database) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SandboxKey {
    pub student_id: i64,
    pub source_database_id: i64,
}

impl SandboxKey {
    pub fn new(student_id: i64, source_database_id: i64) -> Self {
        SandboxKey {
            student_id,
            source_database_id,
        }
    }
}

impl fmt::Display for SandboxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "student {} / database {}",
            self.student_id, self.source_database_id
        )
    }
}

/// Lifecycle state of a sandbox.
///
/// `Creating → Ready → Cleanup → removed`, or `Creating → Error → removed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxStatus {
    Creating,
    Ready,
    Error,
    Cleanup,
}

impl fmt::Display for SandboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SandboxStatus::Creating => write!(f, "creating"),
            SandboxStatus::Ready => write!(f, "ready"),
            SandboxStatus::Error => write!(f, "error"),
            SandboxStatus::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// One tracked sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxInfo {
    /// Opaque runtime handle; set once the instance has been created.
    pub runtime_id: Option<String>,
    /// Unique instance name, also the orphan-sweep match key
    pub name: String,
    /// Host port published for the sandbox engine
    pub port: u16,
    pub student_id: i64,
    pub source_database_id: i64,
    pub created_at: DateTime<Utc>,
    pub status: SandboxStatus,
}

impl SandboxInfo {
    /// A new entry in the `Creating` state.
    pub fn creating(key: SandboxKey, name: String, port: u16) -> Self {
        SandboxInfo {
            runtime_id: None,
            name,
            port,
            student_id: key.student_id,
            source_database_id: key.source_database_id,
            created_at: Utc::now(),
            status: SandboxStatus::Creating,
        }
    }

    pub fn key(&self) -> SandboxKey {
        SandboxKey::new(self.student_id, self.source_database_id)
    }

    pub fn is_ready(&self) -> bool {
        self.status == SandboxStatus::Ready
    }

    /// How long the sandbox has existed.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}

/// Instance name for a sandbox: `<prefix><student>-<database>-<millis>`.
pub fn sandbox_name(prefix: &str, key: SandboxKey, at: DateTime<Utc>) -> String {
    format!(
        "{}{}-{}-{}",
        prefix,
        key.student_id,
        key.source_database_id,
        at.timestamp_millis()
    )
}

/// Rows returned by a query, every value rendered as text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryRows {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_json(&self) -> serde_json::Value {
        let objects: Vec<serde_json::Value> = self
            .rows
            .iter()
            .map(|row| {
                let map: serde_json::Map<String, serde_json::Value> = self
                    .columns
                    .iter()
                    .zip(row.iter())
                    .map(|(column, value)| {
                        let value = value
                            .as_ref()
                            .map(|v| serde_json::Value::String(v.clone()))
                            .unwrap_or(serde_json::Value::Null);
                        (column.clone(), value)
                    })
                    .collect();
                serde_json::Value::Object(map)
            })
            .collect();
        serde_json::Value::Array(objects)
    }
}
