//! Network access to sandbox engines
//!
//! Readiness polling, liveness checks, content loading, and query execution.
//! Every method opens its own connection and closes it before returning,
//! whether the work succeeded or not.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, Connection, Executor, Row};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::error::{Result, SandboxError};
use super::types::{QueryRows, SandboxInfo};
use crate::config::{ReadinessConfig, SandboxConfig, SandboxCredentials};
use crate::sql::{first_keyword, split_statements};

/// Upper bound on a single readiness probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the orchestrator needs to talk to a running sandbox.
#[async_trait]
pub trait ConnectionExecutor: Send + Sync {
    /// Poll until the sandbox answers a trivial query or the budget runs out.
    async fn wait_ready(&self, sandbox: &SandboxInfo) -> Result<()>;

    /// One connect-and-query liveness check.
    async fn verify(&self, sandbox: &SandboxInfo) -> bool;

    /// Run the schema block, then the seed block, each as one batch.
    async fn load_content(&self, sandbox: &SandboxInfo, schema: &str, seed: &str) -> Result<()>;

    /// Run statements in order and return the rows of the last row-returning one.
    async fn execute(&self, sandbox: &SandboxInfo, sql: &str) -> Result<QueryRows>;
}

/// Runs one statement at a time on an open session.
#[async_trait]
pub trait StatementRunner: Send {
    async fn run(&mut self, statement: &str) -> Result<QueryRows>;
}

/// Whether a statement's rows are what the caller asked for.
pub fn returns_rows(statement: &str) -> bool {
    matches!(
        first_keyword(statement).as_str(),
        "SELECT" | "WITH" | "SHOW" | "EXPLAIN"
    )
}

/// Split `sql`, run each statement in order, and return the rows of the last
/// row-returning statement. Other statements still run but contribute nothing.
/// Stops at the first failing statement.
pub async fn execute_script<R>(runner: &mut R, sql: &str) -> Result<QueryRows>
where
    R: StatementRunner + ?Sized,
{
    let mut last = QueryRows::default();
    for statement in split_statements(sql) {
        let rows = runner.run(&statement).await?;
        if returns_rows(&statement) {
            last = rows;
        }
    }
    Ok(last)
}

/// PostgreSQL connector for sandbox engines
#[derive(Debug, Clone)]
pub struct PgSandboxConnector {
    host: String,
    credentials: SandboxCredentials,
    readiness: ReadinessConfig,
}

impl PgSandboxConnector {
    pub fn new(config: &SandboxConfig) -> Self {
        PgSandboxConnector {
            host: config.host.clone(),
            credentials: config.credentials.clone(),
            readiness: config.readiness.clone(),
        }
    }

    fn connect_options(&self, sandbox: &SandboxInfo) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(sandbox.port)
            .username(&self.credentials.user)
            .password(self.credentials.password.expose_secret())
            .database(&self.credentials.database)
    }

    async fn connect(&self, sandbox: &SandboxInfo) -> Result<PgConnection> {
        Ok(PgConnection::connect_with(&self.connect_options(sandbox)).await?)
    }

    /// Connect, run `SELECT 1`, close.
    async fn probe(&self, sandbox: &SandboxInfo) -> Result<()> {
        let attempt = async {
            let mut conn = self.connect(sandbox).await?;
            let result = (&mut conn).execute("SELECT 1").await;
            close(conn, sandbox).await;
            result.map(|_| ()).map_err(SandboxError::from)
        };
        match tokio::time::timeout(PROBE_TIMEOUT, attempt).await {
            Ok(result) => result,
            Err(_) => Err(SandboxError::Runtime {
                reason: format!("probe timed out after {:?}", PROBE_TIMEOUT),
            }),
        }
    }
}

#[async_trait]
impl ConnectionExecutor for PgSandboxConnector {
    async fn wait_ready(&self, sandbox: &SandboxInfo) -> Result<()> {
        let attempts = self.readiness.attempts;
        for attempt in 1..=attempts {
            match self.probe(sandbox).await {
                Ok(()) => {
                    info!("Sandbox {} ready after {} attempt(s)", sandbox.name, attempt);
                    return Ok(());
                }
                Err(e) => {
                    debug!(
                        "Sandbox {} not ready (attempt {}/{}): {}",
                        sandbox.name, attempt, attempts, e
                    );
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.readiness.interval).await;
            }
        }

        Err(SandboxError::ContainerNotReady {
            name: sandbox.name.clone(),
            attempts,
        })
    }

    async fn verify(&self, sandbox: &SandboxInfo) -> bool {
        match self.probe(sandbox).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Sandbox {} failed verification: {}", sandbox.name, e);
                false
            }
        }
    }

    async fn load_content(&self, sandbox: &SandboxInfo, schema: &str, seed: &str) -> Result<()> {
        let mut conn = self.connect(sandbox).await?;
        let result = load_batches(&mut conn, schema, seed).await;
        close(conn, sandbox).await;

        match &result {
            Ok(()) => debug!("Loaded content into {}", sandbox.name),
            Err(e) => warn!("Loading content into {} failed: {}", sandbox.name, e),
        }
        result
    }

    async fn execute(&self, sandbox: &SandboxInfo, sql: &str) -> Result<QueryRows> {
        let mut conn = self.connect(sandbox).await?;
        let result = {
            let mut runner = PgStatementRunner { conn: &mut conn };
            execute_script(&mut runner, sql).await
        };
        close(conn, sandbox).await;
        result
    }
}

async fn load_batches(conn: &mut PgConnection, schema: &str, seed: &str) -> Result<()> {
    for batch in [schema, seed] {
        if batch.trim().is_empty() {
            continue;
        }
        // A bare &str goes over the simple-query protocol, so batches may hold many statements
        (&mut *conn).execute(batch).await?;
    }
    Ok(())
}

async fn close(conn: PgConnection, sandbox: &SandboxInfo) {
    if let Err(e) = conn.close().await {
        debug!("Closing connection to {} failed: {}", sandbox.name, e);
    }
}

/// Simple-query runner; every value comes back in text form.
struct PgStatementRunner<'c> {
    conn: &'c mut PgConnection,
}

#[async_trait]
impl StatementRunner for PgStatementRunner<'_> {
    async fn run(&mut self, statement: &str) -> Result<QueryRows> {
        let rows: Vec<PgRow> = (&mut *self.conn).fetch_all(statement).await?;

        let mut result = QueryRows {
            columns: Vec::new(),
            rows: rows.iter().map(row_values).collect(),
        };

        if let Some(first) = rows.first() {
            result.columns = first.columns().iter().map(|c| c.name().to_string()).collect();
        } else if returns_rows(statement) {
            // No rows to read names from; ask the server for the shape
            if let Ok(describe) = (&mut *self.conn).describe(statement).await {
                result.columns = describe.columns().iter().map(|c| c.name().to_string()).collect();
            }
        }

        Ok(result)
    }
}

fn row_values(row: &PgRow) -> Vec<Option<String>> {
    (0..row.len())
        .map(|i| row.try_get_unchecked::<Option<String>, _>(i).unwrap_or(None))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::QueryErrorKind;

    /// Records statements; SELECTs return one row naming the statement.
    #[derive(Default)]
    struct RecordingRunner {
        ran: Vec<String>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl StatementRunner for RecordingRunner {
        async fn run(&mut self, statement: &str) -> Result<QueryRows> {
            self.ran.push(statement.to_string());
            if self.fail_on.is_some_and(|needle| statement.contains(needle)) {
                return Err(SandboxError::QueryExecution {
                    kind: QueryErrorKind::UndefinedTable,
                    message: "relation does not exist".to_string(),
                });
            }
            if returns_rows(statement) {
                Ok(QueryRows {
                    columns: vec!["statement".to_string()],
                    rows: vec![vec![Some(statement.to_string())]],
                })
            } else {
                Ok(QueryRows::default())
            }
        }
    }

    #[tokio::test]
    async fn test_execute_returns_last_select() {
        let mut runner = RecordingRunner::default();
        let rows = execute_script(&mut runner, "UPDATE t SET x=1; SELECT * FROM t")
            .await
            .unwrap();

        assert_eq!(runner.ran, vec!["UPDATE t SET x=1", "SELECT * FROM t"]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.rows[0][0].as_deref(), Some("SELECT * FROM t"));
    }

    #[tokio::test]
    async fn test_trailing_write_keeps_earlier_select_rows() {
        let mut runner = RecordingRunner::default();
        let rows = execute_script(&mut runner, "SELECT 1; SELECT 2; INSERT INTO t VALUES (1)")
            .await
            .unwrap();

        assert_eq!(runner.ran.len(), 3);
        assert_eq!(rows.rows[0][0].as_deref(), Some("SELECT 2"));
    }

    #[tokio::test]
    async fn test_writes_only_return_empty() {
        let mut runner = RecordingRunner::default();
        let rows = execute_script(&mut runner, "INSERT INTO t VALUES (';'); DELETE FROM t WHERE id = 2;")
            .await
            .unwrap();
        assert_eq!(runner.ran.len(), 2);
        assert!(rows.is_empty());
        assert!(rows.columns.is_empty());
    }

    #[tokio::test]
    async fn test_failure_stops_script() {
        let mut runner = RecordingRunner {
            fail_on: Some("missing"),
            ..Default::default()
        };
        let err = execute_script(&mut runner, "SELECT * FROM missing; SELECT 1")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SandboxError::QueryExecution {
                kind: QueryErrorKind::UndefinedTable,
                ..
            }
        ));
        assert_eq!(runner.ran.len(), 1);
    }

    #[test]
    fn test_returns_rows() {
        assert!(returns_rows("select 1"));
        assert!(returns_rows("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(returns_rows("EXPLAIN SELECT 1"));
        assert!(returns_rows("SHOW search_path"));
        assert!(!returns_rows("UPDATE t SET x = 1"));
        assert!(!returns_rows("CREATE TABLE t (id int)"));
    }

    /// A sandbox on a port nothing listens on.
    fn unreachable_sandbox() -> SandboxInfo {
        let port = std::net::TcpListener::bind(("127.0.0.1", 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        SandboxInfo::creating(
            crate::sandbox::SandboxKey::new(1, 1),
            "sqlsandbox-1-1-0".to_string(),
            port,
        )
    }

    fn quick_connector(attempts: u32) -> PgSandboxConnector {
        let mut config = SandboxConfig::default();
        config.readiness = ReadinessConfig {
            attempts,
            interval: Duration::from_millis(10),
        };
        PgSandboxConnector::new(&config)
    }

    #[tokio::test]
    async fn test_wait_ready_gives_up_after_budget() {
        let connector = quick_connector(2);
        let sandbox = unreachable_sandbox();

        let started = std::time::Instant::now();
        let err = connector.wait_ready(&sandbox).await.unwrap_err();
        let elapsed = started.elapsed();

        match err {
            SandboxError::ContainerNotReady { name, attempts } => {
                assert_eq!(name, sandbox.name);
                assert_eq!(attempts, 2);
            }
            other => panic!("expected ContainerNotReady, got {other:?}"),
        }
        // One pause between the two attempts, none after the last
        assert!(elapsed >= Duration::from_millis(10));
        assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_unreachable_sandbox_through_trait_object() {
        let connector: std::sync::Arc<dyn ConnectionExecutor> = std::sync::Arc::new(quick_connector(1));
        let sandbox = unreachable_sandbox();

        assert!(!connector.verify(&sandbox).await);

        let err = connector
            .load_content(&sandbox, "CREATE TABLE t (id int)", "INSERT INTO t VALUES (1)")
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Runtime { .. }));
        assert!(!err.is_client_error());

        let err = connector.execute(&sandbox, "SELECT 1").await.unwrap_err();
        assert!(matches!(err, SandboxError::Runtime { .. }));
    }

    #[test]
    fn test_connect_options_use_sandbox_port() {
        let connector = PgSandboxConnector::new(&SandboxConfig::default());
        let info = SandboxInfo::creating(
            crate::sandbox::SandboxKey::new(1, 1),
            "sqlsandbox-1-1-0".to_string(),
            15433,
        );
        let options = connector.connect_options(&info);
        assert_eq!(options.get_port(), 15433);
        assert_eq!(options.get_host(), "127.0.0.1");
        assert_eq!(options.get_database(), Some("sandbox"));
    }
}
