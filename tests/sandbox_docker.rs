//! End-to-end tests against a real Docker daemon.
//!
//! Run with `cargo test --test sandbox_docker -- --ignored`.

use sqlsandbox::catalog::{SourceDatabase, StaticCatalog};
use sqlsandbox::config::SandboxConfig;
use sqlsandbox::sandbox::{CleanupScheduler, QueryErrorKind, SandboxError, SandboxOrchestrator};
use std::sync::Arc;

const MYSQL_SCHEMA: &str = "
SET NAMES utf8mb4;
CREATE TABLE `customers` (
  `id` int(11) NOT NULL AUTO_INCREMENT,
  `name` varchar(100) NOT NULL,
  `vip` tinyint(1) DEFAULT 0,
  PRIMARY KEY (`id`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
";

const MYSQL_SEED: &str = "
INSERT INTO `customers` (`id`, `name`, `vip`) VALUES (1, 'Ann; the first', 1), (5, 'O\\'Brien', 0);
";

fn config(port_start: u16) -> SandboxConfig {
    let mut config = SandboxConfig::default();
    config.name_prefix = "sqlsandbox-it-".to_string();
    config.ports.start = port_start;
    config.ports.end = port_start + 9;
    config
}

fn catalog() -> StaticCatalog {
    StaticCatalog::new().with_database(
        1,
        SourceDatabase {
            name: "customers".to_string(),
            schema: MYSQL_SCHEMA.to_string(),
            seed_data: MYSQL_SEED.to_string(),
        },
    )
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn provision_query_and_teardown() {
    let orchestrator = SandboxOrchestrator::from_config(&config(25432), Arc::new(catalog()))
        .await
        .unwrap();

    let (a, b) = tokio::join!(orchestrator.provision(1, 1), orchestrator.provision(1, 1));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.runtime_id, b.runtime_id);

    let rows = orchestrator
        .query(1, 1, "UPDATE customers SET vip = TRUE WHERE id = 5; SELECT name, vip FROM customers ORDER BY id")
        .await
        .unwrap();
    assert_eq!(rows.columns, vec!["name", "vip"]);
    assert_eq!(rows.rows[0][0].as_deref(), Some("Ann; the first"));
    assert_eq!(rows.rows[1][0].as_deref(), Some("O'Brien"));
    assert_eq!(rows.rows[1][1].as_deref(), Some("t"));

    // The sequence continues past the seeded ids
    let rows = orchestrator
        .query(1, 1, "INSERT INTO customers (name) VALUES ('new'); SELECT max(id) FROM customers")
        .await
        .unwrap();
    assert_eq!(rows.rows[0][0].as_deref(), Some("6"));

    let err = orchestrator
        .query(1, 1, "SELECT * FROM nope")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SandboxError::QueryExecution {
            kind: QueryErrorKind::UndefinedTable,
            ..
        }
    ));

    let empty = orchestrator
        .query_read_only(1, 1, "SELECT id FROM customers WHERE false")
        .await
        .unwrap();
    assert!(empty.is_empty());
    assert_eq!(empty.columns, vec!["id"]);

    assert!(orchestrator.teardown(1, 1).await);
    assert!(orchestrator.is_empty().await);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn orphan_sweep_after_restart() {
    let config = config(25442);
    let first = SandboxOrchestrator::from_config(&config, Arc::new(catalog()))
        .await
        .unwrap();
    first.provision(2, 1).await.unwrap();

    // A fresh orchestrator has an empty registry, as after a crash
    let second = SandboxOrchestrator::from_config(&config, Arc::new(catalog()))
        .await
        .unwrap();
    let scheduler = CleanupScheduler::new(second, config.cleanup.clone());
    assert_eq!(scheduler.sweep_orphans().await.unwrap(), 1);
    assert_eq!(scheduler.sweep_orphans().await.unwrap(), 0);
}
