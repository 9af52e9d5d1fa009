//! In-process fakes for the runtime and connection seams.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::connection::ConnectionExecutor;
use super::error::{QueryErrorKind, Result, SandboxError};
use super::orchestrator::SandboxOrchestrator;
use super::runtime::{InstanceSpec, RuntimeController, RuntimeInstance};
use super::types::{QueryRows, SandboxInfo};
use crate::catalog::{SourceDatabase, StaticCatalog};
use crate::config::SandboxConfig;

/// Runtime that keeps instances in a map keyed by id.
#[derive(Default)]
pub struct FakeRuntime {
    instances: Mutex<HashMap<String, RuntimeInstance>>,
    next_id: AtomicUsize,
    pub creates: AtomicUsize,
    pub removes: AtomicUsize,
    pub fail_create: AtomicBool,
    pub fail_remove: AtomicBool,
}

impl FakeRuntime {
    /// An instance created behind the registry's back.
    pub fn add_untracked(&self, name: &str) -> String {
        let id = format!("untracked-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.instances.lock().unwrap().insert(
            id.clone(),
            RuntimeInstance {
                id: id.clone(),
                name: name.to_string(),
                running: true,
            },
        );
        id
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .instances
            .lock()
            .unwrap()
            .values()
            .map(|i| i.name.clone())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl RuntimeController for FakeRuntime {
    async fn create(&self, spec: &InstanceSpec) -> Result<String> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(SandboxError::RuntimeCreation {
                reason: "image not found".to_string(),
            });
        }
        let id = format!("runtime-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.instances.lock().unwrap().insert(
            id.clone(),
            RuntimeInstance {
                id: id.clone(),
                name: spec.name.clone(),
                running: false,
            },
        );
        Ok(id)
    }

    async fn start(&self, runtime_id: &str) -> Result<()> {
        match self.instances.lock().unwrap().get_mut(runtime_id) {
            Some(instance) => {
                instance.running = true;
                Ok(())
            }
            None => Err(SandboxError::RuntimeCreation {
                reason: format!("no such container {runtime_id}"),
            }),
        }
    }

    async fn stop(&self, runtime_id: &str) -> Result<()> {
        if let Some(instance) = self.instances.lock().unwrap().get_mut(runtime_id) {
            instance.running = false;
        }
        Ok(())
    }

    async fn remove(&self, runtime_id: &str) -> Result<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(SandboxError::Runtime {
                reason: "daemon unavailable".to_string(),
            });
        }
        self.instances.lock().unwrap().remove(runtime_id);
        Ok(())
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<RuntimeInstance>> {
        Ok(self
            .instances
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.name.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Connector whose readiness and liveness are switchable.
pub struct FakeConnector {
    pub ready_delay: Duration,
    pub ready: AtomicBool,
    pub alive: AtomicBool,
    pub verifies: AtomicUsize,
    pub loaded: Mutex<Vec<(String, String, String)>>,
    pub executed: Mutex<Vec<(String, String)>>,
}

impl Default for FakeConnector {
    fn default() -> Self {
        FakeConnector {
            ready_delay: Duration::from_millis(20),
            ready: AtomicBool::new(true),
            alive: AtomicBool::new(true),
            verifies: AtomicUsize::new(0),
            loaded: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ConnectionExecutor for FakeConnector {
    async fn wait_ready(&self, sandbox: &SandboxInfo) -> Result<()> {
        tokio::time::sleep(self.ready_delay).await;
        if self.ready.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SandboxError::ContainerNotReady {
                name: sandbox.name.clone(),
                attempts: 30,
            })
        }
    }

    async fn verify(&self, _sandbox: &SandboxInfo) -> bool {
        self.verifies.fetch_add(1, Ordering::SeqCst);
        self.alive.load(Ordering::SeqCst)
    }

    async fn load_content(&self, sandbox: &SandboxInfo, schema: &str, seed: &str) -> Result<()> {
        self.loaded.lock().unwrap().push((
            sandbox.name.clone(),
            schema.to_string(),
            seed.to_string(),
        ));
        Ok(())
    }

    async fn execute(&self, sandbox: &SandboxInfo, sql: &str) -> Result<QueryRows> {
        self.executed
            .lock()
            .unwrap()
            .push((sandbox.name.clone(), sql.to_string()));
        if sql.contains("missing_table") {
            return Err(SandboxError::QueryExecution {
                kind: QueryErrorKind::UndefinedTable,
                message: "relation \"missing_table\" does not exist".to_string(),
            });
        }
        Ok(QueryRows {
            columns: vec!["sql".to_string()],
            rows: vec![vec![Some(sql.to_string())]],
        })
    }
}

/// Config over a dedicated port range so parallel tests do not share ports.
pub fn test_config(port_start: u16, port_end: u16) -> SandboxConfig {
    let mut config = SandboxConfig::default();
    config.ports.start = port_start;
    config.ports.end = port_end;
    config
}

pub fn test_catalog() -> StaticCatalog {
    StaticCatalog::new()
        .with_database(
            1,
            SourceDatabase {
                name: "shop".to_string(),
                schema: "CREATE TABLE `users` (`id` int(11) NOT NULL AUTO_INCREMENT, `name` varchar(50), PRIMARY KEY (`id`)) ENGINE=InnoDB;".to_string(),
                seed_data: "INSERT INTO `users` (`id`, `name`) VALUES (1, 'ann'), (2, 'bo');".to_string(),
            },
        )
        .with_database(
            2,
            SourceDatabase {
                name: "library".to_string(),
                schema: "CREATE TABLE books (id serial primary key, title text);".to_string(),
                seed_data: "INSERT INTO books (title) VALUES ('Dune');".to_string(),
            },
        )
        .with_database(
            9,
            SourceDatabase {
                name: "hostile".to_string(),
                schema: "CREATE TABLE t (id int);".to_string(),
                seed_data: "DROP DATABASE postgres;".to_string(),
            },
        )
}

pub struct Harness {
    pub orchestrator: SandboxOrchestrator,
    pub runtime: Arc<FakeRuntime>,
    pub connector: Arc<FakeConnector>,
}

pub fn harness(port_start: u16, port_end: u16) -> Harness {
    harness_with(port_start, port_end, FakeConnector::default())
}

pub fn harness_with(port_start: u16, port_end: u16, connector: FakeConnector) -> Harness {
    let runtime = Arc::new(FakeRuntime::default());
    let connector = Arc::new(connector);
    let orchestrator = SandboxOrchestrator::new(
        &test_config(port_start, port_end),
        runtime.clone(),
        connector.clone(),
        Arc::new(test_catalog()),
    );
    Harness {
        orchestrator,
        runtime,
        connector,
    }
}
