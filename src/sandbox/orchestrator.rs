//! Sandbox orchestrator
//!
//! Owns the registry of sandboxes keyed by (student, source database) and
//! coordinates the port allocator, runtime, connector, and catalog.
//!
//! Creation is single-flight per key: the first caller spawns the creation
//! task and parks a shared handle in the registry, later callers await the
//! same handle. The task runs to completion even if every caller goes away.

use chrono::Utc;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::connection::{ConnectionExecutor, PgSandboxConnector};
use super::error::{Result, SandboxError};
use super::ports::PortAllocator;
use super::runtime::{DockerRuntime, InstanceSpec, RuntimeController};
use super::types::{sandbox_name, QueryRows, SandboxInfo, SandboxKey, SandboxStatus};
use crate::catalog::SourceCatalog;
use crate::config::SandboxConfig;
use crate::sql::{prepare_content, validate_script, PreparedContent, ValidationPolicy};

type CreationFuture = Shared<BoxFuture<'static, Result<SandboxInfo>>>;

#[derive(Default)]
struct Registry {
    sandboxes: HashMap<SandboxKey, SandboxInfo>,
    /// In-flight creations; an entry exists only while its task runs
    creating: HashMap<SandboxKey, CreationFuture>,
}

impl Registry {
    /// Mutate the entry for `key` only if it is still the sandbox named `name`.
    fn update(&mut self, key: SandboxKey, name: &str, f: impl FnOnce(&mut SandboxInfo)) {
        if let Some(entry) = self.sandboxes.get_mut(&key) {
            if entry.name == name {
                f(entry);
            }
        }
    }

    /// Remove the entry for `key` only if it is still the sandbox named `name`.
    fn remove(&mut self, key: SandboxKey, name: &str) -> bool {
        if self.sandboxes.get(&key).is_some_and(|e| e.name == name) {
            self.sandboxes.remove(&key);
            true
        } else {
            false
        }
    }
}

struct Inner {
    runtime: Arc<dyn RuntimeController>,
    connector: Arc<dyn ConnectionExecutor>,
    catalog: Arc<dyn SourceCatalog>,
    ports: PortAllocator,
    name_prefix: String,
    registry: Mutex<Registry>,
}

/// Coordinates sandbox provisioning, queries, and teardown.
#[derive(Clone)]
pub struct SandboxOrchestrator {
    inner: Arc<Inner>,
}

impl SandboxOrchestrator {
    pub fn new(
        config: &SandboxConfig,
        runtime: Arc<dyn RuntimeController>,
        connector: Arc<dyn ConnectionExecutor>,
        catalog: Arc<dyn SourceCatalog>,
    ) -> Self {
        SandboxOrchestrator {
            inner: Arc::new(Inner {
                runtime,
                connector,
                catalog,
                ports: PortAllocator::new(&config.host, config.ports.start, config.ports.end),
                name_prefix: config.name_prefix.clone(),
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    /// Docker runtime plus PostgreSQL connector, both from `config`.
    pub async fn from_config(config: &SandboxConfig, catalog: Arc<dyn SourceCatalog>) -> Result<Self> {
        let runtime = DockerRuntime::new(config).await?;
        let connector = PgSandboxConnector::new(config);
        Ok(Self::new(config, Arc::new(runtime), Arc::new(connector), catalog))
    }

    pub fn runtime(&self) -> Arc<dyn RuntimeController> {
        self.inner.runtime.clone()
    }

    pub fn ports(&self) -> &PortAllocator {
        &self.inner.ports
    }

    pub fn name_prefix(&self) -> &str {
        &self.inner.name_prefix
    }

    /// Return a ready sandbox for the key, creating one if needed.
    ///
    /// A ready entry is reused only after it passes `verify`; a stale one is
    /// torn down and replaced. Concurrent calls for the same key resolve to
    /// the same sandbox.
    pub async fn provision(&self, student_id: i64, source_database_id: i64) -> Result<SandboxInfo> {
        let key = SandboxKey::new(student_id, source_database_id);

        let existing = {
            let registry = self.inner.registry.lock().await;
            registry.sandboxes.get(&key).filter(|e| e.is_ready()).cloned()
        };

        let mut stale = None;
        if let Some(info) = existing {
            if self.inner.connector.verify(&info).await {
                debug!("Reusing sandbox {} for {}", info.name, key);
                return Ok(info);
            }
            warn!("Sandbox {} for {} failed verification, recreating", info.name, key);
            self.teardown_entry(key, Some(info.name.as_str())).await;
            stale = Some(info.name);
        }

        let creation = {
            let mut registry = self.inner.registry.lock().await;
            if let Some(pending) = registry.creating.get(&key) {
                debug!("Awaiting in-flight creation for {}", key);
                pending.clone()
            } else if let Some(info) = registry
                .sandboxes
                .get(&key)
                .filter(|e| e.is_ready() && Some(&e.name) != stale.as_ref())
            {
                // Another caller finished a creation while we were verifying
                return Ok(info.clone());
            } else {
                let creation = self.spawn_creation(key);
                registry.creating.insert(key, creation.clone());
                creation
            }
        };

        creation.await
    }

    fn spawn_creation(&self, key: SandboxKey) -> CreationFuture {
        let this = self.clone();
        let task = tokio::spawn(async move { this.run_creation(key).await });

        let this = self.clone();
        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    error!("Creation task for {} failed: {}", key, e);
                    this.inner.registry.lock().await.creating.remove(&key);
                    Err(SandboxError::Internal {
                        reason: format!("sandbox creation task failed: {}", e),
                    })
                }
            }
        }
        .boxed()
        .shared()
    }

    /// The creation task body. Always clears the creation lock.
    async fn run_creation(&self, key: SandboxKey) -> Result<SandboxInfo> {
        let result = self.create_sandbox(key).await;

        let mut registry = self.inner.registry.lock().await;
        registry.creating.remove(&key);
        match result {
            Ok(mut info) => {
                info.status = SandboxStatus::Ready;
                registry.sandboxes.insert(key, info.clone());
                info!("Sandbox {} ready on port {} for {}", info.name, info.port, key);
                Ok(info)
            }
            Err(e) => {
                error!("Provisioning sandbox for {} failed: {}", key, e);
                Err(e)
            }
        }
    }

    async fn create_sandbox(&self, key: SandboxKey) -> Result<SandboxInfo> {
        // Content problems are caught before anything is allocated
        let source = self
            .inner
            .catalog
            .get_source_database(key.source_database_id)
            .await?;
        let content = prepare_content(&source.schema, &source.seed_data)?;

        let port = self.inner.ports.reserve().await?;
        let name = sandbox_name(&self.inner.name_prefix, key, Utc::now());
        let mut info = SandboxInfo::creating(key, name, port);
        self.inner
            .registry
            .lock()
            .await
            .sandboxes
            .insert(key, info.clone());
        info!(
            "Creating sandbox {} for {} from {} ({})",
            info.name, key, source.name, content.dialect
        );

        match self.bring_up(&mut info, &content).await {
            Ok(()) => Ok(info),
            Err(e) => {
                self.rollback(key, &info).await;
                Err(e)
            }
        }
    }

    async fn bring_up(&self, info: &mut SandboxInfo, content: &PreparedContent) -> Result<()> {
        let runtime_id = self.inner.runtime.create(&InstanceSpec::for_sandbox(info)).await?;
        info.runtime_id = Some(runtime_id.clone());
        let key = info.key();
        self.inner
            .registry
            .lock()
            .await
            .update(key, &info.name, |e| e.runtime_id = Some(runtime_id.clone()));

        self.inner.runtime.start(&runtime_id).await?;
        self.inner.connector.wait_ready(info).await?;
        self.inner
            .connector
            .load_content(info, &content.schema, &content.seed)
            .await?;
        debug!(
            "Loaded {} statements into {}",
            content.statement_count(),
            info.name
        );
        Ok(())
    }

    /// Undo a failed creation: runtime removed, port released, entry dropped.
    async fn rollback(&self, key: SandboxKey, info: &SandboxInfo) {
        self.inner
            .registry
            .lock()
            .await
            .update(key, &info.name, |e| e.status = SandboxStatus::Error);

        if let Some(runtime_id) = &info.runtime_id {
            if let Err(e) = self.inner.runtime.remove(runtime_id).await {
                warn!("Rollback could not remove {}: {}", info.name, e);
            }
        }
        self.inner.ports.release(info.port).await;
        self.inner.registry.lock().await.remove(key, &info.name);
        debug!("Rolled back sandbox {}", info.name);
    }

    /// Run `sql` against the ready sandbox for the key.
    ///
    /// Every statement is checked against the deny-list first.
    pub async fn query(&self, student_id: i64, source_database_id: i64, sql: &str) -> Result<QueryRows> {
        self.query_with_policy(student_id, source_database_id, sql, ValidationPolicy::DenyList)
            .await
    }

    /// Like [`query`](Self::query), but only read-only statements are accepted.
    pub async fn query_read_only(
        &self,
        student_id: i64,
        source_database_id: i64,
        sql: &str,
    ) -> Result<QueryRows> {
        self.query_with_policy(student_id, source_database_id, sql, ValidationPolicy::ReadOnly)
            .await
    }

    async fn query_with_policy(
        &self,
        student_id: i64,
        source_database_id: i64,
        sql: &str,
        policy: ValidationPolicy,
    ) -> Result<QueryRows> {
        validate_script(sql, policy)?;

        let key = SandboxKey::new(student_id, source_database_id);
        let info = self
            .get(key)
            .await
            .filter(|e| e.is_ready())
            .ok_or_else(|| SandboxError::ContainerNotFound {
                key: key.to_string(),
            })?;

        self.inner.connector.execute(&info, sql).await
    }

    /// Tear down the sandbox for the key. Returns whether one was removed.
    pub async fn teardown(&self, student_id: i64, source_database_id: i64) -> bool {
        self.teardown_entry(SandboxKey::new(student_id, source_database_id), None)
            .await
    }

    /// Tear down every ready sandbox of a student, concurrently.
    pub async fn teardown_all_for_student(&self, student_id: i64) -> usize {
        let keys: Vec<SandboxKey> = self
            .list()
            .await
            .into_iter()
            .filter(|e| e.student_id == student_id && e.is_ready())
            .map(|e| e.key())
            .collect();

        let removed = join_all(keys.into_iter().map(|key| self.teardown_entry(key, None)))
            .await
            .into_iter()
            .filter(|removed| *removed)
            .count();

        info!("Tore down {} sandbox(es) for student {}", removed, student_id);
        removed
    }

    /// Tear down a ready entry, optionally only if it is the sandbox `expected`.
    ///
    /// Entries that are creating, failing, or already being torn down belong
    /// to someone else and are left alone.
    pub(crate) async fn teardown_entry(&self, key: SandboxKey, expected: Option<&str>) -> bool {
        let info = {
            let mut registry = self.inner.registry.lock().await;
            match registry.sandboxes.get_mut(&key) {
                Some(entry)
                    if entry.is_ready() && expected.map_or(true, |name| entry.name == name) =>
                {
                    entry.status = SandboxStatus::Cleanup;
                    entry.clone()
                }
                _ => return false,
            }
        };

        info!("Tearing down sandbox {} for {}", info.name, key);
        if let Some(runtime_id) = &info.runtime_id {
            if let Err(e) = self.inner.runtime.stop(runtime_id).await {
                warn!("Failed to stop {}: {}", info.name, e);
            }
            if let Err(e) = self.inner.runtime.remove(runtime_id).await {
                warn!("Failed to remove {}: {}", info.name, e);
            }
        }
        self.inner.ports.release(info.port).await;
        self.inner.registry.lock().await.remove(key, &info.name);
        true
    }

    /// Current entry for a key, whatever its status.
    pub async fn get(&self, key: SandboxKey) -> Option<SandboxInfo> {
        self.inner.registry.lock().await.sandboxes.get(&key).cloned()
    }

    /// All tracked entries, ordered by key.
    pub async fn list(&self) -> Vec<SandboxInfo> {
        let mut entries: Vec<SandboxInfo> = self
            .inner
            .registry
            .lock()
            .await
            .sandboxes
            .values()
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.key());
        entries
    }

    pub async fn len(&self) -> usize {
        self.inner.registry.lock().await.sandboxes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Names of every tracked sandbox, including ones still being created.
    pub async fn tracked_names(&self) -> HashSet<String> {
        self.inner
            .registry
            .lock()
            .await
            .sandboxes
            .values()
            .map(|e| e.name.clone())
            .collect()
    }

    /// Let in-flight creations finish, then tear everything down.
    pub async fn shutdown(&self) -> usize {
        let pending: Vec<CreationFuture> = self
            .inner
            .registry
            .lock()
            .await
            .creating
            .values()
            .cloned()
            .collect();
        if !pending.is_empty() {
            info!("Waiting for {} in-flight creation(s)", pending.len());
            join_all(pending).await;
        }

        let keys: Vec<SandboxKey> = self.list().await.into_iter().map(|e| e.key()).collect();
        let removed = join_all(keys.into_iter().map(|key| self.teardown_entry(key, None)))
            .await
            .into_iter()
            .filter(|removed| *removed)
            .count();
        info!("Shutdown tore down {} sandbox(es)", removed);
        removed
    }
}
