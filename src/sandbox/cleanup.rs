//! Cleanup scheduler for sandbox reclamation
//!
//! Runs on the configured interval (default 5 minutes) and:
//! 1. Tears down sandboxes older than the maximum age
//! 2. Removes runtime instances carrying the sandbox prefix that the registry
//!    does not know about (left behind by a previous process)
//!
//! Per-student sweeps are triggered by the session layer instead.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::error::Result;
use super::orchestrator::SandboxOrchestrator;
use crate::config::CleanupConfig;

/// What one scheduler tick reclaimed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub aged: usize,
    pub orphans: usize,
}

/// Periodic and on-demand sandbox reclamation
pub struct CleanupScheduler {
    orchestrator: SandboxOrchestrator,
    config: CleanupConfig,
    shutdown: watch::Sender<bool>,
}

impl CleanupScheduler {
    pub fn new(orchestrator: SandboxOrchestrator, config: CleanupConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        CleanupScheduler {
            orchestrator,
            config,
            shutdown,
        }
    }

    /// Tear down every ready sandbox older than the maximum age.
    ///
    /// Running it again with nothing new to expire reclaims nothing.
    pub async fn sweep_aged(&self) -> usize {
        let max_age = self.config.max_age;
        let expired: Vec<_> = self
            .orchestrator
            .list()
            .await
            .into_iter()
            .filter(|e| e.is_ready() && e.age().to_std().is_ok_and(|age| age > max_age))
            .collect();

        if expired.is_empty() {
            return 0;
        }

        let removed = join_all(
            expired
                .iter()
                .map(|e| self.orchestrator.teardown_entry(e.key(), Some(e.name.as_str()))),
        )
        .await
        .into_iter()
        .filter(|removed| *removed)
        .count();

        info!("Age sweep reclaimed {} sandbox(es) older than {:?}", removed, max_age);
        removed
    }

    /// Remove runtime instances with the sandbox prefix that are not tracked.
    pub async fn sweep_orphans(&self) -> Result<usize> {
        let runtime = self.orchestrator.runtime();
        let prefix = self.orchestrator.name_prefix();

        // List before snapshotting: registry entries are inserted before their instance exists
        let instances = runtime.list_by_prefix(prefix).await?;
        let tracked = self.orchestrator.tracked_names().await;

        let mut removed = 0;
        for instance in instances.iter().filter(|i| !tracked.contains(&i.name)) {
            match runtime.remove(&instance.id).await {
                Ok(()) => {
                    info!("Removed orphan sandbox {}", instance.name);
                    removed += 1;
                }
                Err(e) => warn!("Failed to remove orphan {}: {}", instance.name, e),
            }
        }

        if removed > 0 {
            info!("Orphan sweep removed {} instance(s)", removed);
        }
        Ok(removed)
    }

    /// Release everything a student holds, on session end or a solved exercise.
    pub async fn sweep_student(&self, student_id: i64) -> usize {
        self.orchestrator.teardown_all_for_student(student_id).await
    }

    /// One scheduler pass. Failures are logged, not returned.
    pub async fn tick(&self) -> SweepReport {
        let aged = self.sweep_aged().await;
        let orphans = match self.sweep_orphans().await {
            Ok(n) => n,
            Err(e) => {
                error!("Orphan sweep failed: {}", e);
                0
            }
        };
        SweepReport { aged, orphans }
    }

    /// Main scheduler loop; returns after [`stop`](Self::stop).
    pub async fn run(self: Arc<Self>) {
        let mut stop = self.shutdown.subscribe();
        if *stop.borrow() {
            return;
        }

        if self.config.orphan_sweep_on_start {
            if let Err(e) = self.sweep_orphans().await {
                error!("Startup orphan sweep failed: {}", e);
            }
        }

        let mut interval = tokio::time::interval(self.config.interval);
        info!(
            "Cleanup scheduler started, interval: {:?}, max age: {:?}",
            self.config.interval, self.config.max_age
        );

        // Skip the first immediate tick
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.tick().await;
                    debug!("Cleanup tick: {:?}", report);
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Cleanup scheduler stopped");
    }

    /// Run the loop on a background task.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Signal the loop to exit after its current pass.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }
}
