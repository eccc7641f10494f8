//! Orphan discovery and removal.
//!
//! An orphan is a container carrying the managed and cleanup labels that no live
//! orchestrator owns, typically left behind by a crashed or killed test process.
//! Running containers are included.

use std::sync::Arc;

use futures::future::join_all;
use skiff_common::{labels, SessionId, SkiffError, SkiffResult};

use crate::engine::{ContainerDescriptor, ContainerOperations};
use crate::registry::OwnershipRegistry;

/// Outcome of a best-effort purge.
#[derive(Debug, Default)]
pub struct PurgeReport {
    /// IDs that are gone.
    pub removed: Vec<String>,
    /// IDs that could not be removed, with the reason.
    pub failed: Vec<(String, SkiffError)>,
}

impl PurgeReport {
    /// Whether every removal succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Total number of containers attempted.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.removed.len() + self.failed.len()
    }

    /// Convert into the removed IDs, or [`SkiffError::OrphanPurgePartialFailure`].
    ///
    /// # Errors
    ///
    /// Returns an error if any removal failed.
    pub fn into_result(self) -> SkiffResult<Vec<String>> {
        if self.failed.is_empty() {
            return Ok(self.removed);
        }
        Err(SkiffError::OrphanPurgePartialFailure {
            removed: self.removed.len(),
            failed: self.failed.len(),
            failed_ids: self.failed.into_iter().map(|(id, _)| id).collect(),
        })
    }
}

/// Finds and removes orphans on behalf of one session.
#[derive(Clone)]
pub struct OrphanReconciler {
    containers: Arc<dyn ContainerOperations>,
    registry: Arc<OwnershipRegistry>,
    session: SessionId,
}

impl OrphanReconciler {
    /// Reconciler that spares containers in `registry` and those of `session`.
    pub fn new(
        containers: Arc<dyn ContainerOperations>,
        registry: Arc<OwnershipRegistry>,
        session: SessionId,
    ) -> Self {
        Self {
            containers,
            registry,
            session,
        }
    }

    /// Managed, cleanup-eligible containers not owned by this session.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot list containers.
    pub async fn find_orphans(&self) -> SkiffResult<Vec<ContainerDescriptor>> {
        let candidates = self
            .containers
            .list_by_labels(&labels::orphan_filter())
            .await?;
        let total = candidates.len();

        let orphans: Vec<_> = candidates
            .into_iter()
            .filter(|c| !self.registry.contains(&c.id))
            .filter(|c| c.session() != Some(self.session.as_str()))
            .collect();

        tracing::debug!(candidates = total, orphans = orphans.len(), "Found orphans");
        Ok(orphans)
    }

    /// Remove every orphan concurrently.
    ///
    /// One failure never prevents the other removals. A container that is already
    /// gone, or already being removed by the engine, counts as removed.
    pub async fn purge_all(&self, orphans: &[ContainerDescriptor]) -> PurgeReport {
        let removals = orphans.iter().map(|orphan| async move {
            let result = self.containers.remove(&orphan.id).await;
            (orphan.id.clone(), result)
        });

        let mut report = PurgeReport::default();
        for (id, result) in join_all(removals).await {
            match result {
                Ok(()) => {
                    tracing::info!(container = %id, "Removed orphan");
                    report.removed.push(id);
                }
                Err(e) if e.is_not_found() || e.is_removal_in_progress() => {
                    tracing::debug!(container = %id, "Orphan already gone");
                    report.removed.push(id);
                }
                Err(e) => {
                    tracing::warn!(container = %id, error = %e, "Failed to remove orphan");
                    report.failed.push((id, e));
                }
            }
        }
        report
    }

    /// Find and purge in one step.
    ///
    /// # Errors
    ///
    /// Returns an error only if discovery fails; removal failures are reported.
    pub async fn reconcile(&self) -> SkiffResult<PurgeReport> {
        let orphans = self.find_orphans().await?;
        Ok(self.purge_all(&orphans).await)
    }
}

impl std::fmt::Debug for OrphanReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrphanReconciler")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
