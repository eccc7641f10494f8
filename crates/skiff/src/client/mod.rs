//! Lifecycle orchestrator.
//!
//! [`SkiffClient`] composes the engine facade, the ownership registry and the
//! orphan reconciler into the public container lifecycle. Every operation takes a
//! [`CancellationToken`] that is checked at each engine call; a cancelled call
//! returns [`SkiffError::Cancelled`] and performs no rollback.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use skiff_common::{SessionId, SkiffConfig, SkiffError, SkiffResult};
use tokio_util::sync::CancellationToken;

use crate::archive::{self, ArchiveEntry};
use crate::engine::{
    ContainerConfig, ContainerDescriptor, CreateRequest, Engine, ImageBuildConfig,
    OutputConsumer,
};
use crate::reconciler::{OrphanReconciler, PurgeReport};
use crate::registry::OwnershipRegistry;


/// Marker file the Docker engine creates inside every container.
const DOCKERENV: &str = "/.dockerenv";

/// Race `operation` against `cancel`.
///
/// # Errors
///
/// Returns [`SkiffError::Cancelled`] if `cancel` fires first, otherwise the
/// future's own result.
pub async fn cancellable<T>(
    cancel: &CancellationToken,
    operation: &str,
    future: impl Future<Output = SkiffResult<T>>,
) -> SkiffResult<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(SkiffError::cancelled(operation)),
        result = future => result,
    }
}

/// Orchestrates test containers on one engine.
///
/// Construct one per test session, call [`teardown`](Self::teardown) on every
/// exit path, then [`close`](Self::close) it.
pub struct SkiffClient {
    engine: Engine,
    registry: Arc<OwnershipRegistry>,
    session: SessionId,
    config: SkiffConfig,
}

impl SkiffClient {
    /// Create a client for the current process session.
    #[must_use]
    pub fn new(engine: Engine, config: SkiffConfig) -> Self {
        Self {
            engine,
            registry: Arc::new(OwnershipRegistry::new()),
            session: SessionId::current().clone(),
            config,
        }
    }

    /// Use a specific session instead of the process-wide one.
    #[must_use]
    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = session;
        self
    }

    /// Containers created by this client.
    #[must_use]
    pub fn registry(&self) -> &OwnershipRegistry {
        &self.registry
    }

    /// Session stamped on created containers.
    #[must_use]
    pub const fn session(&self) -> &SessionId {
        &self.session
    }

    /// Engine facade in use.
    #[must_use]
    pub const fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Reconciler sparing this client's containers.
    #[must_use]
    pub fn reconciler(&self) -> OrphanReconciler {
        OrphanReconciler::new(
            Arc::clone(&self.engine.containers),
            Arc::clone(&self.registry),
            self.session.clone(),
        )
    }

    /// Whether this process runs inside a Docker container.
    #[must_use]
    pub fn is_running_inside_container() -> bool {
        Path::new(DOCKERENV).exists()
    }

    /// Pull the image if needed, purge orphans, then create and start a container.
    ///
    /// The returned ID is registered with `config.cleanup` before this returns.
    /// Orphan purge failures are logged and never fail the run.
    ///
    /// # Errors
    ///
    /// Returns [`SkiffError::ImageBuildFailed`] if the image cannot be pulled,
    /// [`SkiffError::ContainerCreateFailed`] if the engine rejects the container,
    /// or any transport error.
    pub async fn run(
        &self,
        config: &ContainerConfig,
        cancel: &CancellationToken,
    ) -> SkiffResult<String> {
        let image = config.image.full_name();
        tracing::debug!(image = %image, session = %self.session, "Running container");

        let (ensured, ()) = tokio::join!(
            self.ensure_image(config, cancel),
            self.purge_orphans(cancel)
        );
        ensured?;

        let request = CreateRequest::new(config, &self.session);
        let id = cancellable(cancel, "run container", self.engine.containers.run(&request)).await?;
        self.registry.register(id.clone(), config.cleanup);

        tracing::info!(container = %id, image = %image, "Container running");
        Ok(id)
    }

    async fn ensure_image(
        &self,
        config: &ContainerConfig,
        cancel: &CancellationToken,
    ) -> SkiffResult<()> {
        let name = config.image.full_name();
        let present = cancellable(
            cancel,
            "inspect image",
            self.engine.images.exists_with_name(&name),
        )
        .await?;
        if present {
            tracing::debug!(image = %name, "Image present");
            return Ok(());
        }

        tracing::info!(image = %name, "Pulling image");
        cancellable(
            cancel,
            "pull image",
            self.engine
                .images
                .create(&config.image, config.auth_config.as_ref()),
        )
        .await
    }

    async fn purge_orphans(&self, cancel: &CancellationToken) {
        if !self.config.purge_orphans_on_run {
            return;
        }

        let reconciler = self.reconciler();
        match cancellable(cancel, "purge orphans", reconciler.reconcile()).await {
            Ok(report) => {
                if let Err(e) = report.into_result() {
                    tracing::warn!(error = %e, "Orphan purge incomplete");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Orphan discovery failed"),
        }
    }

    async fn exists(&self, id: &str, cancel: &CancellationToken) -> SkiffResult<bool> {
        cancellable(
            cancel,
            "inspect container",
            self.engine.containers.exists_with_id(id),
        )
        .await
    }

    /// Start a container. Does nothing if it no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the start.
    pub async fn start(&self, id: &str, cancel: &CancellationToken) -> SkiffResult<()> {
        if !self.exists(id, cancel).await? {
            tracing::debug!(container = %id, "Container absent, skipping start");
            return Ok(());
        }
        cancellable(cancel, "start container", self.engine.containers.start(id)).await?;
        tracing::info!(container = %id, "Started container");
        Ok(())
    }

    /// Stop a container. Does nothing if it no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the stop.
    pub async fn stop(&self, id: &str, cancel: &CancellationToken) -> SkiffResult<()> {
        if !self.exists(id, cancel).await? {
            tracing::debug!(container = %id, "Container absent, skipping stop");
            return Ok(());
        }
        cancellable(
            cancel,
            "stop container",
            self.engine
                .containers
                .stop(id, self.config.stop_timeout_secs),
        )
        .await?;
        tracing::info!(container = %id, "Stopped container");
        Ok(())
    }

    /// Remove a container and forget it.
    ///
    /// Absent containers and the engine's own in-flight auto-remove count as
    /// success. The registry entry is dropped on every path, failures included.
    ///
    /// # Errors
    ///
    /// Returns any other engine rejection.
    pub async fn remove(&self, id: &str, cancel: &CancellationToken) -> SkiffResult<()> {
        let result = self.remove_from_engine(id, cancel).await;
        self.registry.unregister(id);
        result
    }

    async fn remove_from_engine(&self, id: &str, cancel: &CancellationToken) -> SkiffResult<()> {
        if !self.exists(id, cancel).await? {
            tracing::debug!(container = %id, "Container absent, skipping remove");
            return Ok(());
        }

        match cancellable(cancel, "remove container", self.engine.containers.remove(id)).await {
            Ok(()) => {
                tracing::info!(container = %id, "Removed container");
                Ok(())
            }
            Err(e) if e.is_removal_in_progress() => {
                tracing::debug!(container = %id, "Engine already removing container");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Forward the container's output to `consumer` until it ends or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`SkiffError::ContainerNotFound`] if the container does not exist,
    /// or [`SkiffError::Cancelled`] if the stream was cut short.
    pub async fn attach(
        &self,
        id: &str,
        consumer: &dyn OutputConsumer,
        cancel: &CancellationToken,
    ) -> SkiffResult<()> {
        if !self.exists(id, cancel).await? {
            return Err(SkiffError::ContainerNotFound { id: id.to_string() });
        }

        tracing::debug!(container = %id, "Attaching to container");
        self.engine.containers.attach(id, consumer, cancel).await?;
        if cancel.is_cancelled() {
            return Err(SkiffError::cancelled("attach container"));
        }
        Ok(())
    }

    /// Run `command` in a running container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist or the exec fails.
    pub async fn exec(
        &self,
        id: &str,
        command: &[String],
        cancel: &CancellationToken,
    ) -> SkiffResult<i64> {
        let code = cancellable(cancel, "exec", self.engine.containers.exec(id, command)).await?;
        tracing::debug!(container = %id, ?command, exit_code = code, "Exec finished");
        Ok(code)
    }

    /// Exit code of a stopped container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist.
    pub async fn get_exit_code(&self, id: &str, cancel: &CancellationToken) -> SkiffResult<i64> {
        cancellable(cancel, "inspect container", self.engine.containers.exit_code(id)).await
    }

    /// Engine view of a container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist.
    pub async fn get_container(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> SkiffResult<ContainerDescriptor> {
        cancellable(cancel, "inspect container", self.engine.containers.inspect(id)).await
    }

    /// Whether the engine runs Windows containers.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be queried.
    pub async fn is_windows_engine_enabled(&self, cancel: &CancellationToken) -> SkiffResult<bool> {
        cancellable(
            cancel,
            "engine info",
            self.engine.system.is_windows_engine_enabled(),
        )
        .await
    }

    /// Write one file into the container filesystem.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be packed or the engine rejects it.
    pub async fn copy_file(
        &self,
        id: &str,
        entry: &ArchiveEntry,
        cancel: &CancellationToken,
    ) -> SkiffResult<()> {
        let archive = archive::pack(entry)?;
        cancellable(
            cancel,
            "copy file",
            self.engine.containers.extract_archive(id, "/", archive),
        )
        .await?;
        tracing::debug!(container = %id, path = %entry.path, size = entry.content.len(), "Copied file");
        Ok(())
    }

    /// Build an image from a context directory.
    ///
    /// # Errors
    ///
    /// Returns [`SkiffError::ImageBuildFailed`] if the engine rejects the build.
    pub async fn build_image(
        &self,
        config: &ImageBuildConfig,
        cancel: &CancellationToken,
    ) -> SkiffResult<String> {
        let image = cancellable(cancel, "build image", self.engine.images.build(config)).await?;
        tracing::info!(image = %image, "Built image");
        Ok(image)
    }

    /// Create a network.
    ///
    /// # Errors
    ///
    /// Returns [`SkiffError::NetworkOperationFailed`] if the engine rejects it.
    pub async fn create_network(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> SkiffResult<String> {
        let id = cancellable(cancel, "create network", self.engine.networks.create(name)).await?;
        tracing::info!(network = %name, id = %id, "Created network");
        Ok(id)
    }

    /// Delete a network.
    ///
    /// # Errors
    ///
    /// Returns [`SkiffError::NetworkOperationFailed`] if the engine rejects it.
    pub async fn delete_network(&self, id: &str, cancel: &CancellationToken) -> SkiffResult<()> {
        cancellable(cancel, "delete network", self.engine.networks.delete(id)).await?;
        tracing::info!(network = %id, "Deleted network");
        Ok(())
    }

    /// Remove every registered container marked for cleanup.
    ///
    /// Containers registered with
    /// [`LeaveInPlace`](crate::engine::CleanupPolicy::LeaveInPlace) are forgotten
    /// but stay on the engine. Removals run concurrently and fail independently.
    pub async fn teardown(&self, cancel: &CancellationToken) -> PurgeReport {
        let eligible = self.registry.cleanup_eligible();
        for id in self.registry.list_registered().difference(&eligible) {
            self.registry.unregister(id);
        }

        let removals = eligible.iter().map(|id| async move {
            (id.clone(), self.remove(id, cancel).await)
        });

        let mut report = PurgeReport::default();
        for (id, result) in join_all(removals).await {
            match result {
                Ok(()) => report.removed.push(id),
                Err(e) => {
                    tracing::warn!(container = %id, error = %e, "Teardown removal failed");
                    report.failed.push((id, e));
                }
            }
        }

        tracing::info!(
            removed = report.removed.len(),
            failed = report.failed.len(),
            "Teardown complete"
        );
        report
    }

    /// Release the engine handle.
    pub fn close(self) {
        tracing::debug!(session = %self.session, "Closing client");
    }
}

impl Drop for SkiffClient {
    fn drop(&mut self) {
        let pending = self.registry.cleanup_eligible();
        if !pending.is_empty() {
            tracing::warn!(
                count = pending.len(),
                "Client dropped with containers still registered for cleanup; call teardown first"
            );
        }
    }
}

impl std::fmt::Debug for SkiffClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkiffClient")
            .field("session", &self.session)
            .field("registered", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
