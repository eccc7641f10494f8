//! Typed engine facade.
//!
//! Each trait covers one engine sub-client. Implementations translate engine
//! failures into [`SkiffError`](skiff_common::SkiffError) variants and never retry.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use skiff_common::{ImageReference, SkiffResult};
use tokio_util::sync::CancellationToken;

#[cfg(test)]
pub(crate) mod fake;
mod types;

pub use types::{
    AuthConfig, CleanupPolicy, ContainerConfig, ContainerDescriptor, CreateRequest,
    ImageBuildConfig, OutputConsumer, OutputStream,
};

/// Container sub-client.
#[async_trait]
pub trait ContainerOperations: Send + Sync {
    /// Whether a container with this ID or name exists.
    async fn exists_with_id(&self, id: &str) -> SkiffResult<bool>;

    /// Containers carrying every `key=value` label of `filter`, in any state.
    async fn list_by_labels(
        &self,
        filter: &[(String, String)],
    ) -> SkiffResult<Vec<ContainerDescriptor>>;

    /// Inspect one container.
    async fn inspect(&self, id: &str) -> SkiffResult<ContainerDescriptor>;

    /// Exit code of a stopped container.
    async fn exit_code(&self, id: &str) -> SkiffResult<i64>;

    /// Create and start a container, returning its ID.
    async fn run(&self, request: &CreateRequest) -> SkiffResult<String>;

    /// Start a created container.
    async fn start(&self, id: &str) -> SkiffResult<()>;

    /// Stop a running container, killing it after `timeout_secs`.
    async fn stop(&self, id: &str, timeout_secs: u64) -> SkiffResult<()>;

    /// Force-remove a container and its anonymous volumes.
    async fn remove(&self, id: &str) -> SkiffResult<()>;

    /// Stream output frames to `consumer` until the stream ends or `cancel` fires.
    async fn attach(
        &self,
        id: &str,
        consumer: &dyn OutputConsumer,
        cancel: &CancellationToken,
    ) -> SkiffResult<()>;

    /// Run `command` inside the container and return its exit code.
    async fn exec(&self, id: &str, command: &[String]) -> SkiffResult<i64>;

    /// Extract a tar archive into the container filesystem at `path`.
    async fn extract_archive(&self, id: &str, path: &str, archive: Bytes) -> SkiffResult<()>;
}

/// Image sub-client.
#[async_trait]
pub trait ImageOperations: Send + Sync {
    /// Whether an image with this full name is present locally.
    async fn exists_with_name(&self, name: &str) -> SkiffResult<bool>;

    /// Pull `image`.
    async fn create(&self, image: &ImageReference, auth: Option<&AuthConfig>) -> SkiffResult<()>;

    /// Build an image from a context directory, returning its reference.
    async fn build(&self, config: &ImageBuildConfig) -> SkiffResult<String>;
}

/// Network sub-client.
#[async_trait]
pub trait NetworkOperations: Send + Sync {
    /// Create a network, returning its ID.
    async fn create(&self, name: &str) -> SkiffResult<String>;

    /// Delete a network.
    async fn delete(&self, id: &str) -> SkiffResult<()>;
}

/// System sub-client.
#[async_trait]
pub trait SystemOperations: Send + Sync {
    /// Whether the engine runs Windows containers.
    async fn is_windows_engine_enabled(&self) -> SkiffResult<bool>;
}

/// Shared handle over the four sub-clients.
///
/// Cloning shares the same transport.
#[derive(Clone)]
pub struct Engine {
    /// Container operations.
    pub containers: Arc<dyn ContainerOperations>,
    /// Image operations.
    pub images: Arc<dyn ImageOperations>,
    /// Network operations.
    pub networks: Arc<dyn NetworkOperations>,
    /// System operations.
    pub system: Arc<dyn SystemOperations>,
}

impl Engine {
    /// Bundle one transport implementing every sub-client.
    pub fn new<T>(transport: T) -> Self
    where
        T: ContainerOperations + ImageOperations + NetworkOperations + SystemOperations + 'static,
    {
        let transport = Arc::new(transport);
        Self {
            containers: transport.clone(),
            images: transport.clone(),
            networks: transport.clone(),
            system: transport,
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}
