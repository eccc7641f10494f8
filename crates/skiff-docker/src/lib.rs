//! # skiff-docker
//!
//! Docker Engine API backend for Skiff.
//!
//! [`DockerEngine`] implements the container, image, network and system
//! sub-clients of [`skiff::engine`] over a single `bollard` connection and maps
//! engine failures onto [`skiff_common::SkiffError`]:
//!
//! | Engine condition | Error |
//! |------------------|-------|
//! | Connection or transport failure | `EngineUnreachable` |
//! | 404 on a container | `ContainerNotFound` |
//! | 409 `removal of container <id> is already in progress` | `RemovalInProgress` |
//! | Pull or build rejected | `ImageBuildFailed` |
//! | Create or start rejected | `ContainerCreateFailed` |
//! | Network create or delete rejected | `NetworkOperationFailed` |
//! | Anything else | `Engine` |
//!
//! Nothing is retried.

#![warn(missing_docs)]

mod context;
mod engine;
mod translate;

pub use engine::DockerEngine;

use skiff::SkiffClient;
use skiff_common::{SkiffConfig, SkiffResult};

/// Connect to the configured engine and build a client on it.
///
/// # Errors
///
/// Returns [`skiff_common::SkiffError::EngineUnreachable`] if the engine does not
/// respond.
pub async fn connect_client(config: SkiffConfig) -> SkiffResult<SkiffClient> {
    let engine = DockerEngine::connect_and_ping(&config).await?;
    tracing::info!(endpoint = %engine.endpoint(), "Docker engine ready");
    Ok(SkiffClient::new(engine.into_engine(), config))
}
