//! # skiff
//!
//! Lifecycle orchestration for ephemeral test containers.
//!
//! This crate provides:
//! - [`SkiffClient`], the public lifecycle: run, start, stop, remove, attach,
//!   exec, copy files, build images, manage networks
//! - An ownership registry of containers created by the running process
//! - Orphan reconciliation against the engine's ownership labels
//! - Single-file tar packing for file injection
//! - The engine facade traits implemented by `skiff-docker`
//!
//! ## Example
//!
//! ```rust,ignore
//! use skiff::{ContainerConfig, SkiffClient};
//! use tokio_util::sync::CancellationToken;
//!
//! let client = SkiffClient::new(engine, SkiffConfig::from_env());
//! let cancel = CancellationToken::new();
//! let id = client.run(&ContainerConfig::new("nginx:latest".parse()?), &cancel).await?;
//! client.remove(&id, &cancel).await?;
//! client.teardown(&cancel).await;
//! client.close();
//! ```

#![warn(missing_docs)]

pub mod archive;
pub mod client;
pub mod engine;
pub mod reconciler;
pub mod registry;

pub use archive::{pack, ArchiveEntry};
pub use client::{cancellable, SkiffClient};
pub use engine::{
    AuthConfig, CleanupPolicy, ContainerConfig, ContainerDescriptor, ContainerOperations,
    CreateRequest, Engine, ImageBuildConfig, ImageOperations, NetworkOperations, OutputConsumer,
    OutputStream, SystemOperations,
};
pub use reconciler::{OrphanReconciler, PurgeReport};
pub use registry::OwnershipRegistry;

pub use skiff_common::{SkiffConfig, SkiffError, SkiffResult};
