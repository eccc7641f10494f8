//! # skiff-common
//!
//! Shared types for the Skiff test-container orchestrator.
//!
//! This crate provides functionality used across all Skiff crates:
//! - The error taxonomy surfaced by lifecycle operations
//! - Ownership labels that mark containers Skiff created
//! - Container, session and image identifiers
//! - Engine endpoint and orchestrator configuration

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod id;
pub mod labels;
pub mod reference;

pub use config::{EngineEndpoint, SkiffConfig};
pub use error::{SkiffError, SkiffResult};
pub use id::{ContainerId, SessionId};
pub use reference::{ImageReference, ImageTag};
