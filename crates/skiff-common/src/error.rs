//! Error taxonomy shared by every Skiff crate.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`SkiffError`].
pub type SkiffResult<T> = Result<T, SkiffError>;

/// Errors raised while orchestrating containers against an engine.
#[derive(Error, Diagnostic, Debug)]
pub enum SkiffError {
    /// The engine transport could not be reached.
    #[error("Container engine unreachable at {endpoint}: {message}")]
    #[diagnostic(
        code(skiff::engine::unreachable),
        help("Check that the Docker daemon is running and DOCKER_HOST points at it")
    )]
    EngineUnreachable {
        /// Endpoint the request was addressed to.
        endpoint: String,
        /// Transport failure description.
        message: String,
    },

    /// Container not found.
    #[error("Container not found: {id}")]
    #[diagnostic(code(skiff::container::not_found))]
    ContainerNotFound {
        /// The container ID that was not found.
        id: String,
    },

    /// The engine is already removing the container (auto-remove fired first).
    #[error("Removal of container {id} is already in progress")]
    #[diagnostic(code(skiff::container::removal_in_progress))]
    RemovalInProgress {
        /// The container being removed.
        id: String,
    },

    /// Pulling or building an image was rejected by the engine.
    #[error("Image build failed for {reference}: {message}")]
    #[diagnostic(code(skiff::image::build_failed))]
    ImageBuildFailed {
        /// Image the engine was asked to produce.
        reference: String,
        /// Engine-reported reason.
        message: String,
    },

    /// Creating or starting a container was rejected by the engine.
    #[error("Container create failed for image {image}: {message}")]
    #[diagnostic(code(skiff::container::create_failed))]
    ContainerCreateFailed {
        /// Image the container was created from.
        image: String,
        /// Engine-reported reason.
        message: String,
    },

    /// Creating or deleting a network was rejected by the engine.
    #[error("Network operation failed for {network}: {message}")]
    #[diagnostic(code(skiff::network::operation_failed))]
    NetworkOperationFailed {
        /// Network name or ID.
        network: String,
        /// Engine-reported reason.
        message: String,
    },

    /// One or more best-effort orphan removals failed.
    #[error("Orphan purge removed {removed} container(s), {failed} failed: {}", .failed_ids.join(", "))]
    #[diagnostic(
        code(skiff::orphan::partial_failure),
        help("Remove the listed containers manually with `skiff rm`")
    )]
    OrphanPurgePartialFailure {
        /// Number of orphans removed.
        removed: usize,
        /// Number of orphans that could not be removed.
        failed: usize,
        /// IDs of the orphans that could not be removed.
        failed_ids: Vec<String>,
    },

    /// Any other engine rejection, carried through unchanged.
    #[error("Engine rejected {operation} (status {status}): {message}")]
    #[diagnostic(code(skiff::engine::rejected))]
    Engine {
        /// Engine operation that failed.
        operation: String,
        /// Engine status code.
        status: u16,
        /// Engine-reported reason.
        message: String,
    },

    /// The operation was cancelled by its caller.
    #[error("Operation cancelled: {operation}")]
    #[diagnostic(code(skiff::cancelled))]
    Cancelled {
        /// The operation that was interrupted.
        operation: String,
    },

    /// Invalid image reference.
    #[error("Invalid image reference: {reference}")]
    #[diagnostic(
        code(skiff::image::invalid_reference),
        help("Use formats like 'alpine', 'nginx:1.27' or 'ghcr.io/org/app@sha256:...'")
    )]
    InvalidImageReference {
        /// The invalid reference.
        reference: String,
    },

    /// Invalid engine endpoint.
    #[error("Invalid engine endpoint: {endpoint}")]
    #[diagnostic(
        code(skiff::config::invalid_endpoint),
        help("Use 'unix:///var/run/docker.sock', 'tcp://host:2375' or 'http://host:2375'")
    )]
    InvalidEndpoint {
        /// The invalid endpoint string.
        endpoint: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(skiff::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(skiff::serialization))]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(skiff::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    #[diagnostic(code(skiff::internal))]
    Internal {
        /// The error message.
        message: String,
    },
}

impl SkiffError {
    /// Whether this error reports a missing container.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ContainerNotFound { .. })
    }

    /// Whether this error is the engine's auto-remove race.
    #[must_use]
    pub const fn is_removal_in_progress(&self) -> bool {
        matches!(self, Self::RemovalInProgress { .. })
    }

    /// Build a [`SkiffError::Cancelled`] for `operation`.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }
}

impl From<serde_json::Error> for SkiffError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for SkiffError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

/// Whether an engine removal failure reason is the auto-remove race for `id`.
///
/// The engine reports `removal of container <id> is already in progress` when its
/// own auto-remove-on-exit fired first. Matching is on the exact sentence, with
/// the engine's optional `Error response from daemon:` prefix tolerated.
#[must_use]
pub fn is_removal_in_progress_message(id: &str, message: &str) -> bool {
    let reason = message
        .trim()
        .trim_start_matches("Error response from daemon:")
        .trim();
    reason == format!("removal of container {id} is already in progress")
}
