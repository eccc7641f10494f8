//! Values exchanged with the engine facade.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use skiff_common::{labels, ImageReference, SessionId};

/// Whether a container may be removed automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPolicy {
    /// Remove on teardown and when found as an orphan.
    #[default]
    CleanUpOnRemove,
    /// Never removed automatically.
    LeaveInPlace,
}

impl CleanupPolicy {
    /// Whether this policy makes the container eligible for automatic removal.
    #[must_use]
    pub const fn is_eligible(self) -> bool {
        matches!(self, Self::CleanUpOnRemove)
    }
}

impl From<bool> for CleanupPolicy {
    fn from(cleanup: bool) -> Self {
        if cleanup {
            Self::CleanUpOnRemove
        } else {
            Self::LeaveInPlace
        }
    }
}

/// Registry credentials forwarded with image pulls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Registry user.
    pub username: Option<String>,
    /// Registry password.
    pub password: Option<String>,
    /// Registry host the credentials belong to.
    pub server_address: Option<String>,
    /// OAuth identity token.
    pub identity_token: Option<String>,
}

/// Caller description of a container to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    /// Image to run.
    pub image: ImageReference,
    /// Credentials for pulling `image`.
    pub auth_config: Option<AuthConfig>,
    /// Container name.
    pub name: Option<String>,
    /// Environment variables.
    pub env: BTreeMap<String, String>,
    /// Caller labels. Ownership labels are added on top.
    pub labels: BTreeMap<String, String>,
    /// Command override.
    pub command: Vec<String>,
    /// Entrypoint override.
    pub entrypoint: Vec<String>,
    /// Working directory.
    pub working_dir: Option<String>,
    /// Ports to expose, as `port/proto`.
    pub exposed_ports: Vec<String>,
    /// Let the engine remove the container once it exits.
    pub auto_remove: bool,
    /// Cleanup eligibility.
    pub cleanup: CleanupPolicy,
}

impl ContainerConfig {
    /// Minimal configuration for `image`.
    pub fn new(image: ImageReference) -> Self {
        Self {
            image,
            auth_config: None,
            name: None,
            env: BTreeMap::new(),
            labels: BTreeMap::new(),
            command: Vec::new(),
            entrypoint: Vec::new(),
            working_dir: None,
            exposed_ports: Vec::new(),
            auto_remove: false,
            cleanup: CleanupPolicy::default(),
        }
    }

    /// Set the container name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Override the command.
    #[must_use]
    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Override the entrypoint.
    #[must_use]
    pub fn with_entrypoint<I, S>(mut self, entrypoint: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entrypoint = entrypoint.into_iter().map(Into::into).collect();
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Expose a port, e.g. `80/tcp`.
    #[must_use]
    pub fn with_exposed_port(mut self, port: impl Into<String>) -> Self {
        self.exposed_ports.push(port.into());
        self
    }

    /// Set registry credentials.
    #[must_use]
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth_config = Some(auth);
        self
    }

    /// Enable engine-side removal on exit.
    #[must_use]
    pub const fn with_auto_remove(mut self, auto_remove: bool) -> Self {
        self.auto_remove = auto_remove;
        self
    }

    /// Set the cleanup policy.
    #[must_use]
    pub const fn with_cleanup(mut self, cleanup: CleanupPolicy) -> Self {
        self.cleanup = cleanup;
        self
    }
}

/// A container creation request as sent to the engine.
///
/// Only constructible from a [`ContainerConfig`], which stamps the ownership
/// labels; every container the facade creates is therefore discoverable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    /// Image to run, as its full name.
    pub image: String,
    /// Container name.
    pub name: Option<String>,
    /// `KEY=value` environment entries.
    pub env: Vec<String>,
    /// Caller labels merged with ownership labels.
    pub labels: BTreeMap<String, String>,
    /// Command override.
    pub command: Vec<String>,
    /// Entrypoint override.
    pub entrypoint: Vec<String>,
    /// Working directory.
    pub working_dir: Option<String>,
    /// Ports to expose.
    pub exposed_ports: Vec<String>,
    /// Engine-side removal on exit.
    pub auto_remove: bool,
}

impl CreateRequest {
    /// Build the request for `config`, labelled for `session`.
    #[must_use]
    pub fn new(config: &ContainerConfig, session: &SessionId) -> Self {
        Self {
            image: config.image.full_name(),
            name: config.name.clone(),
            env: config
                .env
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect(),
            labels: labels::stamp(&config.labels, config.cleanup.is_eligible(), session),
            command: config.command.clone(),
            entrypoint: config.entrypoint.clone(),
            working_dir: config.working_dir.clone(),
            exposed_ports: config.exposed_ports.clone(),
            auto_remove: config.auto_remove,
        }
    }
}

/// Instructions for building an image from a local context directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuildConfig {
    /// Build context directory.
    pub context: PathBuf,
    /// Dockerfile path relative to `context`.
    pub dockerfile: String,
    /// Tag for the built image.
    pub image: ImageReference,
    /// `ARG` values.
    pub build_args: BTreeMap<String, String>,
    /// Labels applied to the image.
    pub labels: BTreeMap<String, String>,
    /// Remove intermediate containers after a successful build.
    pub remove_intermediate: bool,
    /// Ignore the engine build cache.
    pub no_cache: bool,
}

impl ImageBuildConfig {
    /// Build `image` from `context` using its `Dockerfile`.
    pub fn new(context: impl Into<PathBuf>, image: ImageReference) -> Self {
        Self {
            context: context.into(),
            dockerfile: "Dockerfile".to_string(),
            image,
            build_args: BTreeMap::new(),
            labels: BTreeMap::new(),
            remove_intermediate: true,
            no_cache: false,
        }
    }

    /// Use a different Dockerfile.
    #[must_use]
    pub fn with_dockerfile(mut self, dockerfile: impl Into<String>) -> Self {
        self.dockerfile = dockerfile.into();
        self
    }

    /// Add a build argument.
    #[must_use]
    pub fn with_build_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_args.insert(key.into(), value.into());
        self
    }

    /// Disable the build cache.
    #[must_use]
    pub const fn with_no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }
}

/// Engine view of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDescriptor {
    /// Engine-assigned ID.
    pub id: String,
    /// Names, without the engine's leading slash.
    pub names: Vec<String>,
    /// Image the container runs.
    pub image: String,
    /// Engine state string (`running`, `exited`, ...).
    pub state: String,
    /// Labels.
    pub labels: BTreeMap<String, String>,
    /// Creation time in seconds since the epoch, when the engine reports it.
    pub created: Option<i64>,
}

impl ContainerDescriptor {
    /// Whether the engine reports the container running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }

    /// Value of the session label, if present.
    #[must_use]
    pub fn session(&self) -> Option<&str> {
        self.labels.get(labels::SESSION).map(String::as_str)
    }
}

/// Which stream an output frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Receives container output frames during attach.
pub trait OutputConsumer: Send + Sync {
    /// Handle one frame.
    fn consume(&self, stream: OutputStream, data: &[u8]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nginx() -> ImageReference {
        "nginx:latest".parse().unwrap()
    }

    #[test]
    fn cleanup_policy_from_flag() {
        assert_eq!(CleanupPolicy::from(true), CleanupPolicy::CleanUpOnRemove);
        assert_eq!(CleanupPolicy::from(false), CleanupPolicy::LeaveInPlace);
        assert!(!CleanupPolicy::LeaveInPlace.is_eligible());
    }

    #[test]
    fn create_request_stamps_ownership() {
        let config = ContainerConfig::new(nginx())
            .with_env("A", "1")
            .with_label(labels::CLEANUP, "true")
            .with_cleanup(CleanupPolicy::LeaveInPlace);
        let session = SessionId::from("s");

        let request = CreateRequest::new(&config, &session);

        assert_eq!(request.image, "nginx:latest");
        assert_eq!(request.env, vec!["A=1".to_string()]);
        assert_eq!(request.labels[labels::MANAGED], "true");
        assert_eq!(request.labels[labels::CLEANUP], "false");
        assert_eq!(request.labels[labels::SESSION], "s");
    }

    #[test]
    fn build_config_defaults() {
        let config = ImageBuildConfig::new("/ctx", nginx());
        assert_eq!(config.dockerfile, "Dockerfile");
        assert!(config.remove_intermediate);
        assert!(!config.no_cache);
    }
}
