//! Engine endpoint and orchestrator configuration.
//!
//! Values are resolved in order: built-in defaults, an optional TOML file, then
//! environment variables.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{SkiffError, SkiffResult};

/// Environment variable that overrides the engine endpoint for Skiff only.
pub const ENV_HOST: &str = "SKIFF_DOCKER_HOST";

/// Standard Docker endpoint variable, used when [`ENV_HOST`] is unset.
pub const ENV_DOCKER_HOST: &str = "DOCKER_HOST";

/// Environment variable toggling orphan purge before each run.
pub const ENV_PURGE_ORPHANS: &str = "SKIFF_PURGE_ORPHANS";

/// Default Unix socket of a local Docker daemon.
pub const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

/// Endpoint taken from the environment, or [`EngineEndpoint::Local`].
pub static DEFAULT_ENDPOINT: Lazy<EngineEndpoint> = Lazy::new(|| {
    std::env::var(ENV_HOST)
        .or_else(|_| std::env::var(ENV_DOCKER_HOST))
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(EngineEndpoint::Local)
});

/// Where the container engine API is served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EngineEndpoint {
    /// Platform default (Unix socket or named pipe).
    Local,
    /// A Unix domain socket.
    Unix(PathBuf),
    /// A plain HTTP endpoint, `host:port`.
    Tcp(String),
}

impl EngineEndpoint {
    /// Human-readable label for log fields and errors.
    #[must_use]
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl Default for EngineEndpoint {
    fn default() -> Self {
        DEFAULT_ENDPOINT.clone()
    }
}

impl FromStr for EngineEndpoint {
    type Err = SkiffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        let invalid = || SkiffError::InvalidEndpoint {
            endpoint: s.to_string(),
        };

        if value.is_empty() || value == "local" {
            return Ok(Self::Local);
        }

        if let Some(path) = value.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(invalid());
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }

        let address = value
            .strip_prefix("tcp://")
            .or_else(|| value.strip_prefix("http://"));
        match address {
            Some(address) if !address.is_empty() && !address.contains('/') => {
                Ok(Self::Tcp(address.to_string()))
            }
            Some(_) => Err(invalid()),
            None if value.starts_with('/') => Ok(Self::Unix(PathBuf::from(value))),
            None => Err(invalid()),
        }
    }
}

impl TryFrom<String> for EngineEndpoint {
    type Error = SkiffError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EngineEndpoint> for String {
    fn from(value: EngineEndpoint) -> Self {
        value.to_string()
    }
}

impl fmt::Display for EngineEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp(address) => write!(f, "tcp://{address}"),
        }
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SkiffConfig {
    /// Engine API endpoint.
    pub endpoint: EngineEndpoint,
    /// Seconds the engine waits before killing a stopping container.
    pub stop_timeout_secs: u64,
    /// Transport request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Remove orphans of earlier runs before each new container is created.
    pub purge_orphans_on_run: bool,
}

impl Default for SkiffConfig {
    fn default() -> Self {
        Self {
            endpoint: EngineEndpoint::default(),
            stop_timeout_secs: 10,
            request_timeout_secs: 120,
            purge_orphans_on_run: true,
        }
    }
}

impl SkiffConfig {
    /// Configuration from defaults and the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load a TOML file, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> SkiffResult<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "Loading configuration");
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config.with_env_overrides())
    }

    /// Use a specific endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: EngineEndpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Enable or disable orphan purge before each run.
    #[must_use]
    pub const fn with_purge_orphans_on_run(mut self, enabled: bool) -> Self {
        self.purge_orphans_on_run = enabled;
        self
    }

    fn with_env_overrides(mut self) -> Self {
        let host = std::env::var(ENV_HOST).or_else(|_| std::env::var(ENV_DOCKER_HOST));
        if let Ok(host) = host {
            match host.parse() {
                Ok(endpoint) => self.endpoint = endpoint,
                Err(e) => tracing::warn!(host = %host, error = %e, "Ignoring engine endpoint"),
            }
        }

        if let Ok(value) = std::env::var(ENV_PURGE_ORPHANS) {
            match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.purge_orphans_on_run = true,
                "0" | "false" | "no" => self.purge_orphans_on_run = false,
                _ => tracing::warn!(value = %value, "Ignoring {ENV_PURGE_ORPHANS}"),
            }
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_endpoints() {
        assert_eq!(
            "unix:///var/run/docker.sock".parse::<EngineEndpoint>().unwrap(),
            EngineEndpoint::Unix(PathBuf::from("/var/run/docker.sock"))
        );
        assert_eq!(
            "tcp://127.0.0.1:2375".parse::<EngineEndpoint>().unwrap(),
            EngineEndpoint::Tcp("127.0.0.1:2375".to_string())
        );
        assert_eq!(
            "http://docker:2375".parse::<EngineEndpoint>().unwrap(),
            EngineEndpoint::Tcp("docker:2375".to_string())
        );
        assert_eq!(
            "local".parse::<EngineEndpoint>().unwrap(),
            EngineEndpoint::Local
        );
        assert_eq!(
            "/run/user/1000/docker.sock".parse::<EngineEndpoint>().unwrap(),
            EngineEndpoint::Unix(PathBuf::from("/run/user/1000/docker.sock"))
        );
    }

    #[test]
    fn reject_bad_endpoints() {
        assert!("unix://".parse::<EngineEndpoint>().is_err());
        assert!("tcp://".parse::<EngineEndpoint>().is_err());
        assert!("ssh://user@host".parse::<EngineEndpoint>().is_err());
        assert!("tcp://host:2375/path".parse::<EngineEndpoint>().is_err());
    }

    #[test]
    fn endpoint_display_round_trips() {
        let endpoint = EngineEndpoint::Tcp("10.0.0.5:2376".to_string());
        assert_eq!(endpoint.to_string().parse::<EngineEndpoint>().unwrap(), endpoint);
    }

    #[test]
    fn load_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skiff.toml");
        std::fs::write(
            &path,
            "stop_timeout_secs = 3\npurge_orphans_on_run = false\n",
        )
        .unwrap();

        let config = SkiffConfig::load(&path).unwrap();
        assert_eq!(config.stop_timeout_secs, 3);
        assert_eq!(config.request_timeout_secs, 120);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skiff.toml");
        std::fs::write(&path, "stop_timeout = 3\n").unwrap();

        let err = SkiffConfig::load(&path).unwrap_err();
        assert!(matches!(err, SkiffError::Config { .. }));
    }

    #[test]
    fn builder_overrides() {
        let config = SkiffConfig::default()
            .with_endpoint(EngineEndpoint::Tcp("h:1".to_string()))
            .with_purge_orphans_on_run(false);
        assert_eq!(config.endpoint, EngineEndpoint::Tcp("h:1".to_string()));
        assert!(!config.purge_orphans_on_run);
    }
}
