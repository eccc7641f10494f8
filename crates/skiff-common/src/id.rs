//! Container and session identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;

use crate::error::{SkiffError, SkiffResult};

/// A validated container ID or name as accepted by the engine.
///
/// Container references must:
/// - Be 1-128 characters long
/// - Contain only alphanumeric characters, hyphens, underscores and dots
/// - Start with an alphanumeric character
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// Maximum length of a container reference.
    pub const MAX_LENGTH: usize = 128;

    /// Create a new container ID, validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the ID format is invalid.
    pub fn new(id: impl Into<String>) -> SkiffResult<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Get the container ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> SkiffResult<()> {
        let invalid = || SkiffError::Config {
            message: format!("Invalid container ID: {id}"),
        };

        if id.is_empty() || id.len() > Self::MAX_LENGTH {
            return Err(invalid());
        }

        if !id.starts_with(|c: char| c.is_ascii_alphanumeric()) {
            return Err(invalid());
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(invalid());
        }

        Ok(())
    }

    /// Returns a short version of the ID (first 12 characters).
    #[must_use]
    pub fn short(&self) -> &str {
        if self.0.len() <= 12 {
            &self.0
        } else {
            &self.0[..12]
        }
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContainerId {
    type Err = SkiffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ContainerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifies one orchestrator process lifetime.
///
/// Stamped on every created container so the current process can tell its own
/// containers apart from leftovers of earlier runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

static CURRENT_SESSION: Lazy<SessionId> = Lazy::new(SessionId::generate);

impl SessionId {
    /// Generate a fresh random session ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// The session of the running process, generated on first use.
    #[must_use]
    pub fn current() -> &'static Self {
        &CURRENT_SESSION
    }

    /// Get the session ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_container_ids() {
        assert!(ContainerId::new("abc123").is_ok());
        assert!(ContainerId::new("my-container").is_ok());
        assert!(ContainerId::new("my_container.1").is_ok());
        assert!(ContainerId::new("a".repeat(64)).is_ok());
    }

    #[test]
    fn invalid_container_ids() {
        assert!(ContainerId::new("").is_err());
        assert!(ContainerId::new("-invalid").is_err());
        assert!(ContainerId::new("_invalid").is_err());
        assert!(ContainerId::new("invalid!").is_err());
        assert!(ContainerId::new("a".repeat(129)).is_err());
    }

    #[test]
    fn short_id() {
        let id = ContainerId::new("0123456789abcdef").unwrap();
        assert_eq!(id.short(), "0123456789ab");
        let id = ContainerId::new("web").unwrap();
        assert_eq!(id.short(), "web");
    }

    proptest::proptest! {
        #[test]
        fn engine_shaped_ids_validate(id in "[a-zA-Z0-9][a-zA-Z0-9_.-]{0,127}") {
            proptest::prop_assert!(ContainerId::new(id).is_ok());
        }
    }

    #[test]
    fn sessions_are_unique_but_current_is_stable() {
        assert_ne!(SessionId::generate(), SessionId::generate());
        assert_eq!(SessionId::current(), SessionId::current());
        assert_eq!(SessionId::current().as_str().len(), 32);
    }
}
