//! Image reference parsing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SkiffError, SkiffResult};

/// A parsed image reference.
///
/// Unlike a fully canonical reference, the registry is kept only when the caller
/// named one, so [`ImageReference::full_name`] matches what the engine reports
/// for locally stored images (`nginx:latest`, not `docker.io/library/nginx:latest`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageReference {
    /// Registry hostname, if the reference named one.
    pub registry: Option<String>,
    /// Repository name.
    pub repository: String,
    /// Tag or digest.
    pub reference: ImageTag,
}

/// Image tag or digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageTag {
    /// A tag (e.g., "latest").
    Tag(String),
    /// A digest (e.g., "sha256:abc123...").
    Digest(String),
}

impl ImageReference {
    /// Default tag.
    pub const DEFAULT_TAG: &'static str = "latest";

    /// Parse an image reference string.
    ///
    /// Examples:
    /// - `alpine` -> alpine:latest
    /// - `alpine:3.19` -> alpine:3.19
    /// - `localhost:5000/app` -> localhost:5000/app:latest
    /// - `ghcr.io/org/app@sha256:...` -> digest reference
    ///
    /// # Errors
    ///
    /// Returns [`SkiffError::InvalidImageReference`] for empty or malformed input.
    pub fn parse(reference: &str) -> SkiffResult<Self> {
        let trimmed = reference.trim();
        let invalid = || SkiffError::InvalidImageReference {
            reference: reference.to_string(),
        };

        if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
            return Err(invalid());
        }

        let (name, tag) = if let Some((name, digest)) = trimmed.split_once('@') {
            (name, ImageTag::Digest(digest.to_string()))
        } else if let Some(idx) = trimmed.rfind(':') {
            // A colon before the last slash is a registry port, not a tag.
            let potential_tag = &trimmed[idx + 1..];
            if potential_tag.contains('/') {
                (trimmed, ImageTag::Tag(Self::DEFAULT_TAG.to_string()))
            } else {
                (&trimmed[..idx], ImageTag::Tag(potential_tag.to_string()))
            }
        } else {
            (trimmed, ImageTag::Tag(Self::DEFAULT_TAG.to_string()))
        };

        if name.is_empty() || matches!(&tag, ImageTag::Tag(t) | ImageTag::Digest(t) if t.is_empty())
        {
            return Err(invalid());
        }

        let (registry, repository) = match name.split_once('/') {
            Some((head, rest))
                if head.contains('.') || head.contains(':') || head == "localhost" =>
            {
                (Some(head.to_string()), rest.to_string())
            }
            _ => (None, name.to_string()),
        };

        if repository.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            registry,
            repository,
            reference: tag,
        })
    }

    /// Repository including the registry, without tag or digest.
    #[must_use]
    pub fn name(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{registry}/{}", self.repository),
            None => self.repository.clone(),
        }
    }

    /// The tag or digest component.
    #[must_use]
    pub fn tag(&self) -> &str {
        match &self.reference {
            ImageTag::Tag(t) | ImageTag::Digest(t) => t,
        }
    }

    /// The full reference string used for existence checks and container creation.
    #[must_use]
    pub fn full_name(&self) -> String {
        match &self.reference {
            ImageTag::Tag(t) => format!("{}:{t}", self.name()),
            ImageTag::Digest(d) => format!("{}@{d}", self.name()),
        }
    }
}

impl FromStr for ImageReference {
    type Err = SkiffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ImageReference {
    type Error = SkiffError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ImageReference> for String {
    fn from(value: ImageReference) -> Self {
        value.full_name()
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}
