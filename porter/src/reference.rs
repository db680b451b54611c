//! Image reference parsing.
//!
//! References are parsed verbatim, without Docker Hub defaulting:
//! - `k8s.gcr.io/pause:3.2` → registry `k8s.gcr.io`, path `pause`, tag `3.2`
//! - `mirror/google-containers.pause:3.2` → no registry, path
//!   `mirror/google-containers.pause`, tag `3.2`
//! - `localhost:5000/test` → registry `localhost:5000`, path `test`, no tag
//!
//! Formatting a parsed reference yields the original string, so a rewritten
//! target can be handed to a registry client exactly as computed.

use std::fmt;

use crate::{Error, Result};

/// Separator between an image name and its digest.
pub const DIGEST_SEPARATOR: char = '@';

/// A parsed, tag-addressed image reference.
///
/// Digest references are not representable: mirroring operates on mutable
/// tags only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub struct Reference {
    /// Registry hostname (e.g., `gcr.io`, `localhost:5000`), when present.
    pub registry: Option<String>,
    /// Slash-separated repository path (e.g., `google-containers/pause`).
    pub path: String,
    /// Tag, when present.
    pub tag: Option<String>,
}

impl Reference {
    /// Parses an image reference string.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidReference("empty reference".into()));
        }
        if trimmed.contains(DIGEST_SEPARATOR) {
            return Err(Error::DigestUnsupported(trimmed.to_owned()));
        }

        let (registry, remainder) = match trimmed.split_once('/') {
            Some((first, rest)) if is_registry(first) => (Some(first.to_owned()), rest),
            _ => (None, trimmed),
        };

        let (path, tag) = match remainder.rsplit_once(':') {
            Some((path, tag)) if !tag.contains('/') => (path.to_owned(), Some(tag.to_owned())),
            _ => (remainder.to_owned(), None),
        };

        Ok(Self {
            registry,
            path,
            tag,
        })
    }

    /// Returns the reference without its tag (`registry/path`).
    pub fn name(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{registry}/{}", self.path),
            None => self.path.clone(),
        }
    }

    /// Returns the registry hostname, if any.
    pub fn host(&self) -> Option<&str> {
        self.registry.as_deref()
    }
}

/// Returns `true` if the string looks like a registry hostname.
fn is_registry(s: &str) -> bool {
    s.contains('.') || s.contains(':') || s == "localhost"
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{registry}/")?;
        }
        f.write_str(&self.path)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Reference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
