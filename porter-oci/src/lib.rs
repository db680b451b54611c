//! Registry-to-registry image mirroring.
//!
//! Copies an image from its source registry to a mirror reference one blob
//! at a time: the manifest is resolved, then the config and each layer are
//! pulled and pushed (or mounted, on the same registry), then the manifest
//! is pushed. At most one blob is held in memory, nothing touches the local
//! disk and nothing is retried.

#![allow(clippy::missing_docs_in_private_items)]

mod registry;

use std::fmt;

use oci_client::Client;
use oci_client::secrets::RegistryAuth;

pub use registry::Credentials;

/// Result type for porter-oci operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from mirroring an image.
///
/// Every variant names the reference involved so the message can be shown
/// to whoever requested the mirror.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The reference is not valid for the registry client.
    #[error("invalid image reference `{reference}`: {message}")]
    InvalidReference {
        /// The offending reference.
        reference: String,
        /// Parser message.
        message: String,
    },

    /// Pulling the source image failed.
    #[error("pull `{reference}` failed: {message}")]
    Pull {
        /// The source reference.
        reference: String,
        /// Registry or transport message.
        message: String,
    },

    /// Pushing the mirrored image failed.
    #[error("push `{reference}` failed: {message}")]
    Push {
        /// The target reference.
        reference: String,
        /// Registry or transport message.
        message: String,
    },
}

/// Result of a successful mirror.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct MirrorResult {
    /// Source reference as resolved by the client.
    pub source: String,
    /// Target reference as resolved by the client.
    pub target: String,
    /// Source manifest digest, when the registry reported one.
    pub digest: Option<String>,
    /// Number of layers copied.
    pub layers: usize,
    /// Total layer size in bytes, as declared by the manifest.
    pub size: u64,
    /// URL of the pushed manifest.
    pub manifest_url: String,
}

/// Copies images between registries.
pub struct Mirror {
    client: Client,
    pull_auth: RegistryAuth,
    push_auth: RegistryAuth,
}

impl fmt::Debug for Mirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mirror")
            .field("authenticated_push", &!matches!(self.push_auth, RegistryAuth::Anonymous))
            .finish_non_exhaustive()
    }
}

impl Mirror {
    /// Creates a mirror that pulls anonymously and pushes with `push`
    /// credentials (anonymously when `None`).
    pub fn new(push: Option<Credentials>) -> Self {
        Self {
            client: Client::default(),
            pull_auth: RegistryAuth::Anonymous,
            push_auth: push.map_or(RegistryAuth::Anonymous, Credentials::into_auth),
        }
    }

    /// Copies `source` to `target`, blob by blob.
    ///
    /// `on_status` is called with human-readable progress messages.
    pub async fn mirror(
        &self,
        source: &str,
        target: &str,
        on_status: impl Fn(&str),
    ) -> Result<MirrorResult> {
        let src = registry::parse(source)?;

        // 1. Resolve the source manifest.
        on_status(&format!("Pulling {src}..."));
        let (manifest, digest) = registry::pull_manifest(&self.client, &src, &self.pull_auth).await?;
        let layers = manifest.layers.len();
        let size: u64 = manifest
            .layers
            .iter()
            .map(|l| u64::try_from(l.size).unwrap_or_default())
            .sum();
        tracing::info!(source = %src, %digest, layers, size, "resolved manifest");

        // 2. Tag: resolve the mirror reference.
        let dst = registry::parse(target)?;
        on_status(&format!("Tagging {src} as {dst}"));
        tracing::info!(source = %src, destination = %dst, "tagged image");

        // 3. Copy config and layers, then push the manifest.
        on_status(&format!("Pushing {dst}..."));
        registry::authorize_push(&self.client, &dst, &self.push_auth).await?;
        for blob in registry::blobs(&manifest) {
            registry::copy_blob(&self.client, &src, &dst, blob).await?;
        }
        let manifest_url = registry::push_manifest(&self.client, &dst, manifest).await?;
        tracing::info!(destination = %dst, %manifest_url, "pushed image");

        on_status("Done.");
        Ok(MirrorResult {
            source: src.to_string(),
            target: dst.to_string(),
            digest: Some(digest),
            layers,
            size,
            manifest_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_credentials() {
        let mirror = Mirror::new(Some(Credentials::new("bot", "s3cret")));
        let debug = format!("{mirror:?}");
        assert!(debug.contains("authenticated_push: true"));
        assert!(!debug.contains("s3cret"));
    }

    #[tokio::test]
    async fn invalid_source_fails_before_network() {
        let mirror = Mirror::new(None);
        let err = mirror
            .mirror("gcr.io/Upper/Case:v1", "mirror/x:v1", |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidReference { ref reference, .. } if reference == "gcr.io/Upper/Case:v1"));
    }
}
