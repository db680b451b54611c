//! Thin wrappers over the OCI Distribution client.

use std::fmt;

use oci_client::manifest::{OciDescriptor, OciImageManifest, OciManifest};
use oci_client::secrets::RegistryAuth;
use oci_client::{Client, Reference, RegistryOperation};

use crate::{Error, Result};

/// Username/password pair for a registry.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Creates a credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub(crate) fn into_auth(self) -> RegistryAuth {
        RegistryAuth::Basic(self.username, self.password)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Parses a reference with the client's grammar.
pub fn parse(reference: &str) -> Result<Reference> {
    reference
        .parse::<Reference>()
        .map_err(|e| Error::InvalidReference {
            reference: reference.to_owned(),
            message: e.to_string(),
        })
}

/// Fetches the image manifest and its digest; multi-platform indexes
/// resolve to the host platform.
pub async fn pull_manifest(
    client: &Client,
    reference: &Reference,
    auth: &RegistryAuth,
) -> Result<(OciImageManifest, String)> {
    client
        .pull_image_manifest(reference, auth)
        .await
        .map_err(|e| pull_error(reference, e))
}

/// Authenticates for pushing to `reference`.
pub async fn authorize_push(client: &Client, reference: &Reference, auth: &RegistryAuth) -> Result<()> {
    client
        .auth(reference, auth, RegistryOperation::Push)
        .await
        .map(drop)
        .map_err(|e| push_error(reference, e))
}

/// Blobs referenced by a manifest: the config first, then layers in order.
pub fn blobs(manifest: &OciImageManifest) -> impl Iterator<Item = &OciDescriptor> {
    std::iter::once(&manifest.config).chain(&manifest.layers)
}

/// Returns `true` if both references live on the same registry, so blobs
/// can be mounted instead of transferred.
pub fn same_registry(source: &Reference, target: &Reference) -> bool {
    source.resolve_registry() == target.resolve_registry()
}

/// Copies one blob. Only this blob is held in memory.
///
/// On the same registry a cross-repository mount is tried first; when the
/// registry refuses it the blob is transferred.
pub async fn copy_blob(
    client: &Client,
    source: &Reference,
    target: &Reference,
    blob: &OciDescriptor,
) -> Result<()> {
    if same_registry(source, target) {
        match client.mount_blob(target, source, &blob.digest).await {
            Ok(()) => {
                tracing::debug!(digest = %blob.digest, "mounted blob");
                return Ok(());
            }
            Err(e) => tracing::debug!(digest = %blob.digest, error = %e, "mount refused, copying"),
        }
    }

    let mut data = Vec::with_capacity(usize::try_from(blob.size).unwrap_or_default());
    client
        .pull_blob(source, blob, &mut data)
        .await
        .map_err(|e| pull_error(source, e))?;
    client
        .push_blob(target, data, &blob.digest)
        .await
        .map_err(|e| push_error(target, e))?;
    tracing::debug!(digest = %blob.digest, size = blob.size, "copied blob");
    Ok(())
}

/// Pushes the manifest under `reference`, returning its URL.
pub async fn push_manifest(
    client: &Client,
    reference: &Reference,
    manifest: OciImageManifest,
) -> Result<String> {
    client
        .push_manifest(reference, &OciManifest::Image(manifest))
        .await
        .map_err(|e| push_error(reference, e))
}

fn pull_error(reference: &Reference, e: impl fmt::Display) -> Error {
    Error::Pull {
        reference: reference.to_string(),
        message: e.to_string(),
    }
}

fn push_error(reference: &Reference, e: impl fmt::Display) -> Error {
    Error::Push {
        reference: reference.to_string(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_docker_hub() {
        let r = parse("mirror/google-containers.pause:3.2").unwrap();
        assert_eq!(r.registry(), "docker.io");
        assert_eq!(r.repository(), "mirror/google-containers.pause");
        assert_eq!(r.tag(), Some("3.2"));
    }

    #[test]
    fn config_is_copied_before_layers() {
        let descriptor = |digest: &str| OciDescriptor {
            digest: digest.into(),
            ..OciDescriptor::default()
        };
        let manifest = OciImageManifest {
            config: descriptor("sha256:c"),
            layers: vec![descriptor("sha256:l1"), descriptor("sha256:l2")],
            ..OciImageManifest::default()
        };
        let order: Vec<_> = blobs(&manifest).map(|b| b.digest.as_str()).collect();
        assert_eq!(order, ["sha256:c", "sha256:l1", "sha256:l2"]);
    }

    #[test]
    fn mount_requires_same_registry() {
        let src = parse("quay.io/coreos/etcd:v3.5.0").unwrap();
        assert!(same_registry(&src, &parse("quay.io/mirror/quay.coreos.etcd:v3.5.0").unwrap()));
        assert!(!same_registry(&src, &parse("mirror/quay.coreos.etcd:v3.5.0").unwrap()));
        assert!(same_registry(
            &parse("docker.io/library/nginx:1").unwrap(),
            &parse("mirror/docker.library.nginx:1").unwrap()
        ));
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = Credentials::new("bot", "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[test]
    fn credentials_become_basic_auth() {
        assert!(matches!(
            Credentials::new("bot", "pw").into_auth(),
            RegistryAuth::Basic(ref user, ref pass) if user == "bot" && pass == "pw"
        ));
    }
}
