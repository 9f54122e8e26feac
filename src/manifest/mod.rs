//! Manifest / tag / signature layer.
//!
//! A library trait pair backed by the [`crate::blob`] store built underneath it: a
//! manifest revision and each of its detached signatures are themselves blobs, so this
//! layer is mostly bookkeeping — tag pointers, revision links, referential-integrity
//! checks — on top of `BlobStore`.

pub mod signature;

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use oci_spec::image::ImageManifest;
use regex::Regex;

use crate::blob::BlobStore;
use crate::config::Config;
use crate::digest::{self, Digest};
use crate::error::{ManifestError, StorageError};
use crate::storage::paths::PathMapper;
use crate::storage::StorageDriver;
use signature::SignatureVerifier;

/// `library/alpine`, `a/b/c` — one or more lowercase path components, the distribution
/// name-component grammar every repository name must satisfy.
static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:[._-][a-z0-9]+)*(?:/[a-z0-9]+(?:[._-][a-z0-9]+)*)*$")
        .expect("name regex is a fixed, valid pattern")
});

pub(crate) fn validate_repository_name(name: &str) -> Result<(), ManifestError> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(ManifestError::NameInvalid(name.to_string()))
    }
}

#[async_trait]
pub trait ManifestStore: Send + Sync {
    /// Store `bytes` as a new manifest revision, optionally moving `tag` to point at
    /// it. Returns the revision's canonical digest.
    async fn put(&self, bytes: &[u8], tag: Option<&str>) -> Result<Digest, ManifestError>;
    async fn get(&self, revision: &Digest) -> Result<Vec<u8>, ManifestError>;
    async fn get_by_tag(&self, tag: &str) -> Result<Vec<u8>, ManifestError>;
    async fn delete(&self, revision: &Digest) -> Result<(), ManifestError>;
}

#[async_trait]
pub trait TagStore: Send + Sync {
    async fn list(&self) -> Result<Vec<String>, ManifestError>;
    async fn exists(&self, tag: &str) -> Result<bool, ManifestError>;
    async fn resolve(&self, tag: &str) -> Result<Digest, ManifestError>;
    async fn tag(&self, tag: &str, revision: &Digest) -> Result<(), ManifestError>;
    async fn delete(&self, tag: &str) -> Result<(), ManifestError>;
}

#[async_trait]
pub trait SignatureStore: Send + Sync {
    async fn put_signatures(
        &self,
        revision: &Digest,
        signatures: &[Vec<u8>],
    ) -> Result<(), ManifestError>;
    async fn get_signatures(&self, revision: &Digest) -> Result<Vec<Vec<u8>>, ManifestError>;
}

/// Repository-scoped implementation of all three traits, sharing one underlying
/// [`BlobStore`] so manifest payloads, signatures, and layers all land in the same
/// content-addressable namespace and dedup against each other.
pub struct RepositoryManifests {
    driver: Arc<dyn StorageDriver>,
    paths: PathMapper,
    repository: String,
    blobs: Arc<dyn BlobStore>,
    verifier: Arc<dyn SignatureVerifier>,
    config: Arc<Config>,
}

impl RepositoryManifests {
    pub fn new(
        driver: Arc<dyn StorageDriver>,
        paths: PathMapper,
        repository: impl Into<String>,
        blobs: Arc<dyn BlobStore>,
        verifier: Arc<dyn SignatureVerifier>,
        config: Arc<Config>,
    ) -> Self {
        RepositoryManifests {
            driver,
            paths,
            repository: repository.into(),
            blobs,
            verifier,
            config,
        }
    }

    /// Field-cardinality check. Schema1-shaped documents carry parallel
    /// `history`/`fsLayers` arrays that must agree in length; OCI/Docker v2 manifests
    /// have no such pairing and are left to the typed parse below to validate shape.
    fn check_cardinality(raw: &serde_json::Value) -> Result<(), ManifestError> {
        if let (Some(history), Some(fs_layers)) =
            (raw.get("history"), raw.get("fsLayers"))
        {
            let (Some(history), Some(fs_layers)) = (history.as_array(), fs_layers.as_array())
            else {
                return Err(ManifestError::Invalid(
                    "history and fsLayers must be arrays".to_string(),
                ));
            };
            if history.len() != fs_layers.len() {
                return Err(ManifestError::Invalid(format!(
                    "history has {} entries but fsLayers has {}",
                    history.len(),
                    fs_layers.len()
                )));
            }
        }
        Ok(())
    }

    async fn tag_link_path(&self, tag: &str) -> Result<String, ManifestError> {
        Ok(self.paths.manifest_tag_current_path(&self.repository, tag)?)
    }
}

#[async_trait]
impl ManifestStore for RepositoryManifests {
    async fn put(&self, bytes: &[u8], tag: Option<&str>) -> Result<Digest, ManifestError> {
        validate_repository_name(&self.repository)?; // 1

        let raw: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| ManifestError::Invalid(e.to_string()))?;
        Self::check_cardinality(&raw)?; // 2

        let (payload, signatures) = signature::parse_envelope(bytes)?;
        self.verifier.verify(&payload, &signatures).await?; // 3

        if self.config.verify_manifest_references {
            let manifest: ImageManifest = serde_json::from_slice(bytes)
                .map_err(|e| ManifestError::Invalid(e.to_string()))?;
            let mut unknown = Vec::new();
            for layer in manifest.layers() {
                if self.blobs.stat(layer.digest()).await.is_err() {
                    unknown.push(layer.digest().to_string());
                }
            }
            if self.blobs.stat(manifest.config().digest()).await.is_err() {
                unknown.push(manifest.config().digest().to_string());
            }
            if !unknown.is_empty() {
                return Err(ManifestError::BlobUnknown(unknown)); // 4
            }
        }

        let descriptor = self.blobs.put(bytes).await?; // 5
        let revision = descriptor.digest;

        let link_path = self.paths.manifest_revision_link_path(&self.repository, &revision)?;
        self.driver
            .put_content(&link_path, revision.to_string().as_bytes())
            .await?; // 6

        for sig in &signatures {
            let sig_descriptor = self.blobs.put(sig).await?;
            let sig_link =
                self.paths
                    .manifest_signature_link_path(&self.repository, &revision, &sig_descriptor.digest)?;
            self.driver
                .put_content(&sig_link, sig_descriptor.digest.to_string().as_bytes())
                .await?; // 7
        }

        if let Some(tag) = tag {
            TagStore::tag(self, tag, &revision).await?; // 8
        }

        Ok(revision)
    }

    async fn get(&self, revision: &Digest) -> Result<Vec<u8>, ManifestError> {
        let link_path = self.paths.manifest_revision_link_path(&self.repository, revision)?;
        match self.driver.get_content(&link_path).await {
            Ok(_) => {}
            Err(StorageError::PathNotFound(_)) => {
                return Err(ManifestError::ManifestUnknown(revision.to_string()))
            }
            Err(e) => return Err(e.into()),
        }
        Ok(self.blobs.get(revision).await?)
    }

    async fn get_by_tag(&self, tag: &str) -> Result<Vec<u8>, ManifestError> {
        let revision = TagStore::resolve(self, tag).await?;
        self.get(&revision).await
    }

    async fn delete(&self, revision: &Digest) -> Result<(), ManifestError> {
        let link_path = self.paths.manifest_revision_link_path(&self.repository, revision)?;
        match self.driver.delete(&link_path).await {
            Ok(()) => Ok(()),
            Err(StorageError::PathNotFound(_)) => {
                Err(ManifestError::ManifestUnknown(revision.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl TagStore for RepositoryManifests {
    async fn list(&self) -> Result<Vec<String>, ManifestError> {
        let tags_path = self.paths.manifest_tags_path(&self.repository)?;
        match self.driver.list(&tags_path).await {
            Ok(entries) => Ok(entries
                .into_iter()
                .map(|e| e.rsplit('/').next().unwrap_or_default().to_string())
                .collect()),
            Err(StorageError::PathNotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, tag: &str) -> Result<bool, ManifestError> {
        match TagStore::resolve(self, tag).await {
            Ok(_) => Ok(true),
            Err(ManifestError::ManifestUnknown(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn resolve(&self, tag: &str) -> Result<Digest, ManifestError> {
        let link_path = self.tag_link_path(tag).await?;
        let raw = match self.driver.get_content(&link_path).await {
            Ok(bytes) => bytes,
            Err(StorageError::PathNotFound(_)) => {
                return Err(ManifestError::ManifestUnknown(tag.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let text = String::from_utf8_lossy(&raw);
        digest::parse(text.trim()).map_err(ManifestError::from)
    }

    async fn tag(&self, tag: &str, revision: &Digest) -> Result<(), ManifestError> {
        let current_path = self.tag_link_path(tag).await?;
        let index_path = self
            .paths
            .manifest_tag_index_entry_path(&self.repository, tag, revision)?;
        let content = revision.to_string();
        self.driver.put_content(&current_path, content.as_bytes()).await?;
        self.driver.put_content(&index_path, content.as_bytes()).await?;
        Ok(())
    }

    async fn delete(&self, tag: &str) -> Result<(), ManifestError> {
        let tag_path = self.paths.manifest_tag_path(&self.repository, tag)?;
        match self.driver.delete(&tag_path).await {
            Ok(()) => Ok(()),
            Err(StorageError::PathNotFound(_)) => Err(ManifestError::ManifestUnknown(tag.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SignatureStore for RepositoryManifests {
    async fn put_signatures(
        &self,
        revision: &Digest,
        signatures: &[Vec<u8>],
    ) -> Result<(), ManifestError> {
        for sig in signatures {
            let descriptor = self.blobs.put(sig).await?;
            let link =
                self.paths
                    .manifest_signature_link_path(&self.repository, revision, &descriptor.digest)?;
            self.driver
                .put_content(&link, descriptor.digest.to_string().as_bytes())
                .await?;
        }
        Ok(())
    }

    async fn get_signatures(&self, revision: &Digest) -> Result<Vec<Vec<u8>>, ManifestError> {
        let sig_root = self
            .paths
            .manifest_signatures_path(&self.repository, revision, "sha256")?;
        let links = match self.driver.list(&sig_root).await {
            Ok(entries) => entries,
            Err(StorageError::PathNotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        // Bounded fan-out fetch; `futures::future::try_join_all` cancels the remaining
        // fetches as soon as one fails.
        let fetches = links.into_iter().map(|entry| async move {
            let link_content = self.driver.get_content(&entry).await?;
            let text = String::from_utf8_lossy(&link_content);
            let sig_digest = digest::parse(text.trim())?;
            let bytes = self.blobs.get(&sig_digest).await?;
            Ok::<Vec<u8>, ManifestError>(bytes)
        });
        futures::future::try_join_all(fetches).await
    }
}
