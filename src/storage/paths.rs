//! Path mapper.
//!
//! A pure mapping from typed path specifications to absolute backend keys: blob,
//! upload-data, hashstate-checkpoint, manifest-revision, signature, and tag-index paths,
//! all validated before a digest or name is interpolated into them.

use crate::digest::Digest;
use crate::error::StorageError;

/// Pure function from typed path specs to backend keys, rooted under a fixed prefix
/// (`/docker/registry/v2`). Stateless and cheap to clone.
#[derive(Clone, Debug)]
pub struct PathMapper {
    root: String,
}

const PREFIX: &str = "/docker/registry/v2";

impl Default for PathMapper {
    fn default() -> Self {
        PathMapper::new()
    }
}

impl PathMapper {
    pub fn new() -> Self {
        PathMapper {
            root: PREFIX.to_string(),
        }
    }

    fn validate_name(name: &str) -> Result<(), StorageError> {
        if name.is_empty() || name.contains("..") {
            return Err(StorageError::InvalidPath(name.to_string()));
        }
        Ok(())
    }

    fn digest_parts(digest: &Digest) -> (String, String) {
        (digest.algorithm().to_string(), digest.digest().to_string())
    }

    /// `/blobs/<alg>`, the root all digests of one algorithm shard under.
    pub fn blobs_algorithm_root(&self, alg: &str) -> String {
        format!("{}/blobs/{}", self.root, alg)
    }

    /// `/blobs/<alg>/<hex[0:2]>/<hex>`
    pub fn blob_path(&self, digest: &Digest) -> String {
        let (alg, hex) = Self::digest_parts(digest);
        format!("{}/blobs/{}/{}/{}", self.root, alg, &hex[..2], hex)
    }

    /// `/blobs/<alg>/<hex[0:2]>/<hex>/data`
    pub fn blob_data_path(&self, digest: &Digest) -> String {
        format!("{}/data", self.blob_path(digest))
    }

    /// `/repositories`
    pub fn repositories_root(&self) -> String {
        format!("{}/repositories", self.root)
    }

    /// `/repositories/<name>`
    pub fn repository_path(&self, name: &str) -> Result<String, StorageError> {
        Self::validate_name(name)?;
        Ok(format!("{}/{}", self.repositories_root(), name))
    }

    /// `/repositories/<name>/_uploads/<id>`
    pub fn upload_path(&self, name: &str, id: &str) -> Result<String, StorageError> {
        Ok(format!("{}/_uploads/{}", self.repository_path(name)?, id))
    }

    /// `/repositories/<name>/_uploads/<id>/data`
    pub fn upload_data_path(&self, name: &str, id: &str) -> Result<String, StorageError> {
        Ok(format!("{}/data", self.upload_path(name, id)?))
    }

    /// `/repositories/<name>/_uploads/<id>/startedat`
    pub fn upload_started_at_path(&self, name: &str, id: &str) -> Result<String, StorageError> {
        Ok(format!("{}/startedat", self.upload_path(name, id)?))
    }

    /// `/repositories/<name>/_uploads/<id>/hashstates/<alg>` or, with an offset,
    /// `/repositories/<name>/_uploads/<id>/hashstates/<alg>/<offset>`.
    pub fn upload_hash_state_path(
        &self,
        name: &str,
        id: &str,
        alg: &str,
        offset: Option<u64>,
    ) -> Result<String, StorageError> {
        let base = format!("{}/hashstates/{}", self.upload_path(name, id)?, alg);
        Ok(match offset {
            Some(offset) => format!("{base}/{offset}"),
            None => base,
        })
    }

    /// `/repositories/<name>/_layers/<alg>/<hex>/link`
    pub fn layer_link_path(&self, name: &str, digest: &Digest) -> Result<String, StorageError> {
        let (alg, hex) = Self::digest_parts(digest);
        Ok(format!(
            "{}/_layers/{}/{}/link",
            self.repository_path(name)?,
            alg,
            hex
        ))
    }

    /// `/repositories/<name>/_manifests/revisions/<alg>/<hex>/link`
    pub fn manifest_revision_link_path(
        &self,
        name: &str,
        revision: &Digest,
    ) -> Result<String, StorageError> {
        let (alg, hex) = Self::digest_parts(revision);
        Ok(format!(
            "{}/_manifests/revisions/{}/{}/link",
            self.repository_path(name)?,
            alg,
            hex
        ))
    }

    /// `/repositories/<name>/_manifests/revisions/<alg>/<hex>/signatures/<alg2>/<hex2>/link`
    pub fn manifest_signature_link_path(
        &self,
        name: &str,
        revision: &Digest,
        signature: &Digest,
    ) -> Result<String, StorageError> {
        let (alg, hex) = Self::digest_parts(revision);
        let (sig_alg, sig_hex) = Self::digest_parts(signature);
        Ok(format!(
            "{}/_manifests/revisions/{}/{}/signatures/{}/{}/link",
            self.repository_path(name)?,
            alg,
            hex,
            sig_alg,
            sig_hex
        ))
    }

    /// `/repositories/<name>/_manifests/revisions/<alg>/<hex>/signatures/<alg2>`
    pub fn manifest_signatures_path(
        &self,
        name: &str,
        revision: &Digest,
        sig_alg: &str,
    ) -> Result<String, StorageError> {
        let (alg, hex) = Self::digest_parts(revision);
        Ok(format!(
            "{}/_manifests/revisions/{}/{}/signatures/{}",
            self.repository_path(name)?,
            alg,
            hex,
            sig_alg
        ))
    }

    /// `/repositories/<name>/_manifests/tags/<tag>/current/link`
    pub fn manifest_tag_current_path(&self, name: &str, tag: &str) -> Result<String, StorageError> {
        Ok(format!(
            "{}/_manifests/tags/{}/current/link",
            self.repository_path(name)?,
            tag
        ))
    }

    /// `/repositories/<name>/_manifests/tags/<tag>/index/<alg>/<hex>/link`
    pub fn manifest_tag_index_entry_path(
        &self,
        name: &str,
        tag: &str,
        revision: &Digest,
    ) -> Result<String, StorageError> {
        let (alg, hex) = Self::digest_parts(revision);
        Ok(format!(
            "{}/_manifests/tags/{}/index/{}/{}/link",
            self.repository_path(name)?,
            tag,
            alg,
            hex
        ))
    }

    /// `/repositories/<name>/_manifests/tags/<tag>`
    pub fn manifest_tag_path(&self, name: &str, tag: &str) -> Result<String, StorageError> {
        Ok(format!("{}/_manifests/tags/{}", self.repository_path(name)?, tag))
    }

    /// `/repositories/<name>/_manifests/tags`
    pub fn manifest_tags_path(&self, name: &str) -> Result<String, StorageError> {
        Ok(format!("{}/_manifests/tags", self.repository_path(name)?))
    }
}
