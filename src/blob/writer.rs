//! Resumable upload session.
//!
//! A full upload state machine: a buffered scratch writer tee'd into a resumable
//! digester, checkpointed commit/cancel, and digest/length validation with retry.

use std::sync::Arc;

use uuid::Uuid;

use super::Descriptor;
use crate::config::Config;
use crate::digest::{self, Digest};
use crate::digester::{CheckpointStore, ResumableDigester};
use crate::error::{BlobError, StorageError};
use crate::storage::StorageDriver;
use crate::storage::io::BufferedFileWriter;
use crate::storage::paths::PathMapper;

/// A single resumable-upload session, identified by a UUID a client can use to resume
/// writing from a different request (possibly on a different process) later.
pub struct BlobWriter {
    driver: Arc<dyn StorageDriver>,
    paths: PathMapper,
    repository: String,
    id: String,
    config: Arc<Config>,
    digester: Option<ResumableDigester>,
    checkpoints: Option<CheckpointStore>,
    offset: u64,
}

impl BlobWriter {
    pub(crate) fn create(
        driver: Arc<dyn StorageDriver>,
        paths: PathMapper,
        repository: impl Into<String>,
        config: Arc<Config>,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        Self::new(driver, paths, repository, id, config, 0)
    }

    pub(crate) fn resume(
        driver: Arc<dyn StorageDriver>,
        paths: PathMapper,
        repository: impl Into<String>,
        id: impl Into<String>,
        config: Arc<Config>,
        offset: u64,
    ) -> Self {
        Self::new(driver, paths, repository, id, config, offset)
    }

    fn new(
        driver: Arc<dyn StorageDriver>,
        paths: PathMapper,
        repository: impl Into<String>,
        id: impl Into<String>,
        config: Arc<Config>,
        offset: u64,
    ) -> Self {
        let repository = repository.into();
        let id = id.into();
        let checkpoints = if config.resumable_digest.enabled {
            let prefix = paths
                .upload_hash_state_path(&repository, &id, "sha256", None)
                .expect("repository name validated at Repository construction");
            Some(CheckpointStore::new(prefix))
        } else {
            None
        };
        BlobWriter {
            driver,
            paths,
            repository,
            id,
            config,
            digester: if checkpoints.is_some() {
                Some(ResumableDigester::new())
            } else {
                None
            },
            checkpoints,
            offset,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn data_path(&self) -> String {
        self.paths
            .upload_data_path(&self.repository, &self.id)
            .expect("repository name validated at Repository construction")
    }

    fn upload_path(&self) -> String {
        self.paths
            .upload_path(&self.repository, &self.id)
            .expect("repository name validated at Repository construction")
    }

    /// Append bytes at the writer's current offset, tee'd into the resumable digester
    /// when one is configured. On a storage I/O error, the offset still advances by
    /// whatever was durably appended before the failure, so a retry from the same
    /// offset is well-defined.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), BlobError> {
        if self.offset > 0 {
            self.resync_digester().await?;
        }
        let mut writer = BufferedFileWriter::open(self.driver.as_ref(), &self.data_path(), true).await?;
        writer.write_all(bytes).await?;
        writer.commit().await?;
        self.offset += bytes.len() as u64;
        if let Some(digester) = &mut self.digester {
            digester.update(bytes);
        }
        Ok(())
    }

    /// Reposition the write offset. Seeking past the current end is legal; the next
    /// `write` extends the logical size.
    pub fn seek(&mut self, offset: u64) {
        self.offset = offset;
        if let Some(digester) = &mut self.digester {
            if digester.len() != offset {
                // The live digester no longer matches; it is re-synced lazily on the
                // next write via `resumeHashAt`.
                *digester = ResumableDigester::new();
            }
        }
    }

    async fn resync_digester(&mut self) -> Result<(), BlobError> {
        let (Some(checkpoints), Some(digester)) = (&self.checkpoints, &mut self.digester) else {
            return Ok(());
        };
        if digester.len() == self.offset {
            return Ok(());
        }
        let resumed = checkpoints
            .resume_hash_at(self.driver.as_ref(), &self.data_path(), self.offset)
            .await?;
        *digester = resumed;
        Ok(())
    }

    /// Persist a final hash-state checkpoint (if resumable digests are enabled), then
    /// close without committing or cancelling.
    pub async fn close(&mut self) -> Result<(), BlobError> {
        if let (Some(checkpoints), Some(digester)) = (&self.checkpoints, &self.digester) {
            checkpoints.persist(self.driver.as_ref(), digester).await?;
        }
        Ok(())
    }

    /// Abandon the session: delete the upload directory, write nothing to the blob
    /// store.
    pub async fn cancel(self) -> Result<(), BlobError> {
        match self.driver.delete(&self.upload_path()).await {
            Ok(()) | Err(StorageError::PathNotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Validate, move into canonical position (deduping against an existing blob),
    /// link into this repository, and clean up the upload directory.
    pub async fn commit(mut self, expected: &Descriptor) -> Result<Descriptor, BlobError> {
        self.resync_digester().await?;
        let data_path = self.data_path();

        let actual_length = match self.driver.stat(&data_path).await {
            Ok(info) => info.size,
            Err(StorageError::PathNotFound(_)) => 0,
            Err(e) => return Err(e.into()),
        };
        if expected.length != 0 && actual_length != expected.length {
            return Err(BlobError::InvalidLength {
                expected: expected.length,
                actual: actual_length,
            });
        }

        let computed = self.validate_digest(&data_path, &expected.digest).await?;
        if computed.to_string() != expected.digest.to_string() {
            return Err(BlobError::InvalidDigest {
                expected: expected.digest.to_string(),
                actual: computed.to_string(),
            });
        }

        self.move_blob(&data_path, &expected.digest, actual_length)
            .await?;
        self.link_blob(&expected.digest).await?;

        if let Err(e) = self.driver.delete(&self.upload_path()).await {
            tracing::warn!(upload = %self.id, error = %e, "cleanup of upload directory failed after commit");
        }

        Ok(Descriptor {
            digest: expected.digest.clone(),
            length: actual_length,
            media_type: expected.media_type.clone(),
        })
    }

    /// `validateBlob`'s digest step, retried with backoff to tolerate
    /// eventually-consistent backends where the just-written tail isn't yet visible.
    async fn validate_digest(&self, data_path: &str, expected: &Digest) -> Result<Digest, BlobError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.compute_digest(data_path, expected).await;
            match result {
                Ok(digest) => return Ok(digest),
                Err(err) if attempt < self.config.validate_retries => {
                    tracing::debug!(attempt, error = %err, "validateBlob attempt failed, retrying");
                    tokio::time::sleep(self.config.validate_backoff * attempt).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn compute_digest(&self, data_path: &str, expected: &Digest) -> Result<Digest, BlobError> {
        if expected.algorithm().to_string() == "sha256" {
            if let Some(digester) = &self.digester {
                if digester.len() == self.offset {
                    return Ok(digester.finalize());
                }
            }
        }
        let bytes = self.driver.get_content(data_path).await?;
        Ok(digest::sha256(&bytes))
    }

    async fn move_blob(&self, data_path: &str, target: &Digest, length: u64) -> Result<(), BlobError> {
        let canonical = self.paths.blob_data_path(target);
        if self.driver.stat(&canonical).await.is_ok() {
            // Dedup (I5): the blob already exists, never overwrite its bytes.
            return Ok(());
        }
        if length == 0 && digest::is_empty_sha256(target) {
            self.driver.put_content(&canonical, &[]).await?;
            return Ok(());
        }
        self.driver.move_to(data_path, &canonical).await?;
        Ok(())
    }

    async fn link_blob(&self, digest: &Digest) -> Result<(), BlobError> {
        let link_path = self.paths.layer_link_path(&self.repository, digest)?;
        self.driver.put_content(&link_path, digest.to_string().as_bytes()).await?;
        Ok(())
    }
}
