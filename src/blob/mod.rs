//! Content-addressable blob store.
//!
//! A library trait over digest-keyed blob storage with deduplication: committing a
//! blob whose digest already exists in the backend skips the move and just writes the
//! repository's link, rather than overwriting or erroring.

pub mod cache;
pub mod writer;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::digest::{self, Digest};
use crate::error::{BlobError, StorageError, WalkError};
use crate::storage::paths::PathMapper;
use crate::storage::walk;
use crate::storage::{BoxedReader, StorageDriver};
use cache::BlobDescriptorCache;
use writer::BlobWriter;

/// Everything callers need to know about a blob without reading its bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Descriptor {
    pub digest: Digest,
    pub length: u64,
    pub media_type: Option<String>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn stat(&self, digest: &Digest) -> Result<Descriptor, BlobError>;
    async fn get(&self, digest: &Digest) -> Result<Vec<u8>, BlobError>;
    async fn open(&self, digest: &Digest) -> Result<(BoxedReader, Descriptor), BlobError>;
    async fn put(&self, bytes: &[u8]) -> Result<Descriptor, BlobError>;
    fn create(&self) -> BlobWriter;
    fn resume(&self, id: &str, offset: u64) -> BlobWriter;
    async fn delete(&self, digest: &Digest) -> Result<(), BlobError>;
    async fn enumerate(
        &self,
        visitor: &mut dyn FnMut(&Digest) -> Result<(), WalkError>,
    ) -> Result<(), BlobError>;
}

/// Repository-scoped [`BlobStore`]: every `Put`/`BlobWriter::commit` links the
/// canonical blob into this repository's namespace; global blob storage is shared and
/// deduplicated across every repository.
pub struct LinkedBlobStore {
    driver: Arc<dyn StorageDriver>,
    paths: PathMapper,
    repository: String,
    cache: Option<Arc<dyn BlobDescriptorCache>>,
    config: Arc<Config>,
}

impl LinkedBlobStore {
    pub fn new(
        driver: Arc<dyn StorageDriver>,
        paths: PathMapper,
        repository: impl Into<String>,
        cache: Option<Arc<dyn BlobDescriptorCache>>,
        config: Arc<Config>,
    ) -> Self {
        LinkedBlobStore {
            driver,
            paths,
            repository: repository.into(),
            cache,
            config,
        }
    }

    /// `cached → repo-link → global` statter composition.
    async fn resolve(&self, digest: &Digest) -> Result<Descriptor, BlobError> {
        if let Some(cache) = &self.cache {
            if let Some(descriptor) = cache.stat(digest) {
                return Ok(descriptor);
            }
        }

        let link_path = self.paths.layer_link_path(&self.repository, digest)?;
        match self.driver.get_content(&link_path).await {
            Ok(_) => {}
            Err(StorageError::PathNotFound(_)) => return Err(BlobError::BlobUnknown(digest.to_string())),
            Err(e) => return Err(e.into()),
        }

        let data_path = self.paths.blob_data_path(digest);
        let info = self
            .driver
            .stat(&data_path)
            .await
            .map_err(|e| BlobError::from_storage_stat(digest, e))?;

        let descriptor = Descriptor {
            digest: digest.clone(),
            length: info.size,
            media_type: None,
        };
        if let Some(cache) = &self.cache {
            cache.set_descriptor(digest, descriptor.clone());
        }
        Ok(descriptor)
    }
}

#[async_trait]
impl BlobStore for LinkedBlobStore {
    async fn stat(&self, digest: &Digest) -> Result<Descriptor, BlobError> {
        self.resolve(digest).await
    }

    async fn get(&self, digest: &Digest) -> Result<Vec<u8>, BlobError> {
        self.resolve(digest).await?;
        let data_path = self.paths.blob_data_path(digest);
        self.driver
            .get_content(&data_path)
            .await
            .map_err(|e| BlobError::from_storage_stat(digest, e))
    }

    async fn open(&self, digest: &Digest) -> Result<(BoxedReader, Descriptor), BlobError> {
        let descriptor = self.resolve(digest).await?;
        let data_path = self.paths.blob_data_path(digest);
        let reader = self
            .driver
            .reader(&data_path, 0)
            .await
            .map_err(|e| BlobError::from_storage_stat(digest, e))?;
        Ok((reader, descriptor))
    }

    async fn put(&self, bytes: &[u8]) -> Result<Descriptor, BlobError> {
        let mut writer = self.create();
        writer.write(bytes).await?;
        writer.close().await?;
        writer
            .commit(&Descriptor {
                digest: digest::sha256(bytes),
                length: bytes.len() as u64,
                media_type: None,
            })
            .await
    }

    fn create(&self) -> BlobWriter {
        BlobWriter::create(
            self.driver.clone(),
            self.paths.clone(),
            self.repository.clone(),
            self.config.clone(),
        )
    }

    fn resume(&self, id: &str, offset: u64) -> BlobWriter {
        BlobWriter::resume(
            self.driver.clone(),
            self.paths.clone(),
            self.repository.clone(),
            id.to_string(),
            self.config.clone(),
            offset,
        )
    }

    async fn delete(&self, digest: &Digest) -> Result<(), BlobError> {
        if !self.config.delete.enabled {
            return Err(BlobError::Unsupported);
        }
        let link_path = self.paths.layer_link_path(&self.repository, digest)?;
        self.driver
            .delete(&link_path)
            .await
            .map_err(|e| BlobError::from_storage_stat(digest, e))
    }

    async fn enumerate(
        &self,
        visitor: &mut dyn FnMut(&Digest) -> Result<(), WalkError>,
    ) -> Result<(), BlobError> {
        let blobs_root = self.paths.blobs_algorithm_root("sha256");

        let mut collect = |info: &crate::storage::FileInfo| -> Result<(), WalkError> {
            if info.is_dir || !info.path.ends_with("/data") {
                return Ok(());
            }
            let hex = info
                .path
                .rsplit('/')
                .nth(1)
                .unwrap_or_default()
                .to_string();
            if let Ok(digest) = digest::parse(&format!("sha256:{hex}")) {
                visitor(&digest)?;
            }
            Ok(())
        };

        match walk::walk(self.driver.as_ref(), &blobs_root, None, &mut collect).await {
            Ok(()) => Ok(()),
            Err(StorageError::PathNotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryDriver;

    fn store(driver: Arc<dyn StorageDriver>) -> LinkedBlobStore {
        LinkedBlobStore::new(
            driver,
            PathMapper::new(),
            "library/alpine",
            None,
            Arc::new(Config::in_memory()),
        )
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let driver: Arc<dyn StorageDriver> = Arc::new(InMemoryDriver::new());
        let store = store(driver);
        let descriptor = store.put(b"layer bytes").await.unwrap();
        let bytes = store.get(&descriptor.digest).await.unwrap();
        assert_eq!(bytes, b"layer bytes");
    }

    #[tokio::test]
    async fn stat_unknown_digest_is_blob_unknown() {
        let driver: Arc<dyn StorageDriver> = Arc::new(InMemoryDriver::new());
        let store = store(driver);
        let unknown = digest::sha256(b"never written");
        assert!(matches!(store.stat(&unknown).await, Err(BlobError::BlobUnknown(_))));
    }

    #[tokio::test]
    async fn delete_fails_when_disabled_by_config() {
        let driver: Arc<dyn StorageDriver> = Arc::new(InMemoryDriver::new());
        let store = store(driver);
        let descriptor = store.put(b"x").await.unwrap();
        assert!(matches!(store.delete(&descriptor.digest).await, Err(BlobError::Unsupported)));
    }

    #[tokio::test]
    async fn dedup_across_repositories_shares_bytes_once() {
        let driver: Arc<dyn StorageDriver> = Arc::new(InMemoryDriver::new());
        let a = LinkedBlobStore::new(
            driver.clone(),
            PathMapper::new(),
            "library/a",
            None,
            Arc::new(Config::in_memory()),
        );
        let b = LinkedBlobStore::new(
            driver.clone(),
            PathMapper::new(),
            "library/b",
            None,
            Arc::new(Config::in_memory()),
        );
        let descriptor = a.put(b"shared-layer").await.unwrap();
        b.put(b"shared-layer").await.unwrap();

        let blob_path = PathMapper::new().blob_data_path(&descriptor.digest);
        assert_eq!(driver.get_content(&blob_path).await.unwrap(), b"shared-layer");
        assert!(b.stat(&descriptor.digest).await.is_ok());
    }
}
