//! Composition root.
//!
//! A library-level `Registry`/`Repository` pair with no HTTP surface: a `Registry` owns
//! the shared driver, path mapper, cache, and config; `Repository` is the cheap,
//! name-scoped view every blob/manifest operation goes through.

use std::sync::Arc;

use crate::blob::cache::{BlobDescriptorCache, CacheStats, RepositoryScopedCache};
use crate::blob::{BlobStore, LinkedBlobStore};
use crate::config::Config;
use crate::error::ManifestError;
use crate::manifest::signature::{NoopVerifier, SignatureVerifier};
use crate::manifest::{ManifestStore, RepositoryManifests, SignatureStore, TagStore};
use crate::storage::filesystem::FilesystemDriver;
use crate::storage::memory::InMemoryDriver;
use crate::storage::paths::PathMapper;
use crate::storage::StorageDriver;
use crate::config::DriverKind;

/// Process-wide handle to one storage backend, constructed once and cloned cheaply
/// (every field is an `Arc` or a pure value) wherever a [`Repository`] is needed.
#[derive(Clone)]
pub struct Registry {
    driver: Arc<dyn StorageDriver>,
    paths: PathMapper,
    cache: Option<Arc<dyn BlobDescriptorCache>>,
    verifier: Arc<dyn SignatureVerifier>,
    config: Arc<Config>,
}

impl Registry {
    /// Build a [`StorageDriver`] from `config.driver` and wrap it in a `Registry`. A
    /// `NoopVerifier` is wired in by default; call [`Registry::with_verifier`] to
    /// supply a real JWS/libtrust backend.
    pub fn new(config: Config) -> Self {
        let driver: Arc<dyn StorageDriver> = match config.driver {
            DriverKind::Filesystem => Arc::new(FilesystemDriver::new(config.root_directory.clone())),
            DriverKind::InMemory => Arc::new(InMemoryDriver::new()),
        };
        Registry::from_driver(driver, config)
    }

    /// Build a `Registry` around an already-constructed driver, for callers embedding a
    /// backend this crate doesn't ship (S3, Azure, GCS, ...).
    pub fn from_driver(driver: Arc<dyn StorageDriver>, config: Config) -> Self {
        let config = Arc::new(config);
        let cache: Option<Arc<dyn BlobDescriptorCache>> = if config.cache.enabled {
            Some(Arc::new(crate::blob::cache::LruDescriptorCache::new(
                config.cache.capacity,
            )))
        } else {
            None
        };
        Registry {
            driver,
            paths: PathMapper::new(),
            cache,
            verifier: Arc::new(NoopVerifier),
            config,
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Process-wide descriptor cache request/hit/miss counters, `None` if caching is
    /// disabled in `Config`.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    /// A cheap, synchronous, name-scoped view. Fails fast on a malformed name rather
    /// than deferring the error to the first I/O call.
    pub fn repository(&self, name: impl Into<String>) -> Result<Repository, ManifestError> {
        let name = name.into();
        crate::manifest::validate_repository_name(&name)?;
        Ok(Repository {
            registry: self.clone(),
            name,
        })
    }
}

/// One repository's view onto a [`Registry`]. Exposes only [`Repository::blobs`] and
/// [`Repository::manifests`] — there is no way to reach the raw driver through it.
pub struct Repository {
    registry: Registry,
    name: String,
}

impl Repository {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn blobs(&self) -> Arc<dyn BlobStore> {
        let cache: Option<Arc<dyn BlobDescriptorCache>> = self
            .registry
            .cache
            .clone()
            .map(|backing| Arc::new(RepositoryScopedCache::new(self.name.clone(), backing)) as Arc<dyn BlobDescriptorCache>);
        Arc::new(LinkedBlobStore::new(
            self.registry.driver.clone(),
            self.registry.paths.clone(),
            self.name.clone(),
            cache,
            self.registry.config.clone(),
        ))
    }

    pub fn manifests(&self) -> Arc<dyn ManifestsAndTags> {
        Arc::new(RepositoryManifests::new(
            self.registry.driver.clone(),
            self.registry.paths.clone(),
            self.name.clone(),
            self.blobs(),
            self.registry.verifier.clone(),
            self.registry.config.clone(),
        ))
    }
}

/// Convenience supertrait so [`Repository::manifests`] can return one handle that's
/// simultaneously a `ManifestStore`, `TagStore`, and `SignatureStore`, matching how
/// `RepositoryManifests` actually implements all three.
pub trait ManifestsAndTags: ManifestStore + TagStore + SignatureStore {}
impl<T: ManifestStore + TagStore + SignatureStore> ManifestsAndTags for T {}
