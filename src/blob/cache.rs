//! Process-local blob descriptor cache.
//!
//! A digest → descriptor memo sitting in front of the storage driver's link resolution,
//! backed by the `lru` crate behind a mutex.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;

use super::Descriptor;
use crate::digest::{self, Digest};

/// `Stat`/`SetDescriptor` memoization for blob descriptors, keyed by digest string.
pub trait BlobDescriptorCache: Send + Sync {
    fn stat(&self, digest: &Digest) -> Option<Descriptor>;
    fn set_descriptor(&self, digest: &Digest, descriptor: Descriptor);

    /// Process-wide request/hit/miss counts for this cache.
    fn stats(&self) -> CacheStats;
}

/// A snapshot of a cache's request/hit/miss counters, read with `Ordering::Relaxed`
/// since the three counters are independent tallies, not a single consistent view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub requests: u64,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Counters {
    fn record(&self, hit: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            requests: self.requests.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Single-mutex `LruCache` backing; sharding isn't warranted at this scale.
pub struct LruDescriptorCache {
    inner: Mutex<LruCache<String, Descriptor>>,
    counters: Counters,
}

impl LruDescriptorCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        LruDescriptorCache {
            inner: Mutex::new(LruCache::new(capacity)),
            counters: Counters::default(),
        }
    }
}

impl BlobDescriptorCache for LruDescriptorCache {
    fn stat(&self, digest: &Digest) -> Option<Descriptor> {
        let hit = self.inner.lock().get(&digest.to_string()).cloned();
        self.counters.record(hit.is_some());
        hit
    }

    fn set_descriptor(&self, digest: &Digest, descriptor: Descriptor) {
        self.inner.lock().put(digest.to_string(), descriptor);
    }

    fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }
}

/// Prefixes cache keys with a repository name so one process-wide LRU can serve every
/// repository without a cache entry confirmed via repo A's link being trusted as valid
/// in repo B before repo B's own link resolution has confirmed it at least once.
/// The underlying descriptor (digest → length) is globally valid content either way;
/// what this wrapper actually scopes is *when a repository is allowed to skip its own
/// link check*, not the bytes themselves.
pub struct RepositoryScopedCache {
    repository: String,
    backing: Arc<dyn BlobDescriptorCache>,
}

impl RepositoryScopedCache {
    pub fn new(repository: impl Into<String>, backing: Arc<dyn BlobDescriptorCache>) -> Self {
        RepositoryScopedCache {
            repository: repository.into(),
            backing,
        }
    }

    fn scoped_digest(&self, digest: &Digest) -> Digest {
        // `BlobDescriptorCache` is keyed by `Digest`, not an arbitrary string, so the
        // scoping has to round-trip through a digest-shaped key; a `sha256` of the
        // repo-prefixed string gives one without inventing a second cache key type.
        digest::sha256(format!("{}:{}", self.repository, digest).as_bytes())
    }
}

impl BlobDescriptorCache for RepositoryScopedCache {
    fn stat(&self, digest: &Digest) -> Option<Descriptor> {
        let mut descriptor = self.backing.stat(&self.scoped_digest(digest))?;
        descriptor.digest = digest.clone();
        Some(descriptor)
    }

    fn set_descriptor(&self, digest: &Digest, descriptor: Descriptor) {
        self.backing.set_descriptor(&self.scoped_digest(digest), descriptor);
    }

    fn stats(&self) -> CacheStats {
        self.backing.stats()
    }
}
