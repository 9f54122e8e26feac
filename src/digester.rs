//! Resumable SHA-256 digesting.
//!
//! Realizes a resumable digester directly on top of `sha2::Sha256`'s `Clone` impl, plus
//! a small process-local checkpoint cache so a `BlobWriter` resuming within the same
//! process never re-hashes bytes it has already consumed.

use std::collections::HashMap;

use parking_lot::Mutex;
use sha2::{Digest as _, Sha256};
use tokio::io::AsyncReadExt;

use crate::digest::Digest;
use crate::error::StorageError;
use crate::storage::StorageDriver;

/// A SHA-256 digest-in-progress that can snapshot and restore its own state cheaply.
/// `sha2::Sha256` is `Clone`, and cloning it mid-digest is exactly the snapshot the
/// design asks for — there is no separate serialization format to invent for the
/// in-process case.
#[derive(Clone)]
pub struct ResumableDigester {
    hasher: Sha256,
    len: u64,
}

impl Default for ResumableDigester {
    fn default() -> Self {
        Self::new()
    }
}

impl ResumableDigester {
    pub fn new() -> Self {
        ResumableDigester {
            hasher: Sha256::new(),
            len: 0,
        }
    }

    /// Bytes hashed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
        self.len += bytes.len() as u64;
    }

    /// An opaque snapshot of the current state. In this implementation the snapshot
    /// *is* the digester (both halves are `Clone`); kept as a distinct method name so
    /// call sites read as "take a checkpoint" rather than "duplicate this value".
    pub fn state(&self) -> Self {
        self.clone()
    }

    /// Replace this digester's state with a previously taken snapshot.
    pub fn restore(&mut self, snapshot: Self) {
        *self = snapshot;
    }

    /// The canonical digest of everything hashed so far, without consuming `self`.
    pub fn finalize(&self) -> Digest {
        let hex = hex::encode(self.hasher.clone().finalize());
        crate::digest::parse(&format!("sha256:{hex}")).expect("freshly computed sha256 digest is valid")
    }
}

/// Per-upload checkpoint store: a process-local cache of live [`ResumableDigester`]
/// snapshots keyed by byte offset, backed by marker files under the upload's
/// `hashstates/<alg>/` prefix.
///
/// `sha2::Sha256`'s internal block-buffer state isn't part of its public API, so it
/// can't be portably serialized into those marker files for a different process to
/// inherit. Within the process that took the checkpoint, resuming is O(remaining
/// bytes); across processes (or after a restart) it falls back to re-hashing the
/// scratch object from zero, which is slower but — since SHA-256 is deterministic —
/// produces an identical digest, preserving the "resume equals full re-hash" invariant.
pub struct CheckpointStore {
    hashstates_prefix: String,
    live: Mutex<HashMap<u64, ResumableDigester>>,
}

impl CheckpointStore {
    pub fn new(hashstates_prefix: impl Into<String>) -> Self {
        CheckpointStore {
            hashstates_prefix: hashstates_prefix.into(),
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Persist a checkpoint at `digester.len()`: keep the live value for same-process
    /// resumption, and drop a marker file on the backend recording that a checkpoint
    /// existed at this offset.
    pub async fn persist(
        &self,
        driver: &dyn StorageDriver,
        digester: &ResumableDigester,
    ) -> Result<(), StorageError> {
        let offset = digester.len();
        self.live.lock().insert(offset, digester.clone());
        let path = format!("{}/{offset}", self.hashstates_prefix);
        driver.put_content(&path, &[]).await
    }

    /// Resolve a digester positioned at `target_offset`, per the `resumeHashAt`
    /// protocol: prefer an exact or largest-offset-below-target live checkpoint, feed
    /// the gap bytes from the scratch object, and fall back to hashing from zero when
    /// no usable checkpoint is live. Stale on-disk markers newer than the checkpoint
    /// actually used are cleaned up best-effort.
    pub async fn resume_hash_at(
        &self,
        driver: &dyn StorageDriver,
        scratch_path: &str,
        target_offset: u64,
    ) -> Result<ResumableDigester, StorageError> {
        if target_offset == 0 {
            return Ok(ResumableDigester::new());
        }

        let (mut digester, start_offset) = {
            let live = self.live.lock();
            if let Some(exact) = live.get(&target_offset) {
                return Ok(exact.clone());
            }
            live.iter()
                .filter(|(&offset, _)| offset < target_offset)
                .max_by_key(|(&offset, _)| offset)
                .map(|(&offset, d)| (d.clone(), offset))
                .unwrap_or_else(|| (ResumableDigester::new(), 0))
        };

        self.cleanup_newer_than(driver, start_offset).await;

        let mut reader = driver.reader(scratch_path, start_offset).await?;
        let mut remaining = target_offset - start_offset;
        let mut buf = vec![0u8; 64 * 1024];
        while remaining > 0 {
            let want = (buf.len() as u64).min(remaining) as usize;
            let n = reader.read(&mut buf[..want]).await?;
            if n == 0 {
                break;
            }
            digester.update(&buf[..n]);
            remaining -= n as u64;
        }
        Ok(digester)
    }

    async fn cleanup_newer_than(&self, driver: &dyn StorageDriver, offset: u64) {
        let stale: Vec<u64> = {
            let mut live = self.live.lock();
            let stale: Vec<u64> = live.keys().copied().filter(|&o| o > offset).collect();
            for o in &stale {
                live.remove(o);
            }
            stale
        };
        for o in stale {
            let path = format!("{}/{o}", self.hashstates_prefix);
            let _ = driver.delete(&path).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryDriver;

    #[test]
    fn restoring_state_and_feeding_remainder_matches_full_hash() {
        let full = {
            let mut d = ResumableDigester::new();
            d.update(b"hello world");
            d.finalize()
        };

        let mut d = ResumableDigester::new();
        d.update(b"hello ");
        let checkpoint = d.state();

        let mut resumed = ResumableDigester::new();
        resumed.restore(checkpoint);
        resumed.update(b"world");

        assert_eq!(resumed.finalize().to_string(), full.to_string());
    }

    #[tokio::test]
    async fn checkpoint_store_resumes_without_rereading_when_live() {
        let driver = InMemoryDriver::new();
        driver.put_content("/scratch", b"hello world").await.unwrap();
        let store = CheckpointStore::new("/hashstates/sha256");

        let mut d = ResumableDigester::new();
        d.update(b"hello ");
        store.persist(&driver, &d).await.unwrap();

        let resumed = store.resume_hash_at(&driver, "/scratch", 6).await.unwrap();
        assert_eq!(resumed.len(), 6);
    }

    #[tokio::test]
    async fn checkpoint_store_falls_back_to_rehash_when_cold() {
        let driver = InMemoryDriver::new();
        driver.put_content("/scratch", b"hello world").await.unwrap();
        let store = CheckpointStore::new("/hashstates/sha256");

        let resumed = store.resume_hash_at(&driver, "/scratch", 11).await.unwrap();
        let mut expected = ResumableDigester::new();
        expected.update(b"hello world");
        assert_eq!(resumed.finalize().to_string(), expected.finalize().to_string());
    }
}
