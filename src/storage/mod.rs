//! Storage-driver abstraction.
//!
//! A uniform, path-keyed object store capability interface the rest of the crate can
//! dispatch against dynamically (`Arc<dyn StorageDriver>`), with local filesystem and
//! in-memory implementations supplied in this core; cloud backends (S3, Azure, GCS)
//! plug in against the same trait from outside it.

pub mod filesystem;
pub mod io;
pub mod memory;
pub mod paths;
pub mod walk;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use tokio::io::AsyncRead;

use crate::error::StorageError;

static PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(/[A-Za-z0-9._-]+)+$").expect("static regex is valid"));

/// Validate that `path` is absolute, `/`-delimited, and made of safe segment
/// characters.
pub fn validate_path(path: &str) -> Result<(), StorageError> {
    if PATH_RE.is_match(path) {
        Ok(())
    } else {
        Err(StorageError::InvalidPath(path.to_string()))
    }
}

/// Result of a [`StorageDriver::stat`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub path: String,
    pub size: u64,
    pub mod_time: Option<DateTime<Utc>>,
    pub is_dir: bool,
}

/// A streaming reader returned by [`StorageDriver::reader`].
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Streaming writer handle returned by [`StorageDriver::writer`]: exactly one of
/// [`FileWriter::commit`] / [`FileWriter::cancel`] must be called before
/// [`FileWriter::close`]; a close without a commit is an implicit cancel.
#[async_trait]
pub trait FileWriter: Send {
    /// Append bytes, returning the number of bytes the backend acknowledged.
    async fn write(&mut self, buf: &[u8]) -> Result<usize, StorageError>;

    /// Bytes accepted so far, which may exceed bytes durably persisted until the next
    /// flush/commit.
    fn size(&self) -> u64;

    /// Make the written bytes durable at the writer's path. Replaces any existing
    /// object if the writer was opened with `append = false`.
    async fn commit(&mut self) -> Result<(), StorageError>;

    /// Discard everything written in this session.
    async fn cancel(&mut self) -> Result<(), StorageError>;

    /// Close the writer. If neither `commit` nor `cancel` was called first, this is
    /// an implicit cancel.
    async fn close(&mut self) -> Result<(), StorageError>;
}

/// Uniform, path-keyed object store. Cloud backends (S3, Azure, GCS, ...) are
/// structurally identical to this trait; only the local filesystem and in-memory
/// implementations ship in this core.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Entire object bytes. For small objects only; fails with `PathNotFound` if
    /// absent.
    async fn get_content(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Atomically replace an object with the given bytes.
    async fn put_content(&self, path: &str, content: &[u8]) -> Result<(), StorageError>;

    /// A streaming reader starting at `offset`. If `offset >= size`, returns an empty
    /// reader rather than an error.
    async fn reader(&self, path: &str, offset: u64) -> Result<BoxedReader, StorageError>;

    /// A streaming writer. If `append` is false, any existing object is replaced on
    /// commit; if true, bytes are appended and `size()` reflects pre-existing length.
    async fn writer(&self, path: &str, append: bool) -> Result<Box<dyn FileWriter>, StorageError>;

    /// Metadata about `path`. Directories are synthesized for prefix containers that
    /// contain at least one object.
    async fn stat(&self, path: &str) -> Result<FileInfo, StorageError>;

    /// Direct descendants (files and synthetic directories) of a prefix. Fails with
    /// `PathNotFound` if the prefix yields nothing and is not `/`.
    async fn list(&self, path: &str) -> Result<Vec<String>, StorageError>;

    /// Atomic rename. `src` must exist; `dst` is overwritten.
    async fn move_to(&self, src: &str, dst: &str) -> Result<(), StorageError>;

    /// Recursive delete of `path` and all descendants. Idempotent: `PathNotFound` if
    /// nothing matched.
    async fn delete(&self, path: &str) -> Result<(), StorageError>;

    /// A pre-signed URL the client can use to fetch/head the object directly.
    /// Optional; drivers that don't support it return `UnsupportedMethod`.
    async fn redirect_url(&self, _method: &str, path: &str) -> Result<String, StorageError> {
        Err(StorageError::UnsupportedMethod(format!(
            "redirect_url not supported for {path}"
        )))
    }
}
