//! Layered error taxonomy.
//!
//! One enum per layer (storage, blob, manifest, config), composed into a top-level
//! aggregate via `#[from]` conversions; no HTTP surface, so there's no `IntoResponse`
//! boundary here, just these enums.

use std::io;

use thiserror::Error;

use crate::digest::Digest;

/// Errors a [`crate::storage::StorageDriver`] can return.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("transient backend error: {0}")]
    Transient(String),

    #[error("permanent backend error: {0}")]
    Permanent(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Whether a caller should retry this error with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}

/// Errors from the content-addressable blob store.
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("blob unknown: {0}")]
    BlobUnknown(String),

    #[error("blob upload unknown: {0}")]
    BlobUploadUnknown(String),

    #[error("blob upload invalid: {0}")]
    BlobUploadInvalid(String),

    #[error("digest invalid: {0}")]
    DigestInvalid(String),

    #[error("blob invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: u64, actual: u64 },

    #[error("blob invalid digest: expected {expected}, computed {actual}")]
    InvalidDigest { expected: String, actual: String },

    #[error("the operation is unsupported")]
    Unsupported,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl BlobError {
    /// Lift a driver-level "not found" into the store-level `BlobUnknown`. Any other
    /// storage error passes through unchanged.
    pub fn from_storage_stat(digest: &Digest, err: StorageError) -> Self {
        match err {
            StorageError::PathNotFound(_) => BlobError::BlobUnknown(digest.to_string()),
            other => BlobError::Storage(other),
        }
    }
}

/// Errors from the manifest/tag/signature layer.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("manifest unknown: {0}")]
    ManifestUnknown(String),

    #[error("manifest signature could not be verified")]
    Unverified,

    #[error("manifest references unknown blob(s): {0:?}")]
    BlobUnknown(Vec<String>),

    #[error("manifest invalid: {0}")]
    Invalid(String),

    #[error("invalid repository name: {0}")]
    NameInvalid(String),

    #[error("repository not known to registry: {0}")]
    NameUnknown(String),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors that alter control flow during a [`crate::storage::walk`] traversal.
#[derive(Error, Debug)]
pub enum WalkError {
    /// Returned by a visitor on a directory to skip descending into it; returned on a
    /// file it stops the entire walk (preserved for source compatibility — new callers
    /// should prefer [`WalkError::FilledBuffer`] for "stop the walk").
    #[error("skip directory")]
    SkipDir,

    /// Returned to stop the walk early without surfacing an error to the caller of
    /// [`crate::storage::walk::walk`].
    #[error("visitor buffer filled")]
    FilledBuffer,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Config validation failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("root directory must not be empty")]
    EmptyRootDirectory,

    #[error("unknown storage driver: {0}")]
    UnknownDriver(String),

    #[error("invalid driver parameter `{key}`: {reason}")]
    InvalidParam { key: String, reason: String },
}

/// Aggregate error for callers that don't care which layer failed.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
