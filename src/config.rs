//! Registry configuration.
//!
//! Fails fast: invalid driver names and empty filesystem roots are rejected at
//! construction rather than on first use. No CLI flag parsing lives here; the struct
//! and its validation are the library surface an embedding binary's `clap::Args` would
//! be converted into.

use std::time::Duration;

use crate::error::ConfigError;

/// Which [`crate::storage::StorageDriver`] implementation to construct.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DriverKind {
    Filesystem,
    InMemory,
}

impl DriverKind {
    fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "filesystem" | "FILESYSTEM" => Ok(DriverKind::Filesystem),
            "inmemory" | "memory" | "INMEMORY" => Ok(DriverKind::InMemory),
            other => Err(ConfigError::UnknownDriver(other.to_string())),
        }
    }
}

/// Redirect-to-backend toggle (`redirect.enabled`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RedirectConfig {
    pub enabled: bool,
}

/// Blob/manifest deletion toggle (`delete.enabled`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeleteConfig {
    pub enabled: bool,
}

/// Resumable-digest checkpointing toggle (`resumableDigest.enabled`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResumableDigestConfig {
    pub enabled: bool,
}

impl Default for ResumableDigestConfig {
    fn default() -> Self {
        ResumableDigestConfig { enabled: true }
    }
}

/// Process-local descriptor cache sizing (`cache.*`).
#[derive(Clone, Copy, Debug)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            capacity: 10_000,
        }
    }
}

/// Top-level configuration (`driver: {name, params}` plus the other registry knobs).
#[derive(Clone, Debug)]
pub struct Config {
    pub root_directory: String,
    pub driver: DriverKind,
    pub redirect: RedirectConfig,
    pub delete: DeleteConfig,
    pub resumable_digest: ResumableDigestConfig,
    pub cache: CacheConfig,
    /// Retry count for `validateBlob` on an eventually-consistent backend.
    pub validate_retries: u32,
    /// Linear backoff unit for `validateBlob` retries (100 ms × attempt).
    pub validate_backoff: Duration,
    /// Whether `ManifestStore::put` requires every referenced layer/config blob to
    /// already exist. On by default; a mirroring/bulk-import workflow that intentionally
    /// uploads manifests before their layers can disable it.
    pub verify_manifest_references: bool,
}

impl Config {
    /// Construct and eagerly validate a config from a driver name and root path, failing
    /// fast before any driver or router is built from it.
    pub fn new(driver_name: &str, root_directory: impl Into<String>) -> Result<Self, ConfigError> {
        let root_directory = root_directory.into();
        let driver = DriverKind::parse(driver_name)?;
        if driver == DriverKind::Filesystem && root_directory.trim().is_empty() {
            return Err(ConfigError::EmptyRootDirectory);
        }
        Ok(Config {
            root_directory,
            driver,
            redirect: RedirectConfig::default(),
            delete: DeleteConfig::default(),
            resumable_digest: ResumableDigestConfig::default(),
            cache: CacheConfig::default(),
            validate_retries: 3,
            validate_backoff: Duration::from_millis(100),
            verify_manifest_references: true,
        })
    }

    /// Convenience constructor for the in-memory driver, used pervasively in tests.
    pub fn in_memory() -> Self {
        Config::new("inmemory", "").expect("in-memory config is always valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_driver() {
        assert!(matches!(
            Config::new("s3", "/data"),
            Err(ConfigError::UnknownDriver(_))
        ));
    }

    #[test]
    fn rejects_empty_root_for_filesystem() {
        assert!(matches!(
            Config::new("filesystem", ""),
            Err(ConfigError::EmptyRootDirectory)
        ));
    }

    #[test]
    fn in_memory_needs_no_root() {
        let cfg = Config::in_memory();
        assert_eq!(cfg.driver, DriverKind::InMemory);
    }
}
