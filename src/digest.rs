//! Canonical digest handling.
//!
//! A [`Digest`] is the opaque `<algorithm>:<hex>` value that names every blob in the
//! store. We reuse `oci_spec`'s `Digest` type rather than inventing a parallel one: it
//! already parses and displays the canonical form and is what the rest of the OCI
//! ecosystem (manifests, descriptors) expects.

use std::str::FromStr;

pub use oci_spec::image::Digest;
use sha2::{Digest as _, Sha256};

use crate::error::BlobError;

/// The SHA-256 digest of the empty byte string, used for the zero-length-blob fast
/// path.
pub const EMPTY_SHA256: &str =
    "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Parse and validate a digest string, mapping failures onto [`BlobError::DigestInvalid`].
pub fn parse(raw: &str) -> Result<Digest, BlobError> {
    Digest::from_str(raw).map_err(|_| BlobError::DigestInvalid(raw.to_string()))
}

/// Compute the canonical (SHA-256) digest of a byte slice.
pub fn sha256(bytes: &[u8]) -> Digest {
    let hex = hex::encode(Sha256::digest(bytes));
    // Constructed from a value we just hex-encoded ourselves: cannot fail.
    Digest::from_str(&format!("sha256:{hex}")).expect("freshly computed sha256 digest is valid")
}

/// `true` if `digest` is the well-known empty-content digest.
pub fn is_empty_sha256(digest: &Digest) -> bool {
    digest.to_string() == EMPTY_SHA256
}

/// First two hex characters of the digest, used to shard the blob directory tree
/// (`blobs/<alg>/<hex[0:2]>/<hex>/data`).
pub fn shard_prefix(digest: &Digest) -> String {
    digest.digest()[..2].to_string()
}
