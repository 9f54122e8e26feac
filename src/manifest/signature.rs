//! Opaque JSON-signature verification seam.
//!
//! The core never hardcodes a crypto backend. It only knows the libtrust/JWS
//! detached-signature envelope shape well enough to split a manifest payload from its
//! signatures; actual cryptographic verification is delegated to whatever
//! [`SignatureVerifier`] the caller supplies.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ManifestError;

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    signatures: Vec<Value>,
}

/// Caller-supplied cryptographic check of a manifest's detached signatures. The core
/// treats this as an opaque dependency; it parses the envelope shape but never the
/// signature bytes themselves.
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    async fn verify(&self, payload: &[u8], signatures: &[Vec<u8>]) -> Result<(), ManifestError>;
}

/// Accepts every manifest unconditionally. Used in tests, and by callers who verify
/// signatures upstream of this crate (e.g. at an HTTP gateway) and don't need this
/// layer to repeat the check.
pub struct NoopVerifier;

#[async_trait]
impl SignatureVerifier for NoopVerifier {
    async fn verify(&self, _payload: &[u8], _signatures: &[Vec<u8>]) -> Result<(), ManifestError> {
        Ok(())
    }
}

/// Split a signed envelope into the whole-document payload bytes and each detached
/// signature's raw JSON bytes. The envelope is a bare JSON object carrying
/// `signatures: [...]` alongside the manifest payload fields; a manifest with no
/// `signatures` field at all (a plain OCI image manifest) yields zero signatures.
pub fn parse_envelope(bytes: &[u8]) -> Result<(Vec<u8>, Vec<Vec<u8>>), ManifestError> {
    let envelope: Envelope =
        serde_json::from_slice(bytes).map_err(|e| ManifestError::Invalid(e.to_string()))?;
    let signatures = envelope
        .signatures
        .iter()
        .map(|v| serde_json::to_vec(v).unwrap_or_default())
        .collect();
    Ok((bytes.to_vec(), signatures))
}
