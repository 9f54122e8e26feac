//! Content-addressable blob storage core for a container image registry.
//!
//! [`Registry`] is the composition root: build one from a [`Config`], then call
//! [`Registry::repository`] to get a name-scoped [`Repository`] exposing
//! [`Repository::blobs`] (content-addressable, dedup'd blob storage) and
//! [`Repository::manifests`] (manifest/tag/signature bookkeeping on top of it).
//! Everything below that — the [`storage`] driver abstraction, the [`digest`] and
//! [`digester`] helpers, the depth-first [`storage::walk`] — is public for callers
//! embedding their own backend or building a different frontend on the same core, but
//! `Registry`/`Repository` is the surface most callers need.

pub mod blob;
pub mod config;
pub mod digest;
pub mod digester;
pub mod error;
pub mod manifest;
pub mod registry;
pub mod storage;

pub use config::Config;
pub use registry::{Registry, Repository};

/// Initialize the crate's `tracing` subscriber: RFC-3339 timestamps, `RUST_LOG`-driven
/// filtering that falls back to `debug`, span-close events. A binary embedding this
/// crate is free to set up its own subscriber instead; this is a convenience for
/// callers who don't already have one.
pub fn init_tracing() {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}
