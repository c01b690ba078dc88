//! Synchronizing artifacts with a remote object store.
//!
//! Objects are named after their digest (see [`naming`](crate::naming)), so
//! an object that exists under its name can only hold those bytes. Two
//! policies follow from that:
//!
//! | Object | Protocol |
//! |---|---|
//! | Bundle | Unconditional PUT. Bundles are small and rebuilt often. |
//! | Image | HEAD first; PUT only when absent. |
//!
//! An image whose digest-qualified name exists but whose ETag differs means
//! the store and the naming contract disagree. That is reported as a
//! consistency error and the object is never overwritten, because pages in
//! the wild may already reference it.
//!
//! The store itself is behind the [`ObjectStore`] trait. [`S3Store`] speaks
//! the S3 REST API; tests use `MockStore`.

pub mod s3;
pub mod signing;

pub use s3::S3Store;

use crate::digest::Digest;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("{method} {key}: {source}")]
    Transport {
        method: &'static str,
        key: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} {key}: unexpected status {status} {reason}: {body}")]
    UnexpectedStatus {
        method: &'static str,
        key: String,
        status: u16,
        reason: String,
        body: String,
    },
    #[error("HEAD {key}: response has no ETag")]
    MissingEtag { key: String },
    #[error("{key} exists with ETag {found}, expected {expected}; refusing to overwrite")]
    Consistency {
        key: String,
        expected: String,
        found: String,
    },
}

/// What a HEAD request found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Absent,
    /// ETag with surrounding quotes removed.
    Present { etag: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Uploaded,
    AlreadyCurrent,
}

/// A key/value object store.
pub trait ObjectStore: Sync {
    fn head(&self, key: &str) -> Result<Probe, SyncError>;

    fn put(&self, key: &str, body: &[u8], content_type: &str) -> Result<(), SyncError>;
}

/// Upload a bundle under its digest-qualified key.
pub fn sync_bundle(
    store: &dyn ObjectStore,
    key: &str,
    body: &[u8],
    content_type: &str,
) -> Result<SyncOutcome, SyncError> {
    store.put(key, body, content_type)?;
    Ok(SyncOutcome::Uploaded)
}

/// Upload an image unless the store already holds it.
pub fn sync_asset(
    store: &dyn ObjectStore,
    key: &str,
    digest: &Digest,
    body: &[u8],
    content_type: &str,
) -> Result<SyncOutcome, SyncError> {
    match store.head(key)? {
        Probe::Absent => {
            debug!(key, "absent, uploading");
            store.put(key, body, content_type)?;
            Ok(SyncOutcome::Uploaded)
        }
        Probe::Present { etag } if etag.eq_ignore_ascii_case(&digest.to_hex()) => {
            debug!(key, "already current");
            Ok(SyncOutcome::AlreadyCurrent)
        }
        Probe::Present { etag } => Err(SyncError::Consistency {
            key: key.to_string(),
            expected: digest.to_hex(),
            found: etag,
        }),
    }
}
