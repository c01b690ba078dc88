//! Content digests for cache-busting names.
//!
//! Every uploaded object is named after a digest of its bytes, so a URL
//! always points at exactly one version of a file and can be cached forever.
//!
//! ## Algorithm
//!
//! MD5, rendered as 32 lowercase hex digits. The digest only needs to be
//! deterministic and collision-resistant enough for cache busting, and MD5 is
//! what S3 reports as the ETag of a single-part upload, which lets the
//! existence probe in [`remote`](crate::remote) compare the stored object
//! against the local file without downloading it.
//!
//! ## The digest map
//!
//! [`DigestMap`] holds the digests for one invocation: one per compiled
//! bundle and one per file under `img/`, keyed by the path relative to the
//! image root. It is computed once, passed explicitly to whoever needs it,
//! and never persisted. Two modes exist:
//!
//! - [`DigestMode::Full`]: bundles and images, used by deploy.
//! - [`DigestMode::ImagesOnly`]: images only, used by compile to render
//!   image URLs inside style sheets before any bundle exists. Asking an
//!   images-only map for a bundle digest is an error, not a silent miss.

use crate::layout::StaticLayout;
use crate::manifest::{BundleKind, BundleManifest};
use md5::{Digest as _, Md5};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum DigestError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("walking {0}: {1}")]
    Walk(PathBuf, #[source] walkdir::Error),
    #[error("bundle {kind}/{name} has not been compiled: {path} is missing")]
    MissingArtifact {
        kind: BundleKind,
        name: String,
        path: PathBuf,
    },
    #[error("no digest for bundle {kind}/{name}: bundles are not hashed in images-only mode")]
    NotComputed { kind: BundleKind, name: String },
    #[error("no digest for bundle {kind}/{name}: not in the manifest")]
    UnknownBundle { kind: BundleKind, name: String },
    #[error("no digest for image {0}: no such file under img/")]
    UnknownAsset(String),
}

/// A 16-byte content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; 16]);

impl Digest {
    pub fn of(bytes: &[u8]) -> Self {
        Self(Md5::digest(bytes).into())
    }

    pub fn of_file(path: &Path) -> Result<Self, DigestError> {
        let bytes = fs::read(path).map_err(|source| DigestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::of(&bytes))
    }

    /// Parse 32 hex digits (either case).
    pub fn from_hex(s: &str) -> Option<Self> {
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestMode {
    Full,
    ImagesOnly,
}

/// Digests of every bundle and image for one invocation.
#[derive(Debug, Clone)]
pub struct DigestMap {
    mode: DigestMode,
    bundles: BTreeMap<(BundleKind, String), Digest>,
    assets: BTreeMap<String, Digest>,
}

impl DigestMap {
    /// Hash images (and, in full mode, every compiled bundle) under `layout`.
    ///
    /// Images are hashed in parallel on the current rayon pool.
    pub fn compute(
        layout: &StaticLayout,
        manifest: &BundleManifest,
        mode: DigestMode,
    ) -> Result<Self, DigestError> {
        let mut bundles = BTreeMap::new();
        if mode == DigestMode::Full {
            for (kind, name, _) in manifest.iter() {
                let path = layout.artifact_path(kind, name);
                let digest = match Digest::of_file(&path) {
                    Err(DigestError::Io { source, .. })
                        if source.kind() == io::ErrorKind::NotFound =>
                    {
                        return Err(DigestError::MissingArtifact {
                            kind,
                            name: name.to_string(),
                            path,
                        });
                    }
                    other => other?,
                };
                debug!(%kind, name, %digest, "hashed bundle");
                bundles.insert((kind, name.to_string()), digest);
            }
        }

        let assets = hash_tree(&layout.image_dir())?;
        debug!(count = assets.len(), "hashed images");

        Ok(Self {
            mode,
            bundles,
            assets,
        })
    }

    pub fn mode(&self) -> DigestMode {
        self.mode
    }

    pub fn bundle(&self, kind: BundleKind, name: &str) -> Result<Digest, DigestError> {
        if self.mode == DigestMode::ImagesOnly {
            return Err(DigestError::NotComputed {
                kind,
                name: name.to_string(),
            });
        }
        self.bundles
            .get(&(kind, name.to_string()))
            .copied()
            .ok_or_else(|| DigestError::UnknownBundle {
                kind,
                name: name.to_string(),
            })
    }

    /// Digest of an image, by its `/`-separated path relative to `img/`.
    pub fn asset(&self, rel: &str) -> Result<Digest, DigestError> {
        self.assets
            .get(rel)
            .copied()
            .ok_or_else(|| DigestError::UnknownAsset(rel.to_string()))
    }

    pub fn bundles(&self) -> impl Iterator<Item = (BundleKind, &str, Digest)> {
        self.bundles
            .iter()
            .map(|((kind, name), digest)| (*kind, name.as_str(), *digest))
    }

    pub fn assets(&self) -> impl Iterator<Item = (&str, Digest)> {
        self.assets.iter().map(|(rel, digest)| (rel.as_str(), *digest))
    }
}

/// Hash every file below `root`, keyed by `/`-separated relative path.
/// A missing root yields an empty map.
fn hash_tree(root: &Path) -> Result<BTreeMap<String, Digest>, DigestError> {
    if !root.exists() {
        return Ok(BTreeMap::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| DigestError::Walk(root.to_path_buf(), e))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    files
        .par_iter()
        .map(|path| -> Result<(String, Digest), DigestError> {
            let digest = Digest::of_file(path)?;
            Ok((relative_key(root, path), digest))
        })
        .collect()
}

fn relative_key(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
