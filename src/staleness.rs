//! Modification-time based staleness checks.
//!
//! An artifact is fresh when it was written no earlier than the newest of its
//! inputs. All checks here are read-only `stat` calls.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StalenessError {
    #[error("source file not found: {0}")]
    MissingSource(PathBuf),
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Modification time of `path`, or `None` if it does not exist.
pub fn modified(path: &Path) -> io::Result<Option<SystemTime>> {
    match fs::metadata(path) {
        Ok(meta) => meta.modified().map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Decide whether an artifact must be rebuilt from `sources`.
///
/// A missing artifact always needs a rebuild. Otherwise a rebuild is needed
/// iff some source was modified strictly after the artifact. A missing
/// source is a configuration error, never "stale".
pub fn needs_rebuild<P: AsRef<Path>>(
    sources: &[P],
    artifact: &Path,
) -> Result<bool, StalenessError> {
    let artifact_mtime = match modified(artifact).map_err(|source| StalenessError::Io {
        path: artifact.to_path_buf(),
        source,
    })? {
        Some(t) => t,
        None => {
            debug!(artifact = %artifact.display(), "artifact missing, rebuilding");
            return Ok(true);
        }
    };

    for source in sources {
        let source = source.as_ref();
        let source_mtime = modified(source)
            .map_err(|e| StalenessError::Io {
                path: source.to_path_buf(),
                source: e,
            })?
            .ok_or_else(|| StalenessError::MissingSource(source.to_path_buf()))?;
        if source_mtime > artifact_mtime {
            debug!(
                artifact = %artifact.display(),
                source = %source.display(),
                "source newer than artifact"
            );
            return Ok(true);
        }
    }
    Ok(false)
}

/// The newest input time seen by a fold over a set of inputs.
///
/// `Never` is the identity (no inputs), `Unbounded` is newer than every
/// artifact: it marks inputs whose compiled form did not exist yet, so a
/// first-time compile always forces a rebuild downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Stamp {
    #[default]
    Never,
    At(SystemTime),
    Unbounded,
}

impl Stamp {
    /// Whether an artifact last written at `artifact` is older than this stamp.
    /// A missing artifact is always older.
    pub fn is_newer_than(self, artifact: Option<SystemTime>) -> bool {
        match (self, artifact) {
            (_, None) => true,
            (Stamp::Never, Some(_)) => false,
            (Stamp::At(t), Some(a)) => t > a,
            (Stamp::Unbounded, Some(_)) => true,
        }
    }
}
