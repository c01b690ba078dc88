//! Shared test utilities for the static-s3 test suite.
//!
//! Provides a throwaway static tree and helpers to pin modification times,
//! so staleness tests never depend on how fast the filesystem clock ticks.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tree = StaticTree::new();
//! let a = tree.write("js/a.js", "1;");
//! set_mtime(&a, 1_000);
//! let manifest = tree.manifest("[script]\nmain = [\"a.js\"]\n");
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use crate::layout::StaticLayout;
use crate::manifest::BundleManifest;

// =========================================================================
// Fixture setup
// =========================================================================

/// A temporary static root with the standard source directories created.
pub struct StaticTree {
    _tmp: TempDir,
    pub layout: StaticLayout,
}

impl StaticTree {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let layout = StaticLayout::new(tmp.path().join("static"));
        for dir in [
            layout.script_dir(),
            layout.template_dir(),
            layout.style_dir(),
            layout.image_dir(),
        ] {
            std::fs::create_dir_all(dir).unwrap();
        }
        Self { _tmp: tmp, layout }
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    /// Absolute path of `rel` inside the static root. Nothing is created.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    /// Write `contents` to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub fn read(&self, rel: &str) -> Vec<u8> {
        std::fs::read(self.path(rel))
            .unwrap_or_else(|e| panic!("cannot read {rel}: {e}"))
    }

    pub fn read_string(&self, rel: &str) -> String {
        String::from_utf8(self.read(rel)).unwrap()
    }

    /// Parse a TOML manifest (it is not written to disk).
    pub fn manifest(&self, toml: &str) -> BundleManifest {
        BundleManifest::from_toml_str(toml).unwrap()
    }
}

// =========================================================================
// Modification times
// =========================================================================

/// Pin the mtime of `path` to `secs` after the Unix epoch.
pub fn set_mtime(path: &Path, secs: i64) {
    filetime::set_file_mtime(path, filetime::FileTime::from_unix_time(secs, 0)).unwrap();
}

/// Move the mtime of `path` `secs` seconds into the past, relative to now.
pub fn age(path: &Path, secs: u64) {
    let then = SystemTime::now() - Duration::from_secs(secs);
    filetime::set_file_mtime(path, filetime::FileTime::from_system_time(then)).unwrap();
}

pub fn mtime(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or_else(|e| panic!("cannot stat {}: {e}", path.display()))
}
