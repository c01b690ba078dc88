//! On-disk layout of a static tree.
//!
//! Every path the pipeline touches is derived from one root:
//!
//! ```text
//! static/
//! ├── bundles.toml            # Bundle manifest
//! ├── js/                     # Script sources
//! │   └── templates/          # Client-side templates (compiled by subprocess)
//! ├── css/                    # Style sources (imports resolved relative to here)
//! │   └── compiled/           # Preprocessed mirror of css/, input to the style compiler
//! ├── img/                    # Binary assets, uploaded as-is
//! └── bundles/
//!     ├── script/<name>.js    # Compiled script bundles
//!     └── style/<name>.css    # Compiled style bundles
//! ```

use crate::manifest::BundleKind;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StaticLayout {
    root: PathBuf,
}

impl StaticLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn script_dir(&self) -> PathBuf {
        self.root.join("js")
    }

    pub fn template_dir(&self) -> PathBuf {
        self.script_dir().join("templates")
    }

    pub fn style_dir(&self) -> PathBuf {
        self.root.join("css")
    }

    pub fn compiled_style_dir(&self) -> PathBuf {
        self.style_dir().join("compiled")
    }

    pub fn image_dir(&self) -> PathBuf {
        self.root.join("img")
    }

    pub fn bundle_dir(&self, kind: BundleKind) -> PathBuf {
        self.root.join("bundles").join(kind.as_str())
    }

    /// Where the compiled artifact for `kind`/`name` lives.
    pub fn artifact_path(&self, kind: BundleKind, name: &str) -> PathBuf {
        self.bundle_dir(kind)
            .join(format!("{}.{}", name, kind.extension()))
    }
}

/// Replace `path` with `contents` in one step.
///
/// The bytes go to a temporary file in the same directory, which is then
/// renamed over the target. Readers see either the old file or the new one,
/// never a prefix of the new one.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Remove a file if it exists. A missing file is not an error.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
