//! Bundle compilation: turn one manifest entry into one artifact file.
//!
//! | Kind | Per source | Runs in |
//! |---|---|---|
//! | script, plain ref | file read verbatim from `js/` | — |
//! | script, template ref | template compiler stdout | `js/templates/` |
//! | style | style compiler stdout | `css/compiled/` |
//!
//! Every block is followed by exactly one `\n`, in manifest order. The
//! artifact is written atomically; if any step fails the artifact path is
//! removed, so a failed build never leaves stale or partial output behind
//! under the bundle's name.

use crate::compilers::{CompileError, CompileUnit};
use crate::layout::{self, StaticLayout};
use crate::manifest::{BundleKind, SourceRef};
use crate::staleness::{self, StalenessError, Stamp};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("bundle {kind}/{name}: source not found: {}", path.display())]
    MissingSource {
        kind: BundleKind,
        name: String,
        path: PathBuf,
    },
    #[error("bundle {kind}/{name}: {source}")]
    Compiler {
        kind: BundleKind,
        name: String,
        #[source]
        source: CompileError,
    },
    #[error("bundle {kind}/{name}: IO error on {}: {source}", path.display())]
    Io {
        kind: BundleKind,
        name: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A freshly written bundle.
#[derive(Debug, Clone)]
pub struct CompiledArtifact {
    pub kind: BundleKind,
    pub name: String,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub modified: SystemTime,
}

/// Where a script source lives on disk.
pub fn script_source_path(layout: &StaticLayout, source: &SourceRef) -> PathBuf {
    match source {
        SourceRef::Plain(rel) => layout.script_dir().join(rel),
        SourceRef::Template(rel) => layout.template_dir().join(rel),
    }
}

/// Whether a script bundle is older than any of its sources.
pub fn script_needs_rebuild(
    layout: &StaticLayout,
    name: &str,
    sources: &[SourceRef],
) -> Result<bool, BuildError> {
    let paths: Vec<PathBuf> = sources
        .iter()
        .map(|s| script_source_path(layout, s))
        .collect();
    let artifact = layout.artifact_path(BundleKind::Script, name);
    staleness::needs_rebuild(&paths, &artifact).map_err(|e| match e {
        StalenessError::MissingSource(path) => BuildError::MissingSource {
            kind: BundleKind::Script,
            name: name.to_string(),
            path,
        },
        StalenessError::Io { path, source } => BuildError::Io {
            kind: BundleKind::Script,
            name: name.to_string(),
            path,
            source,
        },
    })
}

/// Whether a style bundle is older than the newest input of the style tree,
/// as folded by [`styles::preprocess`](crate::styles::preprocess).
pub fn style_needs_rebuild(
    layout: &StaticLayout,
    name: &str,
    latest: Stamp,
) -> Result<bool, BuildError> {
    let artifact = layout.artifact_path(BundleKind::Style, name);
    let modified = staleness::modified(&artifact).map_err(|source| BuildError::Io {
        kind: BundleKind::Style,
        name: name.to_string(),
        path: artifact.clone(),
        source,
    })?;
    Ok(latest.is_newer_than(modified))
}

/// Compiles bundles under one static root with the given compilers.
pub struct BundleCompiler<'a> {
    layout: &'a StaticLayout,
    templates: &'a dyn CompileUnit,
    styles: &'a dyn CompileUnit,
}

impl<'a> BundleCompiler<'a> {
    pub fn new(
        layout: &'a StaticLayout,
        templates: &'a dyn CompileUnit,
        styles: &'a dyn CompileUnit,
    ) -> Self {
        Self {
            layout,
            templates,
            styles,
        }
    }

    /// Build one bundle and write its artifact.
    ///
    /// On failure the artifact path is removed before the error is returned.
    pub fn compile_bundle(
        &self,
        kind: BundleKind,
        name: &str,
        sources: &[SourceRef],
    ) -> Result<CompiledArtifact, BuildError> {
        let path = self.layout.artifact_path(kind, name);
        match self.build(kind, name, sources, &path) {
            Ok(artifact) => Ok(artifact),
            Err(e) => {
                if let Err(rm) = layout::remove_if_exists(&path) {
                    warn!(path = %path.display(), error = %rm, "could not remove failed artifact");
                }
                Err(e)
            }
        }
    }

    fn build(
        &self,
        kind: BundleKind,
        name: &str,
        sources: &[SourceRef],
        path: &Path,
    ) -> Result<CompiledArtifact, BuildError> {
        let io_err = |path: &Path, source: io::Error| BuildError::Io {
            kind,
            name: name.to_string(),
            path: path.to_path_buf(),
            source,
        };

        let mut bytes = Vec::new();
        for source in sources {
            let block = match kind {
                BundleKind::Script => self.script_block(name, source)?,
                BundleKind::Style => self.style_block(name, source)?,
            };
            bytes.extend_from_slice(&block);
            bytes.push(b'\n');
        }

        layout::write_atomic(path, &bytes).map_err(|e| io_err(path, e))?;
        let modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| io_err(path, e))?;
        debug!(%kind, name, bytes = bytes.len(), "wrote bundle");

        Ok(CompiledArtifact {
            kind,
            name: name.to_string(),
            path: path.to_path_buf(),
            bytes,
            modified,
        })
    }

    fn script_block(&self, name: &str, source: &SourceRef) -> Result<Vec<u8>, BuildError> {
        let kind = BundleKind::Script;
        match source {
            SourceRef::Plain(_) => {
                let path = script_source_path(self.layout, source);
                fs::read(&path).map_err(|e| {
                    if e.kind() == io::ErrorKind::NotFound {
                        BuildError::MissingSource {
                            kind,
                            name: name.to_string(),
                            path,
                        }
                    } else {
                        BuildError::Io {
                            kind,
                            name: name.to_string(),
                            path,
                            source: e,
                        }
                    }
                })
            }
            SourceRef::Template(rel) => {
                let path = script_source_path(self.layout, source);
                if !path.exists() {
                    return Err(BuildError::MissingSource {
                        kind,
                        name: name.to_string(),
                        path,
                    });
                }
                self.templates
                    .compile_unit(Path::new(rel))
                    .map_err(|source| BuildError::Compiler {
                        kind,
                        name: name.to_string(),
                        source,
                    })
            }
        }
    }

    fn style_block(&self, name: &str, source: &SourceRef) -> Result<Vec<u8>, BuildError> {
        let kind = BundleKind::Style;
        let raw = source.raw();
        if !self.layout.compiled_style_dir().join(&raw).exists() {
            return Err(BuildError::MissingSource {
                kind,
                name: name.to_string(),
                path: self.layout.style_dir().join(&raw),
            });
        }
        self.styles
            .compile_unit(Path::new(&raw))
            .map_err(|source| BuildError::Compiler {
                kind,
                name: name.to_string(),
                source,
            })
    }
}
