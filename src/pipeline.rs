//! The build/deploy façade.
//!
//! [`Pipeline`] ties the stages together for one static root:
//!
//! ```text
//! compile:  manifest → staleness → (style preprocess) → bundle compiler → bundles/
//! deploy:   manifest + bundles/ + img/ → digest map → sync engine → object store
//! ```
//!
//! The two operations are independent. `deploy` never compiles: a bundle
//! that has not been built is a configuration error, not a reason to build.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle ─ compile ─▶ Compiling ─┬─▶ Compiled
//!                              └─▶ CompileFailed
//! Idle ─ deploy ──▶ Deploying ─┬─▶ Deployed
//!                              └─▶ DeployFailed
//! ```
//!
//! ## Progress events
//!
//! Both operations take an optional `Sender` and report each bundle and
//! object as it is handled. The CLI drains the channel on a printer thread;
//! library callers can pass `None`.

use crate::compile::{self, BuildError, BundleCompiler};
use crate::compilers::{CompileError, CompileUnit};
use crate::config::{ConfigError, StaticConfig};
use crate::digest::{DigestError, DigestMap, DigestMode};
use crate::layout::StaticLayout;
use crate::manifest::{BundleKind, BundleManifest, ManifestError};
use crate::naming::{self, UrlBase};
use crate::remote::{self, ObjectStore, SyncError, SyncOutcome};
use crate::styles::{self, StyleError, WalkMode};
use rayon::prelude::*;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::info;

/// Broad failure classes, one per way the operator has to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Fix the manifest, config or source tree.
    Configuration,
    /// Fix the source being compiled.
    Compilation,
    /// The store could not be reached or refused a request.
    Network,
    /// The store holds different bytes under a digest-qualified name.
    Consistency,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorClass::Configuration => "configuration error",
            ErrorClass::Compilation => "compilation error",
            ErrorClass::Network => "network error",
            ErrorClass::Consistency => "consistency error",
        })
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Manifest(#[from] ManifestError),
    #[error("style preprocessing failed: {0}")]
    Style(#[from] StyleError),
    #[error("{0}")]
    Build(#[from] BuildError),
    #[error("compiler setup: {0}")]
    Compiler(#[from] CompileError),
    #[error("{0}")]
    Digest(#[from] DigestError),
    #[error("{0}")]
    Sync(#[from] SyncError),
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("upload pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("remote serving is disabled; set remote.enabled = true to deploy")]
    RemoteDisabled,
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::Style(StyleError::Malformed { .. }) => ErrorClass::Compilation,
            PipelineError::Build(BuildError::Compiler { .. }) => ErrorClass::Compilation,
            PipelineError::Sync(SyncError::Consistency { .. }) => ErrorClass::Consistency,
            PipelineError::Sync(_) => ErrorClass::Network,
            _ => ErrorClass::Configuration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Compiling,
    Compiled,
    CompileFailed,
    Deploying,
    Deployed,
    DeployFailed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    /// Rebuild every bundle and regenerate the whole compiled style mirror.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileEvent {
    StylesPreprocessed { regenerated: usize },
    BundleBuilt {
        kind: BundleKind,
        name: String,
        bytes: usize,
    },
    BundleFresh { kind: BundleKind, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployEvent {
    Uploaded { key: String, bytes: usize },
    AlreadyCurrent { key: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileReport {
    pub built: Vec<(BundleKind, String)>,
    pub fresh: Vec<(BundleKind, String)>,
    pub styles_regenerated: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployReport {
    pub uploaded: Vec<String>,
    pub already_current: Vec<String>,
}

/// What a compile would do, computed without writing anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// Style sources whose compiled counterpart is missing or stale.
    pub stale_styles: Vec<PathBuf>,
    /// Every bundle in manifest order, with whether it would be rebuilt.
    pub bundles: Vec<(BundleKind, String, bool)>,
}

impl StatusReport {
    pub fn stale_bundles(&self) -> impl Iterator<Item = (BundleKind, &str)> {
        self.bundles
            .iter()
            .filter(|(_, _, stale)| *stale)
            .map(|(kind, name, _)| (*kind, name.as_str()))
    }
}

pub struct Pipeline {
    layout: StaticLayout,
    manifest: BundleManifest,
    /// Set when pages and style sheets reference the object store.
    public_url: Option<String>,
    phase: Phase,
}

impl Pipeline {
    pub fn new(layout: StaticLayout, manifest: BundleManifest) -> Self {
        Self {
            layout,
            manifest,
            public_url: None,
            phase: Phase::Idle,
        }
    }

    /// Serve from the object store under `public_url`.
    pub fn with_public_url(mut self, public_url: impl Into<String>) -> Self {
        self.public_url = Some(public_url.into());
        self
    }

    /// Open the static root described by `config`, reading its manifest.
    pub fn from_config(config: &StaticConfig, project_root: &Path) -> Result<Self, PipelineError> {
        let layout = StaticLayout::new(config.static_root(project_root));
        let manifest = BundleManifest::load(&config.manifest_path(project_root))?;
        let pipeline = Self::new(layout, manifest);
        Ok(match config.remote.public_url() {
            Some(url) if config.remote.enabled => pipeline.with_public_url(url),
            _ => pipeline,
        })
    }

    pub fn layout(&self) -> &StaticLayout {
        &self.layout
    }

    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_remote(&self) -> bool {
        self.public_url.is_some()
    }

    /// Rebuild every stale bundle.
    ///
    /// Scripts are handled first, then the whole style tree is preprocessed,
    /// then each style bundle is checked against the tree's newest input.
    /// The first failure stops the run.
    pub fn compile(
        &mut self,
        templates: &dyn CompileUnit,
        styles: &dyn CompileUnit,
        options: CompileOptions,
        events: Option<Sender<CompileEvent>>,
    ) -> Result<CompileReport, PipelineError> {
        self.phase = Phase::Compiling;
        let result = self.run_compile(templates, styles, options, events.as_ref());
        self.phase = match result {
            Ok(_) => Phase::Compiled,
            Err(_) => Phase::CompileFailed,
        };
        result
    }

    fn run_compile(
        &self,
        templates: &dyn CompileUnit,
        style_compiler: &dyn CompileUnit,
        options: CompileOptions,
        events: Option<&Sender<CompileEvent>>,
    ) -> Result<CompileReport, PipelineError> {
        let emit = |event: CompileEvent| {
            if let Some(tx) = events {
                tx.send(event).ok();
            }
        };
        let compiler = BundleCompiler::new(&self.layout, templates, style_compiler);
        let mut report = CompileReport::default();

        let mut record = |kind: BundleKind, name: &str, built: Option<usize>| {
            match built {
                Some(bytes) => {
                    emit(CompileEvent::BundleBuilt {
                        kind,
                        name: name.to_string(),
                        bytes,
                    });
                    report.built.push((kind, name.to_string()));
                }
                None => {
                    emit(CompileEvent::BundleFresh {
                        kind,
                        name: name.to_string(),
                    });
                    report.fresh.push((kind, name.to_string()));
                }
            }
        };

        for (name, sources) in self.manifest.bundles(BundleKind::Script) {
            let stale =
                options.force || compile::script_needs_rebuild(&self.layout, name, sources)?;
            let built = if stale {
                let artifact = compiler.compile_bundle(BundleKind::Script, name, sources)?;
                Some(artifact.bytes.len())
            } else {
                None
            };
            record(BundleKind::Script, name, built);
        }

        if options.force {
            styles::clear_compiled(&self.layout)?;
        }
        let digests = self.image_digests()?;
        let pass = styles::preprocess(&self.layout, WalkMode::Write, self.urls(&digests))?;
        let styles_regenerated = pass.stale.len();
        emit(CompileEvent::StylesPreprocessed {
            regenerated: styles_regenerated,
        });

        for (name, sources) in self.manifest.bundles(BundleKind::Style) {
            let stale =
                options.force || compile::style_needs_rebuild(&self.layout, name, pass.latest)?;
            let built = if stale {
                let artifact = compiler.compile_bundle(BundleKind::Style, name, sources)?;
                Some(artifact.bytes.len())
            } else {
                None
            };
            record(BundleKind::Style, name, built);
        }

        report.styles_regenerated = styles_regenerated;
        info!(
            built = report.built.len(),
            fresh = report.fresh.len(),
            "compile finished"
        );
        Ok(report)
    }

    /// Report what `compile` would rebuild, without writing anything.
    pub fn status(&self) -> Result<StatusReport, PipelineError> {
        let mut report = StatusReport::default();
        for (name, sources) in self.manifest.bundles(BundleKind::Script) {
            let stale = compile::script_needs_rebuild(&self.layout, name, sources)?;
            report
                .bundles
                .push((BundleKind::Script, name.to_string(), stale));
        }

        let digests = self.image_digests()?;
        let pass = styles::preprocess(&self.layout, WalkMode::DryRun, self.urls(&digests))?;
        for (name, _) in self.manifest.bundles(BundleKind::Style) {
            let stale = compile::style_needs_rebuild(&self.layout, name, pass.latest)?;
            report.bundles.push((BundleKind::Style, name.to_string(), stale));
        }
        report.stale_styles = pass.stale;
        Ok(report)
    }

    /// Image URLs in style sheets need image digests when serving remotely.
    fn image_digests(&self) -> Result<Option<DigestMap>, PipelineError> {
        match &self.public_url {
            Some(_) => Ok(Some(DigestMap::compute(
                &self.layout,
                &self.manifest,
                DigestMode::ImagesOnly,
            )?)),
            None => Ok(None),
        }
    }

    fn urls<'a>(&'a self, digests: &'a Option<DigestMap>) -> UrlBase<'a> {
        match (&self.public_url, digests) {
            (Some(public_url), Some(digests)) => UrlBase::Remote {
                public_url,
                digests,
            },
            _ => UrlBase::Local,
        }
    }

    pub fn digests(&self, mode: DigestMode) -> Result<DigestMap, PipelineError> {
        Ok(DigestMap::compute(&self.layout, &self.manifest, mode)?)
    }

    /// Upload every bundle and every image to `store`.
    ///
    /// Bundles are uploaded unconditionally, then images are probed and
    /// uploaded when absent. At most `max_uploads` requests run at once. The
    /// first failure stops the run; objects already uploaded stay uploaded.
    pub fn deploy(
        &mut self,
        store: &dyn ObjectStore,
        max_uploads: usize,
        events: Option<Sender<DeployEvent>>,
    ) -> Result<DeployReport, PipelineError> {
        if self.public_url.is_none() {
            return Err(PipelineError::RemoteDisabled);
        }
        self.phase = Phase::Deploying;
        let result = self.run_deploy(store, max_uploads, events.as_ref());
        self.phase = match result {
            Ok(_) => Phase::Deployed,
            Err(_) => Phase::DeployFailed,
        };
        result
    }

    fn run_deploy(
        &self,
        store: &dyn ObjectStore,
        max_uploads: usize,
        events: Option<&Sender<DeployEvent>>,
    ) -> Result<DeployReport, PipelineError> {
        let digests = DigestMap::compute(&self.layout, &self.manifest, DigestMode::Full)?;

        let mut jobs = Vec::new();
        for (kind, name, digest) in digests.bundles() {
            jobs.push(UploadJob {
                key: naming::bundle_key(kind, name, &digest),
                path: self.layout.artifact_path(kind, name),
                probe: None,
            });
        }
        let image_dir = self.layout.image_dir();
        for (rel, digest) in digests.assets() {
            jobs.push(UploadJob {
                key: naming::asset_key(rel, &digest),
                path: image_dir.join(rel),
                probe: Some(digest),
            });
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_uploads.max(1))
            .build()?;
        let outcomes: Vec<(String, SyncOutcome)> = pool.install(|| {
            jobs.par_iter()
                .map(|job| -> Result<(String, SyncOutcome), PipelineError> {
                    let body = fs::read(&job.path).map_err(|source| PipelineError::Io {
                        path: job.path.clone(),
                        source,
                    })?;
                    let content_type = naming::content_type(&job.key);
                    let outcome = match &job.probe {
                        None => remote::sync_bundle(store, &job.key, &body, content_type)?,
                        Some(digest) => {
                            remote::sync_asset(store, &job.key, digest, &body, content_type)?
                        }
                    };
                    if let Some(tx) = events {
                        let event = match outcome {
                            SyncOutcome::Uploaded => DeployEvent::Uploaded {
                                key: job.key.clone(),
                                bytes: body.len(),
                            },
                            SyncOutcome::AlreadyCurrent => DeployEvent::AlreadyCurrent {
                                key: job.key.clone(),
                            },
                        };
                        tx.send(event).ok();
                    }
                    Ok((job.key.clone(), outcome))
                })
                .collect::<Result<Vec<_>, PipelineError>>()
        })?;

        let mut report = DeployReport::default();
        for (key, outcome) in outcomes {
            match outcome {
                SyncOutcome::Uploaded => report.uploaded.push(key),
                SyncOutcome::AlreadyCurrent => report.already_current.push(key),
            }
        }
        info!(
            uploaded = report.uploaded.len(),
            current = report.already_current.len(),
            "deploy finished"
        );
        Ok(report)
    }
}

/// One object to send: bundles carry no probe digest and are always put.
struct UploadJob {
    key: String,
    path: PathBuf,
    probe: Option<crate::digest::Digest>,
}
