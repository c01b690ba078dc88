//! The bundle manifest: which source files make up which bundle.
//!
//! The manifest is a two-level mapping, bundle kind → bundle name → ordered
//! list of source references. It can be written in TOML:
//!
//! ```toml
//! [script]
//! main = ["vendor/jquery.js", "app.js", "templates/comment.hbs"]
//!
//! [style]
//! site = ["site.less"]
//! ```
//!
//! or as the equivalent JSON object. The legacy kind keys `js` and `css` are
//! accepted as aliases for `script` and `style`.
//!
//! ## Source references
//!
//! Script sources are paths relative to `js/`. A source of the form
//! `templates/<path>.hbs` is a client-side template: it is not concatenated
//! verbatim but fed to the template compiler, which runs inside
//! `js/templates/` and receives `<path>.hbs` as its argument.
//!
//! Style sources are paths relative to the compiled style mirror
//! (`css/compiled/`), which is where the style compiler runs.
//!
//! Bundles within a kind are processed in name order; scripts come before
//! styles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error reading manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown bundle {kind}/{name}")]
    UnknownBundle { kind: BundleKind, name: String },
    #[error("invalid bundle name {0:?}: names must be non-empty and contain no path separators")]
    InvalidName(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BundleKind {
    Script,
    Style,
}

impl BundleKind {
    pub const ALL: [BundleKind; 2] = [BundleKind::Script, BundleKind::Style];

    pub fn as_str(self) -> &'static str {
        match self {
            BundleKind::Script => "script",
            BundleKind::Style => "style",
        }
    }

    /// File extension of compiled artifacts of this kind.
    pub fn extension(self) -> &'static str {
        match self {
            BundleKind::Script => "js",
            BundleKind::Style => "css",
        }
    }
}

impl fmt::Display for BundleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const TEMPLATE_PREFIX: &str = "templates/";
const TEMPLATE_SUFFIX: &str = ".hbs";

/// One entry of a bundle's source list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceRef {
    /// Concatenated verbatim.
    Plain(String),
    /// Compiled by the template compiler. Holds the path relative to the
    /// template directory (the `templates/` prefix is stripped).
    Template(String),
}

impl SourceRef {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix(TEMPLATE_PREFIX) {
            Some(rel) if rel.ends_with(TEMPLATE_SUFFIX) => SourceRef::Template(rel.to_string()),
            _ => SourceRef::Plain(raw.to_string()),
        }
    }

    pub fn is_template(&self) -> bool {
        matches!(self, SourceRef::Template(_))
    }

    /// The reference as written in the manifest.
    pub fn raw(&self) -> String {
        match self {
            SourceRef::Plain(p) => p.clone(),
            SourceRef::Template(rel) => format!("{TEMPLATE_PREFIX}{rel}"),
        }
    }
}

impl From<String> for SourceRef {
    fn from(raw: String) -> Self {
        SourceRef::parse(&raw)
    }
}

impl From<SourceRef> for String {
    fn from(source: SourceRef) -> Self {
        source.raw()
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw())
    }
}

/// Bundle kind → bundle name → ordered sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BundleManifest {
    #[serde(default, alias = "js")]
    script: BTreeMap<String, Vec<SourceRef>>,
    #[serde(default, alias = "css")]
    style: BTreeMap<String, Vec<SourceRef>>,
}

impl BundleManifest {
    /// Load a manifest file. `.json` files are parsed as JSON, anything else
    /// as TOML.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ManifestError> {
        let manifest: Self = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ManifestError> {
        let manifest: Self = serde_json::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn kind_map(&self, kind: BundleKind) -> &BTreeMap<String, Vec<SourceRef>> {
        match kind {
            BundleKind::Script => &self.script,
            BundleKind::Style => &self.style,
        }
    }

    fn validate(&self) -> Result<(), ManifestError> {
        for kind in BundleKind::ALL {
            for name in self.kind_map(kind).keys() {
                if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
                    return Err(ManifestError::InvalidName(name.clone()));
                }
            }
        }
        Ok(())
    }

    /// Bundles of one kind, in name order.
    pub fn bundles(&self, kind: BundleKind) -> impl Iterator<Item = (&str, &[SourceRef])> {
        self.kind_map(kind)
            .iter()
            .map(|(name, sources)| (name.as_str(), sources.as_slice()))
    }

    /// Every bundle, scripts first.
    pub fn iter(&self) -> impl Iterator<Item = (BundleKind, &str, &[SourceRef])> {
        BundleKind::ALL
            .into_iter()
            .flat_map(move |kind| self.bundles(kind).map(move |(name, s)| (kind, name, s)))
    }

    pub fn sources(&self, kind: BundleKind, name: &str) -> Result<&[SourceRef], ManifestError> {
        self.kind_map(kind)
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| ManifestError::UnknownBundle {
                kind,
                name: name.to_string(),
            })
    }

    pub fn has_kind(&self, kind: BundleKind) -> bool {
        !self.kind_map(kind).is_empty()
    }

    pub fn len(&self) -> usize {
        self.script.len() + self.style.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
