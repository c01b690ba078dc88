//! Style preprocessing: expand style sources into the compiled mirror and
//! compute the newest input time of the whole style tree.
//!
//! Style sheets import each other, so the staleness of a style bundle depends
//! on every file it transitively imports. Rather than parse imports, the
//! preprocessor folds one timestamp over the entire `css/` tree and every
//! style bundle is compared against it. That over-approximates each import
//! closure (a change anywhere rebuilds all style bundles) but is always
//! correct, including for import cycles.
//!
//! ## The walk
//!
//! Every file under `css/` except the `css/compiled/` subtree is visited in
//! name order. For a file `css/a/b.less` the compiled counterpart is
//! `css/compiled/a/b.less`:
//!
//! - counterpart missing, or its bytes differ from the expansion → written,
//!   contributes [`Stamp::Unbounded`] (forces every style bundle to rebuild);
//! - counterpart older than the source → written, contributes the source
//!   mtime;
//! - otherwise → left alone, contributes the source mtime.
//!
//! Every source is expanded on every pass. An `{% img %}` URL depends on the
//! image's digest when serving remotely, and on the serving mode itself, so a
//! changed image or a switch between local and remote URLs changes the
//! expansion without touching the source. Comparing bytes catches both.
//!
//! [`WalkMode::DryRun`] computes the same fold and the same stale list but
//! writes nothing.
//!
//! ## Expansion
//!
//! Sources are expanded over a tiny fixed environment, with no escaping:
//!
//! | Syntax | Meaning |
//! |---|---|
//! | `{% img "icons/star.png" %}` | URL of `img/icons/star.png` (local or remote) |
//! | `{# ... #}` | Comment, removed |
//!
//! Anything else that opens with `{%` or `{{`, and any unterminated `{%`,
//! `{{` or `{#`, makes the source malformed.

use crate::digest::DigestError;
use crate::layout::{self, StaticLayout};
use crate::naming::{self, UrlBase};
use crate::staleness::{self, Stamp};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum StyleError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("walking {0}: {1}")]
    Walk(PathBuf, #[source] walkdir::Error),
    #[error("{}:{line}: {message}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("{}: {source}", path.display())]
    Asset {
        path: PathBuf,
        #[source]
        source: DigestError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkMode {
    Write,
    DryRun,
}

/// Result of one walk over the style tree.
#[derive(Debug, Clone, Default)]
pub struct StylePass {
    /// Newest input time of the whole tree.
    pub latest: Stamp,
    /// Sources whose compiled counterpart was (or, in a dry run, would be)
    /// regenerated, relative to `css/`.
    pub stale: Vec<PathBuf>,
}

/// Walk the style tree, regenerating stale compiled counterparts.
///
/// A missing `css/` directory is an empty tree. The first malformed source
/// aborts the walk; counterparts written before it stay in place.
pub fn preprocess(
    layout: &StaticLayout,
    mode: WalkMode,
    urls: UrlBase<'_>,
) -> Result<StylePass, StyleError> {
    let style_dir = layout.style_dir();
    let compiled_dir = layout.compiled_style_dir();
    let mut pass = StylePass::default();
    if !style_dir.is_dir() {
        return Ok(pass);
    }

    let walker = WalkDir::new(&style_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.path() != compiled_dir);

    for entry in walker {
        let entry = entry.map_err(|e| StyleError::Walk(style_dir.clone(), e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let source = entry.path();
        let rel = source.strip_prefix(&style_dir).unwrap_or(source);
        let compiled = compiled_dir.join(rel);

        let source_mtime = entry
            .metadata()
            .map_err(|e| StyleError::Walk(source.to_path_buf(), e))?
            .modified()
            .map_err(|e| io_error(source, e))?;
        let compiled_mtime = staleness::modified(&compiled).map_err(|e| io_error(&compiled, e))?;

        let text = read_source(source)?;
        let expanded = expand(&text, urls).map_err(|e| e.at(source))?;
        let changed = match compiled_mtime {
            None => true,
            Some(_) => {
                let current = fs::read(&compiled).map_err(|e| io_error(&compiled, e))?;
                current != expanded.as_bytes()
            }
        };

        let contribution = if changed {
            Stamp::Unbounded
        } else {
            Stamp::At(source_mtime)
        };
        pass.latest = pass.latest.max(contribution);

        let stale = changed || compiled_mtime.is_some_and(|c| source_mtime > c);
        if !stale {
            continue;
        }
        debug!(source = %rel.display(), changed, "style source is stale");
        if mode == WalkMode::Write {
            layout::write_atomic(&compiled, expanded.as_bytes())
                .map_err(|e| io_error(&compiled, e))?;
        }
        pass.stale.push(rel.to_path_buf());
    }

    Ok(pass)
}

/// Delete the compiled mirror so the next walk regenerates every file.
pub fn clear_compiled(layout: &StaticLayout) -> Result<(), StyleError> {
    let dir = layout.compiled_style_dir();
    match fs::remove_dir_all(&dir) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(io_error(&dir, e)),
        _ => Ok(()),
    }
}

fn read_source(path: &Path) -> Result<String, StyleError> {
    let bytes = fs::read(path).map_err(|e| io_error(path, e))?;
    String::from_utf8(bytes).map_err(|_| StyleError::Malformed {
        path: path.to_path_buf(),
        line: 1,
        message: "not valid UTF-8".into(),
    })
}

fn io_error(path: &Path, source: io::Error) -> StyleError {
    StyleError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// An expansion failure not yet tied to a file.
#[derive(Debug)]
pub enum ExpandError {
    Syntax { line: usize, message: String },
    Asset(DigestError),
}

impl ExpandError {
    fn at(self, path: &Path) -> StyleError {
        match self {
            ExpandError::Syntax { line, message } => StyleError::Malformed {
                path: path.to_path_buf(),
                line,
                message,
            },
            ExpandError::Asset(source) => StyleError::Asset {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

/// Expand the tags in one style source.
pub fn expand(source: &str, urls: UrlBase<'_>) -> Result<String, ExpandError> {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(i) = rest.find('{') {
        out.push_str(&rest[..i]);
        let tail = &rest[i..];
        let offset = source.len() - tail.len();
        let syntax = |message: String| ExpandError::Syntax {
            line: line_of(source, offset),
            message,
        };

        let close = if tail.starts_with("{#") {
            "#}"
        } else if tail.starts_with("{%") {
            "%}"
        } else if tail.starts_with("{{") {
            return Err(syntax("expressions are not supported".into()));
        } else {
            out.push('{');
            rest = &tail[1..];
            continue;
        };

        let end = tail[2..]
            .find(close)
            .ok_or_else(|| syntax(format!("unterminated {}", &tail[..2])))?;
        let body = &tail[2..2 + end];
        rest = &tail[2 + end + close.len()..];

        if close == "%}" {
            let path = parse_img_tag(body.trim()).map_err(syntax)?;
            let url = naming::asset_url(urls, path).map_err(ExpandError::Asset)?;
            out.push_str(&url);
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// Parse `img "<path>"` and return the path.
fn parse_img_tag(body: &str) -> Result<&str, String> {
    let (name, arg) = body
        .split_once(char::is_whitespace)
        .unwrap_or((body, ""));
    if name != "img" {
        return Err(format!("unknown tag {name:?}"));
    }
    let arg = arg.trim();
    let quote = arg
        .chars()
        .next()
        .filter(|c| *c == '"' || *c == '\'')
        .ok_or_else(|| "img expects one quoted path".to_string())?;
    let inner = &arg[1..];
    match inner.find(quote) {
        Some(end) if end + 1 == inner.len() && end > 0 => Ok(&inner[..end]),
        _ => Err("img expects one quoted path".into()),
    }
}

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset].bytes().filter(|b| *b == b'\n').count() + 1
}
