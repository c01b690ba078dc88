//! # static-s3
//!
//! Bundle, fingerprint and ship the static assets of a web application.
//!
//! A manifest names bundles (ordered groups of script or style sources). The
//! pipeline compiles each bundle into one artifact, rebuilding only what is
//! stale, and deploys artifacts and images to an S3-compatible store under
//! names that embed a digest of their content, so every URL can be cached
//! forever.
//!
//! # Architecture: Two Independent Operations
//!
//! ```text
//! compile   static/ sources  →  static/bundles/    (incremental, local only)
//! deploy    static/bundles/ + static/img/  →  object store   (never compiles)
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`manifest`] | The bundle manifest: kind → name → ordered source references |
//! | [`layout`] | Paths under the static root; atomic file replacement |
//! | [`staleness`] | Mtime comparisons and the [`staleness::Stamp`] fold |
//! | [`styles`] | Style preprocessing into the compiled mirror; the `{% img %}` tag |
//! | [`compilers`] | The [`compilers::CompileUnit`] seam and the subprocess compiler |
//! | [`compile`] | Builds one bundle artifact, cleaning up on failure |
//! | [`digest`] | MD5 content digests and the per-invocation [`digest::DigestMap`] |
//! | [`naming`] | Digest-qualified remote keys, public URLs, content types |
//! | [`remote`] | The sync protocol, the [`remote::ObjectStore`] seam, and S3 |
//! | [`pipeline`] | The compile/deploy façade, error classes, progress events |
//! | [`config`] | `static-s3.toml` loading, validation, and merging |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## One Timestamp for the Whole Style Tree
//!
//! Style sheets import each other, and a change to an imported file must
//! rebuild every bundle that (transitively) imports it. Instead of parsing
//! imports, [`styles::preprocess`] folds the newest modification time over
//! the entire style tree and every style bundle is compared against it. A
//! change anywhere rebuilds all style bundles; nothing stale is ever kept.
//!
//! ## Content-Addressed Remote Names
//!
//! `script/main_<md5>.js` can only ever hold one content. Bundles are
//! re-uploaded on every deploy (cheap, small), images are probed first and
//! skipped when the store's ETag matches. A mismatching ETag under a
//! digest-qualified name is reported, never overwritten.
//!
//! ## Subprocess Compilers
//!
//! Template and style compilers are external programs, configured as
//! command lines. The pipeline only sees them through
//! [`compilers::CompileUnit`], which is what the tests mock.

pub mod compile;
pub mod compilers;
pub mod config;
pub mod digest;
pub mod layout;
pub mod manifest;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod remote;
pub mod staleness;
pub mod styles;

#[cfg(test)]
pub(crate) mod test_helpers;
