//! Digest-qualified object names and the URLs that point at them.
//!
//! Remote names embed the content digest, so a name always maps to exactly
//! one version of a file. These names end up in page URLs that browsers and
//! caches keep around, which makes the scheme a durable contract:
//!
//! | Object | Remote key |
//! |---|---|
//! | Script bundle `main` | `script/main_<digest>.js` |
//! | Style bundle `site` | `style/site_<digest>.css` |
//! | Image `img/icons/star.png` | `img/icons/star_<digest>.png` |
//!
//! Image names split on the *last* dot (`archive.tar.gz` →
//! `archive.tar_<digest>.gz`); dot-files and extensionless files get the
//! digest appended (`.htaccess` → `.htaccess_<digest>`).
//!
//! When assets are served locally rather than from the store, URLs point at
//! the uncompiled-path layout under `/static/` instead.

use crate::digest::{Digest, DigestError, DigestMap};
use crate::manifest::BundleKind;

/// Key prefix (and local directory) for binary assets.
pub const ASSET_PREFIX: &str = "img";

/// URL prefix under which the static root is served locally.
pub const LOCAL_PREFIX: &str = "/static";

/// Split a file name into stem and extension (with its dot).
///
/// - `"star.png"` → `("star", ".png")`
/// - `"archive.tar.gz"` → `("archive.tar", ".gz")`
/// - `".htaccess"` → `(".htaccess", "")`
/// - `"LICENSE"` → `("LICENSE", "")`
pub fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(i) if !file_name[..i].chars().all(|c| c == '.') => file_name.split_at(i),
        _ => (file_name, ""),
    }
}

/// Remote key of a compiled bundle.
pub fn bundle_key(kind: BundleKind, name: &str, digest: &Digest) -> String {
    format!("{}/{}_{}.{}", kind.as_str(), name, digest, kind.extension())
}

/// Remote key of an image, given its `/`-separated path relative to `img/`.
pub fn asset_key(rel: &str, digest: &Digest) -> String {
    let (dir, file_name) = match rel.rfind('/') {
        Some(i) => (&rel[..i], &rel[i + 1..]),
        None => ("", rel),
    };
    let (stem, ext) = split_extension(file_name);
    if dir.is_empty() {
        format!("{ASSET_PREFIX}/{stem}_{digest}{ext}")
    } else {
        format!("{ASSET_PREFIX}/{dir}/{stem}_{digest}{ext}")
    }
}

/// Content type for an object, from its extension.
pub fn content_type(key: &str) -> &'static str {
    let (_, ext) = split_extension(key.rsplit('/').next().unwrap_or(key));
    match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "js" => "application/javascript",
        "css" => "text/css",
        "json" | "map" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "ico" => "image/vnd.microsoft.icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        _ => "application/octet-stream",
    }
}

/// Where page URLs point: the local static root, or the object store.
#[derive(Debug, Clone, Copy)]
pub enum UrlBase<'a> {
    Local,
    Remote {
        public_url: &'a str,
        digests: &'a DigestMap,
    },
}

/// URL of a compiled bundle as referenced from a page.
pub fn bundle_url(base: UrlBase<'_>, kind: BundleKind, name: &str) -> Result<String, DigestError> {
    match base {
        UrlBase::Local => Ok(format!(
            "{LOCAL_PREFIX}/bundles/{}/{}.{}",
            kind.as_str(),
            name,
            kind.extension()
        )),
        UrlBase::Remote {
            public_url,
            digests,
        } => {
            let digest = digests.bundle(kind, name)?;
            Ok(join_url(public_url, &bundle_key(kind, name, &digest)))
        }
    }
}

/// URL of an image (path relative to `img/`) as referenced from a page or
/// style sheet.
pub fn asset_url(base: UrlBase<'_>, rel: &str) -> Result<String, DigestError> {
    match base {
        UrlBase::Local => Ok(format!("{LOCAL_PREFIX}/{ASSET_PREFIX}/{rel}")),
        UrlBase::Remote {
            public_url,
            digests,
        } => {
            let digest = digests.asset(rel)?;
            Ok(join_url(public_url, &asset_key(rel, &digest)))
        }
    }
}

fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}
