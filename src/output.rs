//! CLI output formatting for compile, deploy and the reports.
//!
//! # Output Format
//!
//! ## Compile
//!
//! ```text
//! bundled script/main.js (1204 bytes)
//! styles: 2 sources preprocessed
//! fresh   style/site.css
//! Compiled 1 bundle, 1 fresh
//! ```
//!
//! ## Deploy
//!
//! ```text
//! uploaded script/main_0cc175b9c0f1b6a831c399e269772661.js (1204 bytes)
//! current  img/icons/star_92eb5ffee6ae2fec3ad71c777531578f.png
//! Deployed 1 object, 1 already current
//! ```
//!
//! ## Status
//!
//! ```text
//! Styles
//!     stale: parts/buttons.less
//! Bundles
//!     script/main.js: fresh
//!     style/site.css: stale
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>` or `String`)
//! for testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::digest::{DigestMap, DigestMode};
use crate::manifest::BundleKind;
use crate::pipeline::{CompileEvent, CompileReport, DeployEvent, DeployReport, StatusReport};

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

/// `script/main.js`: how a bundle is named on the command line.
fn bundle_label(kind: BundleKind, name: &str) -> String {
    format!("{}/{}.{}", kind, name, kind.extension())
}

// ============================================================================
// Compile
// ============================================================================

pub fn format_compile_event(event: &CompileEvent) -> Vec<String> {
    match event {
        CompileEvent::StylesPreprocessed { regenerated: 0 } => Vec::new(),
        CompileEvent::StylesPreprocessed { regenerated } => {
            vec![format!("styles: {} preprocessed", plural(*regenerated, "source"))]
        }
        CompileEvent::BundleBuilt { kind, name, bytes } => {
            vec![format!("bundled {} ({} bytes)", bundle_label(*kind, name), bytes)]
        }
        CompileEvent::BundleFresh { kind, name } => {
            vec![format!("fresh   {}", bundle_label(*kind, name))]
        }
    }
}

pub fn format_compile_summary(report: &CompileReport) -> String {
    format!(
        "Compiled {}, {} fresh",
        plural(report.built.len(), "bundle"),
        report.fresh.len()
    )
}

pub fn print_compile_summary(report: &CompileReport) {
    println!("{}", format_compile_summary(report));
}

// ============================================================================
// Deploy
// ============================================================================

pub fn format_deploy_event(event: &DeployEvent) -> Vec<String> {
    match event {
        DeployEvent::Uploaded { key, bytes } => vec![format!("uploaded {key} ({bytes} bytes)")],
        DeployEvent::AlreadyCurrent { key } => vec![format!("current  {key}")],
    }
}

pub fn format_deploy_summary(report: &DeployReport) -> String {
    format!(
        "Deployed {}, {} already current",
        plural(report.uploaded.len(), "object"),
        report.already_current.len()
    )
}

pub fn print_deploy_summary(report: &DeployReport) {
    println!("{}", format_deploy_summary(report));
}

// ============================================================================
// Reports
// ============================================================================

/// List every digest, bundles first (full mode only), then images.
///
/// ```text
/// Bundles
///     script/main.js  0cc175b9c0f1b6a831c399e269772661
/// Images
///     icons/star.png  92eb5ffee6ae2fec3ad71c777531578f
/// ```
pub fn format_digests(digests: &DigestMap) -> Vec<String> {
    let mut lines = Vec::new();
    if digests.mode() == DigestMode::Full {
        lines.push("Bundles".to_string());
        for (kind, name, digest) in digests.bundles() {
            lines.push(format!("{}{}  {}", indent(1), bundle_label(kind, name), digest));
        }
    }
    lines.push("Images".to_string());
    for (rel, digest) in digests.assets() {
        lines.push(format!("{}{}  {}", indent(1), rel, digest));
    }
    lines
}

pub fn print_digests(digests: &DigestMap) {
    for line in format_digests(digests) {
        println!("{}", line);
    }
}

pub fn format_status(status: &StatusReport) -> Vec<String> {
    let mut lines = vec!["Styles".to_string()];
    if status.stale_styles.is_empty() {
        lines.push(format!("{}up to date", indent(1)));
    }
    for path in &status.stale_styles {
        lines.push(format!("{}stale: {}", indent(1), path.display()));
    }

    lines.push("Bundles".to_string());
    for (kind, name, stale) in &status.bundles {
        let state = if *stale { "stale" } else { "fresh" };
        lines.push(format!("{}{}: {}", indent(1), bundle_label(*kind, name), state));
    }
    lines
}

pub fn print_status(status: &StatusReport) {
    for line in format_status(status) {
        println!("{}", line);
    }
}
