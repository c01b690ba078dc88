//! Project configuration.
//!
//! Handles loading, validating, and merging `static-s3.toml`. Stock defaults
//! are serialized to a TOML table and the user's file is merged on top, so a
//! config file only needs the keys it changes.
//!
//! ## Config File Location
//!
//! ```text
//! project/
//! ├── static-s3.toml           # This file (optional)
//! └── static/                  # static_dir
//!     ├── bundles.toml         # manifest
//!     └── ...
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! static_dir = "static"       # Static root, relative to this file
//! manifest = "bundles.toml"   # Bundle manifest, relative to static_dir
//!
//! [compilers]
//! style = "less/bin/lessc"    # Relative to static_dir, or a name on PATH
//! template = "etc/bin/compiler"
//!
//! [remote]
//! enabled = false             # Serve from the object store
//! bucket = "my-assets"
//! endpoint = "https://my-assets.s3.amazonaws.com"   # Derived from bucket
//! public_url = "https://cdn.example.com"            # Defaults to endpoint
//! access_key_id = "..."       # Or AWS_ACCESS_KEY_ID
//! access_key_secret = "..."   # Or AWS_SECRET_ACCESS_KEY
//!
//! [deploy]
//! max_uploads = 8             # Parallel uploads (default 8, at most 32)
//! ```
//!
//! Credentials found in the environment override the file. Unknown keys are
//! rejected to catch typos early.

use crate::remote::signing::Credentials;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name, looked up in the project root.
pub const CONFIG_FILE: &str = "static-s3.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Project configuration loaded from `static-s3.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticConfig {
    /// Static root, relative to the project root.
    pub static_dir: String,
    /// Bundle manifest, relative to the static root.
    pub manifest: String,
    pub compilers: CompilersConfig,
    pub remote: RemoteConfig,
    pub deploy: DeployConfig,
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            static_dir: "static".to_string(),
            manifest: "bundles.toml".to_string(),
            compilers: CompilersConfig::default(),
            remote: RemoteConfig::default(),
            deploy: DeployConfig::default(),
        }
    }
}

impl StaticConfig {
    /// Validate values that deserialize fine but cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.static_dir.trim().is_empty() {
            return Err(ConfigError::Validation("static_dir must not be empty".into()));
        }
        if self.manifest.trim().is_empty() {
            return Err(ConfigError::Validation("manifest must not be empty".into()));
        }
        if self.compilers.style.trim().is_empty() || self.compilers.template.trim().is_empty() {
            return Err(ConfigError::Validation(
                "compilers.style and compilers.template must not be empty".into(),
            ));
        }
        if self.deploy.max_uploads == Some(0) {
            return Err(ConfigError::Validation(
                "deploy.max_uploads must be at least 1".into(),
            ));
        }
        if self.remote.enabled && self.remote.bucket().is_none() {
            return Err(ConfigError::Validation(
                "remote.enabled requires remote.bucket".into(),
            ));
        }
        Ok(())
    }

    /// Apply credential overrides from the environment.
    ///
    /// `lookup` is `std::env::var(..).ok()` in production; tests pass a map.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
        if let Some(id) = get("AWS_ACCESS_KEY_ID") {
            self.remote.access_key_id = Some(id);
        }
        if let Some(secret) =
            get("AWS_ACCESS_KEY_SECRET").or_else(|| get("AWS_SECRET_ACCESS_KEY"))
        {
            self.remote.access_key_secret = Some(secret);
        }
        self
    }

    pub fn static_root(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.static_dir)
    }

    pub fn manifest_path(&self, project_root: &Path) -> PathBuf {
        self.static_root(project_root).join(&self.manifest)
    }
}

/// External compiler command lines.
///
/// The first word is the program: resolved against the static root when it
/// contains a path separator, looked up on `PATH` otherwise. Remaining words
/// are passed before the source path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilersConfig {
    pub style: String,
    pub template: String,
}

impl Default for CompilersConfig {
    fn default() -> Self {
        Self {
            style: "less/bin/lessc".to_string(),
            template: "etc/bin/compiler".to_string(),
        }
    }
}

/// Object store settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
    /// When true, pages and style sheets reference the object store, and
    /// `deploy` is allowed.
    pub enabled: bool,
    pub bucket: Option<String>,
    pub endpoint: Option<String>,
    pub public_url: Option<String>,
    pub access_key_id: Option<String>,
    pub access_key_secret: Option<String>,
}

impl RemoteConfig {
    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref().filter(|b| !b.is_empty())
    }

    /// Where requests go. Defaults to the bucket's virtual-host endpoint.
    pub fn endpoint(&self) -> Option<String> {
        match &self.endpoint {
            Some(e) if !e.is_empty() => Some(e.clone()),
            _ => self.bucket().map(|b| format!("https://{b}.s3.amazonaws.com")),
        }
    }

    /// Base of the URLs pages use. Defaults to the endpoint.
    pub fn public_url(&self) -> Option<String> {
        match &self.public_url {
            Some(u) if !u.is_empty() => Some(u.clone()),
            _ => self.endpoint(),
        }
    }

    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
        match (
            non_empty(&self.access_key_id),
            non_empty(&self.access_key_secret),
        ) {
            (Some(access_key_id), Some(secret)) => Ok(Credentials {
                access_key_id,
                secret,
            }),
            _ => Err(ConfigError::Validation(
                "deploy needs remote.access_key_id and remote.access_key_secret \
                 (or AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY)"
                    .into(),
            )),
        }
    }
}

/// Deploy settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeployConfig {
    /// Maximum number of requests in flight at once.
    /// When absent, [`DEFAULT_UPLOADS`]; never more than [`MAX_UPLOADS`].
    pub max_uploads: Option<usize>,
}

/// Uploads in flight when `deploy.max_uploads` is not set.
pub const DEFAULT_UPLOADS: usize = 8;

/// Upper bound on `deploy.max_uploads`, independent of the core count.
pub const MAX_UPLOADS: usize = 32;

/// Resolve the effective upload concurrency from config.
///
/// - `None` → [`DEFAULT_UPLOADS`]
/// - `Some(n)` → `min(n, MAX_UPLOADS)`
pub fn effective_uploads(config: &DeployConfig) -> usize {
    config
        .max_uploads
        .unwrap_or(DEFAULT_UPLOADS)
        .min(MAX_UPLOADS)
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(StaticConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<StaticConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: StaticConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from a file path. A missing file yields the defaults.
pub fn load_config_file(path: &Path) -> Result<StaticConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Load `static-s3.toml` from the given project root.
pub fn load_config(root: &Path) -> Result<StaticConfig, ConfigError> {
    load_config_file(&root.join(CONFIG_FILE))
}

/// Returns a fully-commented stock `static-s3.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# static-s3 Configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# Static root, relative to this file.
static_dir = "static"

# Bundle manifest, relative to static_dir. A .json file is read as JSON,
# anything else as TOML.
manifest = "bundles.toml"

# ---------------------------------------------------------------------------
# External compilers
# ---------------------------------------------------------------------------
# Each compiler is run once per source with the source path as its last
# argument, and must print the compiled output on stdout.
# A program containing "/" is relative to static_dir; a bare name is looked
# up on PATH. Extra words are passed as leading arguments.
[compilers]
# Runs in css/compiled/.
style = "less/bin/lessc"
# Runs in js/templates/.
template = "etc/bin/compiler"

# ---------------------------------------------------------------------------
# Object store
# ---------------------------------------------------------------------------
[remote]
# Serve bundles and images from the object store. When false, URLs point at
# /static/ and deploy refuses to run.
enabled = false

# bucket = "my-assets"

# Request endpoint. Defaults to https://<bucket>.s3.amazonaws.com
# endpoint = "https://my-assets.s3.amazonaws.com"

# Base of the URLs written into pages and style sheets. Defaults to endpoint.
# public_url = "https://cdn.example.com"

# Upload credentials. AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY (or
# AWS_ACCESS_KEY_SECRET) in the environment take precedence.
# access_key_id = ""
# access_key_secret = ""

# ---------------------------------------------------------------------------
# Deploy
# ---------------------------------------------------------------------------
[deploy]
# Maximum parallel uploads. Defaults to 8; values above 32 are clamped down.
# max_uploads = 8
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = StaticConfig::default();
        assert_eq!(config.static_dir, "static");
        assert_eq!(config.manifest, "bundles.toml");
        assert_eq!(config.compilers.style, "less/bin/lessc");
        assert_eq!(config.compilers.template, "etc/bin/compiler");
        assert!(!config.remote.enabled);
        assert_eq!(config.deploy.max_uploads, None);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[remote]
bucket = "assets"
"#;
        let config: StaticConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.remote.bucket(), Some("assets"));
        // Defaults preserved
        assert!(!config.remote.enabled);
        assert_eq!(config.static_dir, "static");
    }

    #[test]
    fn unknown_keys_rejected() {
        let result: Result<StaticConfig, _> = toml::from_str("[remote]\nbukket = \"x\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn paths_resolve_against_project_root() {
        let config = StaticConfig::default();
        let root = Path::new("/srv/site");
        assert_eq!(config.static_root(root), PathBuf::from("/srv/site/static"));
        assert_eq!(
            config.manifest_path(root),
            PathBuf::from("/srv/site/static/bundles.toml")
        );
    }

    // =========================================================================
    // Remote settings
    // =========================================================================

    #[test]
    fn endpoint_and_public_url_default_from_bucket() {
        let remote = RemoteConfig {
            bucket: Some("assets".into()),
            ..Default::default()
        };
        assert_eq!(
            remote.endpoint().as_deref(),
            Some("https://assets.s3.amazonaws.com")
        );
        assert_eq!(
            remote.public_url().as_deref(),
            Some("https://assets.s3.amazonaws.com")
        );
    }

    #[test]
    fn explicit_public_url_wins() {
        let remote = RemoteConfig {
            bucket: Some("assets".into()),
            endpoint: Some("http://localhost:9000/assets".into()),
            public_url: Some("https://cdn.example.com".into()),
            ..Default::default()
        };
        assert_eq!(
            remote.endpoint().as_deref(),
            Some("http://localhost:9000/assets")
        );
        assert_eq!(
            remote.public_url().as_deref(),
            Some("https://cdn.example.com")
        );
    }

    #[test]
    fn no_bucket_no_endpoint() {
        assert_eq!(RemoteConfig::default().endpoint(), None);
        assert_eq!(RemoteConfig::default().public_url(), None);
    }

    #[test]
    fn credentials_require_both_halves() {
        let mut remote = RemoteConfig {
            access_key_id: Some("AKID".into()),
            ..Default::default()
        };
        assert!(matches!(
            remote.credentials(),
            Err(ConfigError::Validation(_))
        ));

        remote.access_key_secret = Some("s3cr3t".into());
        let creds = remote.credentials().unwrap();
        assert_eq!(creds.access_key_id, "AKID");
        assert_eq!(creds.secret, "s3cr3t");
    }

    #[test]
    fn environment_overrides_file_credentials() {
        let env: HashMap<&str, &str> = [
            ("AWS_ACCESS_KEY_ID", "ENVID"),
            ("AWS_SECRET_ACCESS_KEY", "envsecret"),
        ]
        .into_iter()
        .collect();
        let mut config = StaticConfig::default();
        config.remote.access_key_id = Some("FILEID".into());

        let config = config.with_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.remote.access_key_id.as_deref(), Some("ENVID"));
        assert_eq!(config.remote.access_key_secret.as_deref(), Some("envsecret"));
    }

    #[test]
    fn legacy_secret_variable_takes_precedence() {
        let env: HashMap<&str, &str> = [
            ("AWS_ACCESS_KEY_SECRET", "legacy"),
            ("AWS_SECRET_ACCESS_KEY", "standard"),
        ]
        .into_iter()
        .collect();
        let config = StaticConfig::default().with_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.remote.access_key_secret.as_deref(), Some("legacy"));
    }

    #[test]
    fn empty_environment_values_are_ignored() {
        let mut config = StaticConfig::default();
        config.remote.access_key_id = Some("FILEID".into());
        let config = config.with_env(|_| Some(String::new()));
        assert_eq!(config.remote.access_key_id.as_deref(), Some("FILEID"));
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn enabled_remote_requires_bucket() {
        let mut config = StaticConfig::default();
        config.remote.enabled = true;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        config.remote.bucket = Some("assets".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_uploads_rejected() {
        let mut config = StaticConfig::default();
        config.deploy.max_uploads = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn empty_compiler_rejected() {
        let mut config = StaticConfig::default();
        config.compilers.style = "  ".into();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn effective_uploads_is_bounded_independently_of_cores() {
        let uploads = |max_uploads| effective_uploads(&DeployConfig { max_uploads });
        assert_eq!(uploads(None), DEFAULT_UPLOADS);
        assert_eq!(uploads(Some(1)), 1);
        assert_eq!(uploads(Some(20)), 20);
        assert_eq!(uploads(Some(1_000)), MAX_UPLOADS);
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config, StaticConfig::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
static_dir = "public/static"

[remote]
enabled = true
bucket = "assets"

[deploy]
max_uploads = 4
"#,
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.static_dir, "public/static");
        assert!(config.remote.enabled);
        assert_eq!(config.deploy.max_uploads, Some(4));
        // Unspecified values should be defaults
        assert_eq!(config.manifest, "bundles.toml");
        assert_eq!(config.compilers.style, "less/bin/lessc");
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE), "this is not valid toml [[[").unwrap();

        let result = load_config(tmp.path());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_validates() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE), "[remote]\nenabled = true\n").unwrap();

        let result = load_config(tmp.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_overlay_replaces_leaves_and_keeps_siblings() {
        let base = stock_defaults_value();
        let overlay: toml::Value = toml::from_str("[compilers]\nstyle = \"lessc\"\n").unwrap();
        let merged = merge_toml(base, overlay);

        let compilers = merged.get("compilers").unwrap();
        assert_eq!(compilers.get("style").unwrap().as_str(), Some("lessc"));
        assert_eq!(
            compilers.get("template").unwrap().as_str(),
            Some("etc/bin/compiler")
        );
    }

    #[test]
    fn resolve_config_with_no_overlay() {
        let config = resolve_config(stock_defaults_value(), None).unwrap();
        assert_eq!(config, StaticConfig::default());
    }

    // =========================================================================
    // stock_config_toml tests
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: StaticConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, StaticConfig::default());
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        assert!(content.contains("[compilers]"));
        assert!(content.contains("[remote]"));
        assert!(content.contains("[deploy]"));
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value();
        assert!(val.is_table());
        assert!(val.get("compilers").is_some());
        assert!(val.get("remote").is_some());
        assert!(val.get("deploy").is_some());
    }
}
