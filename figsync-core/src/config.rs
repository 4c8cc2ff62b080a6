//! YAML configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.figsync/
//!   config.yaml            (mode 0600, created by `figsync init`)
//!   snapshots/
//!     <document_id>.json   (last published snapshot, see figsync-sync)
//! ```
//!
//! # API pattern
//!
//! Every function touching the filesystem has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tokens may be supplied through `FIGSYNC_DESIGN_TOKEN` and
//! `FIGSYNC_HOST_TOKEN`; the environment wins over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use crate::types::DocumentId;

pub const DESIGN_TOKEN_ENV: &str = "FIGSYNC_DESIGN_TOKEN";
pub const HOST_TOKEN_ENV: &str = "FIGSYNC_HOST_TOKEN";

// ---------------------------------------------------------------------------
// 1. Types
// ---------------------------------------------------------------------------

/// Design-tool API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignConfig {
    #[serde(default = "default_design_api")]
    pub api_base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self {
            api_base: default_design_api(),
            token: None,
        }
    }
}

/// Version-control host settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_host_api")]
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// One synchronized design document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentConfig {
    pub id: DocumentId,
    /// Repository-relative directory every generated path is placed under.
    #[serde(default = "default_target_prefix")]
    pub target_prefix: String,
    /// `None` means "use the host's default branch".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,
}

/// Whether concurrent runs for the same document wait for each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyPolicy {
    /// One in-flight run per document; later runs wait, then usually no-op.
    #[default]
    Serialize,
    /// No guard; concurrent runs may each publish their own branch.
    Race,
}

/// Publishing behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub branch_prefix: String,
    pub concurrency: ConcurrencyPolicy,
    pub retry: RetryPolicy,
    /// Per-request timeout for every upstream call.
    pub timeout_secs: u64,
    /// Upper bound on concurrently written blobs.
    pub blob_parallelism: usize,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            branch_prefix: "figsync".to_string(),
            concurrency: ConcurrencyPolicy::default(),
            retry: RetryPolicy::default(),
            timeout_secs: 30,
            blob_parallelism: 8,
        }
    }
}

impl PublishConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Root of `~/.figsync/config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub design: DesignConfig,
    pub host: HostConfig,
    #[serde(default)]
    pub documents: Vec<DocumentConfig>,
    #[serde(default)]
    pub publish: PublishConfig,
    /// Directory of `.tera` files overriding the embedded templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<PathBuf>,
}

impl Config {
    /// Minimal config targeting `owner/repo` with no documents.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            design: DesignConfig::default(),
            host: HostConfig {
                api_base: default_host_api(),
                owner: owner.into(),
                repo: repo.into(),
                token: None,
            },
            documents: Vec::new(),
            publish: PublishConfig::default(),
            templates_dir: None,
        }
    }

    /// Look up a configured document.
    pub fn document(&self, id: &DocumentId) -> Result<&DocumentConfig, ConfigError> {
        self.documents
            .iter()
            .find(|d| &d.id == id)
            .ok_or_else(|| ConfigError::UnknownDocument(id.clone()))
    }

    /// Design-tool token: `FIGSYNC_DESIGN_TOKEN`, else the file value.
    pub fn design_token(&self) -> Result<String, ConfigError> {
        resolve_token(self.design.token.as_deref(), DESIGN_TOKEN_ENV, "design")
    }

    /// Host token: `FIGSYNC_HOST_TOKEN`, else the file value.
    pub fn host_token(&self) -> Result<String, ConfigError> {
        resolve_token(self.host.token.as_deref(), HOST_TOKEN_ENV, "host")
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.owner.trim().is_empty() {
            return Err(invalid("host.owner", "must not be empty"));
        }
        if self.host.repo.trim().is_empty() {
            return Err(invalid("host.repo", "must not be empty"));
        }
        if self.publish.branch_prefix.trim_matches('/').is_empty() {
            return Err(invalid("publish.branch_prefix", "must not be empty"));
        }
        if self.publish.retry.max_attempts == 0 {
            return Err(invalid("publish.retry.max_attempts", "must be at least 1"));
        }
        if self.publish.blob_parallelism == 0 {
            return Err(invalid("publish.blob_parallelism", "must be at least 1"));
        }
        let mut seen = std::collections::BTreeSet::new();
        for doc in &self.documents {
            if !seen.insert(&doc.id) {
                return Err(invalid("documents", format!("duplicate id '{}'", doc.id)));
            }
        }
        Ok(())
    }
}

fn resolve_token(
    file_value: Option<&str>,
    env: &'static str,
    what: &'static str,
) -> Result<String, ConfigError> {
    if let Ok(value) = std::env::var(env) {
        if !value.trim().is_empty() {
            return Ok(value);
        }
    }
    file_value
        .filter(|v| !v.trim().is_empty())
        .map(str::to_owned)
        .ok_or(ConfigError::MissingToken { what, env })
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn default_design_api() -> String {
    "https://api.figma.com".to_string()
}

fn default_host_api() -> String {
    "https://api.github.com".to_string()
}

fn default_target_prefix() -> String {
    "generated/design".to_string()
}

// ---------------------------------------------------------------------------
// 2. Paths
// ---------------------------------------------------------------------------

/// `<home>/.figsync/`
pub fn figsync_root(home: &Path) -> PathBuf {
    home.join(".figsync")
}

/// `<home>/.figsync/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    figsync_root(home).join("config.yaml")
}

// ---------------------------------------------------------------------------
// 3. Load
// ---------------------------------------------------------------------------

/// Load and validate `<home>/.figsync/config.yaml`.
///
/// Returns `ConfigError::NotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Err(ConfigError::NotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    let config: Config =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?;
    config.validate()?;
    Ok(config)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 4. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the config.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &Config) -> Result<(), ConfigError> {
    let root = figsync_root(home);
    if !root.exists() {
        std::fs::create_dir_all(&root)?;
        set_dir_permissions(&root)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// 5. Init
// ---------------------------------------------------------------------------

/// Scaffold a config for `owner/repo`, optionally with one document.
///
/// Idempotent: if the file already exists, loads and returns it unchanged.
pub fn init_at(
    home: &Path,
    owner: &str,
    repo: &str,
    document: Option<DocumentConfig>,
) -> Result<Config, ConfigError> {
    if config_path_at(home).exists() {
        return load_at(home);
    }
    let mut config = Config::new(owner, repo);
    config.documents.extend(document);
    config.validate()?;
    save_at(home, &config)?;
    Ok(config)
}

/// `init_at` convenience wrapper.
pub fn init(
    owner: &str,
    repo: &str,
    document: Option<DocumentConfig>,
) -> Result<Config, ConfigError> {
    init_at(&home()?, owner, repo, document)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Home directory from `dirs::home_dir()`.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
