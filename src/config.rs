//! Installer configuration.
//!
//! Values come from built-in defaults, optionally overlaid by a TOML file
//! (`<keptn dir>/install.toml` or an explicit `--config` path), then by
//! command-line flags in the binary.
//!
//! ```toml
//! installer_version = "0.2.1"
//! substitution = "literal"
//! routable_suffixes = ["xip.io", "nip.io"]
//!
//! [readiness]
//! interval_secs = 5
//! max_attempts = 0   # unbounded
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::manifest::SubstitutionMode;
use crate::retry::RetryPolicy;

pub const DEFAULT_INSTALLER_URL_PREFIX: &str = "https://raw.githubusercontent.com/keptn/installer/";
pub const DEFAULT_INSTALLER_VERSION: &str = "master";
pub const CONFIG_FILENAME: &str = "install.toml";
const KEPTN_DIR_NAME: &str = ".keptn";

#[derive(Debug, Clone)]
pub struct InstallerConfig {
    pub installer_version: String,
    pub installer_url_prefix: String,
    pub keptn_dir: PathBuf,
    pub substitution: SubstitutionMode,
    pub routable_suffixes: Vec<String>,
    pub readiness: RetryPolicy,
    pub endpoint: RetryPolicy,
    /// Consecutive failed endpoint polls between two "still waiting" notices.
    pub notice_every: u32,
}

impl InstallerConfig {
    /// Defaults rooted at the given keptn directory.
    pub fn with_keptn_dir(keptn_dir: PathBuf) -> Self {
        Self {
            installer_version: DEFAULT_INSTALLER_VERSION.to_string(),
            installer_url_prefix: DEFAULT_INSTALLER_URL_PREFIX.to_string(),
            keptn_dir,
            substitution: SubstitutionMode::Structural,
            routable_suffixes: vec!["xip.io".to_string()],
            readiness: RetryPolicy::fixed(Duration::from_secs(5), 360),
            endpoint: RetryPolicy::fixed(Duration::from_secs(5), 360),
            notice_every: 15,
        }
    }

    /// Load defaults and overlay `path` if it exists.
    ///
    /// A missing file is not an error; a malformed one is.
    pub fn load(keptn_dir: PathBuf, path: Option<&Path>) -> Result<Self> {
        let mut config = Self::with_keptn_dir(keptn_dir);
        let candidate = match path {
            Some(explicit) => {
                if !explicit.is_file() {
                    bail!("installer config '{}' not found", explicit.display());
                }
                explicit.to_path_buf()
            }
            None => config.keptn_dir.join(CONFIG_FILENAME),
        };
        if !candidate.is_file() {
            return Ok(config);
        }

        let raw = fs::read_to_string(&candidate)
            .with_context(|| format!("reading installer config '{}'", candidate.display()))?;
        let parsed: InstallerToml = toml::from_str(&raw)
            .with_context(|| format!("parsing installer config '{}'", candidate.display()))?;
        config
            .apply(parsed)
            .with_context(|| format!("validating installer config '{}'", candidate.display()))?;
        Ok(config)
    }

    fn apply(&mut self, file: InstallerToml) -> Result<()> {
        if let Some(version) = file.installer_version {
            self.installer_version = version;
        }
        if let Some(prefix) = file.installer_url_prefix {
            self.installer_url_prefix = prefix;
        }
        if let Some(dir) = file.keptn_dir {
            self.keptn_dir = dir;
        }
        if let Some(mode) = file.substitution {
            self.substitution = match mode.trim().to_ascii_lowercase().as_str() {
                "structural" => SubstitutionMode::Structural,
                "literal" => SubstitutionMode::Literal,
                other => bail!(
                    "unsupported substitution '{}' (expected 'structural' or 'literal')",
                    other
                ),
            };
        }
        if let Some(suffixes) = file.routable_suffixes {
            let suffixes: Vec<String> = suffixes
                .into_iter()
                .map(|s| s.trim().trim_start_matches('.').to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if suffixes.is_empty() {
                bail!("routable_suffixes must name at least one domain suffix");
            }
            self.routable_suffixes = suffixes;
        }
        if let Some(retry) = file.readiness {
            self.readiness = retry.overlay(&self.readiness)?;
        }
        if let Some(retry) = file.endpoint {
            self.endpoint = retry.overlay(&self.endpoint)?;
        }
        if let Some(every) = file.notice_every {
            if every == 0 {
                bail!("notice_every must be at least 1");
            }
            self.notice_every = every;
        }
        Ok(())
    }

    pub fn installer_url(&self) -> String {
        format!(
            "{}{}/manifests/installer/installer.yaml",
            self.installer_url_prefix, self.installer_version
        )
    }

    pub fn rbac_url(&self) -> String {
        format!(
            "{}{}/manifests/installer/rbac.yaml",
            self.installer_url_prefix, self.installer_version
        )
    }

    pub fn installer_manifest_path(&self) -> PathBuf {
        self.keptn_dir.join("installer.yaml")
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.keptn_dir.join(".install-creds")
    }

    pub fn primary_log_path(&self) -> PathBuf {
        self.keptn_dir.join("keptn-installer.log")
    }

    pub fn diagnostic_log_path(&self) -> PathBuf {
        self.keptn_dir.join("keptn-installer-err.log")
    }

    pub fn client_config_path(&self) -> PathBuf {
        self.keptn_dir.join("cli-config.json")
    }
}

/// `~/.keptn`, the default home for every local artifact.
pub fn default_keptn_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    Ok(home.join(KEPTN_DIR_NAME))
}

/// Create the keptn directory if needed.
pub fn ensure_keptn_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("creating keptn directory '{}'", dir.display()))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InstallerToml {
    installer_version: Option<String>,
    installer_url_prefix: Option<String>,
    keptn_dir: Option<PathBuf>,
    substitution: Option<String>,
    routable_suffixes: Option<Vec<String>>,
    readiness: Option<RetryToml>,
    endpoint: Option<RetryToml>,
    notice_every: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RetryToml {
    interval_secs: Option<u64>,
    max_attempts: Option<u32>,
    backoff_multiplier: Option<f64>,
    max_interval_secs: Option<u64>,
}

/// Upper bound for any configured retry delay.
const MAX_RETRY_INTERVAL_SECS: u64 = 24 * 60 * 60;

fn retry_interval(key: &str, secs: u64) -> Result<Duration> {
    if secs > MAX_RETRY_INTERVAL_SECS {
        bail!("{} must be at most {} seconds, got {}", key, MAX_RETRY_INTERVAL_SECS, secs);
    }
    Ok(Duration::from_secs(secs))
}

impl RetryToml {
    fn overlay(self, base: &RetryPolicy) -> Result<RetryPolicy> {
        let mut policy = base.clone();
        if let Some(secs) = self.interval_secs {
            policy.interval = retry_interval("interval_secs", secs)?;
        }
        if let Some(attempts) = self.max_attempts {
            policy.max_attempts = (attempts > 0).then_some(attempts);
        }
        if let Some(multiplier) = self.backoff_multiplier {
            if !(multiplier >= 1.0 && multiplier.is_finite()) {
                bail!("backoff_multiplier must be a finite number >= 1.0, got {}", multiplier);
            }
            policy.backoff_multiplier = multiplier;
        }
        if let Some(secs) = self.max_interval_secs {
            policy.max_interval = retry_interval("max_interval_secs", secs)?;
        }
        if policy.max_interval < policy.interval {
            policy.max_interval = policy.interval;
        }
        Ok(policy)
    }
}
