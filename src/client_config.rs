//! Local keptn CLI configuration.
//!
//! After installation the CLI is pointed at the new control endpoint and
//! given the operator's source-control identity. [`ClientConfigurator`] is the
//! seam; [`LocalClientConfig`] persists the state as JSON in the keptn
//! directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;

use crate::io::write_private;

pub trait ClientConfigurator {
    fn authenticate(&self, endpoint: &str, api_token: &str) -> Result<()>;
    fn configure(&self, org: &str, user: &str, token: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientState {
    pub endpoint: String,
    pub api_token: String,
    pub authenticated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<GithubSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubSettings {
    pub org: String,
    pub user: String,
    pub token: String,
    pub configured_at: String,
}

#[derive(Debug, Clone)]
pub struct LocalClientConfig {
    path: PathBuf,
}

impl LocalClientConfig {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<ClientState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("reading client config '{}'", self.path.display()))?;
        let state = serde_json::from_str(&raw)
            .with_context(|| format!("parsing client config '{}'", self.path.display()))?;
        Ok(Some(state))
    }

    fn save(&self, state: &ClientState) -> Result<()> {
        let json = serde_json::to_string_pretty(state).context("serializing client config")?;
        write_private(&self.path, json.as_bytes(), "client config")?;
        debug!(path = %self.path.display(), "client config written");
        Ok(())
    }
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("formatting timestamp")
}

impl ClientConfigurator for LocalClientConfig {
    fn authenticate(&self, endpoint: &str, api_token: &str) -> Result<()> {
        if !endpoint.starts_with("https://") {
            bail!("endpoint must be an https URL, got '{}'", endpoint);
        }
        if api_token.is_empty() {
            bail!("API token is empty");
        }
        let state = ClientState {
            endpoint: endpoint.to_string(),
            api_token: api_token.to_string(),
            authenticated_at: now_rfc3339()?,
            github: None,
        };
        self.save(&state)
    }

    fn configure(&self, org: &str, user: &str, token: &str) -> Result<()> {
        let Some(mut state) = self.load()? else {
            bail!("keptn CLI is not authenticated; no endpoint in '{}'", self.path.display());
        };
        state.github = Some(GithubSettings {
            org: org.to_string(),
            user: user.to_string(),
            token: token.to_string(),
            configured_at: now_rfc3339()?,
        });
        self.save(&state)
    }
}
