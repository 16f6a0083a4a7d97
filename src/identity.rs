//! Source-control identity checks for the operator's access token.

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::time::Duration;

pub const GITHUB_API: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("keptn-install/", env!("CARGO_PKG_VERSION"));

/// Questions the installer asks the identity provider.
///
/// `Ok(false)` is a rejection the operator can fix; `Err` means the provider
/// could not answer at all.
pub trait IdentityProvider {
    fn token_has_repo_scope(&self, token: &str) -> Result<bool>;
    fn organization_exists(&self, token: &str, org: &str) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct GithubIdentity {
    client: Client,
    api_base: String,
}

impl GithubIdentity {
    pub fn new() -> Result<Self> {
        Self::with_api_base(GITHUB_API)
    }

    pub fn with_api_base(api_base: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .context("building GitHub API client")?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }
}

impl IdentityProvider for GithubIdentity {
    fn token_has_repo_scope(&self, token: &str) -> Result<bool> {
        let url = format!("{}/user", self.api_base);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("token {token}"))
            .send()
            .with_context(|| format!("querying token scopes at {url}"))?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(false);
        }
        if !response.status().is_success() {
            bail!("GitHub API {} returned {}", url, response.status());
        }
        let scopes = response
            .headers()
            .get("X-OAuth-Scopes")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        Ok(scopes_include_repo(scopes))
    }

    fn organization_exists(&self, token: &str, org: &str) -> Result<bool> {
        let url = format!("{}/orgs/{}", self.api_base, org);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("token {token}"))
            .send()
            .with_context(|| format!("looking up organization at {url}"))?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => bail!("GitHub API {} returned {}", url, status),
        }
    }
}

/// `X-OAuth-Scopes` is a comma separated list, e.g. `repo, read:org`.
pub fn scopes_include_repo(header: &str) -> bool {
    header.split(',').map(str::trim).any(|scope| scope == "repo")
}
