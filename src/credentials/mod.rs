//! Operator credentials for an installation run.
//!
//! A [`CredentialRecord`] is an owned value: every acquisition step takes it
//! and hands back an updated copy. The on-disk key names match the cache
//! format older CLI releases wrote, so an existing cache keeps working.

pub mod acquire;
pub mod prompt;
pub mod store;

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::InstallError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CredentialRecord {
    pub github_personal_access_token: String,
    pub github_user_email: String,
    pub github_org: String,
    pub github_user_name: String,
    pub cluster_name: String,
    pub cluster_zone: String,
    pub gke_project: String,
}

/// One prompted field of the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    ClusterName,
    ClusterZone,
    GkeProject,
    GithubUserName,
    GithubUserEmail,
    GithubPersonalAccessToken,
    GithubOrg,
}

const NAME_PATTERN: &str = r"^(([a-z0-9]+-)*[a-z0-9]+)$";
const EMAIL_PATTERN: &str = r"^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,4}$";
const TOKEN_PATTERN: &str = r"^[a-z0-9]{40}$";

impl Field {
    /// Every field, in the order the non-interactive check reports them.
    pub const ALL: [Field; 7] = [
        Field::ClusterName,
        Field::ClusterZone,
        Field::GkeProject,
        Field::GithubUserName,
        Field::GithubUserEmail,
        Field::GithubPersonalAccessToken,
        Field::GithubOrg,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Field::ClusterName => "Cluster Name",
            Field::ClusterZone => "Cluster Zone",
            Field::GkeProject => "GKE Project",
            Field::GithubUserName => "GitHub User Name",
            Field::GithubUserEmail => "GitHub User Email",
            Field::GithubPersonalAccessToken => "GitHub Personal Access Token",
            Field::GithubOrg => "GitHub Organization",
        }
    }

    pub fn violation_message(self) -> String {
        format!("Please enter a valid {}.", self.label())
    }

    fn pattern(self) -> &'static Regex {
        static NAME: OnceLock<Regex> = OnceLock::new();
        static EMAIL: OnceLock<Regex> = OnceLock::new();
        static TOKEN: OnceLock<Regex> = OnceLock::new();
        // The patterns are constants; a compile failure is a programming error.
        match self {
            Field::GithubUserEmail => {
                EMAIL.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern"))
            }
            Field::GithubPersonalAccessToken => {
                TOKEN.get_or_init(|| Regex::new(TOKEN_PATTERN).expect("token pattern"))
            }
            _ => NAME.get_or_init(|| Regex::new(NAME_PATTERN).expect("name pattern")),
        }
    }

    pub fn is_valid(self, value: &str) -> bool {
        self.pattern().is_match(value)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl CredentialRecord {
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::ClusterName => &self.cluster_name,
            Field::ClusterZone => &self.cluster_zone,
            Field::GkeProject => &self.gke_project,
            Field::GithubUserName => &self.github_user_name,
            Field::GithubUserEmail => &self.github_user_email,
            Field::GithubPersonalAccessToken => &self.github_personal_access_token,
            Field::GithubOrg => &self.github_org,
        }
    }

    /// Return a copy with `field` replaced.
    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        let slot = match field {
            Field::ClusterName => &mut self.cluster_name,
            Field::ClusterZone => &mut self.cluster_zone,
            Field::GkeProject => &mut self.gke_project,
            Field::GithubUserName => &mut self.github_user_name,
            Field::GithubUserEmail => &mut self.github_user_email,
            Field::GithubPersonalAccessToken => &mut self.github_personal_access_token,
            Field::GithubOrg => &mut self.github_org,
        };
        *slot = value.into();
        self
    }

    pub fn missing_fields(&self) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|field| self.get(*field).is_empty())
            .collect()
    }

    pub fn has_cluster_identity(&self) -> bool {
        !self.cluster_name.is_empty() && !self.cluster_zone.is_empty() && !self.gke_project.is_empty()
    }

    /// Completeness and format check for records that were not typed in.
    pub fn validate(&self, origin: &str) -> Result<()> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            let names = missing
                .iter()
                .map(|f| f.label())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(InstallError::validation(format!(
                "Incomplete credential file {origin}: missing {names}"
            ))
            .into());
        }

        let malformed = Field::ALL
            .into_iter()
            .filter(|field| !field.is_valid(self.get(*field)))
            .map(|f| f.label())
            .collect::<Vec<_>>();
        if !malformed.is_empty() {
            return Err(InstallError::validation(format!(
                "Invalid values in credential file {origin}: {}",
                malformed.join(", ")
            ))
            .into());
        }
        Ok(())
    }

    /// Single-line compact JSON, the cache format.
    pub fn to_compact_json(&self) -> Result<String> {
        let json = serde_json::to_string(self).context("serializing credential record")?;
        Ok(json.replace("\r\n", "").replace('\n', ""))
    }

    /// Operator-facing summary shown before confirmation.
    pub fn summary(&self) -> String {
        Field::ALL
            .into_iter()
            .map(|field| format!("{}: {}", field.label(), self.get(field)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Read a credential file for non-interactive installs.
pub fn read_credential_file(path: &Path) -> Result<CredentialRecord> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading credential file '{}'", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("parsing credential file '{}'", path.display()))
}
