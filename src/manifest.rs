//! Installer manifest retrieval and placeholder substitution.
//!
//! The upstream installer manifest carries environment entries of the form
//! `value: GITHUB_ORGANIZATION`. Rendering replaces those placeholder scalars
//! with values resolved from the credential record and the target cluster.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_yaml::Value;
use tracing::{debug, info};

use crate::cluster::{ClusterControl, ClusterRef, NetworkRanges};
use crate::config::InstallerConfig;
use crate::credentials::CredentialRecord;
use crate::error::InstallError;
use crate::io::write_private;

/// How placeholders are replaced in the manifest text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstitutionMode {
    /// Parse every document and replace `value` scalars that equal a token.
    Structural,
    /// Plain text replacement of `value: <token>`.
    Literal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderBinding {
    pub token: &'static str,
    pub value: String,
}

/// Remote manifest access.
pub trait ManifestSource {
    /// `Ok(true)` only for a 200 response.
    fn exists(&self, url: &str) -> Result<bool>;
    fn fetch(&self, url: &str) -> Result<String>;
}

pub struct HttpManifestSource {
    client: Client,
}

impl HttpManifestSource {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("keptn-install/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .context("building manifest HTTP client")?;
        Ok(Self { client })
    }
}

impl ManifestSource for HttpManifestSource {
    fn exists(&self, url: &str) -> Result<bool> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("probing {url}"))?;
        Ok(response.status() == StatusCode::OK)
    }

    fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("downloading {url}"))?
            .error_for_status()
            .with_context(|| format!("downloading {url}"))?;
        response
            .text()
            .with_context(|| format!("reading response body of {url}"))
    }
}

/// Both installer manifests must be reachable before anything is mutated.
pub fn check_availability(source: &dyn ManifestSource, installer_url: &str, rbac_url: &str) -> Result<()> {
    let mut available = true;
    for url in [installer_url, rbac_url] {
        match source.exists(url) {
            Ok(true) => {}
            Ok(false) => available = false,
            Err(err) => {
                debug!(url, err = %format!("{err:#}"), "manifest probe failed");
                available = false;
            }
        }
    }
    if !available {
        return Err(InstallError::precondition(format!(
            "Installers not found under:\n{installer_url}\n{rbac_url}"
        ))
        .into());
    }
    Ok(())
}

pub fn bindings(
    record: &CredentialRecord,
    gcloud_user: &str,
    ranges: &NetworkRanges,
) -> Vec<PlaceholderBinding> {
    let bind = |token, value: &str| PlaceholderBinding {
        token,
        value: value.to_string(),
    };
    vec![
        bind("GITHUB_PERSONAL_ACCESS_TOKEN", &record.github_personal_access_token),
        bind("GITHUB_USER_EMAIL", &record.github_user_email),
        bind("GITHUB_USER_NAME", &record.github_user_name),
        bind("GITHUB_ORGANIZATION", &record.github_org),
        bind("GCLOUD_USER", gcloud_user),
        bind("CLUSTER_IPV4_CIDR", &ranges.cluster_ipv4_cidr),
        bind("SERVICES_IPV4_CIDR", &ranges.services_ipv4_cidr),
    ]
}

pub fn substitute_literal(text: &str, bindings: &[PlaceholderBinding]) -> String {
    bindings.iter().fold(text.to_string(), |acc, binding| {
        acc.replace(
            &format!("value: {}", binding.token),
            &format!("value: {}", binding.value),
        )
    })
}

pub fn substitute_structural(text: &str, bindings: &[PlaceholderBinding]) -> Result<String> {
    let mut rendered = Vec::new();
    for (index, doc) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let mut value = Value::deserialize(doc)
            .with_context(|| format!("parsing manifest document {}", index + 1))?;
        if value.is_null() {
            continue;
        }
        replace_placeholders(&mut value, bindings);
        rendered.push(
            serde_yaml::to_string(&value)
                .with_context(|| format!("serializing manifest document {}", index + 1))?,
        );
    }
    Ok(rendered.join("---\n"))
}

fn replace_placeholders(value: &mut Value, bindings: &[PlaceholderBinding]) {
    match value {
        Value::Mapping(map) => {
            for (key, entry) in map.iter_mut() {
                if key.as_str() == Some("value") {
                    if let Some(binding) = entry
                        .as_str()
                        .and_then(|s| bindings.iter().find(|b| b.token == s))
                    {
                        *entry = Value::String(binding.value.clone());
                        continue;
                    }
                }
                replace_placeholders(entry, bindings);
            }
        }
        Value::Sequence(items) => {
            for item in items {
                replace_placeholders(item, bindings);
            }
        }
        Value::Tagged(tagged) => replace_placeholders(&mut tagged.value, bindings),
        _ => {}
    }
}

pub fn render(mode: SubstitutionMode, text: &str, bindings: &[PlaceholderBinding]) -> Result<String> {
    match mode {
        SubstitutionMode::Structural => substitute_structural(text, bindings),
        SubstitutionMode::Literal => Ok(substitute_literal(text, bindings)),
    }
}

/// Download the installer manifest, render it for this cluster and write
/// the result to the installer artifact path.
pub fn prepare_manifest(
    config: &InstallerConfig,
    source: &dyn ManifestSource,
    cluster: &dyn ClusterControl,
    record: &CredentialRecord,
) -> Result<PathBuf> {
    let url = config.installer_url();
    let template = source
        .fetch(&url)
        .with_context(|| format!("downloading installer manifest from {url}"))?;

    let gcloud_user = cluster
        .cloud_account()
        .context("reading active gcloud account")?;
    let ranges = cluster
        .network_ranges(ClusterRef {
            name: &record.cluster_name,
            zone: &record.cluster_zone,
            project: &record.gke_project,
        })
        .with_context(|| format!("describing cluster {}", record.cluster_name))?;

    let bindings = bindings(record, &gcloud_user, &ranges);
    let rendered = render(config.substitution, &template, &bindings)?;

    let path = config.installer_manifest_path();
    write_private(&path, rendered.as_bytes(), "installer manifest")?;
    info!(path = %path.display(), mode = ?config.substitution, "installer manifest prepared");
    Ok(path)
}
