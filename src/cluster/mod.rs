//! Cluster and cloud control surface.
//!
//! The workflow never shells out directly; it talks to a [`ClusterControl`].
//! [`cli::CliCluster`] is the production implementation on top of `kubectl`
//! and `gcloud`.

pub mod cli;
pub mod connect;

use std::io::Read;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Cluster coordinates used for `get-credentials` and `describe`.
#[derive(Debug, Clone, Copy)]
pub struct ClusterRef<'a> {
    pub name: &'a str,
    pub zone: &'a str,
    pub project: &'a str,
}

/// Pod network ranges of the target cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRanges {
    pub cluster_ipv4_cidr: String,
    pub services_ipv4_cidr: String,
}

/// One entry of a pod listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodEntry {
    pub name: String,
    pub phase: String,
}

/// Handle for a running log-follow process.
pub trait LogProcess: Send {
    /// Join the process. Call only after both streams were drained.
    fn wait(&mut self) -> Result<()>;
}

/// Output of an attached log follower, split into its two streams.
pub struct AttachedLogs {
    pub primary: Box<dyn Read + Send>,
    pub diagnostic: Box<dyn Read + Send>,
    pub process: Box<dyn LogProcess>,
}

pub trait ClusterControl {
    /// `gcloud container clusters get-credentials`.
    fn get_credentials(&self, cluster: ClusterRef<'_>) -> Result<()>;

    /// Name of the active kube context.
    fn current_context(&self) -> Result<String>;

    /// Active cloud account.
    fn cloud_account(&self) -> Result<String>;

    fn network_ranges(&self, cluster: ClusterRef<'_>) -> Result<NetworkRanges>;

    /// `kubectl apply -f <source>`; `source` is a path or URL.
    fn apply(&self, source: &str) -> Result<()>;

    fn pods_by_label(&self, selector: &str) -> Result<Vec<PodEntry>>;

    /// Raw JSON of a secret object.
    fn secret_json(&self, namespace: &str, name: &str) -> Result<String>;

    /// Current `.status.domain` of a knative service.
    fn service_domain(&self, namespace: &str, name: &str) -> Result<String>;

    fn delete_deployment(&self, name: &str) -> Result<()>;

    fn follow_logs(&self, pod: &str, container: &str) -> Result<AttachedLogs>;
}

#[derive(Debug, Deserialize)]
struct PodListJson {
    #[serde(default)]
    items: Vec<PodJson>,
}

#[derive(Debug, Deserialize)]
struct PodJson {
    metadata: PodMetadataJson,
    #[serde(default)]
    status: Option<PodStatusJson>,
}

#[derive(Debug, Deserialize)]
struct PodMetadataJson {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PodStatusJson {
    #[serde(default)]
    phase: String,
}

/// Parse `kubectl get pods -ojson` output.
pub fn parse_pod_list(json: &str) -> Result<Vec<PodEntry>> {
    let list: PodListJson = serde_json::from_str(json).context("parsing pod list JSON")?;
    Ok(list
        .items
        .into_iter()
        .map(|pod| PodEntry {
            name: pod.metadata.name,
            phase: pod.status.map(|s| s.phase).unwrap_or_default(),
        })
        .collect())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterDescription {
    cluster_ipv4_cidr: Option<String>,
    services_ipv4_cidr: Option<String>,
}

/// Parse `gcloud container clusters describe` YAML output.
pub fn parse_network_ranges(yaml: &str) -> Result<NetworkRanges> {
    let description: ClusterDescription =
        serde_yaml::from_str(yaml).context("parsing cluster description")?;
    let cluster_ipv4_cidr = description
        .cluster_ipv4_cidr
        .filter(|s| !s.is_empty())
        .context("cluster description has no clusterIpv4Cidr")?;
    let services_ipv4_cidr = description
        .services_ipv4_cidr
        .filter(|s| !s.is_empty())
        .context("cluster description has no servicesIpv4Cidr")?;
    Ok(NetworkRanges {
        cluster_ipv4_cidr,
        services_ipv4_cidr,
    })
}
