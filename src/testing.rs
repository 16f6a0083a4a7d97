//! In-memory stand-ins for the external surfaces, shared by unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;

use anyhow::{anyhow, bail, Result};
use base64::Engine;

use crate::client_config::ClientConfigurator;
use crate::cluster::{
    AttachedLogs, ClusterControl, ClusterRef, LogProcess, NetworkRanges, PodEntry,
};
use crate::identity::IdentityProvider;
use crate::manifest::ManifestSource;

pub const FAKE_API_TOKEN: &str = "secret-api-token";
pub const FAKE_DOMAIN: &str = "control.keptn.35.1.2.3.xip.io";

struct ClusterState {
    calls: Vec<String>,
    context: Option<String>,
    rejected: Vec<String>,
    account: String,
    ranges: Option<NetworkRanges>,
    apply_failures: Vec<(String, String)>,
    pods: VecDeque<Result<Vec<PodEntry>, String>>,
    secret: Option<String>,
    domains: VecDeque<String>,
    fallback_domain: String,
    primary_log: String,
    diagnostic_log: String,
    log_exit_ok: bool,
    delete_fails: bool,
}

/// Scriptable [`ClusterControl`] that records every call as a short string
/// such as `get-credentials c1` or `apply /tmp/x/installer.yaml`.
pub struct FakeCluster {
    state: RefCell<ClusterState>,
}

impl Default for FakeCluster {
    fn default() -> Self {
        let secret = format!(
            r#"{{"data":{{"keptn-api-token":"{}"}}}}"#,
            base64::engine::general_purpose::STANDARD.encode(FAKE_API_TOKEN)
        );
        Self {
            state: RefCell::new(ClusterState {
                calls: Vec::new(),
                context: None,
                rejected: Vec::new(),
                account: "ops@example.com".to_string(),
                ranges: Some(NetworkRanges {
                    cluster_ipv4_cidr: "10.8.0.0/14".to_string(),
                    services_ipv4_cidr: "10.11.240.0/20".to_string(),
                }),
                apply_failures: Vec::new(),
                pods: VecDeque::new(),
                secret: Some(secret),
                domains: VecDeque::new(),
                fallback_domain: FAKE_DOMAIN.to_string(),
                primary_log: "[keptn|info] [t] Installation of keptn complete.\n".to_string(),
                diagnostic_log: String::new(),
                log_exit_ok: true,
                delete_fails: false,
            }),
        }
    }
}

impl FakeCluster {
    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn calls_matching(&self, needle: &str) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|call| call.contains(needle))
            .count()
    }

    pub fn set_context(&self, context: &str) {
        self.state.borrow_mut().context = Some(context.to_string());
    }

    pub fn reject_credentials_for(&self, cluster_name: &str) {
        self.state.borrow_mut().rejected.push(cluster_name.to_string());
    }

    pub fn set_account(&self, account: &str) {
        self.state.borrow_mut().account = account.to_string();
    }

    pub fn clear_ranges(&self) {
        self.state.borrow_mut().ranges = None;
    }

    /// Fail every `apply` whose source contains `needle`.
    pub fn fail_apply(&self, needle: &str, message: &str) {
        self.state
            .borrow_mut()
            .apply_failures
            .push((needle.to_string(), message.to_string()));
    }

    /// Queue one pod listing; once the queue is empty a single running pod is reported.
    pub fn push_pods(&self, pods: &[(&str, &str)]) {
        let pods = pods
            .iter()
            .map(|(name, phase)| PodEntry {
                name: name.to_string(),
                phase: phase.to_string(),
            })
            .collect();
        self.state.borrow_mut().pods.push_back(Ok(pods));
    }

    pub fn push_pod_error(&self, message: &str) {
        self.state.borrow_mut().pods.push_back(Err(message.to_string()));
    }

    pub fn set_secret(&self, json: Option<&str>) {
        self.state.borrow_mut().secret = json.map(str::to_string);
    }

    pub fn push_domain(&self, domain: &str) {
        self.state.borrow_mut().domains.push_back(domain.to_string());
    }

    /// Domain reported once the queue is empty.
    pub fn set_fallback_domain(&self, domain: &str) {
        self.state.borrow_mut().fallback_domain = domain.to_string();
    }

    pub fn set_logs(&self, primary: &str, diagnostic: &str) {
        let mut state = self.state.borrow_mut();
        state.primary_log = primary.to_string();
        state.diagnostic_log = diagnostic.to_string();
    }

    pub fn fail_log_process(&self) {
        self.state.borrow_mut().log_exit_ok = false;
    }

    pub fn fail_delete(&self) {
        self.state.borrow_mut().delete_fails = true;
    }

    fn record(&self, call: String) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl ClusterControl for FakeCluster {
    fn get_credentials(&self, cluster: ClusterRef<'_>) -> Result<()> {
        self.record(format!("get-credentials {}", cluster.name));
        if self.state.borrow().rejected.iter().any(|n| n == cluster.name) {
            bail!("ERROR: (gcloud.container.clusters.get-credentials) NOT_FOUND: {}", cluster.name);
        }
        Ok(())
    }

    fn current_context(&self) -> Result<String> {
        self.record("current-context".to_string());
        self.state
            .borrow()
            .context
            .clone()
            .ok_or_else(|| anyhow!("error: current-context is not set"))
    }

    fn cloud_account(&self) -> Result<String> {
        self.record("cloud-account".to_string());
        Ok(self.state.borrow().account.clone())
    }

    fn network_ranges(&self, cluster: ClusterRef<'_>) -> Result<NetworkRanges> {
        self.record(format!("describe {}", cluster.name));
        self.state
            .borrow()
            .ranges
            .clone()
            .ok_or_else(|| anyhow!("cluster description has no clusterIpv4Cidr"))
    }

    fn apply(&self, source: &str) -> Result<()> {
        self.record(format!("apply {source}"));
        let state = self.state.borrow();
        if let Some((_, message)) = state
            .apply_failures
            .iter()
            .find(|(needle, _)| source.contains(needle.as_str()))
        {
            bail!("{}", message);
        }
        Ok(())
    }

    fn pods_by_label(&self, selector: &str) -> Result<Vec<PodEntry>> {
        self.record(format!("get-pods {selector}"));
        match self.state.borrow_mut().pods.pop_front() {
            Some(Ok(pods)) => Ok(pods),
            Some(Err(message)) => bail!("{}", message),
            None => Ok(vec![PodEntry {
                name: "installer-7d9f".to_string(),
                phase: "Running".to_string(),
            }]),
        }
    }

    fn secret_json(&self, namespace: &str, name: &str) -> Result<String> {
        self.record(format!("get-secret {namespace}/{name}"));
        self.state
            .borrow()
            .secret
            .clone()
            .ok_or_else(|| anyhow!("Error from server (NotFound): secrets \"{name}\" not found"))
    }

    fn service_domain(&self, namespace: &str, name: &str) -> Result<String> {
        self.record(format!("get-ksvc {namespace}/{name}"));
        let mut state = self.state.borrow_mut();
        match state.domains.pop_front() {
            Some(domain) => Ok(domain),
            None => Ok(state.fallback_domain.clone()),
        }
    }

    fn delete_deployment(&self, name: &str) -> Result<()> {
        self.record(format!("delete-deployment {name}"));
        if self.state.borrow().delete_fails {
            bail!("Error from server (NotFound): deployments.apps \"{name}\" not found");
        }
        Ok(())
    }

    fn follow_logs(&self, pod: &str, container: &str) -> Result<AttachedLogs> {
        self.record(format!("logs {pod} {container}"));
        let state = self.state.borrow();
        Ok(AttachedLogs {
            primary: Box::new(Cursor::new(state.primary_log.clone().into_bytes())),
            diagnostic: Box::new(Cursor::new(state.diagnostic_log.clone().into_bytes())),
            process: Box::new(FakeLogProcess {
                exit_ok: state.log_exit_ok,
            }),
        })
    }
}

struct FakeLogProcess {
    exit_ok: bool,
}

impl LogProcess for FakeLogProcess {
    fn wait(&mut self) -> Result<()> {
        if !self.exit_ok {
            bail!("Could not get installer pod logs: `kubectl logs` exited with exit status: 1");
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeIdentity {
    unreachable: bool,
    unscoped_tokens: Vec<String>,
    missing_orgs: Vec<String>,
}

impl FakeIdentity {
    pub fn accepting() -> Self {
        Self::default()
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn without_repo_scope(mut self, token: &str) -> Self {
        self.unscoped_tokens.push(token.to_string());
        self
    }

    pub fn without_org(mut self, org: &str) -> Self {
        self.missing_orgs.push(org.to_string());
        self
    }
}

impl IdentityProvider for FakeIdentity {
    fn token_has_repo_scope(&self, token: &str) -> Result<bool> {
        if self.unreachable {
            bail!("error sending request for url (https://api.github.com/user)");
        }
        Ok(!self.unscoped_tokens.iter().any(|t| t == token))
    }

    fn organization_exists(&self, _token: &str, org: &str) -> Result<bool> {
        if self.unreachable {
            bail!("error sending request for url (https://api.github.com/orgs/{org})");
        }
        Ok(!self.missing_orgs.iter().any(|o| o == org))
    }
}

/// Serves fixed documents by URL.
#[derive(Default)]
pub struct FakeManifestSource {
    documents: HashMap<String, String>,
}

impl FakeManifestSource {
    pub fn with(mut self, url: &str, body: &str) -> Self {
        self.documents.insert(url.to_string(), body.to_string());
        self
    }
}

impl ManifestSource for FakeManifestSource {
    fn exists(&self, url: &str) -> Result<bool> {
        Ok(self.documents.contains_key(url))
    }

    fn fetch(&self, url: &str) -> Result<String> {
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("GET {url} returned 404 Not Found"))
    }
}

#[derive(Default)]
pub struct FakeConfigurator {
    calls: RefCell<Vec<String>>,
    reject_auth: bool,
    reject_configure: bool,
}

impl FakeConfigurator {
    pub fn rejecting_auth() -> Self {
        Self {
            reject_auth: true,
            ..Self::default()
        }
    }

    pub fn rejecting_configure() -> Self {
        Self {
            reject_configure: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl ClientConfigurator for FakeConfigurator {
    fn authenticate(&self, endpoint: &str, token: &str) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("auth {endpoint} {token}"));
        if self.reject_auth {
            bail!("401 Unauthorized");
        }
        Ok(())
    }

    fn configure(&self, org: &str, user: &str, token: &str) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("configure {org} {user} {token}"));
        if self.reject_configure {
            bail!("configuration endpoint unavailable");
        }
        Ok(())
    }
}
