//! Preflight checks run before anything touches the cluster.
//!
//! Order matters: the installer manifests are probed first, then the cloud
//! account, then the cluster client.

use anyhow::Result;
use tracing::debug;

use crate::cluster::ClusterControl;
use crate::config::InstallerConfig;
use crate::error::InstallError;
use crate::manifest::{check_availability, ManifestSource};

/// Host tools the installer shells out to, with where to get them.
pub const GCLOUD: (&str, &str) = ("gcloud", "https://cloud.google.com/sdk/install");
pub const KUBECTL: (&str, &str) = (
    "kubectl",
    "https://kubernetes.io/docs/tasks/tools/install-kubectl/",
);
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[GCLOUD, KUBECTL];

/// Check if a command exists on `PATH`.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Check that specific tools are available.
///
/// Each tuple is (command, install URL). All missing tools are reported at once.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<_> = tools.iter().filter(|(tool, _)| !command_exists(tool)).collect();
    if missing.is_empty() {
        return Ok(());
    }
    let msg = missing
        .iter()
        .map(|(tool, url)| format!("keptn requires '{tool}' but it is not available.\nPlease see {url}"))
        .collect::<Vec<_>>()
        .join("\n");
    Err(InstallError::precondition(msg).into())
}

/// The active gcloud account; its absence is a precondition failure.
pub fn check_gcloud_account(cluster: &dyn ClusterControl) -> Result<String> {
    match cluster.cloud_account() {
        Ok(account) if !account.is_empty() => {
            debug!(%account, "gcloud account configured");
            Ok(account)
        }
        Ok(_) => Err(InstallError::precondition(
            "Please configure your gcloud: no active account (gcloud config set account <account>)",
        )
        .into()),
        Err(err) => {
            Err(InstallError::precondition(format!("Please configure your gcloud: {err:#}")).into())
        }
    }
}

/// Run every preflight check. `tools` is normally [`REQUIRED_TOOLS`].
pub fn run_preflight(
    config: &InstallerConfig,
    source: &dyn ManifestSource,
    cluster: &dyn ClusterControl,
    tools: &[(&str, &str)],
) -> Result<()> {
    check_availability(source, &config.installer_url(), &config.rbac_url())?;

    let (gcloud, kubectl): (Vec<_>, Vec<_>) =
        tools.iter().copied().partition(|(tool, _)| *tool == GCLOUD.0);
    check_required_tools(&gcloud)?;
    check_gcloud_account(cluster)?;
    check_required_tools(&kubectl)?;
    Ok(())
}
