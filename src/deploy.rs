//! Applying the installer manifests to the cluster.

use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::cluster::ClusterControl;
use crate::error::InstallError;

/// Apply RBAC from `rbac_url`, then the rendered installer manifest.
///
/// Nothing is rolled back when the second apply fails.
pub fn deploy_installer(cluster: &dyn ClusterControl, rbac_url: &str, manifest: &Path) -> Result<()> {
    apply_or_abort(cluster, rbac_url, "Error while applying RBAC for installer pod")?;
    info!(source = rbac_url, "installer RBAC applied");

    let manifest = manifest.display().to_string();
    apply_or_abort(cluster, &manifest, "Error while deploying keptn installer pod")?;
    info!(source = %manifest, "installer pod deployed");
    Ok(())
}

fn apply_or_abort(cluster: &dyn ClusterControl, source: &str, context: &str) -> Result<()> {
    cluster.apply(source).map_err(|err| {
        InstallError::Mutation {
            context: context.to_string(),
            source_message: format!("{err:#}"),
        }
        .into()
    })
}
