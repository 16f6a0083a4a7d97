//! Cluster authentication: context inference and the interactive connect loop.

use std::io::{BufRead, Write};

use anyhow::Result;
use tracing::{debug, info, warn};

use super::{ClusterControl, ClusterRef};
use crate::credentials::prompt::Prompter;
use crate::credentials::{CredentialRecord, Field};

const CONNECT_FAILED: &str =
    "Could not connect to cluster. Please verify that you have entered the correct information.";

/// Cluster identity inferred from a kube context name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferredCluster {
    pub name: String,
    pub zone: String,
    pub project: String,
}

/// Split a GKE context name (`gke_<project>_<zone>_<name>`).
///
/// Anything that does not follow that convention yields empty strings.
pub fn parse_gke_context(context: &str) -> InferredCluster {
    let context = context.trim();
    if !context.starts_with("gke") {
        return InferredCluster::default();
    }
    let parts: Vec<&str> = context.split('_').collect();
    if parts.len() < 4 {
        return InferredCluster::default();
    }
    InferredCluster {
        name: parts[3].to_string(),
        zone: parts[2].to_string(),
        project: parts[1].to_string(),
    }
}

/// Best-effort inference from the active kube context.
pub fn infer_cluster(cluster: &dyn ClusterControl) -> InferredCluster {
    match cluster.current_context() {
        Ok(context) => parse_gke_context(&context),
        Err(err) => {
            debug!(err = %format!("{err:#}"), "no current kube context to infer cluster from");
            InferredCluster::default()
        }
    }
}

/// Fetch cluster credentials for the record's identity. `false` on rejection.
pub fn authenticate(cluster: &dyn ClusterControl, record: &CredentialRecord) -> bool {
    let target = ClusterRef {
        name: &record.cluster_name,
        zone: &record.cluster_zone,
        project: &record.gke_project,
    };
    match cluster.get_credentials(target) {
        Ok(()) => {
            info!(cluster = %record.cluster_name, zone = %record.cluster_zone, "authenticated at cluster");
            true
        }
        Err(err) => {
            debug!(err = %format!("{err:#}"), "get-credentials failed");
            false
        }
    }
}

/// Prompt for the cluster identity until authentication succeeds.
pub fn connect_interactive<R: BufRead, W: Write>(
    cluster: &dyn ClusterControl,
    prompter: &mut Prompter<R, W>,
    record: CredentialRecord,
) -> Result<CredentialRecord> {
    let mut record = record;
    if !record.has_cluster_identity() {
        let inferred = infer_cluster(cluster);
        record = record
            .with(Field::ClusterName, inferred.name)
            .with(Field::ClusterZone, inferred.zone)
            .with(Field::GkeProject, inferred.project);
    }

    loop {
        record = prompter.read_field(record, Field::ClusterName)?;
        record = prompter.read_field(record, Field::ClusterZone)?;
        record = prompter.read_field(record, Field::GkeProject)?;
        if authenticate(cluster, &record) {
            return Ok(record);
        }
        warn!(cluster = %record.cluster_name, "cluster authentication failed");
        prompter.say(CONNECT_FAILED)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCluster;
    use std::io::Cursor;

    #[test]
    fn gke_context_is_split() {
        let inferred = parse_gke_context("gke_my-project_us-central1-a_keptn-cluster\n");
        assert_eq!(inferred.project, "my-project");
        assert_eq!(inferred.zone, "us-central1-a");
        assert_eq!(inferred.name, "keptn-cluster");
    }

    #[test]
    fn foreign_contexts_yield_empty_identity() {
        assert_eq!(parse_gke_context("minikube"), InferredCluster::default());
        assert_eq!(parse_gke_context("gke_only_three"), InferredCluster::default());
    }

    #[test]
    fn inferred_values_become_prompt_defaults() {
        let cluster = FakeCluster::default();
        cluster.set_context("gke_proj-1_europe-west1-b_c1");
        let mut prompter = Prompter::new(Cursor::new(b"\n\n\n".to_vec()), Vec::new());

        let record = connect_interactive(&cluster, &mut prompter, CredentialRecord::default()).unwrap();
        assert_eq!(record.cluster_name, "c1");
        assert_eq!(record.cluster_zone, "europe-west1-b");
        assert_eq!(record.gke_project, "proj-1");
        assert_eq!(cluster.calls_matching("get-credentials c1"), 1);
    }

    #[test]
    fn failed_authentication_repeats_the_cycle() {
        let cluster = FakeCluster::default();
        cluster.reject_credentials_for("wrong-cluster");
        let script = "wrong-cluster\nzone-a\nproj\nright-cluster\n\n\n";
        let mut prompter = Prompter::new(Cursor::new(script.as_bytes().to_vec()), Vec::new());

        let record = connect_interactive(&cluster, &mut prompter, CredentialRecord::default()).unwrap();
        assert_eq!(record.cluster_name, "right-cluster");
        assert_eq!(record.cluster_zone, "zone-a");

        let transcript = String::from_utf8(prompter.into_output()).unwrap();
        assert!(transcript.contains(CONNECT_FAILED));
        assert!(transcript.contains("Cluster Zone [zone-a]: "));
    }
}
