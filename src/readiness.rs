//! Waiting for the installer pod to start.

use anyhow::Result;
use tracing::{debug, info};

use crate::cluster::{ClusterControl, PodEntry};
use crate::retry::{poll_until, CancelFlag, Poll, RetryPolicy};

pub const INSTALLER_SELECTOR: &str = "app=installer";

pub fn first_running(pods: &[PodEntry]) -> Option<&PodEntry> {
    pods.iter().find(|pod| pod.phase == "Running")
}

/// Poll until a pod labelled `app=installer` is running and return its name.
///
/// Query failures are treated like "not running yet".
pub fn wait_for_installer_pod(
    cluster: &dyn ClusterControl,
    policy: &RetryPolicy,
    cancel: &CancelFlag,
) -> Result<String> {
    info!("Waiting for installer pod to be started ...");
    let name = poll_until("installer pod", policy, cancel, |attempt| {
        match cluster.pods_by_label(INSTALLER_SELECTOR) {
            Ok(pods) => match first_running(&pods) {
                Some(pod) => Poll::Ready(pod.name.clone()),
                None => {
                    debug!(attempt, pods = pods.len(), "installer pod not running yet");
                    Poll::Pending
                }
            },
            Err(err) => {
                debug!(attempt, err = %format!("{err:#}"), "pod query failed");
                Poll::Pending
            }
        }
    })?;
    info!(pod = %name, "installer pod started");
    Ok(name)
}
