//! [`ClusterControl`] on top of the `kubectl` and `gcloud` binaries.

use anyhow::{Context, Result};
use std::process::{Child, Stdio};

use super::{
    parse_network_ranges, parse_pod_list, AttachedLogs, ClusterControl, ClusterRef, LogProcess,
    NetworkRanges, PodEntry,
};
use crate::process::Cmd;

const KUBECTL: &str = "kubectl";
const GCLOUD: &str = "gcloud";

#[derive(Debug, Clone, Default)]
pub struct CliCluster;

impl CliCluster {
    pub fn new() -> Self {
        Self
    }
}

impl ClusterControl for CliCluster {
    fn get_credentials(&self, cluster: ClusterRef<'_>) -> Result<()> {
        Cmd::new(GCLOUD)
            .args(["container", "clusters", "get-credentials", cluster.name])
            .args(["--zone", cluster.zone, "--project", cluster.project])
            .run()?;
        Ok(())
    }

    fn current_context(&self) -> Result<String> {
        let out = Cmd::new(KUBECTL)
            .args(["config", "current-context"])
            .stdout()?;
        Ok(out.replace("\r\n", "\n").trim().to_string())
    }

    fn cloud_account(&self) -> Result<String> {
        let out = Cmd::new(GCLOUD)
            .args(["config", "get-value", "account"])
            .stdout()?;
        // gcloud prints the account on the first line, hints after it.
        Ok(out
            .replace("\r\n", "\n")
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    fn network_ranges(&self, cluster: ClusterRef<'_>) -> Result<NetworkRanges> {
        let yaml = Cmd::new(GCLOUD)
            .args(["container", "clusters", "describe", cluster.name])
            .arg(format!("--zone={}", cluster.zone))
            .arg(format!("--project={}", cluster.project))
            .stdout()?;
        parse_network_ranges(&yaml)
    }

    fn apply(&self, source: &str) -> Result<()> {
        Cmd::new(KUBECTL).args(["apply", "-f", source]).run()?;
        Ok(())
    }

    fn pods_by_label(&self, selector: &str) -> Result<Vec<PodEntry>> {
        let json = Cmd::new(KUBECTL)
            .args(["get", "pods", "-l", selector, "-ojson"])
            .stdout()?;
        parse_pod_list(&json)
    }

    fn secret_json(&self, namespace: &str, name: &str) -> Result<String> {
        Cmd::new(KUBECTL)
            .args(["get", "secret", name, "-n", namespace, "-ojson"])
            .stdout()
    }

    fn service_domain(&self, namespace: &str, name: &str) -> Result<String> {
        let out = Cmd::new(KUBECTL)
            .args(["get", "ksvc", "-n", namespace, name])
            .arg("-ojsonpath={.status.domain}")
            .stdout()?;
        Ok(out.trim().to_string())
    }

    fn delete_deployment(&self, name: &str) -> Result<()> {
        Cmd::new(KUBECTL)
            .args(["delete", "deployment", name])
            .run()?;
        Ok(())
    }

    fn follow_logs(&self, pod: &str, container: &str) -> Result<AttachedLogs> {
        let cmd = Cmd::new(KUBECTL).args(["logs", pod, "-c", container, "-f"]);
        let mut child = cmd
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Could not get installer pod logs: spawning `{}`", cmd.display()))?;
        let primary = child.stdout.take().context("capturing log follower stdout")?;
        let diagnostic = child.stderr.take().context("capturing log follower stderr")?;
        Ok(AttachedLogs {
            primary: Box::new(primary),
            diagnostic: Box::new(diagnostic),
            process: Box::new(ChildProcess {
                child,
                display: cmd.display(),
            }),
        })
    }
}

struct ChildProcess {
    child: Child,
    display: String,
}

impl LogProcess for ChildProcess {
    fn wait(&mut self) -> Result<()> {
        let status = self
            .child
            .wait()
            .with_context(|| format!("waiting for `{}`", self.display))?;
        if !status.success() {
            anyhow::bail!("Could not get installer pod logs: `{}` exited with {}", self.display, status);
        }
        Ok(())
    }
}
