//! The installation workflow.
//!
//! [`Installer::run`] drives the stages in order and records the current
//! [`Phase`]. Every stage talks to the outside world through the traits held
//! by the installer, so the whole run can be exercised against fakes.

use std::fmt;
use std::fs;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::bootstrap::bootstrap_client;
use crate::client_config::ClientConfigurator;
use crate::cluster::ClusterControl;
use crate::config::{ensure_keptn_dir, InstallerConfig};
use crate::credentials::acquire::{acquire_from_file, acquire_interactive};
use crate::credentials::prompt::Prompter;
use crate::credentials::store::CredentialStore;
use crate::credentials::CredentialRecord;
use crate::deploy::deploy_installer;
use crate::error::InstallError;
use crate::identity::IdentityProvider;
use crate::logs::capture_installer_logs;
use crate::manifest::{prepare_manifest, ManifestSource};
use crate::preflight::{run_preflight, REQUIRED_TOOLS};
use crate::readiness::wait_for_installer_pod;
use crate::retry::CancelFlag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    CredentialsReady,
    ClusterAuthenticated,
    ManifestPrepared,
    Deployed,
    PodRunning,
    LogsClassified,
    Configured,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::CredentialsReady => "credentials-ready",
            Phase::ClusterAuthenticated => "cluster-authenticated",
            Phase::ManifestPrepared => "manifest-prepared",
            Phase::Deployed => "deployed",
            Phase::PodRunning => "pod-running",
            Phase::LogsClassified => "logs-classified",
            Phase::Configured => "configured",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Where credentials come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialMode {
    File(PathBuf),
    Interactive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Stopped after credential acquisition.
    DryRun,
    Installed { endpoint: String },
}

pub struct Installer<'a> {
    config: InstallerConfig,
    cluster: &'a dyn ClusterControl,
    identity: &'a dyn IdentityProvider,
    manifests: &'a dyn ManifestSource,
    client: &'a dyn ClientConfigurator,
    cancel: CancelFlag,
    required_tools: &'a [(&'a str, &'a str)],
    dry_run: bool,
    phase: Phase,
}

impl<'a> Installer<'a> {
    pub fn new(
        config: InstallerConfig,
        cluster: &'a dyn ClusterControl,
        identity: &'a dyn IdentityProvider,
        manifests: &'a dyn ManifestSource,
        client: &'a dyn ClientConfigurator,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            config,
            cluster,
            identity,
            manifests,
            client,
            cancel,
            required_tools: REQUIRED_TOOLS,
            dry_run: false,
            phase: Phase::Idle,
        }
    }

    /// Replace the host tools checked during preflight.
    pub fn with_required_tools(mut self, tools: &'a [(&'a str, &'a str)]) -> Self {
        self.required_tools = tools;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, next: Phase) {
        info!(from = %self.phase, to = %next, "install phase");
        self.phase = next;
    }

    fn ensure_not_cancelled(&self, next: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(InstallError::Cancelled(next.to_string()).into());
        }
        Ok(())
    }

    /// Run the whole installation. `prompter` is only read in interactive mode.
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        mode: CredentialMode,
        prompter: &mut Prompter<R, W>,
    ) -> Result<RunOutcome> {
        match self.run_stages(mode, prompter) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let failed_in = self.phase;
                self.enter(Phase::Failed);
                error!(phase = %failed_in, "installation failed");
                let artifact = self.config.installer_manifest_path();
                if artifact.exists() {
                    warn!(path = %artifact.display(), "keeping installer manifest for inspection");
                }
                Err(err)
            }
        }
    }

    fn run_stages<R: BufRead, W: Write>(
        &mut self,
        mode: CredentialMode,
        prompter: &mut Prompter<R, W>,
    ) -> Result<RunOutcome> {
        ensure_keptn_dir(&self.config.keptn_dir)?;
        run_preflight(&self.config, self.manifests, self.cluster, self.required_tools)?;

        info!("Installing keptn...");
        let record = self.acquire(mode, prompter)?;
        self.enter(Phase::CredentialsReady);
        // Both acquisition paths end with a successful get-credentials.
        self.enter(Phase::ClusterAuthenticated);

        if self.dry_run {
            info!("Skipping installation due to dry-run flag");
            return Ok(RunOutcome::DryRun);
        }

        self.ensure_not_cancelled("manifest preparation")?;
        let manifest = prepare_manifest(&self.config, self.manifests, self.cluster, &record)?;
        self.enter(Phase::ManifestPrepared);

        self.ensure_not_cancelled("deployment")?;
        info!("Deploying keptn installer pod");
        deploy_installer(self.cluster, &self.config.rbac_url(), &manifest)?;
        self.enter(Phase::Deployed);

        let pod = wait_for_installer_pod(self.cluster, &self.config.readiness, &self.cancel)?;
        self.enter(Phase::PodRunning);

        self.ensure_not_cancelled("log capture")?;
        capture_installer_logs(self.cluster, &pod, &self.config)?;
        self.enter(Phase::LogsClassified);

        let endpoint =
            bootstrap_client(self.cluster, self.client, &self.config, &record, &self.cancel)?;
        // Kept on every failure path above for inspection.
        fs::remove_file(&manifest)
            .with_context(|| format!("removing installer manifest '{}'", manifest.display()))?;
        self.enter(Phase::Configured);
        Ok(RunOutcome::Installed { endpoint })
    }

    fn acquire<R: BufRead, W: Write>(
        &self,
        mode: CredentialMode,
        prompter: &mut Prompter<R, W>,
    ) -> Result<CredentialRecord> {
        match mode {
            CredentialMode::File(path) => acquire_from_file(&path, self.cluster, self.identity),
            CredentialMode::Interactive => {
                let store = CredentialStore::new(self.config.credentials_path());
                acquire_interactive(prompter, &store, self.cluster, self.identity)
            }
        }
    }
}
