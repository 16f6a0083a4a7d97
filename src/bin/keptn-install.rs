//! keptn-install
//!
//! Installs keptn on a GKE cluster and configures the local keptn CLI.

use std::io::{self, BufReader};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use keptn_install::client_config::LocalClientConfig;
use keptn_install::cluster::cli::CliCluster;
use keptn_install::config::{default_keptn_dir, InstallerConfig};
use keptn_install::credentials::prompt::Prompter;
use keptn_install::identity::GithubIdentity;
use keptn_install::manifest::HttpManifestSource;
use keptn_install::retry::CancelFlag;
use keptn_install::signal::install_interrupt_handler;
use keptn_install::{CredentialMode, Installer, RunOutcome};

/// Installs keptn on your Kubernetes cluster
#[derive(Parser, Debug)]
#[command(name = "keptn-install")]
#[command(version, about, long_about = None)]
struct Args {
    /// Credential file for a non-interactive install
    #[arg(short = 'c', long)]
    creds: Option<PathBuf>,

    /// Branch or tag of the installer manifests
    #[arg(short = 'k', long)]
    keptn_version: Option<String>,

    /// Installer config file (default: <keptn dir>/install.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the credential cache, manifests and logs
    #[arg(long, env = "KEPTN_DIR")]
    keptn_dir: Option<PathBuf>,

    /// Verify prerequisites and credentials, then stop
    #[arg(long)]
    dry_run: bool,

    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let keptn_dir = match &args.keptn_dir {
        Some(dir) => dir.clone(),
        None => default_keptn_dir()?,
    };
    let mut config = InstallerConfig::load(keptn_dir, args.config.as_deref())?;
    // Flags win over the config file.
    if let Some(dir) = args.keptn_dir {
        config.keptn_dir = dir;
    }
    if let Some(version) = args.keptn_version {
        config.installer_version = version;
    }

    let cancel = CancelFlag::new();
    install_interrupt_handler(&cancel)?;

    let cluster = CliCluster::new();
    let identity = GithubIdentity::new()?;
    let manifests = HttpManifestSource::new()?;
    let client = LocalClientConfig::new(config.client_config_path());

    let mode = match args.creds {
        Some(path) => CredentialMode::File(path),
        None => CredentialMode::Interactive,
    };
    let mut prompter = Prompter::new(BufReader::new(io::stdin()), io::stdout());

    let mut installer = Installer::new(config, &cluster, &identity, &manifests, &client, cancel)
        .dry_run(args.dry_run);
    let outcome = installer.run(mode, &mut prompter)?;

    if let RunOutcome::Installed { endpoint } = outcome {
        info!(%endpoint, "keptn is ready");
    }
    Ok(())
}
