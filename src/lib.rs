//! Bootstraps the keptn control plane onto an existing GKE cluster.
//!
//! An installation runs as a fixed sequence of stages:
//!
//! - **Preflight** - installer manifests reachable, gcloud account set, `kubectl` on `PATH`
//! - **Credentials** - from a JSON file or interactive prompts, verified against GitHub
//! - **Cluster connection** - `gcloud container clusters get-credentials`
//! - **Manifest templating** - placeholder substitution in the installer manifest
//! - **Deployment** - RBAC first, then the installer pod
//! - **Readiness** - bounded polling until the installer pod runs
//! - **Log classification** - both installer streams persisted and judged
//! - **Bootstrap** - API token and endpoint handed to the local CLI config
//!
//! # Architecture
//!
//! ```text
//! workflow::Installer
//!     │
//!     ├── credentials ── identity::IdentityProvider
//!     ├── manifest ───── manifest::ManifestSource
//!     ├── deploy, readiness, logs ── cluster::ClusterControl
//!     └── bootstrap ──── client_config::ClientConfigurator
//! ```
//!
//! Production implementations of the four traits shell out to `kubectl` and
//! `gcloud` or talk HTTP; tests swap in in-memory fakes.

pub mod bootstrap;
pub mod client_config;
pub mod cluster;
pub mod config;
pub mod credentials;
pub mod deploy;
pub mod error;
pub mod identity;
mod io;
pub mod logs;
pub mod manifest;
pub mod preflight;
pub mod process;
pub mod readiness;
pub mod retry;
pub mod signal;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub use config::InstallerConfig;
pub use error::InstallError;
pub use workflow::{CredentialMode, Installer, Phase, RunOutcome};
