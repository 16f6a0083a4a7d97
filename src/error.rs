//! Failure taxonomy for the install workflow.
//!
//! Stage functions return `anyhow::Result` and attach context on the way up.
//! Failures the orchestrator (or a caller) needs to tell apart are raised as
//! [`InstallError`] values inside the `anyhow::Error`, so they can be
//! recovered with `downcast_ref::<InstallError>()`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Manual recovery hint appended to every bootstrap failure.
pub const MANUAL_SETUP_HINT: &str = "To manually set up your keptn CLI, please follow the instructions at https://keptn.sh/docs/0.2.0/reference/cli/.";

#[derive(Debug, Error)]
pub enum InstallError {
    /// Missing remote artifact or host tool. Raised before any cluster mutation.
    #[error("{0}")]
    Precondition(String),

    /// Malformed or rejected credential data.
    #[error("{0}")]
    Validation(String),

    /// The cluster control plane rejected the supplied identity.
    #[error("{0}")]
    Connectivity(String),

    /// A manifest apply failed; `source_message` is the command's own error text.
    #[error("{context}\nAborting installation.\n{source_message}")]
    Mutation {
        context: String,
        source_message: String,
    },

    /// A convergence loop ran out of attempts.
    #[error("{what} did not converge after {attempts} attempts ({elapsed:?})")]
    Convergence {
        what: String,
        attempts: u32,
        elapsed: Duration,
    },

    /// Log capture failed or the installer did not report success.
    #[error("{message}\nInstaller logs: {}, {}", .primary_log.display(), .diagnostic_log.display())]
    Classification {
        message: String,
        primary_log: PathBuf,
        diagnostic_log: PathBuf,
    },

    /// Post-install client setup failed. The platform itself is already installed.
    #[error("{0}\n{}", MANUAL_SETUP_HINT)]
    Bootstrap(String),

    /// The operator interrupted a waiting loop.
    #[error("{0} cancelled by operator")]
    Cancelled(String),
}

impl InstallError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn bootstrap(message: impl Into<String>) -> Self {
        Self::Bootstrap(message.into())
    }
}

/// Recover the taxonomy class from an `anyhow::Error` chain, if any.
pub fn classify(err: &anyhow::Error) -> Option<&InstallError> {
    err.chain().find_map(|cause| cause.downcast_ref::<InstallError>())
}
