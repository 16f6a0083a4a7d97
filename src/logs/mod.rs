//! Installer log capture and verdict.
//!
//! The installer container's stdout and stderr are followed concurrently:
//! stdout on a spawned thread, stderr on the caller's thread. Both are
//! persisted line by line and fed through [`marker::parse_marker`]. The log
//! process is joined only after both streams reached end of file.

pub mod marker;

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, error, info, trace, warn};

use crate::cluster::ClusterControl;
use crate::config::InstallerConfig;
use crate::error::InstallError;
use marker::{parse_marker, Severity};

pub const INSTALLER_CONTAINER: &str = "keptn-installer";
pub const INSTALLER_DEPLOYMENT: &str = "installer";

/// What one stream reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOutcome {
    pub lines: usize,
    pub success_seen: bool,
    pub error_seen: bool,
}

impl LogOutcome {
    /// An empty stream has nothing to object to. Otherwise the success
    /// message is required and any error marker is final.
    pub fn succeeded(&self) -> bool {
        self.lines == 0 || (self.success_seen && !self.error_seen)
    }
}

/// Log file created on the first line only.
struct LazyLog {
    path: PathBuf,
    file: Option<File>,
}

impl LazyLog {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            file: None,
        }
    }

    fn append(&mut self, line: &str) -> Result<()> {
        if self.file.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)
                .with_context(|| format!("creating log file '{}'", self.path.display()))?;
            self.file = Some(file);
        }
        if let Some(file) = self.file.as_mut() {
            writeln!(file, "{line}")
                .and_then(|_| file.sync_data())
                .with_context(|| format!("writing log file '{}'", self.path.display()))?;
        }
        Ok(())
    }
}

/// Read `reader` to end of file, persisting every line to `path`.
///
/// A failed write does not stop the read: the producer must never block on
/// a full pipe. The first write error is returned once the stream ended.
pub fn drain_stream<R: Read>(reader: R, path: &Path) -> Result<LogOutcome> {
    let mut reader = BufReader::new(reader);
    let mut log = LazyLog::new(path);
    let mut outcome = LogOutcome::default();
    let mut write_error: Option<anyhow::Error> = None;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("reading installer log stream for '{}'", path.display()))?;
        if read == 0 {
            break;
        }
        let raw = String::from_utf8_lossy(&buf);
        let line = raw.trim_end_matches(['\n', '\r']);
        outcome.lines += 1;
        if write_error.is_none() {
            if let Err(err) = log.append(line) {
                warn!(err = %format!("{err:#}"), "installer log no longer persisted, still draining");
                write_error = Some(err);
            }
        }

        let Some(marker) = parse_marker(line) else {
            continue;
        };
        match marker.severity {
            Severity::Info => info!("{}", marker.message),
            Severity::Verbose => debug!("{}", marker.message),
            Severity::Debug => trace!("{}", marker.message),
            Severity::Error => {
                error!("{}", marker.message);
                outcome.error_seen = true;
            }
        }
        if marker.is_success() {
            outcome.success_seen = true;
        }
    }
    match write_error {
        Some(err) => Err(err),
        None => Ok(outcome),
    }
}

/// Drain both streams and return `(primary, diagnostic)` outcomes.
pub fn classify_streams(
    primary: Box<dyn Read + Send>,
    diagnostic: Box<dyn Read + Send>,
    primary_path: &Path,
    diagnostic_path: &Path,
) -> Result<(LogOutcome, LogOutcome)> {
    let (tx, rx) = mpsc::channel();
    let path = primary_path.to_path_buf();
    std::thread::spawn(move || {
        let _ = tx.send(drain_stream(primary, &path));
    });

    let diagnostic_result = drain_stream(diagnostic, diagnostic_path);
    let primary_result = rx
        .recv()
        .map_err(|_| anyhow!("primary log drain thread exited without a result"))?;
    Ok((primary_result?, diagnostic_result?))
}

/// Follow the installer pod's logs to completion, decide the verdict and
/// remove the installer deployment on success.
pub fn capture_installer_logs(
    cluster: &dyn ClusterControl,
    pod: &str,
    config: &InstallerConfig,
) -> Result<()> {
    let primary_log = config.primary_log_path();
    let diagnostic_log = config.diagnostic_log_path();
    let classification = |message: String| -> anyhow::Error {
        InstallError::Classification {
            message,
            primary_log: primary_log.clone(),
            diagnostic_log: diagnostic_log.clone(),
        }
        .into()
    };

    let attached = cluster
        .follow_logs(pod, INSTALLER_CONTAINER)
        .map_err(|err| classification(format!("Could not get installer pod logs: {err:#}")))?;
    let mut process = attached.process;

    let (primary, diagnostic) = classify_streams(
        attached.primary,
        attached.diagnostic,
        &primary_log,
        &diagnostic_log,
    )
    .map_err(|err| classification(format!("Could not get installer pod logs: {err:#}")))?;
    process
        .wait()
        .map_err(|err| classification(format!("{err:#}")))?;

    debug!(?primary, ?diagnostic, "installer log streams drained");
    if !(primary.succeeded() && diagnostic.succeeded()) {
        return Err(classification("Installation was unsuccessful".to_string()));
    }

    cluster
        .delete_deployment(INSTALLER_DEPLOYMENT)
        .context("removing installer deployment")?;
    info!("Installation of keptn complete");
    Ok(())
}
