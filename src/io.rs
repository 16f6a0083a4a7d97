use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Replace `path` with `contents`, readable by the owner only.
///
/// The bytes go to a sibling temp file created with mode 0600, are synced and
/// then renamed over `path`. `what` names the file in error messages.
pub(crate) fn write_private(path: &Path, contents: &[u8], what: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {what} directory '{}'", parent.display()))?;
    }
    let tmp = temp_sibling(path);
    {
        let mut file = create_private(&tmp)
            .with_context(|| format!("creating temp {what} '{}'", tmp.display()))?;
        file.write_all(contents)
            .and_then(|_| file.sync_all())
            .with_context(|| format!("writing temp {what} '{}'", tmp.display()))?;
    }
    fs::rename(&tmp, path).with_context(|| {
        format!("replacing {what} '{}' -> '{}'", tmp.display(), path.display())
    })
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("file"));
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(unix)]
fn create_private(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // A leftover temp file keeps its old mode; `mode` only applies on creation.
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
}

#[cfg(all(test, unix))]
pub(crate) fn mode_of(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).unwrap().permissions().mode() & 0o777
}
