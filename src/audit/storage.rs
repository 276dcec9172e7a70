//! Ledger Storage
//!
//! Whole-file reads and crash-safe replacement of the ledger file.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use tempfile::Builder;
use tracing::{debug, error};

use crate::error::{LedgerError, Result};

/// Create the directory holding `path` if it is missing.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    let parent = parent_dir(path);
    std::fs::create_dir_all(parent)
        .map_err(|e| LedgerError::storage("Failed to create ledger directory", parent, e))
}

/// Read the whole ledger as raw bytes. An absent file reads as empty.
///
/// Bytes are not decoded here: a damaged line must not make the rest of the
/// file unreadable.
pub fn read_ledger(path: &Path) -> Result<Vec<u8>> {
    match std::fs::read(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(LedgerError::storage("Failed to read ledger", path, e)),
    }
}

/// Non-blank lines of `content` with their 1-based line numbers. A trailing
/// `\r` is stripped.
pub fn ledger_lines(content: &[u8]) -> impl Iterator<Item = (usize, &[u8])> {
    content
        .split(|&b| b == b'\n')
        .enumerate()
        .map(|(index, line)| (index + 1, line.strip_suffix(b"\r").unwrap_or(line)))
        .filter(|(_, line)| !line.iter().all(u8::is_ascii_whitespace))
}

/// Replace `path` with whatever `write` produces.
///
/// The content goes to a temporary file in the same directory, is flushed
/// and synced, then renamed over `path`. If anything fails before the rename
/// the temporary file is removed and `path` is untouched.
///
/// An existing file keeps its permissions; a new one gets the usual
/// umask-filtered mode rather than the owner-only mode of temporary files.
pub fn replace_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let dir = parent_dir(path);
    let existing_permissions = match std::fs::metadata(path) {
        Ok(metadata) => Some(metadata.permissions()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(LedgerError::storage("Failed to stat ledger", path, e)),
    };

    let mut builder = Builder::new();
    builder.prefix(".ledger");
    if existing_permissions.is_none() {
        new_file_mode(&mut builder);
    }
    let mut temp = builder
        .tempfile_in(dir)
        .map_err(|e| LedgerError::storage("Failed to create temporary file in", dir, e))?;
    debug!("Writing ledger update to {}", temp.path().display());

    let written = write(temp.as_file_mut())
        .and_then(|_| temp.as_file_mut().flush())
        .and_then(|_| match &existing_permissions {
            Some(permissions) => temp.as_file().set_permissions(permissions.clone()),
            None => Ok(()),
        })
        .and_then(|_| temp.as_file().sync_all());
    if let Err(e) = written {
        error!("Ledger update aborted, discarding {}: {}", temp.path().display(), e);
        let temp_path = temp.path().to_path_buf();
        // Dropping the handle would also remove it; closing explicitly surfaces failures.
        if let Err(close_err) = temp.close() {
            error!("Failed to remove temporary file {}: {}", temp_path.display(), close_err);
        }
        return Err(LedgerError::storage("Failed to write temporary file", &temp_path, e));
    }

    // On failure the returned PersistError owns the temp file and deletes it on drop.
    temp.persist(path)
        .map_err(|e| LedgerError::storage("Failed to replace ledger", path, e.error))?;

    sync_dir(dir);
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Plain `0o666`, filtered by the umask when the file is created.
#[cfg(unix)]
fn new_file_mode(builder: &mut Builder<'_, '_>) {
    use std::fs::Permissions;
    use std::os::unix::fs::PermissionsExt;
    builder.permissions(Permissions::from_mode(0o666));
}

#[cfg(not(unix))]
fn new_file_mode(_builder: &mut Builder<'_, '_>) {}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    // Makes the rename itself durable.
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        debug!("Could not sync directory {}: {}", dir.display(), e);
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
