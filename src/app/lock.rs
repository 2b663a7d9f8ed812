//! Lock file enforcing one guard per server root.

use super::RunMode;
use crate::error::{GuardError, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[cfg(unix)]
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

const LOCK_FILENAME: &str = ".spotguard.lock";
const LOCK_FILE_MODE: u32 = 0o600;

/// Held for as long as a guard drives the server; removed on drop.
///
/// Ownership is an exclusive `flock` on the file, which the kernel releases
/// when the owner exits, so a lock left behind by a crashed guard is simply
/// taken over. The JSON body (pid, mode, start time) is informational.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    // Holds the flock until the lock is dropped
    _file: File,
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    mode: RunMode,
    started_at: String,
}

impl InstanceLock {
    pub fn acquire(server_root: &Path, mode: RunMode) -> Result<Self> {
        let path = server_root.join(LOCK_FILENAME);

        loop {
            let file = Self::open(&path)?;

            if !try_lock_exclusive(&file)? {
                let pid = match Self::read_lock_info(&path) {
                    Some(existing) => {
                        warn!(
                            "Guard pid {} ({:?} mode) has held {} since {}",
                            existing.pid,
                            existing.mode,
                            path.display(),
                            existing.started_at
                        );
                        existing.pid
                    }
                    // Owner is still writing its details
                    None => 0,
                };
                return Err(GuardError::AlreadyRunning { path, pid });
            }

            // A releasing owner unlinks the file before unlocking; a lock on
            // that orphaned inode guards nothing
            if !is_current_file(&file, &path) {
                debug!("Lock file {} was replaced while locking, retrying", path.display());
                continue;
            }

            let info = LockInfo {
                pid: std::process::id(),
                mode,
                started_at: chrono::Utc::now().to_rfc3339(),
            };
            let content = serde_json::to_string_pretty(&info)
                .map_err(|e| GuardError::system(format!("cannot encode lock info: {}", e)))?;
            file.set_len(0)?;
            (&file).write_all(content.as_bytes())?;
            file.sync_all()?;

            debug!("Acquired instance lock {}", path.display());
            return Ok(Self { path, _file: file });
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(path: &Path) -> std::io::Result<File> {
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        #[cfg(unix)]
        options.mode(LOCK_FILE_MODE);
        options.open(path)
    }

    fn read_lock_info(path: &Path) -> Option<LockInfo> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> Result<bool> {
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }

    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Ok(false)
    } else {
        Err(GuardError::Io(err))
    }
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> Result<bool> {
    Ok(true)
}

#[cfg(unix)]
fn is_current_file(file: &File, path: &Path) -> bool {
    match (file.metadata(), std::fs::metadata(path)) {
        (Ok(held), Ok(on_disk)) => held.dev() == on_disk.dev() && held.ino() == on_disk.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn is_current_file(_file: &File, _path: &Path) -> bool {
    true
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        // Unlink while still holding the flock; it is released when `_file` closes
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove lock file {}: {}", self.path.display(), e);
        }
        debug!("Released instance lock {}", self.path.display());
    }
}
