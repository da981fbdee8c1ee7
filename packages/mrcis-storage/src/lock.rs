//! Single-writer instance lock (§4.A). One process may hold the lock and
//! mutate the state/vector stores; any number of others may read. A held
//! lock is a two-line text file: a decimal PID, then an ISO-8601 UTC
//! timestamp, rewritten on a heartbeat interval so a crashed holder's
//! lock ages out and gets replaced.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{Result, StorageError};

const DEFAULT_STALE_SECONDS: i64 = 90;

/// Acquired/held state of the instance lock for one process.
pub struct InstanceLock {
    path: PathBuf,
    stale_seconds: i64,
    pid: u32,
    held: bool,
}

impl InstanceLock {
    /// Attempt to acquire the lock at `path`. Never blocks.
    pub fn acquire(path: impl Into<PathBuf>, stale_seconds: Option<i64>) -> Result<Self> {
        let path = path.into();
        let pid = std::process::id();
        let stale_seconds = stale_seconds.unwrap_or(DEFAULT_STALE_SECONDS);
        let mut lock = Self { path, stale_seconds, pid, held: false };

        if lock.try_create() {
            lock.held = true;
            info!(pid, "instance lock acquired");
            return Ok(lock);
        }
        if lock.check_and_promote()? {
            lock.held = true;
            info!(pid, "instance lock acquired by promotion");
        }
        Ok(lock)
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Create the lock file exclusively; `false` means it already exists.
    fn try_create(&self) -> bool {
        let contents = render(self.pid, Utc::now());
        match fs::OpenOptions::new().write(true).create_new(true).open(&self.path) {
            Ok(mut f) => f.write_all(contents.as_bytes()).is_ok(),
            Err(_) => false,
        }
    }

    /// Steps 2-5 of §4.A: read the existing lock, decide staleness, and
    /// atomically replace it if stale. Returns whether this call acquired
    /// the lock (used both for initial acquisition and for promotion).
    pub fn check_and_promote(&mut self) -> Result<bool> {
        let existing = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(_) => {
                // File vanished between our failed create and this read;
                // try to recreate it directly.
                return Ok(self.try_create());
            }
        };

        let stale = match parse(&existing) {
            Some((holder_pid, timestamp)) => {
                let dead = !is_process_alive(holder_pid);
                let aged_out = (Utc::now() - timestamp).num_seconds() > self.stale_seconds;
                dead || aged_out
            }
            None => true, // malformed lock file
        };

        if !stale {
            return Ok(false);
        }

        self.replace_atomically()
    }

    /// Rewrite the lock file atomically via temp-file + rename, as used
    /// both for stale-lock replacement and heartbeats.
    fn replace_atomically(&self) -> Result<bool> {
        let tmp_path = self.path.with_extension("tmp");
        let contents = render(self.pid, Utc::now());
        fs::write(&tmp_path, contents)?;
        match fs::rename(&tmp_path, &self.path) {
            Ok(()) => Ok(true),
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                Err(StorageError::lock(format!("failed to replace stale lock: {e}")))
            }
        }
    }

    /// Rewrite the lock file with a fresh timestamp. Call on a
    /// `heartbeat_seconds` timer while holding the lock.
    pub fn heartbeat(&self) -> Result<()> {
        if !self.held {
            return Err(StorageError::lock("heartbeat called without holding the lock"));
        }
        self.replace_atomically()?;
        Ok(())
    }

    /// Release the lock. Missing file is not an error.
    pub fn release(&mut self) -> Result<()> {
        if !self.held {
            return Ok(());
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.held = false;
        Ok(())
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if self.held {
            if let Err(e) = self.release() {
                warn!("failed to release instance lock on drop: {e}");
            }
        }
    }
}

fn render(pid: u32, timestamp: DateTime<Utc>) -> String {
    format!("{pid}\n{}\n", timestamp.to_rfc3339())
}

fn parse(contents: &str) -> Option<(u32, DateTime<Utc>)> {
    let mut lines = contents.lines();
    let pid: u32 = lines.next()?.trim().parse().ok()?;
    let timestamp = DateTime::parse_from_rfc3339(lines.next()?.trim()).ok()?.with_timezone(&Utc);
    Some((pid, timestamp))
}

#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    // kill(pid, 0) checks existence/permission without sending a signal.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    // Conservative default off Unix: assume alive so we never steal a
    // live lock; staleness still kicks in once the timestamp ages out.
    true
}

/// Returns the lock file path for a given data directory.
pub fn lock_path(data_directory: impl AsRef<Path>) -> PathBuf {
    data_directory.as_ref().join("mrcis.lock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquires_fresh_lock() {
        let dir = tempdir().unwrap();
        let lock = InstanceLock::acquire(dir.path().join("mrcis.lock"), None).unwrap();
        assert!(lock.is_held());
    }

    #[test]
    fn second_acquire_fails_while_first_holds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mrcis.lock");
        let first = InstanceLock::acquire(&path, None).unwrap();
        assert!(first.is_held());
        let second = InstanceLock::acquire(&path, None).unwrap();
        assert!(!second.is_held());
    }

    #[test]
    fn promotes_over_lock_with_dead_pid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mrcis.lock");
        fs::write(&path, render(999_999_999, Utc::now())).unwrap();
        let lock = InstanceLock::acquire(&path, None).unwrap();
        assert!(lock.is_held());
    }

    #[test]
    fn promotes_over_aged_out_timestamp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mrcis.lock");
        let old = Utc::now() - chrono::Duration::seconds(200);
        fs::write(&path, render(std::process::id(), old)).unwrap();
        let lock = InstanceLock::acquire(&path, Some(90)).unwrap();
        assert!(lock.is_held());
    }

    #[test]
    fn malformed_lock_is_treated_as_stale() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mrcis.lock");
        fs::write(&path, "not a pid\n").unwrap();
        let lock = InstanceLock::acquire(&path, None).unwrap();
        assert!(lock.is_held());
    }

    #[test]
    fn release_then_reacquire_succeeds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mrcis.lock");
        let mut first = InstanceLock::acquire(&path, None).unwrap();
        first.release().unwrap();
        let second = InstanceLock::acquire(&path, None).unwrap();
        assert!(second.is_held());
    }
}
