use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::warn;

use crate::error::{LockError, Result};

pub const LOCK_FILE_NAME: &str = ".zfsync.lock";

pub fn lock_path(job_dir: &Path) -> PathBuf {
    job_dir.join(LOCK_FILE_NAME)
}

pub fn hostname() -> String {
    nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".into())
}

/// The single line written into a lock marker: `host pid started`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOwner {
    pub host: String,
    pub pid: u32,
    pub started: String,
}

impl LockOwner {
    pub fn current() -> Self {
        LockOwner {
            host: hostname(),
            pid: std::process::id(),
            started: Utc::now().to_rfc3339(),
        }
    }

    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let host = fields.next()?.to_string();
        let pid = fields.next()?.parse().ok()?;
        let started = fields.next()?.to_string();
        Some(LockOwner { host, pid, started })
    }

    /// Only answerable for owners on this host.
    pub fn is_alive(&self) -> Option<bool> {
        if self.host != hostname() {
            return None;
        }
        Some(Path::new("/proc").join(self.pid.to_string()).exists())
    }
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.host, self.pid, self.started)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    Free,
    Held(LockOwner),
    /// Owner process is gone; an operator has to clean up.
    Stale(LockOwner),
    /// Marker present but its owner cannot be read.
    Unknown,
}

/// Creates the lock marker. `Ok(false)` means another run already holds it.
pub fn try_acquire(path: &Path) -> Result<bool> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut f) => {
            let written = writeln!(f, "{}", LockOwner::current());
            finish_claim(path, written)
        }
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(err) => Err(LockError::Create(path.display().to_string(), err).into()),
    }
}

/// A marker without an owner line would read as held forever, so it is
/// removed again when the write failed.
fn finish_claim(path: &Path, written: io::Result<()>) -> Result<bool> {
    if let Err(err) = written {
        let _ = fs::remove_file(path);
        return Err(LockError::Create(path.display().to_string(), err).into());
    }
    Ok(true)
}

/// Removes the lock marker; an absent marker is not an error.
pub fn release(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(LockError::Remove(path.display().to_string(), err).into()),
    }
}

pub fn inspect(path: &Path) -> Result<LockState> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(LockState::Free),
        Err(err) => return Err(err.into()),
    };
    let Some(owner) = text.lines().next().and_then(LockOwner::parse) else {
        return Ok(LockState::Unknown);
    };
    match owner.is_alive() {
        Some(false) => Ok(LockState::Stale(owner)),
        _ => Ok(LockState::Held(owner)),
    }
}

/// Operator-triggered recovery. Removes a stale or unreadable lock; a live
/// (or foreign-host) lock is only removed with `force`. Returns the state
/// that was found and whether the marker was removed.
pub fn cleanup(path: &Path, force: bool) -> Result<(LockState, bool)> {
    let state = inspect(path)?;
    let remove = match &state {
        LockState::Free => false,
        LockState::Stale(_) | LockState::Unknown => true,
        LockState::Held(_) => force,
    };
    if remove {
        if let LockState::Held(owner) = &state {
            warn!(lock = %path.display(), owner = %owner, "forcing release of held lock");
        }
        release(path)?;
    }
    Ok((state, remove))
}

/// Holds an acquired lock and releases it when dropped.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    held: bool,
}

impl LockGuard {
    pub fn acquire(path: &Path) -> Result<Option<LockGuard>> {
        if try_acquire(path)? {
            Ok(Some(LockGuard {
                path: path.to_path_buf(),
                held: true,
            }))
        } else {
            Ok(None)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) -> Result<()> {
        self.held = false;
        release(&self.path)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.held {
            let _ = release(&self.path);
        }
    }
}
