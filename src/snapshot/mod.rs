//! Agent-side lifecycle of one point-in-time volume copy.
//!
//! A session names its snapshot `<volume><suffix>`, places it beside the
//! source volume and mounts it at `<mount_root>/<volume><suffix>`. Teardown
//! checks each piece before touching it, so it can be repeated after a
//! partial earlier attempt.

pub mod lvm;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::error::{Result, SnapshotError, ZfsyncError};
use crate::types::{volume_name, ExitStatus};
use crate::util::paths::is_safe_name;

pub use lvm::{Lvm, SnapshotBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unvalidated,
    Validated,
    Created,
    Mounted,
    Unmounted,
    Destroyed,
    CleanedUp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Done,
    /// Target already absent.
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    pub unmount: StepResult,
    pub remove_dir: StepResult,
    pub destroy: StepResult,
}

impl TeardownReport {
    fn steps(&self) -> [&StepResult; 3] {
        [&self.unmount, &self.remove_dir, &self.destroy]
    }

    /// At least one step actually did something.
    pub fn is_ok(&self) -> bool {
        self.steps().iter().any(|step| **step == StepResult::Done)
    }

    pub fn has_failures(&self) -> bool {
        self.steps()
            .iter()
            .any(|step| matches!(step, StepResult::Failed(_)))
    }

    /// Failures are critical; a teardown with nothing left to remove is only
    /// a warning.
    pub fn exit_status(&self) -> ExitStatus {
        if self.has_failures() {
            ExitStatus::Critical
        } else if self.is_ok() {
            ExitStatus::Ok
        } else {
            ExitStatus::Warning
        }
    }
}

pub struct SnapshotSession<'a> {
    backend: &'a dyn SnapshotBackend,
    volume: PathBuf,
    snapshot_name: String,
    mount_root: PathBuf,
    state: SessionState,
}

impl<'a> SnapshotSession<'a> {
    pub fn new(
        backend: &'a dyn SnapshotBackend,
        volume: &Path,
        suffix: &str,
        mount_root: &Path,
    ) -> Result<Self> {
        let name = volume_name(volume)
            .filter(|name| is_safe_name(name))
            .ok_or_else(|| SnapshotError::InvalidVolume(volume.display().to_string()))?;
        if !is_safe_name(suffix) {
            return Err(ZfsyncError::message(format!(
                "suffix {} must use only letters, digits, '.', '-', '_'",
                suffix
            )));
        }
        Ok(SnapshotSession {
            backend,
            volume: volume.to_path_buf(),
            snapshot_name: format!("{}{}", name, suffix),
            mount_root: mount_root.to_path_buf(),
            state: SessionState::Unvalidated,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn snapshot_name(&self) -> &str {
        &self.snapshot_name
    }

    pub fn snapshot_device(&self) -> PathBuf {
        match self.volume.parent() {
            Some(parent) => parent.join(&self.snapshot_name),
            None => PathBuf::from(&self.snapshot_name),
        }
    }

    pub fn mount_dir(&self) -> PathBuf {
        self.mount_root.join(&self.snapshot_name)
    }

    /// The source must exist and be a block device; anything else is refused.
    pub fn validate(&mut self) -> bool {
        let valid = self.backend.is_block_device(&self.volume);
        if valid {
            self.state = SessionState::Validated;
        } else {
            warn!(volume = %self.volume.display(), "not a block device");
        }
        valid
    }

    pub fn create(&mut self, size_mb: u64) -> Result<()> {
        if self.state != SessionState::Validated {
            return Err(SnapshotError::InvalidVolume(self.volume.display().to_string()).into());
        }
        let device = self.snapshot_device();
        if self.backend.is_block_device(&device) {
            return Err(SnapshotError::CreateFailed(format!(
                "{} already exists",
                device.display()
            ))
            .into());
        }
        let budget = size_mb.saturating_mul(1024 * 1024);
        let free = self.backend.free_capacity(&self.volume)?;
        if free <= budget {
            return Err(SnapshotError::InsufficientCapacity {
                group: lvm::volume_group(&self.volume).unwrap_or_default(),
                free,
                budget,
            }
            .into());
        }
        self.backend
            .create_snapshot(&self.volume, &self.snapshot_name, size_mb)?;
        self.state = SessionState::Created;
        info!(snapshot = %device.display(), "snapshot created");
        Ok(())
    }

    pub fn mount(&mut self, options: &str) -> Result<()> {
        let dir = self.mount_dir();
        fs::create_dir_all(&dir)
            .map_err(|e| SnapshotError::MountDirFailed(format!("{}: {}", dir.display(), e)))?;
        self.backend
            .mount(&self.snapshot_device(), &dir, options)
            .map_err(|e| match e {
                ZfsyncError::Snapshot(err) => ZfsyncError::Snapshot(err),
                other => SnapshotError::MountFailed(other.to_string()).into(),
            })?;
        self.state = SessionState::Mounted;
        info!(mount = %dir.display(), "snapshot mounted");
        Ok(())
    }

    /// Validate, create and mount; whatever was built is rolled back when a
    /// later step fails.
    pub fn initiate(&mut self, size_mb: u64, options: &str) -> Result<()> {
        if !self.validate() {
            return Err(SnapshotError::InvalidVolume(self.volume.display().to_string()).into());
        }
        self.create(size_mb)?;
        if let Err(err) = self.mount(options) {
            error!(snapshot = %self.snapshot_name, error = %err, "mount failed; rolling back");
            let report = self.teardown();
            if report.has_failures() {
                warn!(snapshot = %self.snapshot_name, "rollback incomplete: {:?}", report);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Unmount, remove the mount directory, destroy the snapshot.
    pub fn teardown(&mut self) -> TeardownReport {
        let dir = self.mount_dir();
        let device = self.snapshot_device();

        let unmount = match self.backend.is_mounted(&dir) {
            Ok(true) => match self.backend.unmount(&dir) {
                Ok(()) => {
                    self.state = SessionState::Unmounted;
                    StepResult::Done
                }
                Err(err) => StepResult::Failed(err.to_string()),
            },
            Ok(false) => {
                warn!(mount = %dir.display(), "not mounted; skipping unmount");
                StepResult::Skipped
            }
            Err(err) => StepResult::Failed(err.to_string()),
        };

        let remove_dir = if dir.is_dir() {
            match fs::remove_dir(&dir) {
                Ok(()) => StepResult::Done,
                Err(err) => StepResult::Failed(format!("remove {}: {}", dir.display(), err)),
            }
        } else {
            warn!(mount = %dir.display(), "mount directory absent; skipping");
            StepResult::Skipped
        };

        let destroy = if self.backend.is_block_device(&device) {
            match self.backend.destroy(&device) {
                Ok(()) => {
                    self.state = SessionState::Destroyed;
                    StepResult::Done
                }
                Err(err) => StepResult::Failed(err.to_string()),
            }
        } else {
            warn!(snapshot = %device.display(), "snapshot absent; skipping destroy");
            StepResult::Skipped
        };

        let report = TeardownReport {
            unmount,
            remove_dir,
            destroy,
        };
        if !report.has_failures() {
            self.state = SessionState::CleanedUp;
        }
        for step in report.steps() {
            if let StepResult::Failed(reason) = step {
                error!(snapshot = %self.snapshot_name, "teardown step failed: {}", reason);
            }
        }
        report
    }
}
