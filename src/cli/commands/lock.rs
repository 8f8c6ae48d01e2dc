use tracing::info;

use crate::cli::commands::job_dir;
use crate::config::Settings;
use crate::error::Result;
use crate::lock::{self, LockState};
use crate::types::ExitStatus;

/// Free is OK, a running owner is a warning, a lock nobody will release is
/// critical.
pub fn run_status(settings: &Settings, dataset: &str) -> Result<ExitStatus> {
    let path = lock::lock_path(&job_dir(settings, dataset)?);
    let status = match lock::inspect(&path)? {
        LockState::Free => {
            println!("{}: not locked", dataset);
            ExitStatus::Ok
        }
        LockState::Held(owner) => {
            println!("{}: backup running ({})", dataset, owner);
            ExitStatus::Warning
        }
        LockState::Stale(owner) => {
            println!("{}: cleanup needed, owner {} is gone", dataset, owner);
            ExitStatus::Critical
        }
        LockState::Unknown => {
            println!("{}: cleanup needed, unreadable lock {}", dataset, path.display());
            ExitStatus::Critical
        }
    };
    Ok(status)
}

pub fn run_cleanup(settings: &Settings, dataset: &str, force: bool) -> Result<ExitStatus> {
    let path = lock::lock_path(&job_dir(settings, dataset)?);
    let (state, removed) = lock::cleanup(&path, force)?;
    if removed {
        info!(lock = %path.display(), state = ?state, "lock removed");
        println!("{}: lock removed", dataset);
        return Ok(ExitStatus::Ok);
    }
    match state {
        LockState::Held(owner) => {
            println!(
                "{}: lock held by {}; pass --force if that run is known to be dead",
                dataset, owner
            );
            Ok(ExitStatus::Warning)
        }
        _ => {
            println!("{}: not locked", dataset);
            Ok(ExitStatus::Ok)
        }
    }
}
