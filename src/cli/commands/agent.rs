use tracing::{error, info, warn};

use crate::cli::args::AgentArgs;
use crate::config::Settings;
use crate::snapshot::{SnapshotBackend, SnapshotSession};
use crate::types::ExitStatus;
use crate::util::paths::ensure_private_dir;

/// `agent initiate-backup`: leaves the snapshot mounted for the controller
/// to pull from, or nothing at all.
pub fn run_initiate(settings: &Settings, args: &AgentArgs, backend: &dyn SnapshotBackend) -> ExitStatus {
    if let Err(err) = ensure_private_dir(&settings.agent_mount_root) {
        error!(error = %err, "mount root unusable");
        return ExitStatus::Critical;
    }
    let mut session = match SnapshotSession::new(
        backend,
        &args.volume,
        &args.suffix,
        &settings.agent_mount_root,
    ) {
        Ok(session) => session,
        Err(err) => {
            error!(error = %err, "cannot start snapshot session");
            return ExitStatus::Critical;
        }
    };
    match session.initiate(settings.snapshot_size_mb, &settings.snapshot_mount_options) {
        Ok(()) => {
            println!("{}", session.mount_dir().display());
            ExitStatus::Ok
        }
        Err(err) => {
            error!(volume = %args.volume.display(), error = %err, "initiate-backup failed");
            ExitStatus::Critical
        }
    }
}

/// `agent end-backup`: safe to repeat; a second call reports a warning.
pub fn run_end(settings: &Settings, args: &AgentArgs, backend: &dyn SnapshotBackend) -> ExitStatus {
    let mut session = match SnapshotSession::new(
        backend,
        &args.volume,
        &args.suffix,
        &settings.agent_mount_root,
    ) {
        Ok(session) => session,
        Err(err) => {
            error!(error = %err, "cannot start snapshot session");
            return ExitStatus::Critical;
        }
    };
    let report = session.teardown();
    let status = report.exit_status();
    match status {
        ExitStatus::Ok => info!(snapshot = %session.snapshot_name(), "end-backup done"),
        ExitStatus::Warning => warn!(snapshot = %session.snapshot_name(), "nothing to tear down"),
        _ => error!(snapshot = %session.snapshot_name(), "end-backup incomplete: {:?}", report),
    }
    status
}
