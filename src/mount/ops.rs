use std::path::Path;
use std::process::Command;

use crate::error::{Result, SnapshotError};
use crate::util::command::run_command;

pub fn mount_device(device: &Path, mountpoint: &Path, options: &str) -> Result<()> {
    let mut cmd = Command::new("mount");
    cmd.arg("-o").arg(options).arg(device).arg(mountpoint);
    let output = run_command(&mut cmd)?;
    if !output.success() {
        return Err(SnapshotError::MountFailed(format!(
            "{} on {} failed with exit code {}: {}",
            device.display(),
            mountpoint.display(),
            output.code,
            output.stderr.trim()
        ))
        .into());
    }
    Ok(())
}

pub fn unmount_path(mountpoint: &Path) -> Result<()> {
    let mut cmd = Command::new("umount");
    cmd.arg(mountpoint);
    let output = run_command(&mut cmd)?;
    if !output.success() {
        return Err(SnapshotError::TeardownFailed(format!(
            "umount {} failed with exit code {}: {}",
            mountpoint.display(),
            output.code,
            output.stderr.trim()
        ))
        .into());
    }
    Ok(())
}
