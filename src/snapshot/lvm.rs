use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;
use std::process::Command;

use crate::error::{Result, SnapshotError, ZfsyncError};
use crate::mount::inspect::mountpoint_is_mounted;
use crate::mount::ops::{mount_device, unmount_path};
use crate::util::command::{describe, run_command};

/// Point-in-time copies of block devices on the protected host.
pub trait SnapshotBackend {
    fn is_block_device(&self, path: &Path) -> bool;
    /// Unallocated bytes in the pool `volume` belongs to.
    fn free_capacity(&self, volume: &Path) -> Result<u64>;
    fn create_snapshot(&self, source: &Path, name: &str, size_mb: u64) -> Result<()>;
    fn destroy(&self, device: &Path) -> Result<()>;
    fn is_mounted(&self, mountpoint: &Path) -> Result<bool>;
    fn mount(&self, device: &Path, mountpoint: &Path, options: &str) -> Result<()>;
    fn unmount(&self, mountpoint: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct Lvm;

/// `/dev/<vg>/<lv>` -> `<vg>`.
pub fn volume_group(volume: &Path) -> Option<String> {
    volume
        .parent()
        .and_then(|parent| parent.file_name())
        .map(|name| name.to_string_lossy().to_string())
}

fn parse_vg_free(stdout: &str) -> Option<u64> {
    stdout.trim().parse().ok()
}

impl SnapshotBackend for Lvm {
    fn is_block_device(&self, path: &Path) -> bool {
        fs::metadata(path)
            .map(|meta| meta.file_type().is_block_device())
            .unwrap_or(false)
    }

    fn free_capacity(&self, volume: &Path) -> Result<u64> {
        let group = volume_group(volume).ok_or_else(|| {
            ZfsyncError::message(format!("no volume group for {}", volume.display()))
        })?;
        let mut cmd = Command::new("vgs");
        cmd.args(["--noheadings", "--nosuffix", "--units", "b", "-o", "vg_free"])
            .arg(&group);
        let label = describe(&cmd);
        let output = run_command(&mut cmd)?;
        if !output.success() {
            return Err(ZfsyncError::message(format!(
                "{} failed with exit code {}: {}",
                label,
                output.code,
                output.stderr.trim()
            )));
        }
        parse_vg_free(&output.stdout).ok_or_else(|| {
            ZfsyncError::message(format!("{}: unexpected output {:?}", label, output.stdout))
        })
    }

    fn create_snapshot(&self, source: &Path, name: &str, size_mb: u64) -> Result<()> {
        let mut cmd = Command::new("lvcreate");
        cmd.arg(format!("-L{}M", size_mb))
            .arg("-s")
            .arg("-n")
            .arg(name)
            .arg(source);
        let label = describe(&cmd);
        let output = run_command(&mut cmd)?;
        if !output.success() {
            return Err(SnapshotError::CreateFailed(format!(
                "{} failed with exit code {}: {}",
                label,
                output.code,
                output.stderr.trim()
            ))
            .into());
        }
        Ok(())
    }

    fn destroy(&self, device: &Path) -> Result<()> {
        let mut cmd = Command::new("lvremove");
        cmd.arg("-y").arg(device);
        let label = describe(&cmd);
        let output = run_command(&mut cmd)?;
        if !output.success() {
            return Err(SnapshotError::TeardownFailed(format!(
                "{} failed with exit code {}: {}",
                label,
                output.code,
                output.stderr.trim()
            ))
            .into());
        }
        Ok(())
    }

    fn is_mounted(&self, mountpoint: &Path) -> Result<bool> {
        mountpoint_is_mounted(mountpoint)
    }

    fn mount(&self, device: &Path, mountpoint: &Path, options: &str) -> Result<()> {
        mount_device(device, mountpoint, options)
    }

    fn unmount(&self, mountpoint: &Path) -> Result<()> {
        unmount_path(mountpoint)
    }
}
