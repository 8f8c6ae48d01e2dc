//! In-memory stand-ins for the external collaborators, used by unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backup::rsync::Transfer;
use crate::chain::VersionedStorage;
use crate::error::{RemoteError, Result, SnapshotError, ZfsyncError};
use crate::remote::RemoteExec;
use crate::snapshot::SnapshotBackend;
use crate::util::command::{CancelToken, CommandOutput};

#[derive(Debug, Default)]
pub struct MemoryStorage {
    datasets: RefCell<Vec<String>>,
    calls: RefCell<Vec<String>>,
    fail_clone: Cell<bool>,
    fail_create: Cell<bool>,
}

impl MemoryStorage {
    pub fn with_datasets(datasets: &[&str]) -> Self {
        let storage = MemoryStorage::default();
        storage
            .datasets
            .borrow_mut()
            .extend(datasets.iter().map(|d| d.to_string()));
        storage
    }

    pub fn fail_clone(&self) {
        self.fail_clone.set(true);
    }

    pub fn fail_create(&self) {
        self.fail_create.set(true);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl VersionedStorage for MemoryStorage {
    fn exists(&self, dataset: &str) -> Result<bool> {
        Ok(self.datasets.borrow().iter().any(|d| d == dataset))
    }

    fn list_units(&self, root: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", root);
        Ok(self
            .datasets
            .borrow()
            .iter()
            .filter_map(|d| d.strip_prefix(&prefix))
            .filter(|leaf| !leaf.contains('/'))
            .map(|leaf| leaf.to_string())
            .collect())
    }

    fn create_root(&self, name: &str) -> Result<()> {
        self.calls.borrow_mut().push(format!("create {}", name));
        if self.fail_create.get() {
            return Err(ZfsyncError::storage(format!("zfs create {} failed", name)));
        }
        self.datasets.borrow_mut().push(name.to_string());
        Ok(())
    }

    fn snapshot_and_clone(&self, parent: &str, new_name: &str) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("clone {} -> {}", parent, new_name));
        if self.fail_clone.get() || !self.exists(parent)? {
            return Err(ZfsyncError::storage(format!("zfs clone {} failed", parent)));
        }
        self.datasets.borrow_mut().push(new_name.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeRemote {
    calls: RefCell<Vec<String>>,
    exits: RefCell<HashMap<String, i32>>,
    timeouts: RefCell<HashSet<String>>,
    unreachable: Cell<bool>,
}

impl FakeRemote {
    /// Exit code returned for an agent action such as `end-backup`.
    pub fn set_exit(&self, action: &str, code: i32) {
        self.exits.borrow_mut().insert(action.to_string(), code);
    }

    /// Makes an agent action hit the remote timeout.
    pub fn time_out(&self, action: &str) {
        self.timeouts.borrow_mut().insert(action.to_string());
    }

    pub fn unreachable(&self) {
        self.unreachable.set(true);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| call.split_whitespace().nth(3).map(|a| a.to_string()))
            .collect()
    }
}

impl RemoteExec for FakeRemote {
    fn exec(
        &self,
        host: &str,
        argv: &[String],
        _timeout: Option<Duration>,
        cancel: &CancelToken,
    ) -> Result<CommandOutput> {
        self.calls
            .borrow_mut()
            .push(format!("{}: {}", host, argv.join(" ")));
        if self.unreachable.get() {
            return Err(RemoteError::Exit(format!("ssh {}", host), 255).into());
        }
        if cancel.is_cancelled() {
            return Err(RemoteError::Cancelled(format!("ssh {}", host)).into());
        }
        let action = argv.get(2).cloned().unwrap_or_default();
        if self.timeouts.borrow().contains(&action) {
            return Err(RemoteError::Timeout(format!("ssh {}", host), 600).into());
        }
        let code = self.exits.borrow().get(&action).copied().unwrap_or(0);
        Ok(CommandOutput {
            code,
            ..CommandOutput::default()
        })
    }
}

#[derive(Debug, Default)]
pub struct FakeTransfer {
    calls: RefCell<Vec<(String, PathBuf, PathBuf)>>,
    code: Cell<i32>,
    cancel_on_sync: RefCell<Option<CancelToken>>,
}

impl FakeTransfer {
    pub fn exit_with(&self, code: i32) {
        self.code.set(code);
    }

    /// Simulates a signal arriving while the copy runs.
    pub fn cancel_during_sync(&self, token: &CancelToken) {
        *self.cancel_on_sync.borrow_mut() = Some(token.clone());
    }

    pub fn calls(&self) -> Vec<(String, PathBuf, PathBuf)> {
        self.calls.borrow().clone()
    }
}

impl Transfer for FakeTransfer {
    fn sync(
        &self,
        host: &str,
        source: &Path,
        dest: &Path,
        _excludes: &[String],
        _cancel: &CancelToken,
    ) -> Result<i32> {
        self.calls
            .borrow_mut()
            .push((host.to_string(), source.to_path_buf(), dest.to_path_buf()));
        if let Some(token) = self.cancel_on_sync.borrow().as_ref() {
            token.cancel();
            return Err(RemoteError::Cancelled("rsync".to_string()).into());
        }
        Ok(self.code.get())
    }
}

#[derive(Debug, Default)]
pub struct FakeSnapshots {
    block_devices: RefCell<HashSet<PathBuf>>,
    mounted: RefCell<HashSet<PathBuf>>,
    free: Cell<u64>,
    fail_mount: Cell<bool>,
    calls: RefCell<Vec<String>>,
}

impl FakeSnapshots {
    pub fn with_volume(volume: &str, free: u64) -> Self {
        let fake = FakeSnapshots::default();
        fake.block_devices.borrow_mut().insert(PathBuf::from(volume));
        fake.free.set(free);
        fake
    }

    pub fn fail_mount(&self) {
        self.fail_mount.set(true);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl SnapshotBackend for FakeSnapshots {
    fn is_block_device(&self, path: &Path) -> bool {
        self.block_devices.borrow().contains(path)
    }

    fn free_capacity(&self, _volume: &Path) -> Result<u64> {
        Ok(self.free.get())
    }

    fn create_snapshot(&self, source: &Path, name: &str, size_mb: u64) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("lvcreate -L{}M -s -n {} {}", size_mb, name, source.display()));
        let device = source
            .parent()
            .map(|parent| parent.join(name))
            .unwrap_or_else(|| PathBuf::from(name));
        self.block_devices.borrow_mut().insert(device);
        Ok(())
    }

    fn destroy(&self, device: &Path) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("lvremove -y {}", device.display()));
        self.block_devices.borrow_mut().remove(device);
        Ok(())
    }

    fn is_mounted(&self, mountpoint: &Path) -> Result<bool> {
        Ok(self.mounted.borrow().contains(mountpoint))
    }

    fn mount(&self, device: &Path, mountpoint: &Path, _options: &str) -> Result<()> {
        self.calls.borrow_mut().push(format!(
            "mount {} {}",
            device.display(),
            mountpoint.display()
        ));
        if self.fail_mount.get() {
            return Err(SnapshotError::MountFailed(device.display().to_string()).into());
        }
        self.mounted.borrow_mut().insert(mountpoint.to_path_buf());
        Ok(())
    }

    fn unmount(&self, mountpoint: &Path) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("umount {}", mountpoint.display()));
        self.mounted.borrow_mut().remove(mountpoint);
        Ok(())
    }
}
