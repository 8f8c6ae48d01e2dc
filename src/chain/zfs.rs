use std::process::Command;

use crate::error::{Result, ZfsyncError};
use crate::util::command::{describe, run_command};

/// Versioned dataset tree holding the chain units of every job.
pub trait VersionedStorage {
    fn exists(&self, dataset: &str) -> Result<bool>;
    /// Leaf names of the direct children of `root`.
    fn list_units(&self, root: &str) -> Result<Vec<String>>;
    fn create_root(&self, name: &str) -> Result<()>;
    /// Snapshots `parent` and clones that snapshot into `new_name`.
    fn snapshot_and_clone(&self, parent: &str, new_name: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct Zfs;

impl Zfs {
    fn zfs(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("zfs");
        cmd.args(args);
        let label = describe(&cmd);
        let output = run_command(&mut cmd)?;
        if !output.success() {
            return Err(ZfsyncError::storage(format!(
                "{} failed with exit code {}: {}",
                label,
                output.code,
                output.stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

impl VersionedStorage for Zfs {
    fn exists(&self, dataset: &str) -> Result<bool> {
        let mut cmd = Command::new("zfs");
        cmd.args(["list", "-H", "-o", "name", dataset]);
        Ok(run_command(&mut cmd)?.success())
    }

    fn list_units(&self, root: &str) -> Result<Vec<String>> {
        let stdout = self.zfs(&["list", "-H", "-o", "name", "-t", "filesystem", "-d", "1", root])?;
        Ok(child_names(root, &stdout))
    }

    fn create_root(&self, name: &str) -> Result<()> {
        self.zfs(&["create", name]).map(|_| ())
    }

    fn snapshot_and_clone(&self, parent: &str, new_name: &str) -> Result<()> {
        let tag = new_name.rsplit('/').next().unwrap_or(new_name);
        let snapshot = format!("{}@{}", parent, tag);
        self.zfs(&["snapshot", &snapshot])?;
        self.zfs(&["clone", &snapshot, new_name]).map(|_| ())
    }
}

fn child_names(root: &str, listing: &str) -> Vec<String> {
    let prefix = format!("{}/", root.trim_end_matches('/'));
    listing
        .lines()
        .filter_map(|line| line.trim().strip_prefix(&prefix))
        .filter(|leaf| !leaf.is_empty() && !leaf.contains('/'))
        .map(|leaf| leaf.to_string())
        .collect()
}
