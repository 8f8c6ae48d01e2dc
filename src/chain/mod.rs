//! Chain units: one dataset per backup attempt under the job root, named
//! `<stamp>_<kind>`. Parents are never stored; they are resolved from the
//! sorted listing and vetted against the ledger every time.

pub mod zfs;

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Result, ZfsyncError};
use crate::ledger::Ledger;
use crate::types::{suffix_for_stamp, Attempt, BackupKind, Outcome};
use crate::util::paths::dataset_dir;

pub use zfs::{VersionedStorage, Zfs};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainUnit {
    pub dataset: String,
    pub stamp: String,
    pub kind: BackupKind,
}

impl ChainUnit {
    pub fn new(root: &str, stamp: &str, kind: BackupKind) -> Self {
        ChainUnit {
            dataset: format!("{}/{}_{}", root, stamp, kind),
            stamp: stamp.to_string(),
            kind,
        }
    }

    /// Parses a child leaf like `2024-01-01T00-00-00_full`; anything else is
    /// not a chain unit.
    pub fn parse(root: &str, leaf: &str) -> Option<Self> {
        let (stamp, kind) = leaf.rsplit_once('_')?;
        let kind = match kind {
            "full" => BackupKind::Full,
            "diff" => BackupKind::Diff,
            "inc" => BackupKind::Inc,
            _ => return None,
        };
        Attempt::from_stamp(stamp).ok()?;
        Some(ChainUnit::new(root, stamp, kind))
    }

    /// Suffix token of the attempt that produced this unit.
    pub fn suffix(&self) -> String {
        suffix_for_stamp(&self.stamp)
    }

    pub fn dir(&self, pool_root: &Path) -> PathBuf {
        dataset_dir(pool_root, &self.dataset)
    }
}

/// What `create_unit` is about to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainPlan {
    pub kind: BackupKind,
    pub parent: Option<ChainUnit>,
}

pub struct ChainStore<'a> {
    storage: &'a dyn VersionedStorage,
    ledger: &'a Ledger,
}

impl<'a> ChainStore<'a> {
    pub fn new(storage: &'a dyn VersionedStorage, ledger: &'a Ledger) -> Self {
        ChainStore { storage, ledger }
    }

    /// Existing units under `root`, oldest first.
    pub fn units(&self, root: &str) -> Result<Vec<ChainUnit>> {
        let mut units: Vec<ChainUnit> = self
            .storage
            .list_units(root)?
            .iter()
            .filter_map(|leaf| ChainUnit::parse(root, leaf))
            .collect();
        units.sort_by(|a, b| a.dataset.cmp(&b.dataset));
        Ok(units)
    }

    /// Decides the kind actually taken, downgrading to full whenever the
    /// parent cannot be trusted.
    pub fn plan(&self, root: &str, requested: BackupKind) -> Result<ChainPlan> {
        let units = self.units(root)?;
        let full = ChainPlan {
            kind: BackupKind::Full,
            parent: None,
        };
        if requested == BackupKind::Full {
            return Ok(full);
        }
        if units.is_empty() {
            warn!(root, requested = %requested, "no previous backups; taking full backup");
            return Ok(full);
        }
        match requested {
            BackupKind::Full => Ok(full),
            BackupKind::Diff => {
                let Some(parent) = units.iter().rev().find(|u| u.kind == BackupKind::Full) else {
                    warn!(root, "no full backup to diff against; taking full backup");
                    return Ok(full);
                };
                let status = self.ledger.read(Some(&parent.suffix()));
                if status != Some(Outcome::Successful) {
                    warn!(
                        root,
                        parent = %parent.dataset,
                        status = ?status,
                        "last full backup not successful; taking full backup"
                    );
                    return Ok(full);
                }
                Ok(ChainPlan {
                    kind: BackupKind::Diff,
                    parent: Some(parent.clone()),
                })
            }
            BackupKind::Inc => {
                let previous = self.ledger.read(None);
                if previous != Some(Outcome::Successful) {
                    warn!(root, status = ?previous, "previous backup not successful; taking full backup");
                    return Ok(full);
                }
                let Some(parent) = units.last() else {
                    return Ok(full);
                };
                if self.ledger.read(Some(&parent.suffix())) == Some(Outcome::Failed) {
                    warn!(root, parent = %parent.dataset, "latest unit recorded as failed; taking full backup");
                    return Ok(full);
                }
                Ok(ChainPlan {
                    kind: BackupKind::Inc,
                    parent: Some(parent.clone()),
                })
            }
        }
    }

    pub fn create_unit(
        &self,
        root: &str,
        requested: BackupKind,
        attempt: &Attempt,
    ) -> Result<ChainUnit> {
        let plan = self.plan(root, requested)?;
        let unit = ChainUnit::new(root, attempt.stamp(), plan.kind);
        match &plan.parent {
            None => {
                self.storage.create_root(&unit.dataset)?;
                info!(unit = %unit.dataset, "created full unit");
            }
            Some(parent) => {
                if parent.stamp == unit.stamp {
                    return Err(ZfsyncError::storage(format!(
                        "unit {} already exists for this attempt",
                        parent.dataset
                    )));
                }
                self.storage
                    .snapshot_and_clone(&parent.dataset, &unit.dataset)?;
                info!(unit = %unit.dataset, parent = %parent.dataset, "cloned unit");
            }
        }
        Ok(unit)
    }
}
