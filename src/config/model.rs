use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::BackupKind;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default, rename = "poolMountRoot", skip_serializing_if = "Option::is_none")]
    pub pool_mount_root: Option<PathBuf>,
    #[serde(default, rename = "agentMountRoot", skip_serializing_if = "Option::is_none")]
    pub agent_mount_root: Option<PathBuf>,
    #[serde(default, rename = "snapshotSizeMb", skip_serializing_if = "Option::is_none")]
    pub snapshot_size_mb: Option<u64>,
    #[serde(default, rename = "snapshotMountOptions", skip_serializing_if = "Option::is_none")]
    pub snapshot_mount_options: Option<String>,
    #[serde(default, rename = "ledgerMaxRecords", skip_serializing_if = "Option::is_none")]
    pub ledger_max_records: Option<usize>,
    #[serde(default, rename = "remoteTimeoutSecs", skip_serializing_if = "Option::is_none")]
    pub remote_timeout_secs: Option<u64>,
    #[serde(default, rename = "transferTimeoutSecs", skip_serializing_if = "Option::is_none")]
    pub transfer_timeout_secs: Option<u64>,
    #[serde(default, rename = "agentCommand", skip_serializing_if = "Option::is_none")]
    pub agent_command: Option<String>,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rsync: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SshConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct JobConfig {
    pub name: String,
    pub client: String,
    pub dataset: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub volumes: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
}

fn default_kind() -> String {
    "inc".to_string()
}

/// One protected host plus the dataset its chain lives under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub name: String,
    pub client: String,
    pub dataset: String,
    pub kind: BackupKind,
    pub volumes: Vec<PathBuf>,
    pub excludes: Vec<String>,
}

/// Validated, immutable settings shared by every component of a run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub pool_mount_root: PathBuf,
    pub agent_mount_root: PathBuf,
    pub snapshot_size_mb: u64,
    pub snapshot_mount_options: String,
    pub ledger_max_records: usize,
    pub remote_timeout: Duration,
    pub transfer_timeout: Option<Duration>,
    pub agent_command: String,
    pub ssh_user: Option<String>,
    pub ssh_options: Vec<String>,
    pub rsync_extra: Vec<String>,
    /// Applied to every job, including ones given on the command line.
    pub excludes: Vec<String>,
    pub jobs: Vec<Job>,
}

impl Settings {
    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|job| job.name == name)
    }
}
