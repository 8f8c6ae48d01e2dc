use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::model::{Config, Job, Settings};
use crate::error::{ConfigError, Result, ZfsyncError};
use crate::types::BackupKind;
use crate::util::paths::{is_safe_dataset, is_safe_name, is_safe_volume, path_has_parent_dir};

pub const CONFIG_FILE: &str = "/etc/zfsync/zfsync.yaml";

const DEFAULT_POOL_MOUNT_ROOT: &str = "/";
const DEFAULT_AGENT_MOUNT_ROOT: &str = "/mnt/zfsync";
const DEFAULT_SNAPSHOT_SIZE_MB: u64 = 512;
const DEFAULT_SNAPSHOT_MOUNT_OPTIONS: &str = "ro";
const DEFAULT_LEDGER_MAX_RECORDS: usize = 30;
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 600;
const DEFAULT_AGENT_COMMAND: &str = "zfsync";

/// Loads settings from `path`. When no path was given explicitly a missing
/// default file yields the built-in defaults.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let (path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(CONFIG_FILE), false),
    };
    let mut contents = String::new();
    match File::open(&path) {
        Ok(mut file) => {
            file.read_to_string(&mut contents)?;
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound && !explicit => {
            return parse_settings(Config::default());
        }
        Err(err) => {
            return Err(ZfsyncError::message(format!(
                "open config {}: {}",
                path.display(),
                err
            )))
        }
    }
    let cfg: Config =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
    parse_settings(cfg)
}

pub fn parse_settings(cfg: Config) -> Result<Settings> {
    let pool_mount_root = cfg
        .pool_mount_root
        .unwrap_or_else(|| PathBuf::from(DEFAULT_POOL_MOUNT_ROOT));
    let agent_mount_root = cfg
        .agent_mount_root
        .unwrap_or_else(|| PathBuf::from(DEFAULT_AGENT_MOUNT_ROOT));
    for (key, path) in [
        ("poolMountRoot", &pool_mount_root),
        ("agentMountRoot", &agent_mount_root),
    ] {
        if !path.is_absolute() || path_has_parent_dir(path) {
            return Err(ConfigError::Invalid(format!(
                "{} must be an absolute path without ..",
                key
            ))
            .into());
        }
    }

    let snapshot_size_mb = cfg.snapshot_size_mb.unwrap_or(DEFAULT_SNAPSHOT_SIZE_MB);
    if snapshot_size_mb == 0 {
        return Err(ConfigError::Invalid("snapshotSizeMb must be positive".to_string()).into());
    }
    let ledger_max_records = cfg.ledger_max_records.unwrap_or(DEFAULT_LEDGER_MAX_RECORDS);
    if ledger_max_records < 2 {
        return Err(ConfigError::Invalid(
            "ledgerMaxRecords must keep at least 2 records".to_string(),
        )
        .into());
    }

    let mut jobs = Vec::new();
    let mut names = HashSet::new();
    for job in cfg.jobs {
        if !is_safe_name(&job.name) {
            return Err(ConfigError::Invalid(format!(
                "job {} name must use only letters, digits, '.', '-', '_'",
                job.name
            ))
            .into());
        }
        if !names.insert(job.name.clone()) {
            return Err(ConfigError::Invalid(format!("duplicate job name {}", job.name)).into());
        }
        let kind = BackupKind::parse(&job.kind)
            .map_err(|e| ConfigError::Invalid(format!("job {}: {}", job.name, e)))?;
        let mut excludes = cfg.excludes.clone();
        excludes.extend(job.excludes);
        let job = Job {
            name: job.name,
            client: job.client,
            dataset: job.dataset,
            kind,
            volumes: job.volumes,
            excludes,
        };
        validate_job(&job)?;
        jobs.push(job);
    }

    Ok(Settings {
        pool_mount_root,
        agent_mount_root,
        snapshot_size_mb,
        snapshot_mount_options: cfg
            .snapshot_mount_options
            .unwrap_or_else(|| DEFAULT_SNAPSHOT_MOUNT_OPTIONS.to_string()),
        ledger_max_records,
        remote_timeout: Duration::from_secs(
            cfg.remote_timeout_secs.unwrap_or(DEFAULT_REMOTE_TIMEOUT_SECS),
        ),
        transfer_timeout: cfg.transfer_timeout_secs.map(Duration::from_secs),
        agent_command: cfg
            .agent_command
            .unwrap_or_else(|| DEFAULT_AGENT_COMMAND.to_string()),
        ssh_user: cfg.ssh.user,
        ssh_options: cfg.ssh.options,
        rsync_extra: cfg.rsync,
        excludes: cfg.excludes,
        jobs,
    })
}

/// Checks a job regardless of whether it came from the file or the command line.
pub fn validate_job(job: &Job) -> Result<()> {
    let label = if job.name.is_empty() {
        job.dataset.as_str()
    } else {
        job.name.as_str()
    };
    if job.client.trim().is_empty() || job.client.starts_with('-') {
        return Err(ConfigError::Invalid(format!("job {}: client is required", label)).into());
    }
    if !is_safe_dataset(&job.dataset) {
        return Err(ConfigError::Invalid(format!(
            "job {}: dataset {} must be a relative name like pool/job",
            label, job.dataset
        ))
        .into());
    }
    if job.volumes.is_empty() {
        return Err(ConfigError::Invalid(format!("job {}: no volumes listed", label)).into());
    }
    let mut leaves = HashSet::new();
    for volume in &job.volumes {
        if !is_safe_volume(volume) {
            return Err(ConfigError::Invalid(format!(
                "job {}: volume {} must be an absolute path of letters, digits, '.', '-', '_'",
                label,
                volume.display()
            ))
            .into());
        }
        if !leaves.insert(volume.file_name()) {
            return Err(ConfigError::Invalid(format!(
                "job {}: two volumes named {}",
                label,
                volume.display()
            ))
            .into());
        }
    }
    Ok(())
}
