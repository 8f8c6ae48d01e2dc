use tracing::{info, warn};

use crate::backup::rsync::Rsync;
use crate::backup::Orchestrator;
use crate::chain::Zfs;
use crate::cli::args::BackupArgs;
use crate::config::{validate_job, Job, Settings};
use crate::error::{ConfigError, Result};
use crate::remote::Ssh;
use crate::signal_handler::signal_handler;
use crate::types::{Attempt, ExitStatus};
use crate::util::command::CancelToken;

pub fn run_backup_command(settings: &Settings, args: BackupArgs) -> Result<ExitStatus> {
    let job = resolve_job(settings, &args)?;
    let cancel = CancelToken::new();
    signal_handler(&cancel);

    let ssh = Ssh::new(settings.ssh_user.clone(), settings.ssh_options.clone());
    let mut rsync_extra = settings.rsync_extra.clone();
    rsync_extra.extend(args.rsync);
    let transfer = Rsync::new(ssh.clone(), rsync_extra, settings.transfer_timeout);
    let storage = Zfs;

    let attempt = Attempt::now();
    let report = Orchestrator::new(settings, &storage, &ssh, &transfer, &cancel).run(&job, &attempt);
    for warning in &report.warnings {
        warn!(job = %job.name, "{}", warning);
    }
    match &report.unit {
        Some(unit) => info!(job = %job.name, unit = %unit.dataset, outcome = %report.outcome, "done"),
        None => info!(job = %job.name, outcome = %report.outcome, "done"),
    }
    Ok(report.status)
}

/// A configured job (with an optional kind override) or one described
/// entirely on the command line.
pub fn resolve_job(settings: &Settings, args: &BackupArgs) -> Result<Job> {
    if let Some(name) = &args.job {
        let mut job = settings
            .job(name)
            .cloned()
            .ok_or_else(|| ConfigError::Invalid(format!("job {} not found", name)))?;
        if let Some(kind) = args.kind {
            job.kind = kind;
        }
        if !args.volumes.is_empty() {
            job.volumes = args.volumes.clone();
        }
        validate_job(&job)?;
        return Ok(job);
    }

    let (client, dataset) = match (&args.client, &args.dataset) {
        (Some(client), Some(dataset)) => (client.clone(), dataset.clone()),
        _ => {
            return Err(ConfigError::Invalid(
                "either --job or both --client and --dataset are required".to_string(),
            )
            .into())
        }
    };
    let kind = args
        .kind
        .ok_or_else(|| ConfigError::Invalid("--kind is required without --job".to_string()))?;
    let job = Job {
        name: dataset.clone(),
        client,
        dataset,
        kind,
        volumes: args.volumes.clone(),
        excludes: settings.excludes.clone(),
    };
    validate_job(&job)?;
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load::parse_settings;
    use crate::config::model::{Config, JobConfig};
    use crate::types::BackupKind;
    use std::path::PathBuf;

    fn settings() -> Settings {
        parse_settings(Config {
            excludes: vec!["/tmp".to_string()],
            jobs: vec![JobConfig {
                name: "web1".to_string(),
                client: "web1.example.com".to_string(),
                dataset: "backup/web1".to_string(),
                kind: "diff".to_string(),
                volumes: vec![PathBuf::from("/dev/vg0/root")],
                excludes: Vec::new(),
            }],
            ..Config::default()
        })
        .expect("settings")
    }

    #[test]
    fn configured_job_takes_kind_override() {
        let args = BackupArgs {
            job: Some("web1".to_string()),
            kind: Some(BackupKind::Full),
            ..BackupArgs::default()
        };
        let job = resolve_job(&settings(), &args).expect("job");
        assert_eq!(job.kind, BackupKind::Full);
        assert_eq!(job.client, "web1.example.com");
        assert_eq!(job.volumes, vec![PathBuf::from("/dev/vg0/root")]);
    }

    #[test]
    fn adhoc_job_gets_global_excludes() {
        let args = BackupArgs {
            client: Some("db1".to_string()),
            dataset: Some("backup/db1".to_string()),
            kind: Some(BackupKind::Inc),
            volumes: vec![PathBuf::from("/dev/vg0/data")],
            ..BackupArgs::default()
        };
        let job = resolve_job(&settings(), &args).expect("job");
        assert_eq!(job.name, "backup/db1");
        assert_eq!(job.excludes, vec!["/tmp".to_string()]);
    }

    #[test]
    fn adhoc_job_needs_kind_and_volumes() {
        let mut args = BackupArgs {
            client: Some("db1".to_string()),
            dataset: Some("backup/db1".to_string()),
            volumes: vec![PathBuf::from("/dev/vg0/data")],
            ..BackupArgs::default()
        };
        assert!(resolve_job(&settings(), &args).is_err());
        args.kind = Some(BackupKind::Full);
        args.volumes.clear();
        assert!(resolve_job(&settings(), &args).is_err());
    }

    #[test]
    fn unknown_job_is_rejected() {
        let args = BackupArgs {
            job: Some("nope".to_string()),
            ..BackupArgs::default()
        };
        assert!(resolve_job(&settings(), &args).is_err());
    }
}
