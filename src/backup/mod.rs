//! Controller control loop for one job: ledger, lock, chain unit, then one
//! snapshot/transfer/teardown cycle per volume, strictly in sequence.

pub mod rsync;

use std::path::Path;

use tracing::{error, info, warn};

use crate::chain::{ChainStore, ChainUnit, VersionedStorage};
use crate::config::{Job, Settings};
use crate::error::{RemoteError, Result, ZfsyncError};
use crate::ledger::Ledger;
use crate::lock::{self, LockGuard, LockState};
use crate::remote::{AgentClient, RemoteExec};
use crate::types::{volume_name, Attempt, ExitStatus, Outcome};
use crate::util::command::CancelToken;
use crate::util::paths::dataset_dir;

use self::rsync::{transfer_succeeded, Transfer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub status: ExitStatus,
    pub outcome: Outcome,
    pub unit: Option<ChainUnit>,
    pub warnings: Vec<String>,
}

impl RunReport {
    fn new(status: ExitStatus, outcome: Outcome) -> Self {
        RunReport {
            status,
            outcome,
            unit: None,
            warnings: Vec::new(),
        }
    }
}

pub struct Orchestrator<'a> {
    settings: &'a Settings,
    storage: &'a dyn VersionedStorage,
    remote: &'a dyn RemoteExec,
    transfer: &'a dyn Transfer,
    cancel: &'a CancelToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        settings: &'a Settings,
        storage: &'a dyn VersionedStorage,
        remote: &'a dyn RemoteExec,
        transfer: &'a dyn Transfer,
        cancel: &'a CancelToken,
    ) -> Self {
        Orchestrator {
            settings,
            storage,
            remote,
            transfer,
            cancel,
        }
    }

    pub fn run(&self, job: &Job, attempt: &Attempt) -> RunReport {
        let suffix = attempt.suffix();
        let job_dir = dataset_dir(&self.settings.pool_mount_root, &job.dataset);
        let ledger = Ledger::new(&job_dir, self.settings.ledger_max_records);
        info!(
            job = %job.name,
            client = %job.client,
            dataset = %job.dataset,
            kind = %job.kind,
            suffix = %suffix,
            "backup started"
        );

        record(&ledger, &suffix, Outcome::Running);
        match self.storage.exists(&job.dataset) {
            Ok(true) => {}
            Ok(false) => {
                error!(dataset = %job.dataset, "job root does not exist");
                record(&ledger, &suffix, Outcome::Failed);
                return RunReport::new(ExitStatus::Critical, Outcome::Failed);
            }
            Err(err) => {
                error!(dataset = %job.dataset, error = %err, "cannot check job root");
                record(&ledger, &suffix, Outcome::Failed);
                return RunReport::new(ExitStatus::Critical, Outcome::Failed);
            }
        }

        let lock_file = lock::lock_path(&job_dir);
        let guard = match LockGuard::acquire(&lock_file) {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                report_contention(&lock_file);
                record(&ledger, &suffix, Outcome::Failed);
                return RunReport::new(ExitStatus::Warning, Outcome::Failed);
            }
            Err(err) => {
                error!(error = %err, "cannot create lock");
                record(&ledger, &suffix, Outcome::Failed);
                return RunReport::new(ExitStatus::Critical, Outcome::Failed);
            }
        };

        let mut report = match self.run_locked(job, attempt, &ledger) {
            Ok((unit, warnings)) => {
                record(&ledger, &suffix, Outcome::Successful);
                info!(unit = %unit.dataset, "backup finished");
                RunReport {
                    status: ExitStatus::Ok,
                    outcome: Outcome::Successful,
                    unit: Some(unit),
                    warnings,
                }
            }
            Err(err) => {
                error!(job = %job.name, error = %err, "backup failed");
                record(&ledger, &suffix, Outcome::Failed);
                RunReport::new(ExitStatus::Critical, Outcome::Failed)
            }
        };

        if let Err(err) = guard.release() {
            error!(error = %err, "lock not released; next run will need cleanup");
            report.status = report.status.max(ExitStatus::Warning);
            report.warnings.push(err.to_string());
        }
        report
    }

    fn run_locked(
        &self,
        job: &Job,
        attempt: &Attempt,
        ledger: &Ledger,
    ) -> Result<(ChainUnit, Vec<String>)> {
        let store = ChainStore::new(self.storage, ledger);
        let unit = store.create_unit(&job.dataset, job.kind, attempt)?;
        let agent = AgentClient::new(
            self.remote,
            &job.client,
            &self.settings.agent_command,
            self.settings.remote_timeout,
        );
        let suffix = attempt.suffix();
        let mut warnings = Vec::new();
        for volume in &job.volumes {
            if self.cancel.is_cancelled() {
                return Err(RemoteError::Cancelled(format!("backup of {}", job.name)).into());
            }
            if let Some(warning) = self.backup_volume(&agent, job, &unit, volume, &suffix)? {
                warnings.push(warning);
            }
        }
        Ok((unit, warnings))
    }

    /// One volume: snapshot on the agent, copy, then tear the snapshot down
    /// whatever the copy did. Returns a teardown warning, if any.
    fn backup_volume(
        &self,
        agent: &AgentClient<'_>,
        job: &Job,
        unit: &ChainUnit,
        volume: &Path,
        suffix: &str,
    ) -> Result<Option<String>> {
        let name = volume_name(volume).ok_or_else(|| {
            ZfsyncError::message(format!("volume {} has no name", volume.display()))
        })?;
        if let Err(err) = agent.initiate_backup(volume, suffix, self.cancel) {
            // The agent may still finish creating the snapshot after ssh is
            // killed locally.
            if matches!(
                err,
                ZfsyncError::Remote(RemoteError::Timeout(..) | RemoteError::Cancelled(_))
            ) {
                if let Some(warning) = self.teardown(agent, job, volume, suffix) {
                    warn!("{}", warning);
                }
            }
            return Err(err);
        }

        let source = self
            .settings
            .agent_mount_root
            .join(format!("{}{}", name, suffix));
        let dest = unit.dir(&self.settings.pool_mount_root).join(&name);
        info!(volume = %volume.display(), dest = %dest.display(), "transfer started");
        let transferred = match self
            .transfer
            .sync(&job.client, &source, &dest, &job.excludes, self.cancel)
        {
            Ok(code) if transfer_succeeded(code) => Ok(()),
            Ok(code) => Err(ZfsyncError::Transfer(format!(
                "{} exited with code {}",
                volume.display(),
                code
            ))),
            Err(err) => Err(err),
        };

        let warning = self.teardown(agent, job, volume, suffix);
        if let Some(warning) = &warning {
            warn!("{}", warning);
        }

        transferred?;
        info!(volume = %volume.display(), "transfer finished");
        Ok(warning)
    }

    /// Asks the agent to remove the snapshot. Uses its own token so it still
    /// runs after a signal. Returns a warning when teardown did not succeed.
    fn teardown(
        &self,
        agent: &AgentClient<'_>,
        job: &Job,
        volume: &Path,
        suffix: &str,
    ) -> Option<String> {
        match agent.end_backup(volume, suffix, &CancelToken::new()) {
            Ok(ExitStatus::Ok) => {
                info!(volume = %volume.display(), "snapshot removed");
                None
            }
            Ok(ExitStatus::Warning) => {
                warn!(volume = %volume.display(), "nothing to tear down on agent");
                None
            }
            Ok(status) => Some(format!(
                "teardown of {} on {} exited with code {}",
                volume.display(),
                job.client,
                status.code()
            )),
            Err(err) => Some(format!("teardown of {}: {}", volume.display(), err)),
        }
    }
}

fn record(ledger: &Ledger, suffix: &str, outcome: Outcome) {
    if let Err(err) = ledger.write(suffix, outcome) {
        warn!(outcome = %outcome, error = %err, "ledger not updated");
    }
}

fn report_contention(lock_file: &Path) {
    match lock::inspect(lock_file) {
        Ok(LockState::Stale(owner)) => warn!(
            lock = %lock_file.display(),
            owner = %owner,
            "lock held by a process that no longer runs; run `zfsync lock cleanup`"
        ),
        Ok(LockState::Held(owner)) => {
            warn!(lock = %lock_file.display(), owner = %owner, "job is already running")
        }
        Ok(state) => warn!(lock = %lock_file.display(), state = ?state, "job is locked"),
        Err(err) => warn!(lock = %lock_file.display(), error = %err, "job is locked"),
    }
}
