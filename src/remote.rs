use std::path::Path;
use std::process::Command;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{RemoteError, Result};
use crate::types::ExitStatus;
use crate::util::command::{run_supervised, CancelToken, CommandOutput, Stream};

/// Runs an argv on another host and reports what it printed and how it exited.
pub trait RemoteExec {
    fn exec(
        &self,
        host: &str,
        argv: &[String],
        timeout: Option<Duration>,
        cancel: &CancelToken,
    ) -> Result<CommandOutput>;
}

#[derive(Debug, Clone, Default)]
pub struct Ssh {
    pub user: Option<String>,
    pub options: Vec<String>,
}

impl Ssh {
    pub fn new(user: Option<String>, options: Vec<String>) -> Self {
        Ssh { user, options }
    }

    pub fn target(&self, host: &str) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, host),
            None => host.to_string(),
        }
    }

    /// `ssh` plus options, as one shell word list (used by rsync `-e`).
    pub fn transport(&self) -> Vec<String> {
        let mut words = vec![
            "ssh".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
        ];
        words.extend(self.options.iter().cloned());
        words
    }
}

impl RemoteExec for Ssh {
    fn exec(
        &self,
        host: &str,
        argv: &[String],
        timeout: Option<Duration>,
        cancel: &CancelToken,
    ) -> Result<CommandOutput> {
        let transport = self.transport();
        let mut cmd = Command::new(&transport[0]);
        cmd.args(&transport[1..]).arg(self.target(host)).arg("--");
        cmd.args(argv);
        run_supervised(&mut cmd, timeout, cancel, |stream, line| match stream {
            Stream::Stdout => info!(host, "{}", line),
            Stream::Stderr => warn!(host, "{}", line),
        })
    }
}

/// Controller-side handle for the agent subcommands on one client.
pub struct AgentClient<'a> {
    remote: &'a dyn RemoteExec,
    host: &'a str,
    command: &'a str,
    timeout: Duration,
}

impl<'a> AgentClient<'a> {
    pub fn new(remote: &'a dyn RemoteExec, host: &'a str, command: &'a str, timeout: Duration) -> Self {
        AgentClient {
            remote,
            host,
            command,
            timeout,
        }
    }

    fn argv(&self, action: &str, volume: &Path, suffix: &str) -> Vec<String> {
        vec![
            self.command.to_string(),
            "agent".to_string(),
            action.to_string(),
            "--volume".to_string(),
            volume.to_string_lossy().to_string(),
            "--suffix".to_string(),
            suffix.to_string(),
        ]
    }

    /// Validate, snapshot and mount `volume` on the client.
    pub fn initiate_backup(&self, volume: &Path, suffix: &str, cancel: &CancelToken) -> Result<()> {
        let argv = self.argv("initiate-backup", volume, suffix);
        let output = self.remote.exec(self.host, &argv, Some(self.timeout), cancel)?;
        if !output.success() {
            return Err(RemoteError::Exit(
                format!("{} initiate-backup {}", self.host, volume.display()),
                output.code,
            )
            .into());
        }
        Ok(())
    }

    /// Unmount and destroy the snapshot; the agent's exit class is returned
    /// so the caller can tell "nothing to do" from a failed teardown.
    pub fn end_backup(&self, volume: &Path, suffix: &str, cancel: &CancelToken) -> Result<ExitStatus> {
        let argv = self.argv("end-backup", volume, suffix);
        let output = self.remote.exec(self.host, &argv, Some(self.timeout), cancel)?;
        Ok(ExitStatus::from_code(output.code))
    }
}
