use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::error::{Result, ZfsyncError};
use crate::remote::Ssh;
use crate::util::command::{nice_ionice, run_supervised, CancelToken, Stream};

/// rsync: "partial transfer due to vanished source files".
const RSYNC_VANISHED: i32 = 24;

/// Copies a directory on a remote host into a local directory.
pub trait Transfer {
    fn sync(
        &self,
        host: &str,
        source: &Path,
        dest: &Path,
        excludes: &[String],
        cancel: &CancelToken,
    ) -> Result<i32>;
}

pub fn transfer_succeeded(code: i32) -> bool {
    code == 0 || code == RSYNC_VANISHED
}

pub struct Rsync {
    ssh: Ssh,
    extra: Vec<String>,
    timeout: Option<Duration>,
}

impl Rsync {
    pub fn new(ssh: Ssh, extra: Vec<String>, timeout: Option<Duration>) -> Self {
        Rsync { ssh, extra, timeout }
    }

    pub fn args(&self, host: &str, source: &Path, dest: &Path, excludes_file: Option<&Path>) -> Vec<String> {
        let mut args = vec![
            "rsync".to_string(),
            "-aHAX".to_string(),
            "--numeric-ids".to_string(),
            "--inplace".to_string(),
            "--delete".to_string(),
            "--stats".to_string(),
            "-e".to_string(),
            self.ssh.transport().join(" "),
        ];
        if let Some(file) = excludes_file {
            args.push(format!("--exclude-from={}", file.display()));
        }
        args.extend(self.extra.iter().cloned());
        args.push(format!(
            "{}:{}/",
            self.ssh.target(host),
            source.display().to_string().trim_end_matches('/')
        ));
        args.push(format!("{}/", dest.display().to_string().trim_end_matches('/')));
        args
    }
}

impl Transfer for Rsync {
    fn sync(
        &self,
        host: &str,
        source: &Path,
        dest: &Path,
        excludes: &[String],
        cancel: &CancelToken,
    ) -> Result<i32> {
        let excludes_file = if excludes.is_empty() {
            None
        } else {
            Some(create_excludes_file(excludes)?)
        };
        let args = self.args(
            host,
            source,
            dest,
            excludes_file.as_ref().map(|f| f.path()),
        );
        let mut cmd = nice_ionice(&args);
        let output = run_supervised(&mut cmd, self.timeout, cancel, |stream, line| match stream {
            Stream::Stdout => info!(dest = %dest.display(), "{}", line),
            Stream::Stderr => warn!(dest = %dest.display(), "{}", line),
        })?;
        Ok(output.code)
    }
}

fn create_excludes_file(excludes: &[String]) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()
        .map_err(|e| ZfsyncError::Transfer(format!("create excludes file: {}", e)))?;
    for exclude in excludes {
        writeln!(file, "{}", exclude)?;
    }
    file.flush()?;
    Ok(file)
}
