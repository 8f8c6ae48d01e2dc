use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{RemoteError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared flag tripped by the signal handler; checked by every running child.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

pub fn describe(cmd: &Command) -> String {
    let program = cmd.get_program().to_string_lossy();
    let args: Vec<String> = cmd
        .get_args()
        .map(|a| a.to_string_lossy().to_string())
        .collect();
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Runs a short local command to completion and captures its output.
pub fn run_command(cmd: &mut Command) -> Result<CommandOutput> {
    debug!(command = %describe(cmd), "run");
    let program = cmd.get_program().to_string_lossy().to_string();
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|e| RemoteError::Spawn(format!("{}: {}", program, e)))?;
    Ok(CommandOutput {
        code: output.status.code().unwrap_or(1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

pub fn nice_ionice(args: &[String]) -> Command {
    let mut cmd = Command::new("nice");
    cmd.arg("-n")
        .arg("19")
        .arg("ionice")
        .arg("-c")
        .arg("3")
        .arg("-n7");
    for arg in args {
        cmd.arg(arg);
    }
    cmd
}

/// Runs a command while forwarding its output line by line, killing it when
/// `timeout` elapses or `cancel` is tripped. A non-zero exit is not an error
/// here; callers interpret `CommandOutput::code`.
pub fn run_supervised<F>(
    cmd: &mut Command,
    timeout: Option<Duration>,
    cancel: &CancelToken,
    mut on_line: F,
) -> Result<CommandOutput>
where
    F: FnMut(Stream, &str),
{
    let label = describe(cmd);
    debug!(command = %label, "run");
    let program = cmd.get_program().to_string_lossy().to_string();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| RemoteError::Spawn(format!("{}: {}", program, e)))?;

    let (tx, rx) = mpsc::channel();
    let mut readers = Vec::new();
    if let Some(out) = child.stdout.take() {
        readers.push(spawn_reader(out, Stream::Stdout, tx.clone()));
    }
    if let Some(err) = child.stderr.take() {
        readers.push(spawn_reader(err, Stream::Stderr, tx.clone()));
    }
    drop(tx);

    let deadline = timeout.map(|t| Instant::now() + t);
    let mut output = CommandOutput::default();
    let mut collect = |stream: Stream, line: String, output: &mut CommandOutput| {
        on_line(stream, &line);
        let buf = match stream {
            Stream::Stdout => &mut output.stdout,
            Stream::Stderr => &mut output.stderr,
        };
        buf.push_str(&line);
        buf.push('\n');
    };

    let status = loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok((stream, line)) => collect(stream, line, &mut output),
            Err(RecvTimeoutError::Disconnected) => thread::sleep(POLL_INTERVAL),
            Err(RecvTimeoutError::Timeout) => {}
        }
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(RemoteError::Cancelled(label).into());
        }
        if let (Some(deadline), Some(timeout)) = (deadline, timeout) {
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RemoteError::Timeout(label, timeout.as_secs()).into());
            }
        }
    };

    for (stream, line) in rx.iter() {
        collect(stream, line, &mut output);
    }
    for reader in readers {
        let _ = reader.join();
    }
    output.code = status.code().unwrap_or(1);
    Ok(output)
}

fn spawn_reader<R>(source: R, stream: Stream, tx: Sender<(Stream, String)>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        for line in BufReader::new(source).lines() {
            let Ok(line) = line else { break };
            if tx.send((stream, line)).is_err() {
                break;
            }
        }
    })
}
