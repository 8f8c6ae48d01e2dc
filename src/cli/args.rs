use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::types::BackupKind;

#[derive(Parser, Debug)]
#[command(name = "zfsync", version, about = "LVM snapshot backups into ZFS clone chains")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Back up one job from the controller.
    Backup(BackupArgs),
    /// Snapshot actions run on the protected host.
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },
    Lock {
        #[command(subcommand)]
        command: LockCommand,
    },
    /// Print the status ledger of a job root.
    Ledger(DatasetArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct BackupArgs {
    /// Job from the configuration file.
    #[arg(long, conflicts_with_all = ["client", "dataset"])]
    pub job: Option<String>,
    #[arg(long)]
    pub client: Option<String>,
    #[arg(long)]
    pub dataset: Option<String>,
    #[arg(long, value_parser = BackupKind::parse)]
    pub kind: Option<BackupKind>,
    /// Extra rsync argument; repeat for more.
    #[arg(long = "rsync-arg", allow_hyphen_values = true)]
    pub rsync: Vec<String>,
    pub volumes: Vec<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AgentCommand {
    InitiateBackup(AgentArgs),
    EndBackup(AgentArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AgentArgs {
    #[arg(long)]
    pub volume: PathBuf,
    #[arg(long)]
    pub suffix: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum LockCommand {
    Status(DatasetArgs),
    /// Remove a lock left behind by a run that no longer exists.
    Cleanup(CleanupArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DatasetArgs {
    #[arg(long)]
    pub dataset: String,
}

#[derive(Args, Debug, Clone)]
pub struct CleanupArgs {
    #[arg(long)]
    pub dataset: String,
    /// Also remove a lock whose owner still appears to be running.
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_agent_invocation() {
        let cli = Cli::try_parse_from([
            "zfsync",
            "agent",
            "initiate-backup",
            "--volume",
            "/dev/vg0/lv0",
            "--suffix",
            "_rsyncbackup_2024-01-01T00-00-00",
        ])
        .expect("parse");
        match cli.command {
            Command::Agent {
                command: AgentCommand::InitiateBackup(args),
            } => {
                assert_eq!(args.volume, PathBuf::from("/dev/vg0/lv0"));
                assert_eq!(args.suffix, "_rsyncbackup_2024-01-01T00-00-00");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn parses_adhoc_backup() {
        let cli = Cli::try_parse_from([
            "zfsync",
            "--verbose",
            "backup",
            "--client",
            "web1",
            "--dataset",
            "backup/web1",
            "--kind",
            "incremental",
            "--rsync-arg",
            "--bwlimit=1000",
            "/dev/vg0/root",
            "/dev/vg0/home",
        ])
        .expect("parse");
        assert!(cli.verbose);
        match cli.command {
            Command::Backup(args) => {
                assert_eq!(args.kind, Some(BackupKind::Inc));
                assert_eq!(args.rsync, vec!["--bwlimit=1000".to_string()]);
                assert_eq!(args.volumes.len(), 2);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn job_conflicts_with_adhoc_target() {
        assert!(Cli::try_parse_from([
            "zfsync", "backup", "--job", "web1", "--client", "web1"
        ])
        .is_err());
    }
}
