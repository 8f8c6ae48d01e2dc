use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::args::{AgentCommand, Cli, Command, LockCommand};
use crate::cli::commands::{agent, backup, ledger, lock};
use crate::config::load_settings;
use crate::snapshot::Lvm;
use crate::types::ExitStatus;

pub mod args;
pub mod commands;

pub fn run() -> Result<ExitStatus> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = load_settings(cli.config.as_deref()).context("loading configuration")?;
    let status = match cli.command {
        Command::Backup(args) => backup::run_backup_command(&settings, args)?,
        Command::Agent { command } => match command {
            AgentCommand::InitiateBackup(args) => agent::run_initiate(&settings, &args, &Lvm),
            AgentCommand::EndBackup(args) => agent::run_end(&settings, &args, &Lvm),
        },
        Command::Lock { command } => match command {
            LockCommand::Status(args) => lock::run_status(&settings, &args.dataset)?,
            LockCommand::Cleanup(args) => lock::run_cleanup(&settings, &args.dataset, args.force)?,
        },
        Command::Ledger(args) => ledger::run_ledger(&settings, &args.dataset)?,
    };
    Ok(status)
}

/// Logs go to stderr so agent stdout stays clean for the controller.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
