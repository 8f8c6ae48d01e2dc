pub mod backup;
pub mod chain;
pub mod cli;
pub mod config;
pub mod error;
pub mod ledger;
pub mod lock;
pub mod mount;
pub mod remote;
pub mod signal_handler;
pub mod snapshot;
pub mod types;
pub mod util;

#[cfg(test)]
mod testing;
