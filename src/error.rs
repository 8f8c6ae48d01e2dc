use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZfsyncError {
    #[error("{0}")]
    Message(String),
    #[error("{0}")]
    Config(ConfigError),
    #[error("{0}")]
    Lock(LockError),
    #[error("storage: {0}")]
    Storage(String),
    #[error("{0}")]
    Snapshot(SnapshotError),
    #[error("{0}")]
    Remote(RemoteError),
    #[error("transfer: {0}")]
    Transfer(String),
    #[error("{0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parse config: {0}")]
    Parse(String),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("create lock {0}: {1}")]
    Create(String, io::Error),
    #[error("remove lock {0}: {1}")]
    Remove(String, io::Error),
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("volume {0} is not a block device")]
    InvalidVolume(String),
    #[error("volume group {group} has {free} bytes free, snapshot needs more than {budget}")]
    InsufficientCapacity { group: String, free: u64, budget: u64 },
    #[error("create snapshot {0}")]
    CreateFailed(String),
    #[error("create mount directory {0}")]
    MountDirFailed(String),
    #[error("mount {0}")]
    MountFailed(String),
    #[error("teardown {0}")]
    TeardownFailed(String),
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("spawn {0}")]
    Spawn(String),
    #[error("{0} timed out after {1} seconds")]
    Timeout(String, u64),
    #[error("{0} cancelled")]
    Cancelled(String),
    #[error("{0} exited with code {1}")]
    Exit(String, i32),
}

pub type Result<T> = std::result::Result<T, ZfsyncError>;

impl ZfsyncError {
    pub fn message(msg: impl Into<String>) -> Self {
        ZfsyncError::Message(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        ZfsyncError::Storage(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ZfsyncError::Remote(RemoteError::Cancelled(_)))
    }
}

impl From<ConfigError> for ZfsyncError {
    fn from(err: ConfigError) -> Self {
        ZfsyncError::Config(err)
    }
}

impl From<LockError> for ZfsyncError {
    fn from(err: LockError) -> Self {
        ZfsyncError::Lock(err)
    }
}

impl From<SnapshotError> for ZfsyncError {
    fn from(err: SnapshotError) -> Self {
        ZfsyncError::Snapshot(err)
    }
}

impl From<RemoteError> for ZfsyncError {
    fn from(err: RemoteError) -> Self {
        ZfsyncError::Remote(err)
    }
}
