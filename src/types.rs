use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{NaiveDateTime, Utc};

/// Fixed-width UTC stamp; names built from it sort in creation order.
pub const STAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";
pub const SUFFIX_PREFIX: &str = "_rsyncbackup_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackupKind {
    Full,
    Diff,
    Inc,
}

impl BackupKind {
    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(BackupKind::Full),
            "diff" | "differential" => Ok(BackupKind::Diff),
            "inc" | "incremental" => Ok(BackupKind::Inc),
            _ => Err(format!(
                "invalid backup kind {}; expected full, diff, or inc",
                value
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::Full => "full",
            BackupKind::Diff => "diff",
            BackupKind::Inc => "inc",
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome column of a ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Running,
    Successful,
    Warning,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Running => "RUNNING",
            Outcome::Successful => "SUCCESSFUL",
            Outcome::Warning => "WARNING",
            Outcome::Failed => "FAILED",
        }
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "RUNNING" => Ok(Outcome::Running),
            "SUCCESSFUL" => Ok(Outcome::Successful),
            "WARNING" => Ok(Outcome::Warning),
            "FAILED" => Ok(Outcome::Failed),
            other => Err(format!("unknown outcome {}", other)),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process exit classes shared by the controller and the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExitStatus {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Ok => 0,
            ExitStatus::Warning => 1,
            ExitStatus::Critical => 2,
            ExitStatus::Unknown => 3,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ExitStatus::Ok,
            1 => ExitStatus::Warning,
            2 => ExitStatus::Critical,
            _ => ExitStatus::Unknown,
        }
    }
}

/// One backup attempt, identified by the time it started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    stamp: String,
}

impl Attempt {
    pub fn now() -> Self {
        Attempt {
            stamp: Utc::now().format(STAMP_FORMAT).to_string(),
        }
    }

    pub fn from_stamp(stamp: &str) -> Result<Self, String> {
        NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT)
            .map_err(|e| format!("invalid stamp {}: {}", stamp, e))?;
        Ok(Attempt {
            stamp: stamp.to_string(),
        })
    }

    pub fn stamp(&self) -> &str {
        &self.stamp
    }

    pub fn suffix(&self) -> String {
        suffix_for_stamp(&self.stamp)
    }
}

pub fn suffix_for_stamp(stamp: &str) -> String {
    format!("{}{}", SUFFIX_PREFIX, stamp)
}

/// Last path component of a volume path, `/dev/vg0/lv0` -> `lv0`.
pub fn volume_name(volume: &Path) -> Option<String> {
    volume
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_kind_accepts_long_names() {
        assert_eq!(BackupKind::parse("incremental"), Ok(BackupKind::Inc));
        assert_eq!(BackupKind::parse(" DIFF "), Ok(BackupKind::Diff));
        assert!(BackupKind::parse("weekly").is_err());
    }

    #[test]
    fn outcome_parse_is_exact() {
        assert_eq!("FAILED".parse::<Outcome>(), Ok(Outcome::Failed));
        assert!("failed".parse::<Outcome>().is_err());
    }

    #[test]
    fn stamps_sort_chronologically() {
        let earlier = Attempt::from_stamp("2024-01-09T23-59-59").expect("stamp");
        let later = Attempt::from_stamp("2024-01-10T00-00-00").expect("stamp");
        assert!(earlier.stamp() < later.stamp());
        assert_eq!(later.suffix(), "_rsyncbackup_2024-01-10T00-00-00");
        assert!(Attempt::from_stamp("2024-1-10 00:00").is_err());
    }

    #[test]
    fn volume_name_is_last_component() {
        assert_eq!(volume_name(Path::new("/dev/vg0/lv0")).as_deref(), Some("lv0"));
        assert_eq!(volume_name(Path::new("/")), None);
    }
}
