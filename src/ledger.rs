//! Bounded, line-oriented record of backup attempts for one job.
//!
//! Each line is `timestamp,suffix,outcome`. The last line describes the
//! attempt in progress (or just finished); the one before it is the last
//! completed attempt. Reads never fail: a missing or unreadable ledger is
//! reported as "unknown" so callers can fall back to a full backup.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{Result, ZfsyncError};
use crate::types::Outcome;

pub const LEDGER_FILE_NAME: &str = ".zfsync.status";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub timestamp: String,
    pub suffix: String,
    pub outcome: Outcome,
}

impl Record {
    pub fn new(suffix: &str, outcome: Outcome) -> Self {
        Record {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            suffix: suffix.to_string(),
            outcome,
        }
    }

    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.trim().splitn(3, ',');
        let timestamp = fields.next()?.trim();
        let suffix = fields.next()?.trim();
        let outcome = fields.next()?.parse().ok()?;
        if timestamp.is_empty() || suffix.is_empty() {
            return None;
        }
        Some(Record {
            timestamp: timestamp.to_string(),
            suffix: suffix.to_string(),
            outcome,
        })
    }

    pub fn render(&self) -> String {
        format!("{},{},{}", self.timestamp, self.suffix, self.outcome)
    }
}

#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    max_records: usize,
}

impl Ledger {
    pub fn new(job_dir: &Path, max_records: usize) -> Self {
        Ledger {
            path: job_dir.join(LEDGER_FILE_NAME),
            max_records,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// With `suffix`, the newest outcome recorded for that attempt; without,
    /// the outcome of the previous attempt (second-to-last line).
    pub fn read(&self, suffix: Option<&str>) -> Option<Outcome> {
        let lines = self.lines()?;
        match suffix {
            Some(suffix) => lines
                .iter()
                .rev()
                .filter_map(|line| Record::parse(line))
                .find(|record| record.suffix == suffix)
                .map(|record| record.outcome),
            None => {
                if lines.len() < 2 {
                    return None;
                }
                Record::parse(&lines[lines.len() - 2]).map(|record| record.outcome)
            }
        }
    }

    /// Parsable records, oldest first.
    pub fn records(&self) -> Vec<Record> {
        self.lines()
            .unwrap_or_default()
            .iter()
            .filter_map(|line| Record::parse(line))
            .collect()
    }

    /// Records `outcome` for `suffix`, replacing the last line when it belongs
    /// to the same attempt, then trims to the newest `max_records` lines.
    pub fn write(&self, suffix: &str, outcome: Outcome) -> Result<()> {
        let mut lines = match fs::read_to_string(&self.path) {
            Ok(text) => non_blank(&text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                return Err(ZfsyncError::message(format!(
                    "read ledger {}: {}",
                    self.path.display(),
                    err
                )))
            }
        };
        let record = Record::new(suffix, outcome).render();
        let same_attempt = lines
            .last()
            .and_then(|line| Record::parse(line))
            .map(|last| last.suffix == suffix)
            .unwrap_or(false);
        if same_attempt {
            if let Some(last) = lines.last_mut() {
                *last = record;
            }
        } else {
            lines.push(record);
        }
        if lines.len() > self.max_records {
            let excess = lines.len() - self.max_records;
            lines.drain(..excess);
        }
        self.persist(&lines)
            .map_err(|e| ZfsyncError::message(format!("write ledger {}: {}", self.path.display(), e)))?;
        debug!(ledger = %self.path.display(), suffix, outcome = %outcome, "ledger updated");
        Ok(())
    }

    fn lines(&self) -> Option<Vec<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Some(non_blank(&text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(ledger = %self.path.display(), error = %err, "ledger unreadable");
                None
            }
        }
    }

    fn persist(&self, lines: &[String]) -> io::Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        for line in lines {
            writeln!(tmp, "{}", line)?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

fn non_blank(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_ledger_reads_as_unknown() {
        let dir = TempDir::new().expect("tempdir");
        let ledger = Ledger::new(dir.path(), 5);
        assert_eq!(ledger.read(None), None);
        assert_eq!(ledger.read(Some("_rsyncbackup_x")), None);
        assert!(ledger.records().is_empty());
    }

    #[test]
    fn same_attempt_overwrites_last_record() {
        let dir = TempDir::new().expect("tempdir");
        let ledger = Ledger::new(dir.path(), 5);
        ledger.write("_a", Outcome::Successful).expect("write");
        ledger.write("_b", Outcome::Running).expect("write");
        ledger.write("_b", Outcome::Failed).expect("write");
        let records = ledger.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].outcome, Outcome::Failed);
        assert_eq!(ledger.read(Some("_b")), Some(Outcome::Failed));
        assert_eq!(ledger.read(None), Some(Outcome::Successful));
    }

    #[test]
    fn previous_attempt_needs_two_records() {
        let dir = TempDir::new().expect("tempdir");
        let ledger = Ledger::new(dir.path(), 5);
        ledger.write("_a", Outcome::Running).expect("write");
        assert_eq!(ledger.read(None), None);
    }

    #[test]
    fn ledger_is_bounded_newest_last() {
        let dir = TempDir::new().expect("tempdir");
        let ledger = Ledger::new(dir.path(), 3);
        for n in 0..7 {
            ledger
                .write(&format!("_attempt{}", n), Outcome::Successful)
                .expect("write");
        }
        let suffixes: Vec<String> = ledger.records().into_iter().map(|r| r.suffix).collect();
        assert_eq!(suffixes, vec!["_attempt4", "_attempt5", "_attempt6"]);
        let text = fs::read_to_string(ledger.path()).expect("read");
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn corrupt_lines_are_unknown_not_errors() {
        let dir = TempDir::new().expect("tempdir");
        let ledger = Ledger::new(dir.path(), 5);
        fs::write(
            ledger.path(),
            "2024-01-01T00:00:00Z,_a,SUCCESSFUL\ngarbage\n2024-01-02T00:00:00Z,_b,RUNNING\n",
        )
        .expect("write");
        assert_eq!(ledger.read(None), None);
        assert_eq!(ledger.read(Some("_a")), Some(Outcome::Successful));
        assert_eq!(ledger.read(Some("_zzz")), None);
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let dir = TempDir::new().expect("tempdir");
        let ledger = Ledger::new(&dir.path().join("gone"), 5);
        assert!(ledger.write("_a", Outcome::Running).is_err());
    }
}
