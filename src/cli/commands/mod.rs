pub mod agent;
pub mod backup;
pub mod ledger;
pub mod lock;

use std::path::PathBuf;

use crate::config::Settings;
use crate::error::{ConfigError, Result};
use crate::util::paths::{dataset_dir, is_safe_dataset};

/// Local directory of a job root named on the command line.
pub fn job_dir(settings: &Settings, dataset: &str) -> Result<PathBuf> {
    if !is_safe_dataset(dataset) {
        return Err(ConfigError::Invalid(format!(
            "dataset {} must be a relative name like pool/job",
            dataset
        ))
        .into());
    }
    Ok(dataset_dir(&settings.pool_mount_root, dataset))
}
