use crate::cli::commands::job_dir;
use crate::config::Settings;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::types::ExitStatus;

pub fn run_ledger(settings: &Settings, dataset: &str) -> Result<ExitStatus> {
    let ledger = Ledger::new(&job_dir(settings, dataset)?, settings.ledger_max_records);
    let records = ledger.records();
    if records.is_empty() {
        println!("no records in {}", ledger.path().display());
        return Ok(ExitStatus::Warning);
    }
    for record in records {
        println!("{}", record.render());
    }
    Ok(ExitStatus::Ok)
}
