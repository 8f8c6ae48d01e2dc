use zfsync::error::ZfsyncError;
use zfsync::types::ExitStatus;

fn main() {
    match zfsync::cli::run() {
        Ok(status) => std::process::exit(status.code()),
        Err(err) => {
            eprintln!("zfsync: {:#}", err);
            let status = match err.downcast_ref::<ZfsyncError>() {
                Some(ZfsyncError::Config(_)) => ExitStatus::Critical,
                _ => ExitStatus::Unknown,
            };
            std::process::exit(status.code());
        }
    }
}
