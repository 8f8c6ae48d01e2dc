use std::thread;

use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use tracing::{error, warn};

use crate::util::command::CancelToken;

/// Trips `cancel` on SIGINT/SIGTERM. The running step kills its child
/// process and the caller's cleanup path takes over from there.
pub fn signal_handler(cancel: &CancelToken) {
    let cancel = cancel.clone();
    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(err) => {
            error!(error = %err, "signal handler setup failed");
            return;
        }
    };
    thread::spawn(move || {
        for signal in signals.forever() {
            warn!(signal, "interrupted; stopping after cleanup");
            cancel.cancel();
        }
    });
}
