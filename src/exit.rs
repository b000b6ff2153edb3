//! Process boundary for the binaries: error reporting with panic containment.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::process::ExitCode;

use scan_errors::{bug, ErrorCode, ScanError, ScanResult};

use crate::errors::{describe, exit_code};
use crate::logging;

/// Execute a binary's body, logging any `ScanError` (or contained panic) and
/// translating it into the process exit status.
pub fn run_main<F>(label: &'static str, operation: F) -> ExitCode
where
    F: FnOnce() -> ScanResult<()>,
{
    match dispatch(label, operation) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => ExitCode::from(report(label, &err)),
    }
}

/// Execute `operation`, converting panics into `Internal` errors.
pub fn dispatch<T, F>(label: &'static str, operation: F) -> ScanResult<T>
where
    F: FnOnce() -> ScanResult<T>,
{
    match catch_unwind(AssertUnwindSafe(operation)) {
        Ok(result) => result,
        Err(payload) => Err(panic_to_error(label, payload)),
    }
}

/// Log `err`, emit its JSON trailer and return the exit status it maps to.
pub fn report(label: &str, err: &ScanError) -> u8 {
    logging::log_scan_error(label, err);
    logging::emit_error_trailer(err);
    eprintln!("{label}: {}", describe(err));
    exit_code(err)
}

fn panic_to_error(label: &'static str, payload: Box<dyn Any + Send>) -> ScanError {
    let message = panic_payload_to_string(&payload);
    bug!(ErrorCode::Unknown, "panic in {label}: {message}")
}

fn panic_payload_to_string(payload: &Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
