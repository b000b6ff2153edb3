//! Shared helpers for turning `ScanError` into operator-facing text and exit codes.

use std::fmt::Write as _;

use scan_errors::{ErrorKind, ScanError, ScanResult};

/// Convenient alias for scan results used across the Rust modules.
pub type Result<T> = ScanResult<T>;

/// Exit status for caller mistakes (bad flags, bad configuration, missing files).
pub const EXIT_USAGE: u8 = 2;
/// Exit status for environment failures (runtime bootstrap, output channel, tools).
pub const EXIT_ENVIRONMENT: u8 = 1;
/// Exit status for internal bugs and contained panics.
pub const EXIT_INTERNAL: u8 = 70;

/// Render the stable error code alongside the human-readable message, context
/// payload and underlying cause.
pub fn describe(err: &ScanError) -> String {
    let mut message = err.to_string();
    if let Some(source) = err.source_ref() {
        let _ = write!(&mut message, ": caused by {}", source);
    }
    message
}

/// Map an error onto the process exit status reported by the binaries.
pub fn exit_code(err: &ScanError) -> u8 {
    match err.kind {
        ErrorKind::Usage => EXIT_USAGE,
        ErrorKind::Environment => EXIT_ENVIRONMENT,
        ErrorKind::Internal => EXIT_INTERNAL,
        _ => EXIT_INTERNAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_errors::{bug, enverr, usage, ErrorCode};
    use std::io;

    #[test]
    fn describe_appends_cause() {
        let err = enverr!(ErrorCode::OutputUnavailable, "failed to write probe report")
            .with_context("bytes", "120")
            .with_source(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"));
        assert_eq!(
            describe(&err),
            "[ERR_OUTPUT_UNAVAILABLE] failed to write probe report (bytes=120): caused by broken pipe"
        );
    }

    #[test]
    fn every_kind_maps_to_a_failing_status() {
        let usage_err = usage!(ErrorCode::SourceMissing, "no source");
        let env_err = enverr!(ErrorCode::RuntimeInitFailed, "init failed");
        let internal = bug!(ErrorCode::Unknown, "oops");
        assert_eq!(exit_code(&usage_err), EXIT_USAGE);
        assert_eq!(exit_code(&env_err), EXIT_ENVIRONMENT);
        assert_eq!(exit_code(&internal), EXIT_INTERNAL);
        assert!([EXIT_USAGE, EXIT_ENVIRONMENT, EXIT_INTERNAL]
            .iter()
            .all(|code| *code != 0));
    }
}
