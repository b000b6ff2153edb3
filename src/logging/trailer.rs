//! One-line JSON error trailers for callers that parse stderr.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use scan_errors::{ErrorCode, ErrorKind, ScanError};
use serde::Serialize;

use super::logger;

static ENABLED: AtomicBool = AtomicBool::new(false);

pub(crate) fn set_json_errors_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::SeqCst);
}

pub fn json_errors_enabled() -> bool {
    ENABLED.load(Ordering::SeqCst)
}

#[derive(Serialize)]
struct Trailer<'a> {
    run_id: &'a str,
    target_spec: Option<String>,
    error_code: ErrorCode,
    error_kind: ErrorKind,
    message: &'a str,
    context: IndexMap<&'a str, &'a str>,
}

/// Describe `err` on stderr when JSON errors are enabled.
pub fn emit_error_trailer(err: &ScanError) {
    if json_errors_enabled() {
        let _ = write_error_trailer(err, &mut io::stderr().lock());
    }
}

pub(crate) fn write_error_trailer<W: Write>(err: &ScanError, out: &mut W) -> io::Result<()> {
    let trailer = Trailer {
        run_id: logger::run_id(),
        target_spec: logger::active_target_spec(),
        error_code: err.code,
        error_kind: err.kind,
        message: err.message(),
        context: err
            .context
            .iter()
            .map(|(key, value)| (*key, value.as_str()))
            .collect(),
    };
    serde_json::to_writer(&mut *out, &trailer)?;
    out.write_all(b"\n")?;
    out.flush()
}
