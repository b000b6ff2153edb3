//! Assembly and emission of the probe document.
//!
//! The document is a flat JSON object, one line per entry, so that the outputs
//! of two builds can be compared with a plain line diff:
//!
//! ```text
//! {
//! "value_MPI_BOTTOM" : 0,
//! "size_MPI_BOTTOM" : 8,
//! "value_MPI_IN_PLACE" : -1,
//! "size_MPI_IN_PLACE" : 8,
//! "_" : null}
//! ```

use std::fmt::Write as _;
use std::io::Write;

use scan_errors::{enverr, ensure_usage, ErrorCode};

use super::sentinel::ProbeResult;
use super::targets::ProbeTarget;
use crate::errors::Result;

/// Key of the closing entry terminating every document.
pub const TRAILER_KEY: &str = "_";

/// Results of one probe run, in target declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    entries: Vec<ProbeResult>,
}

impl ProbeReport {
    /// Read every target once, in order.
    pub fn collect(targets: &[ProbeTarget]) -> Result<Self> {
        ensure_usage!(
            !targets.is_empty(),
            ErrorCode::EmptyTargetSet,
            "probe target table is empty"
        );
        let entries = targets
            .iter()
            .map(|target| {
                let result = target.read();
                log::debug!(
                    target: "mpiscan::probe",
                    value = result.value(), size = result.size_bytes();
                    "read sentinel {}",
                    result.name()
                );
                result
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ProbeResult] {
        &self.entries
    }

    /// Render the complete document, including the trailing newline.
    pub fn render(&self) -> String {
        let mut document = String::from("{\n");
        for entry in &self.entries {
            let _ = writeln!(
                document,
                "\"value_{}\" : {},",
                entry.name(),
                entry.value()
            );
            let _ = writeln!(
                document,
                "\"size_{}\" : {},",
                entry.name(),
                entry.size_bytes()
            );
        }
        let _ = writeln!(document, "\"{}\" : null}}", TRAILER_KEY);
        document
    }

    /// Write the document to `out` in a single write followed by a flush.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        let document = self.render();
        out.write_all(document.as_bytes())
            .and_then(|()| out.flush())
            .map_err(|err| {
                enverr!(ErrorCode::OutputUnavailable, "failed to write probe report")
                    .with_context("bytes", document.len().to_string())
                    .with_context("io", err.to_string())
                    .with_source(err)
            })
    }
}
