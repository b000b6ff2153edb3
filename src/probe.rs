//! The sentinel probe: read a fixed table of constants while the distributed
//! runtime is up and emit one document describing them.

mod report;
mod sentinel;
mod targets;

pub use report::{ProbeReport, TRAILER_KEY};
pub use sentinel::{format_sentinel, NativeLong, ProbeResult, Sentinel};
pub use targets::ProbeTarget;

use std::ffi::OsString;
use std::io::Write;

use crate::errors::Result;
use crate::runtime::{DistributedRuntime, RuntimeSession};

/// Perform one probe run.
///
/// The runtime is initialized with `args`, every target is read, the report is
/// written to `out` and the runtime is finalized. When writing fails the
/// session is still released before the error is returned.
pub fn run_probe<R, W>(
    runtime: R,
    args: &[OsString],
    targets: &[ProbeTarget],
    out: &mut W,
) -> Result<()>
where
    R: DistributedRuntime,
    W: Write,
{
    let session = RuntimeSession::start(runtime, args)?;
    let report = ProbeReport::collect(targets)?;
    report.write_to(out)?;
    log::info!(
        target: "mpiscan::probe",
        entries = report.entries().len();
        "probe report written for runtime {}",
        session.runtime_name()
    );
    session.finish()
}
