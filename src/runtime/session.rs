use std::ffi::OsString;

use scan_errors::{enverr, ErrorCode};

use super::{DistributedRuntime, RuntimeStatus};
use crate::errors::Result;
use crate::logging::with_error_code;

/// Scoped ownership of an initialized runtime.
///
/// Use [`RuntimeSession::finish`] to finalize and observe the status. A session
/// dropped without `finish` (early return, panic) still finalizes and logs a
/// failing status.
pub struct RuntimeSession<R: DistributedRuntime> {
    runtime: R,
    active: bool,
}

impl<R: DistributedRuntime> RuntimeSession<R> {
    /// Initialize `runtime`. On failure nothing is finalized.
    pub fn start(mut runtime: R, args: &[OsString]) -> Result<Self> {
        let status = runtime.initialize(args);
        if !status.is_success() {
            return Err(
                enverr!(ErrorCode::RuntimeInitFailed, "runtime initialization failed")
                    .with_context("runtime", runtime.name())
                    .with_context("status", status.to_string()),
            );
        }
        log::debug!(target: "mpiscan::runtime", "runtime {} initialized", runtime.name());
        Ok(Self {
            runtime,
            active: true,
        })
    }

    pub fn runtime_name(&self) -> &'static str {
        self.runtime.name()
    }

    /// Finalize the runtime and report its status.
    pub fn finish(mut self) -> Result<()> {
        let status = self.finalize_once();
        if status.is_success() {
            log::debug!(
                target: "mpiscan::runtime",
                "runtime {} finalized",
                self.runtime.name()
            );
            Ok(())
        } else {
            Err(
                enverr!(ErrorCode::RuntimeFinalizeFailed, "runtime finalization failed")
                    .with_context("runtime", self.runtime.name())
                    .with_context("status", status.to_string()),
            )
        }
    }

    fn finalize_once(&mut self) -> RuntimeStatus {
        if !self.active {
            return RuntimeStatus::SUCCESS;
        }
        self.active = false;
        self.runtime.finalize()
    }
}

impl<R: DistributedRuntime> Drop for RuntimeSession<R> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let status = self.finalize_once();
        if !status.is_success() {
            with_error_code(ErrorCode::RuntimeFinalizeFailed, || {
                log::warn!(
                    target: "mpiscan::runtime",
                    status = status.raw();
                    "runtime {} failed to finalize during unwind",
                    self.runtime.name()
                );
            });
        }
    }
}
