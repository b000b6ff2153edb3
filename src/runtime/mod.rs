//! Lifecycle of the distributed runtime library whose constants are probed.
//!
//! Constants exported by the runtime are only meaningful between a successful
//! initialize and the matching finalize. [`RuntimeSession`] holds that window
//! open and closes it on every exit path.

#[cfg(feature = "mpi")]
pub mod mpi;
mod session;

pub use session::RuntimeSession;

use std::ffi::OsString;
use std::fmt;

/// Raw status code returned by the runtime's lifecycle calls. Zero is success,
/// following `MPI_SUCCESS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeStatus(libc::c_int);

impl RuntimeStatus {
    pub const SUCCESS: RuntimeStatus = RuntimeStatus(0);

    pub const fn from_raw(code: libc::c_int) -> Self {
        Self(code)
    }

    pub const fn raw(self) -> libc::c_int {
        self.0
    }

    pub const fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-lifecycle contract of the runtime library.
pub trait DistributedRuntime {
    /// Short identifier used in logs and error context.
    fn name(&self) -> &'static str;

    /// Bring the runtime up, handing it the process arguments untouched.
    fn initialize(&mut self, args: &[OsString]) -> RuntimeStatus;

    /// Tear the runtime down. Called at most once, only after a successful initialize.
    fn finalize(&mut self) -> RuntimeStatus;
}
