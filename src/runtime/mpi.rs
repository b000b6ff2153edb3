//! MPI backend: `MPI_Init` / `MPI_Finalize` and the sentinel constants.
//!
//! `MPI_BOTTOM` and `MPI_IN_PLACE` are preprocessor macros whose type differs
//! between implementations. Their value and `sizeof` are taken by a C shim
//! compiled with the implementation's `mpicc` (see `build.rs`), so a change of
//! either shows up in the document.

use std::ffi::{CString, OsString};
use std::os::raw::{c_char, c_int};
use std::os::unix::ffi::OsStrExt;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use mpi_sys as ffi;

use super::{DistributedRuntime, RuntimeStatus};
use crate::probe::ProbeTarget;
use crate::probe_target;

/// Status reported when initialization is attempted twice in one process.
const STATUS_ALREADY_INITIALIZED: c_int = -1;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

mod shim {
    use std::os::raw::c_long;

    extern "C" {
        pub fn mpiscan_bottom_value() -> c_long;
        pub fn mpiscan_bottom_size() -> usize;
        pub fn mpiscan_in_place_value() -> c_long;
        pub fn mpiscan_in_place_size() -> usize;
    }
}

/// The sentinels probed in an MPI build, in emission order.
// SAFETY (all four calls): the shim functions take no arguments and only
// return compile-time properties of the macros.
pub static MPI_TARGETS: &[ProbeTarget] = &[
    probe_target!(
        MPI_BOTTOM,
        value = unsafe { shim::mpiscan_bottom_value() },
        size = unsafe { shim::mpiscan_bottom_size() },
    ),
    probe_target!(
        MPI_IN_PLACE,
        value = unsafe { shim::mpiscan_in_place_value() },
        size = unsafe { shim::mpiscan_in_place_size() },
    ),
];

/// Handle to the process-wide MPI library.
#[derive(Default)]
pub struct MpiRuntime {
    // MPI may keep pointers into argv after `MPI_Init`, so the strings live as
    // long as the runtime.
    argv: Vec<CString>,
    argv_ptrs: Vec<*mut c_char>,
}

impl MpiRuntime {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DistributedRuntime for MpiRuntime {
    fn name(&self) -> &'static str {
        "mpi"
    }

    fn initialize(&mut self, args: &[OsString]) -> RuntimeStatus {
        if INITIALIZED.swap(true, Ordering::SeqCst) {
            log::error!(
                target: "mpiscan::runtime",
                "MPI_Init called twice in one process"
            );
            return RuntimeStatus::from_raw(STATUS_ALREADY_INITIALIZED);
        }

        // Process arguments never contain NUL, so nothing is dropped here.
        self.argv = args
            .iter()
            .filter_map(|arg| CString::new(arg.as_bytes()).ok())
            .collect();
        self.argv_ptrs = self
            .argv
            .iter()
            .map(|arg| arg.as_ptr() as *mut c_char)
            .collect();
        self.argv_ptrs.push(ptr::null_mut());

        let mut argc = self.argv.len() as c_int;
        let mut argv = self.argv_ptrs.as_mut_ptr();
        // SAFETY: argc/argv describe a NULL-terminated array of NUL-terminated
        // strings owned by `self`, which outlives the MPI session.
        let status = unsafe { ffi::MPI_Init(&mut argc, &mut argv) };
        RuntimeStatus::from_raw(status)
    }

    fn finalize(&mut self) -> RuntimeStatus {
        // SAFETY: only reached after a successful `MPI_Init` (see RuntimeSession).
        let status = unsafe { ffi::MPI_Finalize() };
        RuntimeStatus::from_raw(status)
    }
}
