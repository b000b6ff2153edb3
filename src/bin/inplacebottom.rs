//! Prints the value and size of `MPI_BOTTOM` and `MPI_IN_PLACE`.

use std::env;
use std::ffi::OsString;
use std::io;
use std::process::ExitCode;

use mpiscan::logging::{init_rust_logging_with_default, log_scan_error};
use mpiscan::policy::configure_policy_from_env;
use mpiscan::runtime::mpi::{MpiRuntime, MPI_TARGETS};
use mpiscan::{run_main, run_probe};

fn main() -> ExitCode {
    init_rust_logging_with_default("mpiscan=warn");
    // Policy only shapes diagnostics; the probe output never depends on it.
    if let Err(err) = configure_policy_from_env() {
        log_scan_error("inplacebottom", &err);
    }

    run_main("inplacebottom", || {
        let args: Vec<OsString> = env::args_os().collect();
        run_probe(MpiRuntime::new(), &args, MPI_TARGETS, &mut io::stdout().lock())
    })
}
