//! ABI sentinel probe for MPI implementations.
//!
//! The `inplacebottom` binary initializes MPI, prints the value and size of
//! `MPI_BOTTOM` and `MPI_IN_PLACE` as a small JSON-like document and
//! finalizes. The `mpiscan` binary runs that probe against every build of the
//! requested implementations managed by spack and renders the results.

pub mod cli;
pub mod errors;
pub mod exit;
pub mod harvest;
pub mod logging;
pub mod policy;
pub mod probe;
pub mod runtime;

pub use crate::errors::Result;
pub use crate::exit::run_main;
pub use crate::probe::{format_sentinel, run_probe, ProbeReport, ProbeResult, ProbeTarget};
pub use crate::runtime::{DistributedRuntime, RuntimeSession, RuntimeStatus};
