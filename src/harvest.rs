//! Harvest harness: run the probe against every installed build of the
//! requested MPI implementations and collect the documents it prints.

pub(crate) mod command;
mod implementation;
mod output;
mod spack;

pub use command::{CommandOutcome, STATUS_TIMED_OUT};
pub use implementation::{BuildRecipe, BuildSettings, Implementation, PROBE_BIN};
pub use output::{Harvest, OutputFormat, RunOutput, RunRecord};
pub use spack::{parse_versions, PackageManager, Spack, STATUS_LOAD_FAILED};
