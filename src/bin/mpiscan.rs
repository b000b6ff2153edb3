use std::process::ExitCode;

use clap::Parser;
use mpiscan::cli::{self, Cli};
use mpiscan::logging::init_rust_logging_with_default;
use mpiscan::policy::configure_policy_from_env;
use mpiscan::run_main;

fn main() -> ExitCode {
    let args = Cli::parse();
    init_rust_logging_with_default("mpiscan=info");
    run_main("mpiscan", || {
        configure_policy_from_env()?;
        cli::run(&args)
    })
}
