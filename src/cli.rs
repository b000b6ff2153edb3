//! Command line of the `mpiscan` harvest binary.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use scan_errors::{enverr, ensure_usage, ErrorCode};

use crate::errors::Result;
use crate::harvest::{
    BuildRecipe, BuildSettings, Harvest, Implementation, OutputFormat, PackageManager, Spack,
};

pub const DEFAULT_MPIS: [&str; 4] = ["openmpi", "mpich", "intel-mpi", "mvapich2"];

#[derive(Debug, Parser)]
#[command(name = "mpiscan")]
#[command(about = "mpiscan MPI code inspector")]
pub struct Cli {
    /// Format used for the results
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Comma separated list of MPI spack recipes to use
    #[arg(short, long, value_delimiter = ',', default_values = DEFAULT_MPIS)]
    pub mpis: Vec<String>,

    /// Allow building missing MPI versions
    #[arg(short, long)]
    pub build: bool,

    /// Store results in this file
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Previous JSON result file (nothing is compiled or run)
    #[arg(short, long)]
    pub json: Option<PathBuf>,

    /// C file or Cargo project compiled and run against each MPI
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Timeout in seconds of each run
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Timeout in seconds of each build
    #[arg(long)]
    pub build_timeout: Option<u64>,
}

impl Cli {
    fn build_settings(&self) -> BuildSettings {
        let mut settings = BuildSettings::from_policy();
        if let Some(secs) = self.timeout {
            settings.run_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.build_timeout {
            settings.build_timeout = Duration::from_secs(secs);
        }
        settings
    }
}

/// Gather the harvest requested by `cli`, either from a previous results file
/// or by running the probe through `pm`.
pub fn collect<P: PackageManager + ?Sized>(cli: &Cli, pm: &P) -> Result<Harvest> {
    if let Some(json) = &cli.json {
        ensure_usage!(
            json.is_file(),
            ErrorCode::ResultsFileInvalid,
            "{} is not a regular file",
            json.display()
        );
        return Harvest::load(json);
    }

    let Some(source) = &cli.source else {
        return Err(scan_errors::usage!(
            ErrorCode::SourceMissing,
            "a file to compile and run is required (-s/--source)"
        ));
    };
    let recipe = BuildRecipe::from_source(source)?;
    let settings = cli.build_settings();

    let implementations = cli
        .mpis
        .iter()
        .map(|name| Implementation::discover(pm, name.trim(), cli.build))
        .collect::<Result<Vec<_>>>()?;

    let mut harvest = Harvest::new();
    for implementation in &implementations {
        let records = implementation.compile_and_run(pm, &recipe, &settings)?;
        harvest.insert(implementation.name(), records);
    }
    Ok(harvest)
}

/// Run the harvest described by `cli` and write the rendered results.
pub fn run(cli: &Cli) -> Result<()> {
    let mut harvest = collect(cli, &Spack::from_policy())?;
    harvest.unfold();
    let rendered = harvest.render(cli.format)?;
    match &cli.out {
        Some(path) => write_file(path, &rendered),
        None => write_stream(&mut io::stdout().lock(), &rendered),
    }
}

fn write_file(path: &Path, rendered: &str) -> Result<()> {
    let mut file = File::create(path).map_err(|err| {
        enverr!(ErrorCode::OutputUnavailable, "cannot create results file")
            .with_context("path", path.display().to_string())
            .with_context("io", err.to_string())
    })?;
    write_stream(&mut file, rendered)
        .map_err(|err| err.with_context("path", path.display().to_string()))
}

fn write_stream<W: Write>(out: &mut W, rendered: &str) -> Result<()> {
    out.write_all(rendered.as_bytes())
        .and_then(|()| out.flush())
        .map_err(|err| {
            enverr!(ErrorCode::OutputUnavailable, "failed to write results")
                .with_context("io", err.to_string())
                .with_source(err)
        })
}
