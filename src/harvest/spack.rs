//! Package manager seam: discovering, installing and entering MPI builds.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use scan_errors::{enverr, usage, ErrorCode};

use super::command::{describe_command, run_captured, run_silent, CommandOutcome};
use crate::errors::Result;
use crate::policy::policy_snapshot;

/// Status recorded when the environment of a spec cannot be loaded.
pub const STATUS_LOAD_FAILED: i32 = 1;

static VERSION_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)\s+([0-9.]+)\s+http.*").expect("version regex is valid")
});

/// Operations the harvest harness needs from a package manager.
pub trait PackageManager {
    /// Whether `package` is known at all.
    fn exists(&self, package: &str) -> Result<bool>;

    /// Every version the package manager can provide, sorted and deduplicated.
    fn list_versions(&self, package: &str) -> Result<Vec<String>>;

    /// Whether `spec` (`name@version`) is installed.
    fn is_installed(&self, spec: &str) -> Result<bool>;

    /// Build and install `spec`, returning whether it succeeded.
    fn install(&self, spec: &str) -> Result<bool>;

    /// Run `command` inside the environment of `spec`, capturing stdout.
    fn run_loaded(&self, spec: &str, command: &[String], timeout: Duration)
        -> Result<CommandOutcome>;
}

/// The `spack` command line.
#[derive(Debug, Clone)]
pub struct Spack {
    program: PathBuf,
}

impl Spack {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Use the executable configured through `MPISCAN_SPACK`.
    pub fn from_policy() -> Self {
        Self::new(policy_snapshot().spack)
    }

    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut command = Command::new(&self.program);
        command.args(args);
        command
    }
}

impl PackageManager for Spack {
    fn exists(&self, package: &str) -> Result<bool> {
        run_silent(&mut self.command(["spec", package]))
    }

    fn list_versions(&self, package: &str) -> Result<Vec<String>> {
        let mut command = self.command(["info", package]);
        let output = command.output().map_err(|err| {
            enverr!(ErrorCode::CommandFailed, "failed to query package versions")
                .with_context("command", describe_command(&command))
                .with_context("io", err.to_string())
        })?;
        if !output.status.success() {
            return Err(
                enverr!(ErrorCode::CommandFailed, "package info query failed")
                    .with_context("command", describe_command(&command))
                    .with_context("status", format!("{}", output.status)),
            );
        }
        let versions = parse_versions(&String::from_utf8_lossy(&output.stdout));
        if versions.is_empty() {
            return Err(
                enverr!(ErrorCode::NoVersionsFound, "cannot find any version for {}", package)
                    .with_context("package", package),
            );
        }
        Ok(versions)
    }

    fn is_installed(&self, spec: &str) -> Result<bool> {
        run_silent(&mut self.command(["find", spec]))
    }

    fn install(&self, spec: &str) -> Result<bool> {
        let mut command = self.command(["install", spec]);
        let status = command.status().map_err(|err| {
            enverr!(ErrorCode::CommandFailed, "failed to run package install")
                .with_context("command", describe_command(&command))
                .with_context("io", err.to_string())
        })?;
        Ok(status.success())
    }

    fn run_loaded(
        &self,
        spec: &str,
        command: &[String],
        timeout: Duration,
    ) -> Result<CommandOutcome> {
        let mut load = self.command(["load", "--sh", spec]);
        let output = load.output().map_err(|err| {
            enverr!(ErrorCode::CommandFailed, "failed to load package environment")
                .with_context("command", describe_command(&load))
                .with_context("io", err.to_string())
        })?;
        if !output.status.success() {
            log::warn!(
                target: "mpiscan::harvest",
                "could not load environment of {}",
                spec
            );
            return Ok(CommandOutcome::failed(STATUS_LOAD_FAILED));
        }

        let script = shell_script(&String::from_utf8_lossy(&output.stdout), command)?;
        let mut file = tempfile::Builder::new()
            .prefix("mpiscan-")
            .suffix(".sh")
            .tempfile()
            .map_err(|err| {
                enverr!(ErrorCode::Io, "failed to create wrapper script")
                    .with_context("io", err.to_string())
            })?;
        file.write_all(script.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|err| {
                enverr!(ErrorCode::Io, "failed to write wrapper script")
                    .with_context("path", file.path().display().to_string())
                    .with_context("io", err.to_string())
            })?;

        let mut shell = Command::new("sh");
        shell.arg(file.path());
        run_captured(&mut shell, timeout)
    }
}

/// Extract version numbers from `spack info` output.
pub fn parse_versions(info: &str) -> Vec<String> {
    VERSION_LINE
        .captures_iter(info)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Environment setup followed by the quoted command line.
pub(crate) fn shell_script(load_env: &str, command: &[String]) -> Result<String> {
    let quoted = command
        .iter()
        .map(|arg| {
            shlex::try_quote(arg).map_err(|err| {
                usage!(ErrorCode::CommandFailed, "cannot quote command argument for sh")
                    .with_context("argument", arg.escape_debug().to_string())
                    .with_context("detail", err.to_string())
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("{}\n{}\n", load_env.trim_end(), quoted.join(" ")))
}
