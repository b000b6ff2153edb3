//! Spawning external commands with captured stdout and a deadline.

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use scan_errors::{bug, enverr, ErrorCode};

use crate::errors::Result;

/// Status recorded when a command is killed for exceeding its deadline.
pub const STATUS_TIMED_OUT: i32 = -1;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Result of a captured command. `output` is only present when the command
/// exited successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub output: Option<String>,
    pub status: i32,
}

impl CommandOutcome {
    pub fn failed(status: i32) -> Self {
        Self {
            output: None,
            status,
        }
    }

    pub fn timed_out(&self) -> bool {
        self.status == STATUS_TIMED_OUT
    }
}

/// Run `command` to completion, discarding its output, and report whether it succeeded.
pub fn run_silent(command: &mut Command) -> Result<bool> {
    let status = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|err| spawn_error(command, err))?;
    Ok(status.success())
}

/// Run `command`, capturing stdout, killing it once `timeout` elapses.
pub fn run_captured(command: &mut Command, timeout: Duration) -> Result<CommandOutcome> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|err| spawn_error(command, err))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| bug!(ErrorCode::Unknown, "child stdout was not captured"))?;
    let reader = thread::spawn(move || {
        let mut buffer = Vec::new();
        stdout.read_to_end(&mut buffer).map(|_| buffer)
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) if Instant::now() >= deadline => break None,
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(enverr!(ErrorCode::CommandFailed, "failed to poll child process")
                    .with_context("command", describe_command(command))
                    .with_context("io", err.to_string()));
            }
        }
    };

    let Some(status) = status else {
        let _ = child.kill();
        let _ = child.wait();
        // Grandchildren may still hold the pipe open; leave the reader detached.
        drop(reader);
        log::error!(
            target: "mpiscan::harvest",
            timeout_secs = timeout.as_secs();
            "command timed out: {}",
            describe_command(command)
        );
        return Ok(CommandOutcome::failed(STATUS_TIMED_OUT));
    };

    let captured = reader
        .join()
        .map_err(|_| bug!(ErrorCode::Unknown, "stdout reader thread panicked"))?
        .map_err(|err| {
            enverr!(ErrorCode::Io, "failed to read child stdout")
                .with_context("command", describe_command(command))
                .with_context("io", err.to_string())
        })?;

    if status.success() {
        Ok(CommandOutcome {
            output: Some(String::from_utf8_lossy(&captured).into_owned()),
            status: 0,
        })
    } else {
        Ok(CommandOutcome::failed(exit_status_code(status)))
    }
}

fn exit_status_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

fn spawn_error(command: &Command, err: std::io::Error) -> scan_errors::ScanError {
    enverr!(ErrorCode::CommandFailed, "failed to spawn command")
        .with_context("command", describe_command(command))
        .with_context("io", err.to_string())
}

pub(crate) fn describe_command(command: &Command) -> String {
    let mut text = command.get_program().to_string_lossy().into_owned();
    for arg in command.get_args() {
        text.push(' ');
        text.push_str(&arg.to_string_lossy());
    }
    text
}
