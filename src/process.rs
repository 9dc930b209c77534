//! External process execution.
//!
//! The registries never spawn processes directly; they go through a
//! [`ProcessRunner`] so tests can script tool output.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{self, AsyncReadExt};
use tracing::{error, trace};

use crate::{Error, Result};

/// Longest rendering of a command line used in log messages.
const RENDER_LIMIT: usize = 255;

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Executable path or name looked up on `PATH`.
    pub program: PathBuf,
    /// Arguments, not including the program.
    pub args: Vec<String>,
}

impl CommandLine {
    /// Create a command line.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Space-separated rendering capped at `limit` bytes.
    pub fn render(&self, limit: usize) -> String {
        let program = self.program.to_string_lossy();
        let mut out = String::new();
        for part in std::iter::once(program.as_ref()).chain(self.args.iter().map(String::as_str)) {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(part);
            if out.len() >= limit {
                let mut end = limit;
                while !out.is_char_boundary(end) {
                    end -= 1;
                }
                out.truncate(end);
                break;
            }
        }
        out
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(RENDER_LIMIT))
    }
}

/// How a finished process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Normal exit with a code.
    Exited(i32),
    /// Ended without a code, e.g. killed by a signal.
    Terminated,
}

impl ExitStatus {
    /// Exit code zero.
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

/// Result of running a process to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit status.
    pub status: ExitStatus,
    /// Captured standard output, empty when capture was not requested.
    pub stdout: Vec<u8>,
}

impl ProcessOutput {
    /// Successful exit with the given output.
    pub fn success(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            status: ExitStatus::Exited(0),
            stdout: stdout.into(),
        }
    }

    /// Non-zero exit with no output.
    pub fn failure(code: i32) -> Self {
        Self {
            status: ExitStatus::Exited(code),
            stdout: Vec::new(),
        }
    }

    /// Turn a non-successful status into an error, logging it under `name`.
    pub fn check(self, name: &str) -> Result<Self> {
        match self.status {
            ExitStatus::Exited(0) => Ok(self),
            ExitStatus::Exited(code) => {
                error!("\"{}\" exit value {}", name, code);
                Err(Error::ExitStatus {
                    name: name.to_string(),
                    code,
                })
            }
            ExitStatus::Terminated => {
                error!("\"{}\" exited unexpectedly", name);
                Err(Error::Terminated {
                    name: name.to_string(),
                })
            }
        }
    }

    /// Captured output as text, lossily decoded.
    pub fn stdout_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }
}

/// Runs external processes to completion.
///
/// Implementations report a spawn failure as [`Error::MissingBinary`] when
/// the executable does not exist and [`Error::Spawn`] otherwise. A process
/// that started always yields `Ok`, whatever its exit status.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command`, keeping at most `capture` bytes of stdout when set.
    async fn run(&self, command: &CommandLine, capture: Option<usize>) -> Result<ProcessOutput>;
}

/// [`ProcessRunner`] backed by `tokio::process`.
///
/// The child is killed if the returned future is dropped, so callers can
/// bound it with `tokio::time::timeout`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioRunner;

impl TokioRunner {
    /// Create a runner.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for TokioRunner {
    async fn run(&self, command: &CommandLine, capture: Option<usize>) -> Result<ProcessOutput> {
        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if capture.is_some() {
            cmd.stdout(Stdio::piped());
        } else {
            cmd.stdout(Stdio::null());
        }

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::MissingBinary(command.to_string()),
            _ => Error::Spawn {
                command: command.to_string(),
                source: e,
            },
        })?;

        let mut stdout = Vec::new();
        if let (Some(limit), Some(mut pipe)) = (capture, child.stdout.take()) {
            (&mut pipe).take(limit as u64).read_to_end(&mut stdout).await?;
            // Discard the rest; a full pipe would stall the child.
            io::copy(&mut pipe, &mut io::sink()).await?;
        }

        let status = match child.wait().await?.code() {
            Some(code) => ExitStatus::Exited(code),
            None => ExitStatus::Terminated,
        };
        trace!(command = %command, ?status, bytes = stdout.len(), "process finished");

        Ok(ProcessOutput { status, stdout })
    }
}
