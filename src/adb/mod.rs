//! Android devices through the `adb` command-line bridge.
//!
//! - [`Adb`] builds and runs `adb` command lines
//! - [`AdbRegistry`] keeps the slot table refreshed from `adb devices`
//! - [`forward`] / [`forward_remove_all`] manage TCP port forwards

pub mod config;
pub mod device;
pub mod forward;
pub mod parse;
pub mod registry;

pub use config::AdbConfig;
pub use device::AdbDevice;
pub use forward::{forward, forward_list, forward_remove_all};
pub use parse::ForwardEntry;
pub use registry::AdbRegistry;

use tokio::time;
use tracing::error;

use crate::process::{CommandLine, ProcessOutput, ProcessRunner, TokioRunner};
use crate::{Error, Result};

/// Caller arguments allowed per invocation: a 32-entry argument vector
/// minus the program, `-s`, the serial and the terminator.
pub const MAX_ARGS: usize = 28;

/// Handle for running `adb` commands.
#[derive(Debug, Clone)]
pub struct Adb<R = TokioRunner> {
    config: AdbConfig,
    runner: R,
}

impl Adb<TokioRunner> {
    /// Run the real executable described by `config`.
    pub fn new(config: AdbConfig) -> Self {
        Self::with_runner(config, TokioRunner::new())
    }
}

impl<R: ProcessRunner> Adb<R> {
    /// Use a custom process runner.
    pub fn with_runner(config: AdbConfig, runner: R) -> Self {
        Self { config, runner }
    }

    /// Active configuration.
    pub fn config(&self) -> &AdbConfig {
        &self.config
    }

    /// Build `adb [-s <serial>] <args...>`.
    pub fn command_line(&self, serial: Option<&str>, args: &[&str]) -> Result<CommandLine> {
        if args.len() > MAX_ARGS {
            error!("max {} command args allowed", MAX_ARGS);
            return Err(Error::TooManyArgs { max: MAX_ARGS });
        }

        let mut argv = Vec::with_capacity(args.len() + 2);
        if let Some(serial) = serial {
            argv.push("-s".to_string());
            argv.push(serial.to_string());
        }
        argv.extend(args.iter().map(|a| a.to_string()));
        Ok(CommandLine::new(self.config.adb_path.clone(), argv))
    }

    /// Run an `adb` command, returning its output whatever the exit status.
    ///
    /// Output is captured up to the configured limit when `capture` is set.
    pub async fn execute(
        &self,
        serial: Option<&str>,
        args: &[&str],
        capture: bool,
    ) -> Result<ProcessOutput> {
        let command = self.command_line(serial, args)?;
        let limit = capture.then_some(self.config.output_limit);

        let result = match self.config.command_timeout {
            Some(after) => match time::timeout(after, self.runner.run(&command, limit)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout {
                    name: command.to_string(),
                    after,
                }),
            },
            None => self.runner.run(&command, limit).await,
        };

        if let Err(e) = &result {
            match e {
                Error::MissingBinary(_) => error!("command not found: {}", command),
                Error::Timeout { after, .. } => error!("\"{}\" timed out after {:?}", command, after),
                other => error!("{}", other),
            }
        }
        result
    }

    /// [`execute`](Self::execute) and require a zero exit status.
    pub(crate) async fn run_checked(
        &self,
        name: &str,
        serial: Option<&str>,
        args: &[&str],
        capture: bool,
    ) -> Result<ProcessOutput> {
        self.execute(serial, args, capture).await?.check(name)
    }
}
