//! Error types for device-link.

use std::time::Duration;

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The executable could not be found.
    #[error("command not found: {0}")]
    MissingBinary(String),

    /// The process could not be started.
    #[error("failed to exec: {command}: {source}")]
    Spawn {
        /// Rendered command line.
        command: String,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The process ran but exited with a non-zero status.
    #[error("\"{name}\" exit value {code}")]
    ExitStatus {
        /// Short name of the command for logs.
        name: String,
        /// Exit code reported by the OS.
        code: i32,
    },

    /// The process ended without an exit code (killed by a signal).
    #[error("\"{name}\" exited unexpectedly")]
    Terminated {
        /// Short name of the command for logs.
        name: String,
    },

    /// The process or daemon exchange did not finish in time.
    #[error("\"{name}\" timed out after {after:?}")]
    Timeout {
        /// Short name of the operation.
        name: String,
        /// Configured limit.
        after: Duration,
    },

    /// More command arguments than the argument vector can hold.
    #[error("max {max} command args allowed")]
    TooManyArgs {
        /// Maximum number of caller-supplied arguments.
        max: usize,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Plist encoding or decoding error.
    #[error("plist error: {0}")]
    Plist(#[from] plist::Error),

    /// Malformed usbmuxd exchange.
    #[error("usbmuxd protocol error: {0}")]
    Protocol(String),

    /// usbmuxd answered a request with a non-zero result code.
    #[error("usbmuxd returned error code {code}")]
    MuxResult {
        /// Result `Number` from the daemon reply.
        code: u64,
    },

    /// Device index outside the last fetched device list.
    #[error("no device at index {index} ({count} known)")]
    NoSuchDevice {
        /// Requested index.
        index: usize,
        /// Number of devices from the last reload.
        count: usize,
    },

    /// The usbmuxd backend is not available on this host.
    #[error("usbmuxd backend not available")]
    Unavailable,

    /// Unparseable daemon socket address.
    #[error("invalid usbmuxd address: {0}")]
    InvalidAddress(String),
}

impl Error {
    /// Create a protocol error.
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }

    /// Whether the error means the external binary was absent.
    pub fn is_missing_binary(&self) -> bool {
        matches!(self, Self::MissingBinary(_))
    }
}
