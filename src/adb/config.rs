//! Options for talking to the `adb` executable.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the `adb` executable path.
pub const ADB_ENV: &str = "ADB";

/// Default number of device slots.
pub const DEFAULT_DEVICE_LIMIT: usize = 8;

/// Default capture size for `adb devices` and `getprop` output.
pub const DEFAULT_OUTPUT_LIMIT: usize = 1024;

/// Configuration for [`Adb`](super::Adb).
#[derive(Clone, Debug)]
pub struct AdbConfig {
    /// Path of the `adb` executable.
    pub adb_path: PathBuf,
    /// Number of device slots in the registry.
    pub device_limit: usize,
    /// Bytes of command output kept for parsing.
    pub output_limit: usize,
    /// Optional limit per `adb` invocation. `None` waits forever.
    pub command_timeout: Option<Duration>,
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            adb_path: default_adb_path(),
            device_limit: DEFAULT_DEVICE_LIMIT,
            output_limit: DEFAULT_OUTPUT_LIMIT,
            command_timeout: None,
        }
    }
}

impl AdbConfig {
    /// Defaults, with the executable taken from `$ADB` when set.
    pub fn from_env() -> Self {
        let config = Self::default();
        match std::env::var_os(ADB_ENV) {
            Some(path) if !path.is_empty() => config.adb_path(path),
            _ => config,
        }
    }

    /// Set the `adb` executable. Default: `adb` (`.\adb\adb.exe` on Windows).
    pub fn adb_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.adb_path = path.into();
        self
    }

    /// Set the number of device slots. Default: 8.
    pub fn device_limit(mut self, n: usize) -> Self {
        self.device_limit = n;
        self
    }

    /// Set how many output bytes are kept. Default: 1024.
    pub fn output_limit(mut self, n: usize) -> Self {
        self.output_limit = n;
        self
    }

    /// Kill and fail any `adb` invocation running longer than `d`. Default: none.
    pub fn command_timeout(mut self, d: Duration) -> Self {
        self.command_timeout = Some(d);
        self
    }
}

fn default_adb_path() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r".\adb\adb.exe")
    } else {
        PathBuf::from("adb")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = AdbConfig::default()
            .adb_path("/opt/platform-tools/adb")
            .device_limit(2)
            .output_limit(64)
            .command_timeout(Duration::from_secs(3));

        assert_eq!(config.adb_path, PathBuf::from("/opt/platform-tools/adb"));
        assert_eq!(config.device_limit, 2);
        assert_eq!(config.output_limit, 64);
        assert_eq!(config.command_timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn defaults() {
        let config = AdbConfig::default();
        assert_eq!(config.device_limit, DEFAULT_DEVICE_LIMIT);
        assert_eq!(config.output_limit, DEFAULT_OUTPUT_LIMIT);
        assert!(config.command_timeout.is_none());
    }
}
