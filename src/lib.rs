//! Discovery and connection setup for locally attached mobile devices.
//!
//! Android devices are found through the `adb` bridge tool, iOS devices
//! through the usbmuxd daemon. Both registries follow [`DeviceRegistry`]:
//! reload, then drain with `next_device`.

#![deny(missing_docs)]

pub mod adb;
pub mod error;
pub mod process;
pub mod registry;
pub mod usbmux;

// Re-export key types
pub use adb::{Adb, AdbConfig, AdbDevice, AdbRegistry};
pub use error::{Error, Result};
pub use process::{CommandLine, ProcessOutput, ProcessRunner, TokioRunner};
pub use registry::DeviceRegistry;
pub use usbmux::{MuxClient, MuxDeviceInfo, MuxStream, UsbmuxRegistry, UsbmuxdClient};
