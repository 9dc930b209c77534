//! iOS devices through the usbmuxd multiplexing daemon.
//!
//! - [`MuxClient`] is the daemon interface; [`UsbmuxdClient`] talks to the
//!   real daemon socket
//! - [`UsbmuxRegistry`] keeps the fetched device list and opens connections

pub mod client;
pub mod protocol;
pub mod registry;
pub mod stream;
pub mod usbmuxd;

pub use client::{ConnectionType, MuxClient, MuxDeviceInfo};
pub use registry::UsbmuxRegistry;
pub use stream::MuxStream;
pub use usbmuxd::{MuxAddress, UsbmuxdClient, UsbmuxdConfig};
