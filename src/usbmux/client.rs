//! Daemon client interface consumed by the usbmux registry.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::registry::bounded;
use crate::Result;

/// Capacity of the UDID field, terminator included.
pub const UDID_CAPACITY: usize = 44;

/// How the daemon reaches the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    /// Cabled connection.
    Usb,
    /// Paired over the network.
    Network,
    /// Anything else the daemon reports.
    Unknown,
}

impl ConnectionType {
    /// Map the daemon's `ConnectionType` property.
    pub fn from_property(value: &str) -> Self {
        match value {
            "USB" => Self::Usb,
            "Network" => Self::Network,
            _ => Self::Unknown,
        }
    }
}

/// One device as listed by the multiplexing daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxDeviceInfo {
    handle: u32,
    product_id: u32,
    udid: String,
    connection_type: ConnectionType,
}

impl MuxDeviceInfo {
    /// Create a record; the UDID is truncated to its capacity.
    pub fn new(handle: u32, product_id: u32, udid: &str, connection_type: ConnectionType) -> Self {
        Self {
            handle,
            product_id,
            udid: bounded(udid, UDID_CAPACITY),
            connection_type,
        }
    }

    /// Opaque handle passed back to [`MuxClient::connect`].
    pub fn handle(&self) -> u32 {
        self.handle
    }

    /// USB product id.
    pub fn product_id(&self) -> u32 {
        self.product_id
    }

    /// Device UDID (serial number).
    pub fn udid(&self) -> &str {
        &self.udid
    }

    /// Transport between daemon and device.
    pub fn connection_type(&self) -> ConnectionType {
        self.connection_type
    }
}

/// Client of a usbmuxd-compatible daemon.
///
/// Lists handed out by [`device_list()`](MuxClient::device_list) belong to
/// the client: holders give them back through
/// [`release_device_list()`](MuxClient::release_device_list) before asking
/// for a new one.
#[async_trait]
pub trait MuxClient: Send + Sync {
    /// Raw connection to a device port.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin;

    /// Adjust client-side diagnostics. Default: no-op.
    fn set_debug_level(&self, _level: u8) {}

    /// Fetch the devices currently attached to the daemon.
    async fn device_list(&self) -> Result<Vec<MuxDeviceInfo>>;

    /// Give back a list obtained from [`device_list()`](MuxClient::device_list).
    fn release_device_list(&self, list: Vec<MuxDeviceInfo>) {
        drop(list);
    }

    /// Open a connection to `port` on the device behind `handle`.
    async fn connect(&self, handle: u32, port: u16) -> Result<Self::Stream>;

    /// Close a connection from [`connect()`](MuxClient::connect).
    async fn disconnect(&self, mut stream: Self::Stream) -> Result<()> {
        stream.shutdown().await?;
        Ok(())
    }
}
