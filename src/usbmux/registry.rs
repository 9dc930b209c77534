//! Device list fetched from the multiplexing daemon.

use async_trait::async_trait;
use tracing::{debug, error, warn};

use super::client::{MuxClient, MuxDeviceInfo};
use super::usbmuxd::UsbmuxdClient;
use crate::registry::DeviceRegistry;
use crate::{Error, Result};

/// Client state: a usable daemon client or nothing at all.
enum Backend<C> {
    Available(C),
    Unavailable,
}

/// Registry of devices attached to usbmuxd.
///
/// Holds the last list handed out by the client and gives it back through
/// [`MuxClient::release_device_list`] before fetching the next one and when
/// dropped. Without a backend every operation degrades to "no devices".
pub struct UsbmuxRegistry<C: MuxClient = UsbmuxdClient> {
    backend: Backend<C>,
    devices: Option<Vec<MuxDeviceInfo>>,
    cursor: usize,
}

impl UsbmuxRegistry<UsbmuxdClient> {
    /// Registry over the platform daemon, degraded when none is configured.
    pub fn open() -> Self {
        match UsbmuxdClient::from_env() {
            Ok(client) => {
                debug!(address = %client.address(), "using usbmuxd");
                Self::new(client)
            }
            Err(e) => {
                warn!("usbmuxd not available: {}", e);
                Self::unavailable()
            }
        }
    }
}

impl<C: MuxClient> UsbmuxRegistry<C> {
    /// Registry over `client`.
    pub fn new(client: C) -> Self {
        Self {
            backend: Backend::Available(client),
            devices: None,
            cursor: 0,
        }
    }

    /// Degraded registry that never reports devices.
    pub fn unavailable() -> Self {
        Self {
            backend: Backend::Unavailable,
            devices: None,
            cursor: 0,
        }
    }

    /// Whether a daemon client is present.
    pub fn is_available(&self) -> bool {
        matches!(self.backend, Backend::Available(_))
    }

    /// Forward a diagnostics level to the client.
    pub fn set_debug_level(&self, level: u8) {
        if let Backend::Available(client) = &self.backend {
            client.set_debug_level(level);
        }
    }

    /// Devices from the last reload.
    pub fn device_count(&self) -> usize {
        self.devices.as_ref().map_or(0, Vec::len)
    }

    /// Refetch the device list.
    ///
    /// An unreachable daemon counts as zero devices, the same as a daemon
    /// with nothing attached.
    pub async fn reload(&mut self) -> Result<usize> {
        self.cursor = 0;
        let client = match &self.backend {
            Backend::Available(client) => client,
            Backend::Unavailable => return Ok(0),
        };

        if let Some(previous) = self.devices.take() {
            client.release_device_list(previous);
        }

        match client.device_list().await {
            Ok(list) => {
                debug!("USBMux: Reload: {} devices", list.len());
                let count = list.len();
                self.devices = Some(list);
                Ok(count)
            }
            Err(e) => {
                debug!("Could not get iOS device list, usbmuxd not running? ({})", e);
                Ok(0)
            }
        }
    }

    /// Next device of the last reload, `None` once all were returned.
    pub fn next_device(&mut self) -> Option<&MuxDeviceInfo> {
        let dev = self.devices.as_ref()?.get(self.cursor)?;
        self.cursor += 1;
        Some(dev)
    }

    /// Connect to `port` on the device at `device_index` of the last reload.
    ///
    /// Indexes outside the last list fail without contacting the daemon.
    pub async fn connect(&self, device_index: usize, port: u16) -> Result<C::Stream> {
        let count = self.device_count();
        debug!("USBMUX Connect: dev={}/{}, port={}", device_index, count, port);

        let client = match &self.backend {
            Backend::Available(client) => client,
            Backend::Unavailable => {
                error!("usbmuxd client not available");
                return Err(Error::Unavailable);
            }
        };

        let dev = self
            .devices
            .as_ref()
            .and_then(|list| list.get(device_index))
            .ok_or(Error::NoSuchDevice {
                index: device_index,
                count,
            })?;

        client.connect(dev.handle(), port).await.map_err(|e| {
            error!("usbmuxd connect failed: {}", e);
            e
        })
    }

    /// Close a stream returned by [`connect()`](Self::connect).
    pub async fn disconnect(&self, stream: C::Stream) -> Result<()> {
        match &self.backend {
            Backend::Available(client) => client.disconnect(stream).await,
            Backend::Unavailable => Err(Error::Unavailable),
        }
    }
}

impl<C: MuxClient> Drop for UsbmuxRegistry<C> {
    fn drop(&mut self) {
        if let (Backend::Available(client), Some(list)) = (&self.backend, self.devices.take()) {
            client.release_device_list(list);
        }
    }
}

#[async_trait]
impl<C: MuxClient> DeviceRegistry for UsbmuxRegistry<C> {
    type Device = MuxDeviceInfo;

    async fn reload(&mut self) -> Result<usize> {
        UsbmuxRegistry::reload(self).await
    }

    async fn next_device(&mut self) -> Option<&MuxDeviceInfo> {
        UsbmuxRegistry::next_device(self)
    }
}
