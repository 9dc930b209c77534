//! [`MuxClient`] speaking the usbmuxd socket protocol.

use std::fmt;
#[cfg(unix)]
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::time;
use tracing::{debug, trace};

use super::client::{MuxClient, MuxDeviceInfo};
use super::protocol::{decode_device_list, read_frame, write_frame, Request, ResultReply};
use super::stream::MuxStream;
use crate::{Error, Result};

/// Environment variable overriding the daemon address.
pub const SOCKET_ADDRESS_ENV: &str = "USBMUXD_SOCKET_ADDRESS";

/// Where usbmuxd listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxAddress {
    /// Unix domain socket path.
    #[cfg(unix)]
    Unix(PathBuf),
    /// `host:port`.
    Tcp(String),
}

impl MuxAddress {
    /// Platform default, if this platform runs usbmuxd at all.
    pub fn platform_default() -> Option<Self> {
        platform_default()
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
fn platform_default() -> Option<MuxAddress> {
    Some(MuxAddress::Unix(PathBuf::from("/var/run/usbmuxd")))
}

#[cfg(target_os = "macos")]
fn platform_default() -> Option<MuxAddress> {
    None
}

#[cfg(windows)]
fn platform_default() -> Option<MuxAddress> {
    Some(MuxAddress::Tcp("127.0.0.1:27015".to_string()))
}

#[cfg(not(any(unix, windows)))]
fn platform_default() -> Option<MuxAddress> {
    None
}

#[cfg(unix)]
fn unix_address(raw: &str, path: &str) -> Result<MuxAddress> {
    if path.is_empty() {
        return Err(Error::InvalidAddress(raw.to_string()));
    }
    Ok(MuxAddress::Unix(PathBuf::from(path)))
}

#[cfg(not(unix))]
fn unix_address(raw: &str, _path: &str) -> Result<MuxAddress> {
    Err(Error::InvalidAddress(raw.to_string()))
}

impl FromStr for MuxAddress {
    type Err = Error;

    /// Parse `UNIX:/path` or `host:port`.
    fn from_str(s: &str) -> Result<Self> {
        if let Some(path) = s.strip_prefix("UNIX:") {
            return unix_address(s, path);
        }

        match s.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(Self::Tcp(s.to_string()))
            }
            _ => Err(Error::InvalidAddress(s.to_string())),
        }
    }
}

impl fmt::Display for MuxAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(unix)]
            Self::Unix(path) => write!(f, "UNIX:{}", path.display()),
            Self::Tcp(addr) => f.write_str(addr),
        }
    }
}

/// Configuration for [`UsbmuxdClient`].
#[derive(Clone, Debug)]
pub struct UsbmuxdConfig {
    /// Daemon address; `None` when the platform has no daemon.
    pub address: Option<MuxAddress>,
    /// Program name reported to the daemon.
    pub prog_name: String,
    /// Optional limit for each request/reply exchange.
    pub timeout: Option<Duration>,
}

impl Default for UsbmuxdConfig {
    fn default() -> Self {
        Self {
            address: MuxAddress::platform_default(),
            prog_name: env!("CARGO_PKG_NAME").to_string(),
            timeout: None,
        }
    }
}

impl UsbmuxdConfig {
    /// Defaults, with the address taken from `$USBMUXD_SOCKET_ADDRESS` when set.
    pub fn from_env() -> Result<Self> {
        let config = Self::default();
        match std::env::var(SOCKET_ADDRESS_ENV) {
            Ok(addr) if !addr.is_empty() => Ok(config.address(addr.parse()?)),
            _ => Ok(config),
        }
    }

    /// Set the daemon address. Default: `/var/run/usbmuxd` on Linux and other
    /// Unix systems, `127.0.0.1:27015` on Windows, none on macOS.
    pub fn address(mut self, address: MuxAddress) -> Self {
        self.address = Some(address);
        self
    }

    /// Set the program name sent with every request. Default: this crate's name.
    pub fn prog_name(mut self, name: impl Into<String>) -> Self {
        self.prog_name = name.into();
        self
    }

    /// Bound each daemon exchange. Default: none.
    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = Some(d);
        self
    }
}

/// usbmuxd client over its Unix or TCP socket.
///
/// Each request opens a fresh socket. For `Connect` that socket becomes the
/// device connection once the daemon accepts.
#[derive(Debug)]
pub struct UsbmuxdClient {
    address: MuxAddress,
    config: UsbmuxdConfig,
    next_tag: AtomicU32,
    debug_level: AtomicU8,
}

impl UsbmuxdClient {
    /// Create a client; fails with [`Error::Unavailable`] without an address.
    pub fn new(config: UsbmuxdConfig) -> Result<Self> {
        let address = config.address.clone().ok_or(Error::Unavailable)?;
        Ok(Self {
            address,
            config,
            next_tag: AtomicU32::new(1),
            debug_level: AtomicU8::new(0),
        })
    }

    /// Client configured from the environment.
    pub fn from_env() -> Result<Self> {
        Self::new(UsbmuxdConfig::from_env()?)
    }

    /// Daemon address in use.
    pub fn address(&self) -> &MuxAddress {
        &self.address
    }

    async fn open(&self) -> Result<MuxStream> {
        let stream = match &self.address {
            #[cfg(unix)]
            MuxAddress::Unix(path) => MuxStream::Unix(UnixStream::connect(path).await?),
            MuxAddress::Tcp(addr) => MuxStream::Tcp(TcpStream::connect(addr.as_str()).await?),
        };
        Ok(stream)
    }

    /// Send `request` on a fresh socket and return the socket with the reply body.
    async fn exchange(&self, name: &str, request: &Request<'_>) -> Result<(MuxStream, Vec<u8>)> {
        let body = request.to_plist()?;
        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);

        let run = async {
            let mut stream = self.open().await?;
            write_frame(&mut stream, tag, &body).await?;
            let frame = read_frame(&mut stream).await?;
            if frame.tag != tag {
                return Err(Error::protocol(format!(
                    "reply tag {} does not match request tag {}",
                    frame.tag, tag
                )));
            }
            Ok::<_, Error>((stream, frame.body))
        };

        let (stream, reply) = match self.config.timeout {
            Some(after) => time::timeout(after, run).await.map_err(|_| Error::Timeout {
                name: name.to_string(),
                after,
            })??,
            None => run.await?,
        };

        if self.debug_level.load(Ordering::Relaxed) > 0 {
            debug!(request = name, tag, bytes = reply.len(), "usbmuxd reply");
        } else {
            trace!(request = name, tag, bytes = reply.len(), "usbmuxd reply");
        }
        Ok((stream, reply))
    }
}

#[async_trait]
impl MuxClient for UsbmuxdClient {
    type Stream = MuxStream;

    /// Levels above zero log every daemon exchange at debug level.
    fn set_debug_level(&self, level: u8) {
        self.debug_level.store(level, Ordering::Relaxed);
    }

    async fn device_list(&self) -> Result<Vec<MuxDeviceInfo>> {
        let request = Request::list_devices(&self.config.prog_name);
        let (_stream, reply) = self.exchange("ListDevices", &request).await?;
        decode_device_list(&reply)
    }

    async fn connect(&self, handle: u32, port: u16) -> Result<MuxStream> {
        let request = Request::connect(&self.config.prog_name, handle, port);
        let (stream, reply) = self.exchange("Connect", &request).await?;
        ResultReply::check(&reply)?;
        Ok(stream)
    }
}
