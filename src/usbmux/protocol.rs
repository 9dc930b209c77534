//! usbmuxd wire format.
//!
//! Every message is a 16-byte little-endian header (total length,
//! protocol version, message type, tag) followed by an XML plist body.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::client::{ConnectionType, MuxDeviceInfo};
use crate::{Error, Result};

/// Header size in bytes.
pub const HEADER_LEN: usize = 16;

/// Protocol version for plist messages.
pub const PLIST_VERSION: u32 = 1;

/// Message type for plist messages.
pub const MESSAGE_PLIST: u32 = 8;

/// Largest body accepted from the daemon.
pub const MAX_BODY_LEN: usize = 1 << 20;

/// Protocol revision announced to the daemon.
const LIB_USBMUX_VERSION: u64 = 3;

/// One framed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Request tag echoed by the daemon in its reply.
    pub tag: u32,
    /// Plist payload.
    pub body: Vec<u8>,
}

/// Write one plist frame.
pub async fn write_frame<W>(writer: &mut W, tag: u32, body: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(HEADER_LEN + body.len())
        .map_err(|_| Error::protocol("message too large"))?;
    let mut buf = Vec::with_capacity(HEADER_LEN + body.len());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&PLIST_VERSION.to_le_bytes());
    buf.extend_from_slice(&MESSAGE_PLIST.to_le_bytes());
    buf.extend_from_slice(&tag.to_le_bytes());
    buf.extend_from_slice(body);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one plist frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;

    let field = |i: usize| u32::from_le_bytes([header[i], header[i + 1], header[i + 2], header[i + 3]]);
    let len = field(0) as usize;
    let version = field(4);
    let message = field(8);
    let tag = field(12);

    if len < HEADER_LEN || len - HEADER_LEN > MAX_BODY_LEN {
        return Err(Error::protocol(format!("bad message length {len}")));
    }
    if version != PLIST_VERSION || message != MESSAGE_PLIST {
        return Err(Error::protocol(format!(
            "unsupported message version={version} type={message}"
        )));
    }

    let mut body = vec![0u8; len - HEADER_LEN];
    reader.read_exact(&mut body).await?;
    Ok(Frame { tag, body })
}

/// Client request body.
#[derive(Debug, Serialize)]
pub struct Request<'a> {
    #[serde(rename = "MessageType")]
    message_type: &'a str,
    #[serde(rename = "ClientVersionString")]
    client_version: &'a str,
    #[serde(rename = "ProgName")]
    prog_name: &'a str,
    #[serde(rename = "kLibUSBMuxVersion")]
    lib_version: u64,
    #[serde(rename = "DeviceID", skip_serializing_if = "Option::is_none")]
    device_id: Option<u32>,
    #[serde(rename = "PortNumber", skip_serializing_if = "Option::is_none")]
    port_number: Option<u16>,
}

impl<'a> Request<'a> {
    /// `ListDevices` request.
    pub fn list_devices(prog_name: &'a str) -> Self {
        Self::new("ListDevices", prog_name)
    }

    /// `Connect` request for `port` on device `handle`.
    pub fn connect(prog_name: &'a str, handle: u32, port: u16) -> Self {
        Self {
            device_id: Some(handle),
            port_number: Some(port_to_wire(port)),
            ..Self::new("Connect", prog_name)
        }
    }

    fn new(message_type: &'a str, prog_name: &'a str) -> Self {
        Self {
            message_type,
            client_version: concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION")),
            prog_name,
            lib_version: LIB_USBMUX_VERSION,
            device_id: None,
            port_number: None,
        }
    }

    /// Encode as an XML plist.
    pub fn to_plist(&self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        plist::to_writer_xml(&mut body, self)?;
        Ok(body)
    }
}

/// The daemon reads the port in network byte order.
pub fn port_to_wire(port: u16) -> u16 {
    u16::from_ne_bytes(port.to_be_bytes())
}

/// `Result` reply.
#[derive(Debug, Deserialize)]
pub struct ResultReply {
    /// Always `Result` for this reply.
    #[serde(rename = "MessageType")]
    pub message_type: String,
    /// Zero on success.
    #[serde(rename = "Number", default)]
    pub number: u64,
}

impl ResultReply {
    /// Decode and require `Number` zero.
    pub fn check(body: &[u8]) -> Result<()> {
        let reply: ResultReply = plist::from_bytes(body)?;
        if reply.message_type != "Result" {
            return Err(Error::protocol(format!(
                "unexpected reply {}",
                reply.message_type
            )));
        }
        match reply.number {
            0 => Ok(()),
            code => Err(Error::MuxResult { code }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeviceListReply {
    #[serde(rename = "DeviceList")]
    device_list: Vec<AttachedRecord>,
}

#[derive(Debug, Deserialize)]
struct AttachedRecord {
    #[serde(rename = "DeviceID")]
    device_id: u32,
    #[serde(rename = "Properties")]
    properties: Properties,
}

#[derive(Debug, Deserialize)]
struct Properties {
    #[serde(rename = "SerialNumber", default)]
    serial_number: String,
    #[serde(rename = "ProductID", default)]
    product_id: u32,
    #[serde(rename = "ConnectionType", default)]
    connection_type: String,
}

/// Decode a `ListDevices` reply.
///
/// A daemon refusing the request answers with a `Result` instead, which is
/// reported as [`Error::MuxResult`].
pub fn decode_device_list(body: &[u8]) -> Result<Vec<MuxDeviceInfo>> {
    match plist::from_bytes::<DeviceListReply>(body) {
        Ok(reply) => Ok(reply
            .device_list
            .into_iter()
            .map(|rec| {
                MuxDeviceInfo::new(
                    rec.device_id,
                    rec.properties.product_id,
                    &rec.properties.serial_number,
                    ConnectionType::from_property(&rec.properties.connection_type),
                )
            })
            .collect()),
        Err(e) => {
            ResultReply::check(body)?;
            Err(e.into())
        }
    }
}
