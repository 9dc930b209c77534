use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use plist::{Dictionary, Value};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::TcpListener;

use device_link::usbmux::protocol::{port_to_wire, read_frame, write_frame};
use device_link::usbmux::{
    ConnectionType, MuxAddress, MuxClient, MuxDeviceInfo, UsbmuxRegistry, UsbmuxdClient,
    UsbmuxdConfig,
};
use device_link::{DeviceRegistry, Error, Result};

#[derive(Default)]
struct DaemonState {
    devices: Mutex<Vec<MuxDeviceInfo>>,
    down: AtomicBool,
    fetches: AtomicUsize,
    releases: AtomicUsize,
    connects: AtomicUsize,
    debug_level: AtomicU8,
    peers: Mutex<Vec<DuplexStream>>,
}

impl DaemonState {
    fn with_devices(n: u32) -> Arc<Self> {
        let state = Arc::new(Self::default());
        *state.devices.lock().unwrap() = (0..n)
            .map(|i| MuxDeviceInfo::new(10 + i, 0x12a8, &format!("udid-{i}"), ConnectionType::Usb))
            .collect();
        state
    }

    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// In-memory daemon that counts list hand-outs and returns.
struct CountingClient(Arc<DaemonState>);

#[async_trait]
impl MuxClient for CountingClient {
    type Stream = DuplexStream;

    fn set_debug_level(&self, level: u8) {
        self.0.debug_level.store(level, Ordering::SeqCst);
    }

    async fn device_list(&self) -> Result<Vec<MuxDeviceInfo>> {
        if self.0.down.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::ErrorKind::ConnectionRefused.into()));
        }
        self.0.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.0.devices.lock().unwrap().clone())
    }

    fn release_device_list(&self, _list: Vec<MuxDeviceInfo>) {
        self.0.releases.fetch_add(1, Ordering::SeqCst);
    }

    async fn connect(&self, handle: u32, _port: u16) -> Result<DuplexStream> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        if handle == 0 {
            return Err(Error::MuxResult { code: 3 });
        }
        let (ours, theirs) = duplex(64);
        self.0.peers.lock().unwrap().push(theirs);
        Ok(ours)
    }
}

#[test_log::test(tokio::test)]
async fn lists_are_released_before_refetch_and_on_drop() {
    let state = DaemonState::with_devices(2);
    let mut registry = UsbmuxRegistry::new(CountingClient(state.clone()));

    assert_eq!(registry.reload().await.unwrap(), 2);
    assert_eq!(DaemonState::count(&state.releases), 0);
    assert_eq!(registry.reload().await.unwrap(), 2);
    assert_eq!(registry.reload().await.unwrap(), 2);

    assert_eq!(DaemonState::count(&state.fetches), 3);
    assert_eq!(DaemonState::count(&state.releases), 2);

    drop(registry);
    assert_eq!(DaemonState::count(&state.releases), 3);
}

#[tokio::test]
async fn dropping_without_reload_releases_nothing() {
    let state = DaemonState::with_devices(1);
    drop(UsbmuxRegistry::new(CountingClient(state.clone())));
    assert_eq!(DaemonState::count(&state.releases), 0);
}

#[tokio::test]
async fn iterates_last_list_and_rewinds_on_reload() {
    let state = DaemonState::with_devices(3);
    let mut registry = UsbmuxRegistry::new(CountingClient(state));
    assert!(registry.next_device().is_none());

    registry.reload().await.unwrap();
    let mut udids = Vec::new();
    while let Some(dev) = registry.next_device() {
        udids.push(dev.udid().to_string());
    }
    assert_eq!(udids, ["udid-0", "udid-1", "udid-2"]);
    assert!(registry.next_device().is_none());

    registry.reload().await.unwrap();
    assert_eq!(registry.next_device().unwrap().handle(), 10);
}

#[tokio::test]
async fn unreachable_daemon_means_no_devices() {
    let state = DaemonState::with_devices(2);
    let mut registry = UsbmuxRegistry::new(CountingClient(state.clone()));
    registry.reload().await.unwrap();

    state.down.store(true, Ordering::SeqCst);
    assert_eq!(registry.reload().await.unwrap(), 0);
    assert_eq!(registry.device_count(), 0);
    assert!(registry.next_device().is_none());
    assert_eq!(DaemonState::count(&state.releases), 1);

    drop(registry);
    assert_eq!(DaemonState::count(&state.releases), 1);
}

#[tokio::test]
async fn connect_checks_bounds_before_the_daemon() {
    let state = DaemonState::with_devices(2);
    let mut registry = UsbmuxRegistry::new(CountingClient(state.clone()));

    assert!(matches!(
        registry.connect(0, 62078).await,
        Err(Error::NoSuchDevice { index: 0, count: 0 })
    ));

    registry.reload().await.unwrap();
    assert!(matches!(
        registry.connect(2, 62078).await,
        Err(Error::NoSuchDevice { index: 2, count: 2 })
    ));
    assert_eq!(DaemonState::count(&state.connects), 0);
}

#[tokio::test]
async fn connect_hands_out_a_device_pipe() {
    let state = DaemonState::with_devices(2);
    let mut registry = UsbmuxRegistry::new(CountingClient(state.clone()));
    registry.reload().await.unwrap();

    let mut stream = registry.connect(1, 62078).await.unwrap();
    let mut peer = state.peers.lock().unwrap().pop().unwrap();

    stream.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    peer.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    registry.disconnect(stream).await.unwrap();
    assert_eq!(peer.read(&mut buf).await.unwrap(), 0);
}

#[tokio::test]
async fn refused_connect_is_reported() {
    let state = Arc::new(DaemonState::default());
    *state.devices.lock().unwrap() = vec![MuxDeviceInfo::new(0, 1, "udid", ConnectionType::Network)];
    let mut registry = UsbmuxRegistry::new(CountingClient(state.clone()));
    registry.reload().await.unwrap();

    assert!(matches!(
        registry.connect(0, 1).await,
        Err(Error::MuxResult { code: 3 })
    ));
    assert_eq!(DaemonState::count(&state.connects), 1);
}

#[tokio::test]
async fn debug_level_reaches_the_client() {
    let state = DaemonState::with_devices(0);
    let registry = UsbmuxRegistry::new(CountingClient(state.clone()));
    registry.set_debug_level(2);
    assert_eq!(state.debug_level.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unavailable_registry_degrades() {
    let mut registry = UsbmuxRegistry::<CountingClient>::unavailable();
    assert!(!registry.is_available());

    assert_eq!(registry.reload().await.unwrap(), 0);
    assert!(registry.next_device().is_none());
    assert!(matches!(
        registry.connect(0, 62078).await,
        Err(Error::Unavailable)
    ));
    registry.set_debug_level(1);
}

#[tokio::test]
async fn usable_through_the_trait() {
    async fn first_udid<D>(registry: &mut D) -> Option<String>
    where
        D: DeviceRegistry<Device = MuxDeviceInfo>,
    {
        registry.reload().await.ok()?;
        registry.next_device().await.map(|d| d.udid().to_string())
    }

    let mut registry = UsbmuxRegistry::new(CountingClient(DaemonState::with_devices(1)));
    assert_eq!(first_udid(&mut registry).await.as_deref(), Some("udid-0"));
}

fn xml(dict: Dictionary) -> Vec<u8> {
    let mut body = Vec::new();
    Value::Dictionary(dict).to_writer_xml(&mut body).unwrap();
    body
}

fn attached(device_id: u64, serial: &str) -> Value {
    let mut props = Dictionary::new();
    props.insert("ConnectionType".into(), Value::String("USB".into()));
    props.insert("ProductID".into(), Value::Integer(0x12a8u64.into()));
    props.insert("SerialNumber".into(), Value::String(serial.into()));
    let mut dev = Dictionary::new();
    dev.insert("DeviceID".into(), Value::Integer(device_id.into()));
    dev.insert("MessageType".into(), Value::String("Attached".into()));
    dev.insert("Properties".into(), Value::Dictionary(props));
    Value::Dictionary(dev)
}

fn result(number: u64) -> Vec<u8> {
    let mut reply = Dictionary::new();
    reply.insert("MessageType".into(), Value::String("Result".into()));
    reply.insert("Number".into(), Value::Integer(number.into()));
    xml(reply)
}

fn tcp_client(addr: std::net::SocketAddr) -> UsbmuxdClient {
    UsbmuxdClient::new(
        UsbmuxdConfig::default()
            .address(MuxAddress::Tcp(addr.to_string()))
            .prog_name("device-link-tests"),
    )
    .unwrap()
}

#[test_log::test(tokio::test)]
async fn talks_to_a_usbmuxd_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let daemon = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let frame = read_frame(&mut sock).await.unwrap();
        let request: Dictionary = plist::from_bytes(&frame.body).unwrap();
        assert_eq!(
            request.get("MessageType").and_then(Value::as_string),
            Some("ListDevices")
        );
        assert_eq!(
            request.get("ProgName").and_then(Value::as_string),
            Some("device-link-tests")
        );
        let mut reply = Dictionary::new();
        reply.insert(
            "DeviceList".into(),
            Value::Array(vec![attached(7, "00008030-001A2D3E0C41802E")]),
        );
        write_frame(&mut sock, frame.tag, &xml(reply)).await.unwrap();

        // Connect: the socket turns into the device pipe after the reply.
        let (mut sock, _) = listener.accept().await.unwrap();
        let frame = read_frame(&mut sock).await.unwrap();
        let request: Dictionary = plist::from_bytes(&frame.body).unwrap();
        write_frame(&mut sock, frame.tag, &result(0)).await.unwrap();

        let mut buf = [0u8; 4];
        sock.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        sock.write_all(b"pong").await.unwrap();
        request
    });

    let mut registry = UsbmuxRegistry::new(tcp_client(addr));
    assert_eq!(registry.reload().await.unwrap(), 1);
    let dev = registry.next_device().unwrap();
    assert_eq!(dev.udid(), "00008030-001A2D3E0C41802E");
    assert_eq!(dev.handle(), 7);
    assert_eq!(dev.connection_type(), ConnectionType::Usb);

    let mut stream = registry.connect(0, 62078).await.unwrap();
    stream.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"pong");
    registry.disconnect(stream).await.unwrap();

    let request = daemon.await.unwrap();
    assert_eq!(
        request.get("MessageType").and_then(Value::as_string),
        Some("Connect")
    );
    assert_eq!(
        request.get("DeviceID").and_then(Value::as_unsigned_integer),
        Some(7)
    );
    assert_eq!(
        request.get("PortNumber").and_then(Value::as_unsigned_integer),
        Some(u64::from(port_to_wire(62078)))
    );
}

#[tokio::test]
async fn daemon_refusal_fails_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let daemon = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let frame = read_frame(&mut sock).await.unwrap();
        let mut reply = Dictionary::new();
        reply.insert("DeviceList".into(), Value::Array(vec![attached(3, "abc")]));
        write_frame(&mut sock, frame.tag, &xml(reply)).await.unwrap();

        let (mut sock, _) = listener.accept().await.unwrap();
        let frame = read_frame(&mut sock).await.unwrap();
        write_frame(&mut sock, frame.tag, &result(3)).await.unwrap();
    });

    let mut registry = UsbmuxRegistry::new(tcp_client(addr));
    registry.reload().await.unwrap();
    assert!(matches!(
        registry.connect(0, 22).await,
        Err(Error::MuxResult { code: 3 })
    ));
    daemon.await.unwrap();
}

#[tokio::test]
async fn stopped_daemon_reloads_to_zero() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut registry = UsbmuxRegistry::new(tcp_client(addr));
    assert_eq!(registry.reload().await.unwrap(), 0);
    assert!(registry.next_device().is_none());
}
