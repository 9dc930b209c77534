use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use device_link::adb::forward;
use device_link::{Adb, AdbConfig, AdbRegistry, UsbmuxRegistry};

#[derive(Parser)]
#[clap(name = "list-devices")]
#[clap(about = "List Android and iOS devices attached to this host")]
struct Args {
    /// Path to the adb executable (overrides $ADB)
    #[clap(long)]
    adb: Option<String>,

    /// Kill adb commands that run longer than this many seconds
    #[clap(long)]
    timeout: Option<u64>,

    /// Forward this host port to the same port on every online Android device
    #[clap(long)]
    forward: Option<u16>,

    /// Verbose usbmuxd diagnostics
    #[clap(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = AdbConfig::from_env();
    if let Some(path) = args.adb {
        config = config.adb_path(path);
    }
    if let Some(secs) = args.timeout {
        config = config.command_timeout(Duration::from_secs(secs));
    }

    let mut android = AdbRegistry::new(Adb::new(config)).await;
    match android.reload().await {
        Ok(count) => {
            info!("{} Android device(s)", count);
            for _ in 0..count {
                let Some(dev) = android.next_device().await else {
                    break;
                };
                println!("android {:<24} {:<14} {}", dev.serial(), dev.state(), dev.model());
            }
        }
        Err(e) => warn!("adb unavailable: {}", e),
    }

    if let Some(port) = args.forward {
        let online: Vec<String> = android
            .devices()
            .take(android.device_count())
            .filter(|d| d.state() == "device")
            .map(|d| d.serial().to_string())
            .collect();
        for serial in online {
            forward(android.adb(), &serial, port, port).await?;
            info!("forwarding tcp:{} to {}", port, serial);
        }
    }

    let mut ios = UsbmuxRegistry::open();
    if args.verbose {
        ios.set_debug_level(1);
    }
    let count = ios.reload().await?;
    info!("{} iOS device(s)", count);
    while let Some(dev) = ios.next_device() {
        println!(
            "ios     {:<44} handle={} product=0x{:04x} {:?}",
            dev.udid(),
            dev.handle(),
            dev.product_id(),
            dev.connection_type()
        );
    }

    Ok(())
}
