//! Slot table of devices reported by `adb devices`.

use async_trait::async_trait;
use tracing::debug;

use super::device::{sanitize_model, AdbDevice};
use super::parse::parse_devices;
use super::Adb;
use crate::process::{ProcessRunner, TokioRunner};
use crate::registry::DeviceRegistry;
use crate::Result;

/// Fixed-capacity table of adb devices.
///
/// Slots are filled positionally: slot `n` holds the `n`th device line of
/// the most recent `adb devices` output. A slot is never emptied once
/// created, so a device that disappears stays visible until another device
/// lands in the same slot. Every reload forgets the model of every slot it
/// writes, and [`next_device()`](Self::next_device) fetches it again the
/// first time it visits the slot while the device is online.
pub struct AdbRegistry<R = TokioRunner> {
    adb: Adb<R>,
    slots: Vec<Option<AdbDevice>>,
    cursor: usize,
    count: usize,
}

impl<R: ProcessRunner> AdbRegistry<R> {
    /// Create an empty table and warm up the adb server.
    ///
    /// A failing `start-server` is logged and ignored; the server may
    /// already be running.
    pub async fn new(adb: Adb<R>) -> Self {
        let slots = vec![None; adb.config().device_limit];
        let _ = adb
            .run_checked("adb start-server", None, &["start-server"], false)
            .await;
        Self {
            adb,
            slots,
            cursor: 0,
            count: 0,
        }
    }

    /// The command handle, for [`forward`](super::forward) and friends.
    pub fn adb(&self) -> &Adb<R> {
        &self.adb
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Device lines written by the last successful reload.
    pub fn device_count(&self) -> usize {
        self.count
    }

    /// Populated slots in order, without resolving models.
    pub fn devices(&self) -> impl Iterator<Item = &AdbDevice> {
        self.slots.iter().flatten()
    }

    /// Refresh the table from `adb reconnect offline` and `adb devices`.
    ///
    /// Either command failing leaves the table untouched. A malformed
    /// device line ends parsing without failing the reload; the devices
    /// before it are kept.
    pub async fn reload(&mut self) -> Result<usize> {
        self.adb
            .run_checked("adb r.o.", None, &["reconnect", "offline"], false)
            .await?;
        let output = self
            .adb
            .run_checked("adb devices", None, &["devices"], true)
            .await?;

        let text = output.stdout_lossy();
        let lines = parse_devices(&text, self.slots.len());
        for (slot, line) in self.slots.iter_mut().zip(&lines) {
            match slot {
                Some(dev) => dev.update(line.serial, line.state),
                None => *slot = Some(AdbDevice::new(line.serial, line.state)),
            }
        }

        self.count = lines.len();
        self.cursor = 0;
        debug!(devices = self.count, "adb reload");
        Ok(self.count)
    }

    /// Next device in slot order, or `None` at the first empty slot.
    ///
    /// The cursor wraps after the last slot and stays put on `None`. An
    /// online device without a model gets one resolved here, which runs
    /// `adb shell getprop` and blocks until it exits; a failure leaves the
    /// model empty.
    pub async fn next_device(&mut self) -> Option<&AdbDevice> {
        if self.cursor >= self.slots.len() {
            self.cursor = 0;
        }
        let index = self.cursor;

        let missing_model = match self.slots.get(index).and_then(Option::as_ref) {
            Some(dev) => {
                if dev.is_offline() {
                    debug!(serial = %dev.serial(), "device is offline");
                }
                dev.needs_model().then(|| dev.serial().to_string())
            }
            None => return None,
        };
        self.cursor += 1;

        if let Some(serial) = missing_model {
            if let Some(model) = resolve_model(&self.adb, &serial).await {
                if let Some(dev) = self.slots[index].as_mut() {
                    dev.set_model(model);
                }
            }
        }
        self.slots[index].as_ref()
    }
}

async fn resolve_model<R: ProcessRunner>(adb: &Adb<R>, serial: &str) -> Option<String> {
    let output = adb
        .run_checked(
            "adb get model",
            Some(serial),
            &["shell", "getprop", "ro.product.model"],
            true,
        )
        .await
        .ok()?;
    let model = sanitize_model(&output.stdout);
    debug!("model: {}", model);
    Some(model)
}

#[async_trait]
impl<R: ProcessRunner> DeviceRegistry for AdbRegistry<R> {
    type Device = AdbDevice;

    async fn reload(&mut self) -> Result<usize> {
        AdbRegistry::reload(self).await
    }

    async fn next_device(&mut self) -> Option<&AdbDevice> {
        AdbRegistry::next_device(self).await
    }
}
