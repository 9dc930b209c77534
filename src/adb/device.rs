//! Device records kept in the adb slot table.

use crate::registry::bounded;

/// Capacity of the serial field, terminator included.
pub const SERIAL_CAPACITY: usize = 80;

/// Capacity of the state field, terminator included.
pub const STATE_CAPACITY: usize = 32;

/// Capacity of the model field, terminator included.
pub const MODEL_CAPACITY: usize = 80;

const OFFLINE: &str = "offline";

/// One device as reported by `adb devices`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdbDevice {
    serial: String,
    state: String,
    model: String,
}

impl AdbDevice {
    /// Create a record, truncating both fields to their capacity.
    pub fn new(serial: &str, state: &str) -> Self {
        let mut dev = Self::default();
        dev.update(serial, state);
        dev
    }

    /// Serial number assigned by adb.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Status token such as `device`, `offline` or `unauthorized`.
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Product model, empty until resolved.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// State starts with `offline`.
    pub fn is_offline(&self) -> bool {
        self.state.as_bytes().starts_with(OFFLINE.as_bytes())
    }

    /// Overwrite serial and state and forget the model.
    pub(crate) fn update(&mut self, serial: &str, state: &str) {
        self.serial = bounded(serial, SERIAL_CAPACITY);
        self.state = bounded(state, STATE_CAPACITY);
        self.model.clear();
    }

    pub(crate) fn needs_model(&self) -> bool {
        !self.is_offline() && self.model.is_empty()
    }

    pub(crate) fn set_model(&mut self, model: String) {
        self.model = model;
    }
}

/// Leading run of model-safe characters from raw `getprop` output.
///
/// Stops at the first byte that is not ASCII alphanumeric, space, `-` or
/// `_`, so trailing newlines and control characters never make it in.
pub fn sanitize_model(raw: &[u8]) -> String {
    let max = MODEL_CAPACITY - 2;
    raw.iter()
        .take(max)
        .take_while(|&&b| b.is_ascii_alphanumeric() || matches!(b, b' ' | b'-' | b'_'))
        .map(|&b| b as char)
        .collect()
}
