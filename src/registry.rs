//! Iteration contract shared by the adb and usbmux registries.

use async_trait::async_trait;

use crate::Result;

/// A device table refreshed on demand and drained with a cursor.
///
/// Nothing refreshes in the background: callers that want periodic
/// discovery call [`reload()`](DeviceRegistry::reload) from their own loop,
/// then call [`next_device()`](DeviceRegistry::next_device) until it yields
/// `None`. A registry is driven by one owner at a time.
#[async_trait]
pub trait DeviceRegistry: Send {
    /// Record type yielded by the iterator.
    type Device: Send + Sync;

    /// Resynchronise with the backend and rewind the cursor.
    ///
    /// Returns how many devices the backend reported.
    async fn reload(&mut self) -> Result<usize>;

    /// Next known device, or `None` at the end of the table.
    async fn next_device(&mut self) -> Option<&Self::Device>;
}

/// Keep at most `capacity - 1` bytes, cut on a character boundary.
///
/// Device records mirror fixed-size, NUL-terminated fields, so one byte of
/// every capacity is reserved.
pub(crate) fn bounded(value: &str, capacity: usize) -> String {
    let max = capacity.saturating_sub(1);
    if value.len() <= max {
        return value.to_string();
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}
