//! Parsers for `adb` text output.

use tracing::{debug, trace};

const HEADER_MARKER: &str = "List of";
const SEPARATORS: [char; 2] = [' ', '\t'];

/// One `<serial><whitespace><state>` line of `adb devices`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLine<'a> {
    /// Left token.
    pub serial: &'a str,
    /// Remainder of the line after the separator run.
    pub state: &'a str,
}

/// Parse `adb devices` output into at most `limit` device lines.
///
/// The `List of attached devices` header, blank lines and server banners
/// (`* daemon started successfully`) are skipped. A line without any space
/// or tab ends the parse: everything after it is ignored.
pub fn parse_devices(output: &str, limit: usize) -> Vec<DeviceLine<'_>> {
    let mut devices = Vec::new();
    if limit == 0 {
        return devices;
    }

    for line in output.split('\n') {
        trace!(": {}", line);
        if line.trim().is_empty() || line.contains(HEADER_MARKER) || line.starts_with('*') {
            continue;
        }

        let Some(sep) = line.find(SEPARATORS) else {
            debug!(line, "no separator in device line, stopping");
            break;
        };
        if sep == 0 {
            continue;
        }

        let serial = &line[..sep];
        let state = line[sep + 1..].trim_start_matches(SEPARATORS).trim_end();
        if state.is_empty() {
            continue;
        }

        devices.push(DeviceLine { serial, state });
        if devices.len() == limit {
            break;
        }
    }
    devices
}

/// One active forward from `adb forward --list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardEntry {
    /// Device the forward belongs to.
    pub serial: String,
    /// Host side, e.g. `tcp:5555`.
    pub local: String,
    /// Device side, e.g. `tcp:6000`.
    pub remote: String,
}

/// Parse `adb forward --list` output, ignoring lines that do not have
/// exactly three fields.
pub fn parse_forward_list(output: &str) -> Vec<ForwardEntry> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next(), fields.next(), fields.next()) {
                (Some(serial), Some(local), Some(remote), None) => Some(ForwardEntry {
                    serial: serial.to_string(),
                    local: local.to_string(),
                    remote: remote.to_string(),
                }),
                _ => None,
            }
        })
        .collect()
}
