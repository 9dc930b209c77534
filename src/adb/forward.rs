//! TCP port forwards brokered by `adb`.

use tracing::debug;

use super::parse::{parse_forward_list, ForwardEntry};
use super::Adb;
use crate::process::ProcessRunner;
use crate::Result;

/// Forward host `local_port` to `remote_port` on the device.
pub async fn forward<R: ProcessRunner>(
    adb: &Adb<R>,
    serial: &str,
    local_port: u16,
    remote_port: u16,
) -> Result<()> {
    let local = format!("tcp:{local_port}");
    let remote = format!("tcp:{remote_port}");
    adb.run_checked("adb fwd", Some(serial), &["forward", &local, &remote], false)
        .await?;
    debug!(serial, local_port, remote_port, "forward established");
    Ok(())
}

/// Drop every forward of the device. Failures are only logged.
pub async fn forward_remove_all<R: ProcessRunner>(adb: &Adb<R>, serial: &str) {
    let _ = adb
        .run_checked("adb fwd clear", Some(serial), &["forward", "--remove-all"], false)
        .await;
}

/// Active forwards across all devices.
pub async fn forward_list<R: ProcessRunner>(adb: &Adb<R>) -> Result<Vec<ForwardEntry>> {
    let output = adb
        .run_checked("adb fwd list", None, &["forward", "--list"], true)
        .await?;
    Ok(parse_forward_list(&output.stdout_lossy()))
}
