//! Fire-and-forget simulator warm-up
//!
//! Booting a simulator takes long enough that starting it before the first
//! build saves wall-clock time on test targets. The boot runs on a named
//! thread that is never joined: nothing waits for it, and a test step that
//! starts before the boot finishes simply boots the simulator itself.

use std::io;
use std::sync::Arc;
use std::thread;

use tracing::{info, warn};

use crate::runner::{Invocation, ToolRunner};

/// Thread name of the boot task
pub const SIMULATOR_BOOT_TASK: &str = "simulator-boot";

pub fn boot_invocation(udid: &str) -> Invocation {
    Invocation::new("xcrun").args(["simctl", "boot", udid])
}

/// Start booting `udid` in the background. Best effort: the result is only
/// logged.
pub fn spawn_simulator_boot(runner: Arc<dyn ToolRunner>, udid: String) -> io::Result<()> {
    let handle = thread::Builder::new()
        .name(SIMULATOR_BOOT_TASK.to_string())
        .spawn(move || match runner.capture(&boot_invocation(&udid)) {
            Ok(output) if output.succeeded() => info!(udid = %udid, "simulator booted"),
            // simctl refuses to boot an already booted device
            Ok(output) => warn!(udid = %udid, status = output.status, stderr = %output.stderr.trim(), "simulator boot did not succeed"),
            Err(e) => warn!(udid = %udid, error = %e, "simulator boot failed to start"),
        })?;
    drop(handle);
    Ok(())
}
