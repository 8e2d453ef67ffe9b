//! Process execution utilities with timeout support
//!
//! Provides helpers for running ffmpeg/ffprobe with configurable timeouts so
//! a hung encoder can't block the pipeline forever.

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

use crate::core::error::AppError;

/// Default timeout for ffmpeg renders (10 minutes, a few hundred frames at 24 fps)
pub const FFMPEG_TIMEOUT: Duration = Duration::from_secs(600);

/// Default timeout for ffprobe metadata queries (30 seconds)
pub const FFPROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Run an async Command with a timeout.
///
/// The child is killed when the timeout fires (`kill_on_drop`).
pub async fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<Output, AppError> {
    cmd.kill_on_drop(true);
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(AppError::Io(e)),
        Err(_) => Err(AppError::Process(format!("Process timed out after {}s", timeout.as_secs()))),
    }
}

/// Returns true if `binary -version` runs successfully.
pub async fn is_available(binary: &str) -> bool {
    Command::new(binary)
        .arg("-version")
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}
