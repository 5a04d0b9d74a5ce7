// src/render.rs

//! External renderer invocation and the pre-flight sync check.
//!
//! The renderer is the only external process that produces user-visible
//! output, so two policies live here:
//! - before spawning anything, the plan's output duration and the assembled
//!   audio duration must agree to within one frame; a mismatch is a bug in
//!   the planner/assembler/renderer bridge and fails loudly;
//! - a cancelled request kills the in-flight process and keeps no partial
//!   output.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::assembler::AssembledAudio;
use crate::error::{Error, Result};
use crate::planner::EditPlan;

/// Verify the audio/video duration invariant before invoking the renderer.
///
/// The video side will render exactly the plan's kept segments (with fade
/// overlap), so the assembled audio must match `estimated_output_duration`
/// to within one frame at the source frame rate (floored at 2 ms for
/// high-rate sources).
pub fn verify_sync(plan: &EditPlan, audio: &AssembledAudio, frame_rate: f64) -> Result<()> {
    let expected = plan.estimated_output_duration;
    let actual = audio.duration_s();
    let tolerance = (1.0 / frame_rate).max(0.002);

    let drift = (expected - actual).abs();
    if drift > tolerance {
        return Err(Error::SyncError(format!(
            "plan expects {expected:.6}s of output but assembled audio is {actual:.6}s \
             (drift {drift:.6}s > tolerance {tolerance:.6}s)"
        )));
    }

    debug!(expected, actual, drift, "sync check passed");
    Ok(())
}

/// Runs the external media tool. The sole external process invocation that
/// produces the final output.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn run(&self, args: &[String], output: &Path, cancel: &CancellationToken) -> Result<()>;
}

/// Production renderer shelling out to `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FfmpegRenderer {
    bin: PathBuf,
}

impl Default for FfmpegRenderer {
    fn default() -> Self {
        Self {
            bin: PathBuf::from("ffmpeg"),
        }
    }
}

impl FfmpegRenderer {
    pub fn with_bin(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }
}

#[async_trait]
impl Renderer for FfmpegRenderer {
    async fn run(&self, args: &[String], output: &Path, cancel: &CancellationToken) -> Result<()> {
        debug!(bin = %self.bin.display(), ?args, "starting render");

        let child = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::RenderFailed(format!("failed to spawn renderer: {e}")))?;

        // Racing against cancellation: dropping the child kills the process
        // (kill_on_drop), and the partial output file is removed below.
        let out = tokio::select! {
            out = child.wait_with_output() => {
                out.map_err(|e| Error::RenderFailed(format!("renderer did not complete: {e}")))?
            }
            _ = cancel.cancelled() => {
                let _ = std::fs::remove_file(output);
                return Err(Error::Cancelled);
            }
        };

        if !out.status.success() {
            let _ = std::fs::remove_file(output);
            return Err(Error::RenderFailed(format!(
                "renderer exited with {}: {}",
                out.status,
                stderr_tail(&out.stderr)
            )));
        }

        info!(output = %output.display(), "render complete");
        Ok(())
    }
}

/// The last few lines of renderer stderr: enough to diagnose, small enough
/// to put in an error message.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(8);
    lines[start..].join(" | ")
}
