// src/subject.rs

//! Subject localization: where in the frame the speaker (or other subject)
//! is, so the crop can follow them.
//!
//! The vision model itself is out of process and consumed as an oracle: a
//! JPEG goes in, a normalized point with a confidence comes out. The
//! pipeline samples a handful of frames across the clip, queries the oracle
//! with bounded retries, and aggregates. The oracle being down is never
//! fatal: the caller falls back to a center crop flagged for review.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A normalized image coordinate plus the oracle's confidence in it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubjectPosition {
    pub nx: f64,
    pub ny: f64,
    pub confidence: f64,
}

impl SubjectPosition {
    /// Frame center with zero confidence: the degraded-mode fallback.
    pub fn center() -> Self {
        Self {
            nx: 0.5,
            ny: 0.5,
            confidence: 0.0,
        }
    }
}

/// The external vision model, reduced to its one operation.
#[async_trait]
pub trait VisionOracle: Send + Sync {
    async fn locate(&self, jpeg: &[u8]) -> anyhow::Result<SubjectPosition>;
}

/// Relative positions inside the clip range at which frames are sampled.
const FRAME_FRACTIONS: [f64; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

/// Fewer successful frames than this and the aggregate is not trustworthy.
const MIN_FRAMES_FOR_AGGREGATE: usize = 3;

/// Per-frame deadline for one oracle call.
const ORACLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Backoff before the two retries a frame gets.
const RETRY_BACKOFF_MS: [u64; 2] = [100, 400];

/// Samples frames from the clip range and aggregates oracle answers.
pub struct SubjectLocalizer {
    oracle: Arc<dyn VisionOracle>,
    ffmpeg_bin: PathBuf,
}

impl SubjectLocalizer {
    pub fn new(oracle: Arc<dyn VisionOracle>) -> Self {
        Self {
            oracle,
            ffmpeg_bin: PathBuf::from("ffmpeg"),
        }
    }

    pub fn with_ffmpeg_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.ffmpeg_bin = bin.into();
        self
    }

    /// Localize the subject across the clip range.
    ///
    /// Never fails: frames that cannot be extracted or located are skipped,
    /// and under [`MIN_FRAMES_FOR_AGGREGATE`] successes the result is the
    /// center fallback.
    pub async fn localize(
        &self,
        source: &Path,
        clip_start: f64,
        clip_end: f64,
        scratch: &Path,
        cancel: &CancellationToken,
    ) -> SubjectPosition {
        let span = clip_end - clip_start;
        let mut hits: Vec<SubjectPosition> = Vec::new();

        for (i, fraction) in FRAME_FRACTIONS.iter().enumerate() {
            if cancel.is_cancelled() {
                return SubjectPosition::center();
            }

            // Sampling at exactly clip_end would ask for a frame past the
            // last one; nudge the final sample inside the range.
            let t = (clip_start + fraction * span).min(clip_end - 0.01).max(clip_start);
            let frame_path = scratch.join(format!("subject-frame-{i}.jpg"));

            let jpeg = match self.extract_frame(source, t, &frame_path).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(t, error = %format!("{err:#}"), "frame extraction failed; skipping");
                    continue;
                }
            };

            match locate_with_retry(self.oracle.as_ref(), &jpeg, cancel).await {
                Some(pos) => hits.push(pos),
                None => warn!(t, "vision oracle gave no answer for frame"),
            }
        }

        if hits.len() < MIN_FRAMES_FOR_AGGREGATE {
            debug!(hits = hits.len(), "too few localized frames; using center");
            return SubjectPosition::center();
        }

        aggregate(&hits)
    }

    /// Pull one frame as JPEG bytes via the external media tool.
    async fn extract_frame(&self, source: &Path, t: f64, out: &Path) -> anyhow::Result<Vec<u8>> {
        let output = Command::new(&self.ffmpeg_bin)
            .arg("-y")
            .arg("-v")
            .arg("error")
            .arg("-ss")
            .arg(format!("{t:.3}"))
            .arg("-i")
            .arg(source)
            .arg("-frames:v")
            .arg("1")
            .arg("-q:v")
            .arg("3")
            .arg(out)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            anyhow::bail!(
                "frame grab exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(tokio::fs::read(out).await?)
    }
}

/// One oracle call with up to two retries and exponential backoff.
async fn locate_with_retry(
    oracle: &dyn VisionOracle,
    jpeg: &[u8],
    cancel: &CancellationToken,
) -> Option<SubjectPosition> {
    for attempt in 0..=RETRY_BACKOFF_MS.len() {
        if cancel.is_cancelled() {
            return None;
        }

        match tokio::time::timeout(ORACLE_TIMEOUT, oracle.locate(jpeg)).await {
            Ok(Ok(pos)) => {
                return Some(SubjectPosition {
                    nx: pos.nx.clamp(0.0, 1.0),
                    ny: pos.ny.clamp(0.0, 1.0),
                    confidence: pos.confidence.clamp(0.0, 1.0),
                });
            }
            Ok(Err(err)) => {
                debug!(attempt, error = %format!("{err:#}"), "oracle call failed");
            }
            Err(_) => {
                debug!(attempt, "oracle call timed out");
            }
        }

        if let Some(backoff) = RETRY_BACKOFF_MS.get(attempt) {
            tokio::time::sleep(Duration::from_millis(*backoff)).await;
        }
    }

    None
}

/// Confidence-weighted mean of per-frame positions; overall confidence is
/// the plain mean.
fn aggregate(hits: &[SubjectPosition]) -> SubjectPosition {
    let weight: f64 = hits.iter().map(|h| h.confidence).sum();
    let confidence = weight / hits.len() as f64;

    if weight <= f64::EPSILON {
        // All-zero confidence carries no position information.
        return SubjectPosition::center();
    }

    SubjectPosition {
        nx: hits.iter().map(|h| h.nx * h.confidence).sum::<f64>() / weight,
        ny: hits.iter().map(|h| h.ny * h.confidence).sum::<f64>() / weight,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pos(nx: f64, ny: f64, confidence: f64) -> SubjectPosition {
        SubjectPosition { nx, ny, confidence }
    }

    #[test]
    fn aggregate_weights_by_confidence() {
        let hits = [pos(0.2, 0.2, 1.0), pos(0.8, 0.8, 0.5), pos(0.2, 0.2, 0.0)];
        let agg = aggregate(&hits);

        // (0.2*1.0 + 0.8*0.5) / 1.5 = 0.4
        assert!((agg.nx - 0.4).abs() < 1e-9);
        assert!((agg.ny - 0.4).abs() < 1e-9);
        assert!((agg.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn aggregate_with_zero_total_confidence_is_center() {
        let hits = [pos(0.1, 0.1, 0.0), pos(0.9, 0.9, 0.0), pos(0.5, 0.1, 0.0)];
        assert_eq!(aggregate(&hits), SubjectPosition::center());
    }

    struct FlakyOracle {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl VisionOracle for FlakyOracle {
        async fn locate(&self, _jpeg: &[u8]) -> anyhow::Result<SubjectPosition> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                anyhow::bail!("oracle hiccup");
            }
            Ok(pos(0.25, 0.75, 0.9))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_recover_from_transient_failures() {
        let oracle = FlakyOracle {
            calls: AtomicUsize::new(0),
            fail_first: 2,
        };
        let cancel = CancellationToken::new();

        let got = locate_with_retry(&oracle, b"jpeg", &cancel).await;
        assert_eq!(got, Some(pos(0.25, 0.75, 0.9)));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_retry_budget() {
        let oracle = FlakyOracle {
            calls: AtomicUsize::new(0),
            fail_first: usize::MAX,
        };
        let cancel = CancellationToken::new();

        let got = locate_with_retry(&oracle, b"jpeg", &cancel).await;
        assert_eq!(got, None);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn out_of_range_answers_are_clamped() {
        struct WildOracle;

        #[async_trait]
        impl VisionOracle for WildOracle {
            async fn locate(&self, _jpeg: &[u8]) -> anyhow::Result<SubjectPosition> {
                Ok(pos(1.7, -0.3, 2.0))
            }
        }

        let cancel = CancellationToken::new();
        let got = locate_with_retry(&WildOracle, b"jpeg", &cancel).await.unwrap();
        assert_eq!(got, pos(1.0, 0.0, 1.0));
    }
}
