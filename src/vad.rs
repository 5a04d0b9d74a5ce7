// src/vad.rs

//! Voice-activity analysis over an extracted PCM file.
//!
//! The raw detector sits behind [`VoiceDetector`] so the pipeline (and tests)
//! can swap the neural model for a scripted double. What the rest of the crate
//! consumes is never raw detector spans but a [`VadAnalysis`]: an exact
//! alternating speech/silence partition of the analyzed range, normalized by
//! the policy below.

use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use voice_activity_detector::VoiceActivityDetector as Silero;

use crate::presets::{Preset, PresetConfig};
use crate::wav;

/// Detector gaps shorter than this are merged into the surrounding speech.
///
/// This is deliberately the same value as [`MIN_INTERVAL_S`]: merging every
/// sub-minimum gap is the only way to guarantee the partition never contains
/// an interval shorter than the minimum.
const MIN_GAP_S: f64 = 0.020;

/// No interval in the final partition may be shorter than this.
const MIN_INTERVAL_S: f64 = 0.020;

/// A contiguous run of detected speech, in source-time seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeechSegment {
    pub start: f64,
    pub end: f64,
}

/// A contiguous run of non-speech, in source-time seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SilenceSegment {
    pub start: f64,
    pub end: f64,
}

/// The memoized result of analyzing one source with one preset.
///
/// Immutable once built: the cache hands out shared references and the planner
/// never writes back. `speech_segments` and `silence_segments` together
/// partition `[offset, offset + duration)` exactly, alternating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VadAnalysis {
    pub source_id: String,
    pub duration: f64,
    pub speech_segments: Vec<SpeechSegment>,
    pub silence_segments: Vec<SilenceSegment>,
    pub preset: Preset,
    pub config: PresetConfig,
    pub generated_at: SystemTime,
}

/// The raw speech detector: spans of detected speech, in seconds from the
/// start of the PCM file.
///
/// Implementations are blocking; the orchestrator runs them on the blocking
/// pool under a deadline.
pub trait VoiceDetector: Send + Sync {
    fn detect(&self, pcm_path: &Path, threshold: f32) -> Result<Vec<(f64, f64)>>;
}

/// Silero-backed detector.
///
/// Feeds fixed-size chunks (32 ms at the pipeline rate) through the bundled
/// silero model and emits maximal runs of speech-labeled chunks. The final
/// partial chunk is zero-padded rather than dropped so trailing speech is not
/// cut short.
#[derive(Debug, Clone)]
pub struct SileroDetector {
    chunk_size: usize,
}

impl Default for SileroDetector {
    fn default() -> Self {
        // 512 samples is the silero-supported chunk size for 16 kHz input.
        Self { chunk_size: 512 }
    }
}

impl VoiceDetector for SileroDetector {
    fn detect(&self, pcm_path: &Path, threshold: f32) -> Result<Vec<(f64, f64)>> {
        let (samples, rate) = wav::read_mono_f32(pcm_path)?;
        anyhow::ensure!(
            rate == wav::PIPELINE_SAMPLE_RATE,
            "detector expects {} Hz input, got {rate}",
            wav::PIPELINE_SAMPLE_RATE
        );

        let mut vad = Silero::builder()
            .sample_rate(i64::from(rate))
            .chunk_size(self.chunk_size)
            .build()
            .context("failed to initialize silero detector")?;

        let chunk_s = self.chunk_size as f64 / rate as f64;
        let mut spans: Vec<(f64, f64)> = Vec::new();
        let mut run_start: Option<usize> = None;

        for (i, chunk) in samples.chunks(self.chunk_size).enumerate() {
            let prob = if chunk.len() == self.chunk_size {
                vad.predict(chunk.iter().copied())
            } else {
                let mut padded = chunk.to_vec();
                padded.resize(self.chunk_size, 0.0);
                vad.predict(padded)
            };

            let is_speech = prob >= threshold;
            match (is_speech, run_start) {
                (true, None) => run_start = Some(i),
                (false, Some(s)) => {
                    spans.push((s as f64 * chunk_s, i as f64 * chunk_s));
                    run_start = None;
                }
                _ => {}
            }
        }

        if let Some(s) = run_start {
            let end = samples.len() as f64 / rate as f64;
            spans.push((s as f64 * chunk_s, end));
        }

        debug!(spans = spans.len(), "silero detection complete");
        Ok(spans)
    }
}

/// Build a [`VadAnalysis`] from raw detector spans.
///
/// `offset` is the source-time position of the PCM's first sample (zero when
/// the extraction covered the whole source); all output segments are in
/// source-time.
pub fn analyze(
    source_id: &str,
    preset: Preset,
    duration: f64,
    offset: f64,
    raw_spans: Vec<(f64, f64)>,
) -> VadAnalysis {
    let (speech, silence) = partition_spans(&raw_spans, duration);

    let shift = |t: f64| t + offset;
    let speech_segments = speech
        .into_iter()
        .map(|s| SpeechSegment {
            start: shift(s.start),
            end: shift(s.end),
        })
        .collect();
    let silence_segments = silence
        .into_iter()
        .map(|s| SilenceSegment {
            start: shift(s.start),
            end: shift(s.end),
        })
        .collect();

    VadAnalysis {
        source_id: source_id.to_owned(),
        duration,
        speech_segments,
        silence_segments,
        preset,
        config: preset.config(),
        generated_at: SystemTime::now(),
    }
}

/// Normalize raw spans into an exact alternating partition of `[0, duration)`.
///
/// Policy:
/// - clamp spans into `[0, duration)`, drop empties, sort by start
/// - merge spans separated by less than [`MIN_GAP_S`]
/// - drop speech intervals shorter than [`MIN_INTERVAL_S`]
/// - snap a leading/trailing silence sliver shorter than the minimum onto the
///   adjacent speech interval
/// - silences are the complement of the surviving speech
pub fn partition_spans(
    raw: &[(f64, f64)],
    duration: f64,
) -> (Vec<SpeechSegment>, Vec<SilenceSegment>) {
    let mut spans: Vec<(f64, f64)> = raw
        .iter()
        .map(|&(s, e)| (s.clamp(0.0, duration), e.clamp(0.0, duration)))
        .filter(|&(s, e)| e > s)
        .collect();
    spans.sort_by(|a, b| a.0.total_cmp(&b.0));

    // Merge overlaps and sub-minimum gaps.
    //
    // Invariant: `merged` stays sorted and non-overlapping, with every gap
    // between entries at least MIN_GAP_S wide.
    let mut merged: Vec<(f64, f64)> = Vec::new();
    for (s, e) in spans {
        if let Some((_, prev_end)) = merged.last_mut() {
            if s - *prev_end < MIN_GAP_S {
                *prev_end = prev_end.max(e);
                continue;
            }
        }
        merged.push((s, e));
    }

    merged.retain(|&(s, e)| e - s >= MIN_INTERVAL_S);

    // A boundary sliver of silence can never satisfy the minimum; absorb it
    // into the first/last speech interval instead.
    if let Some(first) = merged.first_mut() {
        if first.0 > 0.0 && first.0 < MIN_INTERVAL_S {
            first.0 = 0.0;
        }
    }
    if let Some(last) = merged.last_mut() {
        if last.1 < duration && duration - last.1 < MIN_INTERVAL_S {
            last.1 = duration;
        }
    }

    let speech: Vec<SpeechSegment> = merged
        .iter()
        .map(|&(start, end)| SpeechSegment { start, end })
        .collect();

    let mut silence = Vec::new();
    let mut cursor = 0.0;
    for seg in &speech {
        if seg.start > cursor {
            silence.push(SilenceSegment {
                start: cursor,
                end: seg.start,
            });
        }
        cursor = seg.end;
    }
    if cursor < duration {
        silence.push(SilenceSegment {
            start: cursor,
            end: duration,
        });
    }

    (speech, silence)
}
