// src/planner.rs

//! The edit planner: turns a VAD partition, a clip window, and per-request
//! adjustments into an ordered list of kept segments plus the timeline map
//! every downstream consumer shares.
//!
//! Design constraints that shaped this module:
//! - The plan stays in floating-point source-time end to end. Frame snapping
//!   here once caused a ~118 ms audio/video desync, because the video path
//!   snapped while audio and captions did not; snapping is now a renderer-only
//!   concern.
//! - A `KeptSegment` is a contiguous range of *source* audio. Shortening a
//!   silence keeps its center, so a partially trimmed silence contributes its
//!   own segment between the flanking speech; an untrimmed silence joins its
//!   neighbors into one segment; a fully removed silence leaves a single join.
//! - Crossfades are clamped to half the shorter adjoining segment at plan
//!   time, so the timeline, the assembler, and the renderer sync check all
//!   agree on the same fade lengths.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::presets::PresetConfig;
use crate::timeline::{TimelineMap, TimelineSpan};
use crate::vad::VadAnalysis;

/// Tolerance when matching a per-silence override to a silence interval.
const OVERRIDE_MATCH_S: f64 = 0.100;

/// Two source ranges closer than this are treated as contiguous.
const CONTIGUITY_EPS: f64 = 1e-9;

/// A caller-supplied decision for one specific silence, keyed by where that
/// silence starts in source-time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SilenceOverride {
    pub src_start: f64,
    pub keep_ms: u64,
}

/// Per-request deviations from the preset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Adjustments {
    /// Replaces the preset's `max_kept_silence_s` when set.
    pub max_kept_silence_s: Option<f64>,

    /// Per-silence keep decisions, matched by start time within 100 ms.
    pub silence_overrides: Vec<SilenceOverride>,
}

/// A contiguous range of source audio that survives trimming.
///
/// Fades describe the crossfade shared with the previous/next kept segment;
/// the first segment has `lead_fade_s = 0` and the last `trail_fade_s = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeptSegment {
    pub src_start: f64,
    pub src_end: f64,
    pub lead_fade_s: f64,
    pub trail_fade_s: f64,
}

impl KeptSegment {
    pub fn duration(&self) -> f64 {
        self.src_end - self.src_start
    }
}

/// The full edit decision for one clip request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditPlan {
    pub clip_start: f64,
    pub clip_end: f64,

    /// The effective config (preset merged with adjustments).
    pub config: PresetConfig,

    pub kept_segments: Vec<KeptSegment>,
    pub timeline: TimelineMap,

    /// Always equals the timeline's final `out_end`.
    pub estimated_output_duration: f64,
}

impl EditPlan {
    /// Source material removed by the plan, in seconds.
    pub fn removed_duration(&self) -> f64 {
        let kept: f64 = self.kept_segments.iter().map(|k| k.duration()).sum();
        (self.clip_end - self.clip_start) - kept
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Speech,
    Silence,
}

#[derive(Debug, Clone, Copy)]
struct Interval {
    kind: Kind,
    start: f64,
    end: f64,
}

/// Compute the edit plan for one clip window.
///
/// Errors with [`Error::EmptyPlan`] when no speech intersects the window.
pub fn plan(
    vad: &VadAnalysis,
    clip_start: f64,
    clip_end: f64,
    adjustments: Option<&Adjustments>,
) -> Result<EditPlan> {
    let config = vad.config;
    let default_adjustments = Adjustments::default();
    let adjustments = adjustments.unwrap_or(&default_adjustments);
    let max_kept = adjustments
        .max_kept_silence_s
        .unwrap_or(config.max_kept_silence_s);

    // 1. Intersect the partition with the clip window. Only the speech side
    // needs carrying over: the silences are re-derived as gaps after padding
    // reshapes them anyway.
    let mut speech = clip_speech_intervals(vad, clip_start, clip_end);
    if speech.is_empty() {
        return Err(Error::EmptyPlan);
    }

    // 2. Pad speech into the surrounding silence, clamped to the window.
    // Overlapping padded intervals split the overlap at its midpoint.
    for iv in &mut speech {
        iv.start = (iv.start - config.speech_padding_s).max(clip_start);
        iv.end = (iv.end + config.speech_padding_s).min(clip_end);
    }
    for i in 1..speech.len() {
        if speech[i].start < speech[i - 1].end {
            let boundary = (speech[i].start + speech[i - 1].end) / 2.0;
            speech[i - 1].end = boundary;
            speech[i].start = boundary;
        }
    }

    // Re-derive the silences as the gaps the padding left behind.
    let intervals = interleave_with_silences(&speech, clip_start, clip_end);

    // 3 + 4. Decide how much of each silence to keep and emit the kept source
    // ranges. A kept silence keeps its center; material trimmed at an
    // interval boundary breaks source contiguity there.
    let mut ranges: Vec<(f64, f64)> = Vec::new();
    for iv in &intervals {
        match iv.kind {
            Kind::Speech => push_range(&mut ranges, iv.start, iv.end),
            Kind::Silence => {
                let d = iv.end - iv.start;
                let keep = silence_keep(iv.start, d, &config, max_kept, adjustments);
                if keep <= 0.0 {
                    continue;
                }
                let trim = (d - keep) / 2.0;
                push_range(&mut ranges, iv.start + trim, iv.end - trim);
            }
        }
    }

    if ranges.is_empty() {
        return Err(Error::EmptyPlan);
    }

    // 5. Crossfades at every join, clamped so each fade fits inside both of
    // its segments.
    let mut kept_segments: Vec<KeptSegment> = ranges
        .iter()
        .map(|&(src_start, src_end)| KeptSegment {
            src_start,
            src_end,
            lead_fade_s: 0.0,
            trail_fade_s: 0.0,
        })
        .collect();

    for i in 1..kept_segments.len() {
        let fade = config
            .crossfade_s
            .min(kept_segments[i - 1].duration() / 2.0)
            .min(kept_segments[i].duration() / 2.0);
        kept_segments[i - 1].trail_fade_s = fade;
        kept_segments[i].lead_fade_s = fade;
    }

    // 6. The timeline map. Fades cost no output time: each join overlaps the
    // previous segment's tail, so the next span starts `fade` early.
    let mut spans = Vec::with_capacity(kept_segments.len());
    let mut prev_out_end = 0.0;
    for (i, seg) in kept_segments.iter().enumerate() {
        let out_start = if i == 0 {
            0.0
        } else {
            prev_out_end - seg.lead_fade_s
        };
        let out_end = out_start + seg.duration();
        spans.push(TimelineSpan {
            src_start: seg.src_start,
            src_end: seg.src_end,
            out_start,
            out_end,
        });
        prev_out_end = out_end;
    }

    let estimated_output_duration = prev_out_end;

    debug!(
        kept = kept_segments.len(),
        output_s = estimated_output_duration,
        removed_s = (clip_end - clip_start) - estimated_output_duration,
        "edit plan ready"
    );

    Ok(EditPlan {
        clip_start,
        clip_end,
        config,
        kept_segments,
        timeline: TimelineMap::from_spans(spans),
        estimated_output_duration,
    })
}

/// Collect the speech intervals clipped to the window, in source order.
fn clip_speech_intervals(vad: &VadAnalysis, clip_start: f64, clip_end: f64) -> Vec<Interval> {
    let mut out: Vec<Interval> = vad
        .speech_segments
        .iter()
        .map(|s| Interval {
            kind: Kind::Speech,
            start: s.start.max(clip_start),
            end: s.end.min(clip_end),
        })
        .filter(|iv| iv.end > iv.start)
        .collect();
    out.sort_by(|a, b| a.start.total_cmp(&b.start));
    out
}

/// Rebuild the alternating interval list from padded speech: every gap
/// between consecutive speech intervals (and against the window edges) is a
/// silence.
fn interleave_with_silences(speech: &[Interval], clip_start: f64, clip_end: f64) -> Vec<Interval> {
    let mut out = Vec::with_capacity(speech.len() * 2 + 1);
    let mut cursor = clip_start;

    for iv in speech {
        if iv.start - cursor > CONTIGUITY_EPS {
            out.push(Interval {
                kind: Kind::Silence,
                start: cursor,
                end: iv.start,
            });
        }
        out.push(*iv);
        cursor = iv.end;
    }

    if clip_end - cursor > CONTIGUITY_EPS {
        out.push(Interval {
            kind: Kind::Silence,
            start: cursor,
            end: clip_end,
        });
    }

    out
}

/// How much of a silence to keep, in seconds.
///
/// Precedence: per-silence override, then the no-trim floor, then the global
/// cap. The result is always within `[0, d]`.
fn silence_keep(
    start: f64,
    d: f64,
    config: &PresetConfig,
    max_kept: f64,
    adjustments: &Adjustments,
) -> f64 {
    if let Some(ov) = adjustments
        .silence_overrides
        .iter()
        .find(|ov| (ov.src_start - start).abs() < OVERRIDE_MATCH_S)
    {
        return (ov.keep_ms as f64 / 1000.0).min(d);
    }

    if d < config.min_silence_s {
        return d;
    }

    d.min(max_kept)
}

/// Append a kept range, coalescing with the previous one when they are
/// contiguous in source-time (an untrimmed boundary).
fn push_range(ranges: &mut Vec<(f64, f64)>, start: f64, end: f64) {
    if end - start <= CONTIGUITY_EPS {
        return;
    }
    if let Some((_, prev_end)) = ranges.last_mut() {
        if (start - *prev_end).abs() <= CONTIGUITY_EPS {
            *prev_end = end;
            return;
        }
    }
    ranges.push((start, end));
}
