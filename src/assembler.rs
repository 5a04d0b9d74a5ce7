// src/assembler.rs

//! Concatenate kept segments from the extracted PCM with equal-power
//! crossfades and write the result as the output audio track.
//!
//! All sample indices derive from the same rounding rule the extractor uses
//! (nearest sample), and all fade lengths come from the plan, so the sample
//! count here always lands within a couple of samples of
//! `estimated_output_duration * rate`; the renderer's sync check depends on
//! that.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::extract::ExtractedAudio;
use crate::planner::EditPlan;
use crate::wav;

/// The assembled output track on disk.
#[derive(Debug, Clone)]
pub struct AssembledAudio {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub sample_count: usize,
}

impl AssembledAudio {
    pub fn duration_s(&self) -> f64 {
        self.sample_count as f64 / self.sample_rate as f64
    }
}

/// Assemble the plan's kept segments from an in-memory PCM buffer.
///
/// `pcm_start_s` is the source-time of `samples[0]` (zero for a whole-source
/// extraction). Segments outside the buffer clamp rather than panic; the plan
/// and the extraction were produced from the same probe, so a mismatch
/// beyond rounding means an upstream bug that the sync check will catch.
pub fn assemble(samples: &[f32], rate: u32, pcm_start_s: f64, plan: &EditPlan) -> Vec<f32> {
    let to_index = |t: f64| ((t - pcm_start_s) * rate as f64).round().max(0.0) as usize;

    let capacity = (plan.estimated_output_duration * rate as f64).round() as usize;
    let mut out: Vec<f32> = Vec::with_capacity(capacity + 2);

    for (i, seg) in plan.kept_segments.iter().enumerate() {
        let i0 = to_index(seg.src_start).min(samples.len());
        let i1 = to_index(seg.src_end).clamp(i0, samples.len());
        let piece = &samples[i0..i1];

        if i == 0 {
            out.extend_from_slice(piece);
            continue;
        }

        // Overlap the previous tail with this head. The fade was already
        // clamped by the planner; the min() here only guards degenerate
        // buffers (truncate silently, per the advisory-fade contract).
        let nominal = (seg.lead_fade_s * rate as f64).round() as usize;
        let fade = nominal.min(piece.len()).min(out.len());
        let tail_start = out.len() - fade;

        for t in 0..fade {
            let theta = std::f32::consts::FRAC_PI_2 * t as f32 / fade as f32;
            out[tail_start + t] = out[tail_start + t] * theta.cos() + piece[t] * theta.sin();
        }

        out.extend_from_slice(&piece[fade..]);
    }

    out
}

/// Read the extracted PCM, assemble, and write the output WAV.
pub fn assemble_to_wav(
    pcm: &ExtractedAudio,
    plan: &EditPlan,
    out_path: &Path,
) -> Result<AssembledAudio> {
    let (samples, rate) =
        wav::read_mono_f32(&pcm.path).map_err(|e| Error::IoFailure(format!("{e:#}")))?;

    let assembled = assemble(&samples, rate, pcm.start_s, plan);

    wav::write_mono_f32(out_path, &assembled, rate)
        .map_err(|e| Error::IoFailure(format!("{e:#}")))?;

    debug!(
        samples = assembled.len(),
        duration_s = assembled.len() as f64 / rate as f64,
        "assembled audio written"
    );

    Ok(AssembledAudio {
        path: out_path.to_path_buf(),
        sample_rate: rate,
        sample_count: assembled.len(),
    })
}
