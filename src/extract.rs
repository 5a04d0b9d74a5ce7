// src/extract.rs

//! Decode a source's audio to the pipeline PCM format.
//!
//! Responsibilities:
//! - open the container and find a usable audio track
//! - decode it start to finish, downmixed to mono
//! - resample to the pipeline rate when the source rate differs
//! - slice the requested time range and write it as an f32 WAV
//!
//! The extractor produces the one byte sequence that both the VAD analyzer
//! and the audio assembler consume, so a resampling mismatch between the two
//! cannot occur by construction.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use rubato::{Resampler, SincFixedIn, WindowFunction};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Track};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::wav;

/// A PCM file on disk plus the facts downstream consumers need about it.
#[derive(Debug, Clone)]
pub struct ExtractedAudio {
    pub path: PathBuf,

    /// Source-time position of the first sample.
    pub start_s: f64,

    pub sample_rate: u32,
    pub sample_count: usize,
}

impl ExtractedAudio {
    pub fn duration_s(&self) -> f64 {
        self.sample_count as f64 / self.sample_rate as f64
    }
}

/// Decodes a time range of a source to mono PCM at a known rate.
///
/// Implementations are blocking; the orchestrator runs them on the blocking
/// pool.
pub trait AudioDecoder: Send + Sync {
    fn extract_range(
        &self,
        source: &Path,
        t0: f64,
        t1: f64,
        rate: u32,
        out: &Path,
    ) -> Result<ExtractedAudio>;
}

/// Production decoder built on Symphonia.
#[derive(Debug, Clone, Default)]
pub struct SymphoniaDecoder;

impl AudioDecoder for SymphoniaDecoder {
    fn extract_range(
        &self,
        source: &Path,
        t0: f64,
        t1: f64,
        rate: u32,
        out: &Path,
    ) -> Result<ExtractedAudio> {
        let (mono, src_rate) =
            decode_to_mono(source).map_err(|e| Error::DecodeFailed(format!("{e:#}")))?;

        let samples = if src_rate == rate {
            mono
        } else {
            resample_mono(&mono, src_rate, rate)
                .map_err(|e| Error::DecodeFailed(format!("{e:#}")))?
        };

        let slice = slice_range(&samples, rate, t0, t1);
        wav::write_mono_f32(out, slice, rate).map_err(|e| Error::IoFailure(format!("{e:#}")))?;

        debug!(
            source = %source.display(),
            t0,
            t1,
            samples = slice.len(),
            "extracted pcm range"
        );

        Ok(ExtractedAudio {
            path: out.to_path_buf(),
            start_s: t0,
            sample_rate: rate,
            sample_count: slice.len(),
        })
    }
}

/// Pick the audio track to decode: the container's default track when it is
/// decodable audio, otherwise the first track that is.
///
/// A known sample rate is required; without it the resampling decision in
/// `extract_range` has nothing to go on.
fn usable_audio_track(reader: &dyn FormatReader) -> Option<Track> {
    let decodable =
        |t: &Track| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some();

    reader
        .default_track()
        .filter(|t| decodable(t))
        .or_else(|| reader.tracks().iter().find(|t| decodable(t)))
        .cloned()
}

/// Decode the whole audio track to mono f32 at the source rate.
fn decode_to_mono(source: &Path) -> anyhow::Result<(Vec<f32>, u32)> {
    let file = File::open(source)
        .with_context(|| format!("failed to open source {}", source.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = source.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| anyhow!("could not identify container format: {e}"))?;
    let mut reader = probed.format;

    let track =
        usable_audio_track(reader.as_ref()).ok_or_else(|| anyhow!("no usable audio track"))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| anyhow!("unsupported audio codec: {e}"))?;

    let mut mono: Vec<f32> = Vec::new();
    let mut src_rate: u32 = 0;
    let mut skipped_frames = 0u32;

    loop {
        let packet = match reader.next_packet() {
            Ok(p) => p,
            // Symphonia signals end-of-file through the IO error channel.
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(anyhow!("demux failed mid-stream: {e}")),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(buf) => buf,
            Err(SymphoniaError::DecodeError(_)) => {
                // A corrupt frame is survivable; keep a count so a badly
                // damaged file at least shows up in the logs.
                skipped_frames += 1;
                continue;
            }
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(anyhow!("audio codec gave up: {e}")),
        };

        let spec = *decoded.spec();
        src_rate = spec.rate;
        let channels = spec.channels.count();
        anyhow::ensure!(channels > 0, "decoded frame reported zero channels");

        let mut frame = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        frame.copy_interleaved_ref(decoded);
        downmix_into_mono(frame.samples(), channels, &mut mono);
    }

    if skipped_frames > 0 {
        warn!(skipped_frames, source = %source.display(), "skipped corrupt audio frames");
    }

    anyhow::ensure!(!mono.is_empty(), "no audio could be decoded from the source");
    anyhow::ensure!(src_rate > 0, "audio track never reported a sample rate");

    Ok((mono, src_rate))
}

/// Downmix interleaved samples into the accumulator by averaging channels.
///
/// Policy: equal-weight average across channels (simple, predictable).
fn downmix_into_mono(interleaved: &[f32], channels: usize, mono: &mut Vec<f32>) {
    if channels == 1 {
        mono.extend_from_slice(interleaved);
        return;
    }

    let frames = interleaved.len() / channels;
    mono.reserve(frames);
    for f in 0..frames {
        let base = f * channels;
        let mut acc = 0.0;
        for c in 0..channels {
            acc += interleaved[base + c];
        }
        mono.push(acc / channels as f32);
    }
}

/// Resample a full mono buffer to `dst_rate`.
///
/// rubato expects fixed-size input blocks; the tail is zero-padded and the
/// output truncated back to the exact expected length so padding never leaks
/// into downstream sample math.
fn resample_mono(input: &[f32], src_rate: u32, dst_rate: u32) -> anyhow::Result<Vec<f32>> {
    // Block size tradeoff: larger blocks = better throughput; this is an
    // offline path so throughput wins.
    let in_chunk = 2048usize;

    let mut rs = SincFixedIn::<f32>::new(
        dst_rate as f64 / src_rate as f64,
        2.0,
        rubato::SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: rubato::SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        },
        in_chunk,
        1, // mono
    )
    .map_err(|e| anyhow!("resampler rejected {src_rate}->{dst_rate} Hz: {e}"))?;

    let expected = (input.len() as f64 * dst_rate as f64 / src_rate as f64).round() as usize;

    let mut padded = input.to_vec();
    let rem = padded.len() % in_chunk;
    if rem != 0 {
        padded.resize(padded.len() + (in_chunk - rem), 0.0);
    }

    let mut out = Vec::with_capacity(expected + in_chunk);
    for block in padded.chunks(in_chunk) {
        let processed = rs
            .process(&[block.to_vec()], None)
            .map_err(|e| anyhow!("resampling stalled mid-buffer: {e}"))?;
        anyhow::ensure!(processed.len() == 1, "resampler returned a non-mono block");
        out.extend_from_slice(&processed[0]);
    }

    out.truncate(expected);
    Ok(out)
}

/// Slice `[t0, t1)` out of a sample buffer.
///
/// Index rounding policy: round both edges to the nearest sample, so the
/// slice length is within one sample of `round((t1 - t0) * rate)` and two
/// consumers slicing the same range get identical bytes.
fn slice_range(samples: &[f32], rate: u32, t0: f64, t1: f64) -> &[f32] {
    let i0 = ((t0 * rate as f64).round() as usize).min(samples.len());
    let i1 = ((t1 * rate as f64).round() as usize).clamp(i0, samples.len());
    &samples[i0..i1]
}
