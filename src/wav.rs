use std::path::Path;

use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

/// The pipeline's internal PCM rate. Extraction, VAD, and assembly all
/// operate at this rate so no resampling mismatch can creep in between them.
pub const PIPELINE_SAMPLE_RATE: u32 = 16_000;

/// Read a mono float WAV produced by the extractor (or a test fixture).
///
/// We only accept the exact format the pipeline writes: rejecting anything
/// else here keeps downstream sample arithmetic honest.
pub fn read_mono_f32(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(path)
        .with_context(|| format!("failed to open wav file {}", path.display()))?;

    let spec = reader.spec();
    if spec.channels != 1 {
        anyhow::bail!("expected mono WAV, got {} channels", spec.channels);
    }

    let samples = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .context("failed reading f32 samples")?,
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .context("failed reading i16 samples")?,
        (fmt, bits) => anyhow::bail!("unsupported WAV sample format {fmt:?}/{bits}"),
    };

    Ok((samples, spec.sample_rate))
}

/// Write mono f32 samples as a 32-bit float WAV.
pub fn write_mono_f32(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("failed to create wav file {}", path.display()))?;

    for &s in samples {
        writer.write_sample(s)?;
    }

    writer.finalize().context("failed to finalize wav file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_f32_samples() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tone.wav");

        let samples: Vec<f32> = (0..160).map(|i| (i as f32 / 160.0).sin()).collect();
        write_mono_f32(&path, &samples, PIPELINE_SAMPLE_RATE)?;

        let (read, rate) = read_mono_f32(&path)?;
        assert_eq!(rate, PIPELINE_SAMPLE_RATE);
        assert_eq!(read, samples);
        Ok(())
    }

    #[test]
    fn rejects_stereo_input() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("stereo.wav");

        let spec = WavSpec {
            channels: 2,
            sample_rate: PIPELINE_SAMPLE_RATE,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec)?;
        writer.write_sample(0.0f32)?;
        writer.write_sample(0.0f32)?;
        writer.finalize()?;

        let err = read_mono_f32(&path).unwrap_err();
        assert!(err.to_string().contains("mono"));
        Ok(())
    }
}
