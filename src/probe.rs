// src/probe.rs

//! Container probing via the external `ffprobe` tool.
//!
//! Responsibilities:
//! - report duration, audio sample rate, video frame rate and dimensions
//! - keep the JSON parsing separate from process invocation so it is
//!   testable without the binary installed
//!
//! Duration policy: prefer the container-level duration, fall back to the
//! best stream's. Frame rate prefers `avg_frame_rate` (true average) over
//! `r_frame_rate` (nominal base).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// What the pipeline needs to know about a source before planning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration_s: f64,
    pub sample_rate: u32,
    pub frame_rate: f64,
    pub width: u32,
    pub height: u32,
}

/// Probes a source for its basic facts.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, source: &Path) -> Result<MediaInfo>;
}

/// Production probe shelling out to `ffprobe`.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    bin: PathBuf,
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self {
            bin: PathBuf::from("ffprobe"),
        }
    }
}

impl FfprobeProbe {
    pub fn with_bin(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn probe(&self, source: &Path) -> Result<MediaInfo> {
        let output = Command::new(&self.bin)
            .arg("-v")
            .arg("error")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg("-show_streams")
            .arg(source)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::SourceUnreadable(format!("failed to spawn ffprobe: {e}")))?;

        if !output.status.success() {
            return Err(Error::SourceUnreadable(format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let info = parse_ffprobe_json(&output.stdout)?;
        debug!(source = %source.display(), ?info, "probed source");
        Ok(info)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    sample_rate: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

/// Turn ffprobe's JSON into a [`MediaInfo`], validating what the pipeline
/// relies on (positive frame rate, known dimensions, an audio track).
fn parse_ffprobe_json(bytes: &[u8]) -> Result<MediaInfo> {
    let parsed: FfprobeOutput = serde_json::from_slice(bytes)
        .map_err(|e| Error::SourceUnreadable(format!("unparseable ffprobe output: {e}")))?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| Error::SourceUnreadable("no video stream".into()))?;

    let audio = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .ok_or_else(|| Error::SourceUnreadable("no audio stream".into()))?;

    let duration_s = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            // Container duration missing (some fragmented files); fall back
            // to the longest stream duration.
            parsed
                .streams
                .iter()
                .filter_map(|s| s.duration.as_deref()?.parse::<f64>().ok())
                .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))))
        })
        .filter(|d| *d > 0.0)
        .ok_or_else(|| Error::SourceUnreadable("duration unknown".into()))?;

    let frame_rate = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rational)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_rational))
        .filter(|r| *r > 0.0)
        .ok_or_else(|| Error::SourceUnreadable("frame rate unknown".into()))?;

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(Error::SourceUnreadable("video dimensions unknown".into())),
    };

    let sample_rate = audio
        .sample_rate
        .as_deref()
        .and_then(|r| r.parse::<u32>().ok())
        .filter(|r| *r > 0)
        .ok_or_else(|| Error::SourceUnreadable("audio sample rate unknown".into()))?;

    Ok(MediaInfo {
        duration_s,
        sample_rate,
        frame_rate,
        width,
        height,
    })
}

/// Parse ffprobe's rational rates (`"30000/1001"`, `"30/1"`, `"25"`).
fn parse_rational(s: &str) -> Option<f64> {
    match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 { None } else { Some(num / den) }
        }
        None => s.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {
                "codec_type": "video",
                "width": 1920,
                "height": 1080,
                "avg_frame_rate": "30000/1001",
                "r_frame_rate": "30000/1001"
            },
            {
                "codec_type": "audio",
                "sample_rate": "48000",
                "duration": "132.5"
            }
        ],
        "format": { "duration": "132.48" }
    }"#;

    #[test]
    fn parses_a_typical_probe() -> Result<()> {
        let info = parse_ffprobe_json(SAMPLE.as_bytes())?;
        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
        assert_eq!(info.sample_rate, 48_000);
        assert!((info.duration_s - 132.48).abs() < 1e-9);
        assert!((info.frame_rate - 29.97).abs() < 0.01);
        Ok(())
    }

    #[test]
    fn falls_back_to_stream_duration() -> Result<()> {
        let json = SAMPLE.replace(r#""format": { "duration": "132.48" }"#, r#""format": {}"#);
        let info = parse_ffprobe_json(json.as_bytes())?;
        assert!((info.duration_s - 132.5).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn missing_streams_are_rejected() {
        let no_audio = r#"{
            "streams": [
                { "codec_type": "video", "width": 640, "height": 480, "avg_frame_rate": "25/1" }
            ],
            "format": { "duration": "10.0" }
        }"#;
        let err = parse_ffprobe_json(no_audio.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), "source_unreadable");
        assert!(err.to_string().contains("no audio stream"));
    }

    #[test]
    fn rational_rates_parse_in_every_spelling() {
        assert_eq!(parse_rational("30/1"), Some(30.0));
        assert_eq!(parse_rational("25"), Some(25.0));
        assert!((parse_rational("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rational("0/0"), None);
        assert_eq!(parse_rational("nope"), None);
    }
}
