// src/bin/clipcut-cli.rs

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use clipcut::cache::VadCache;
use clipcut::captions::Transcript;
use clipcut::pipeline::{ClipExporter, ClipRequest, Services};
use clipcut::presets::{Preset, TargetFormat};

#[tokio::main]
async fn main() -> Result<()> {
    clipcut::logging::init();

    let params = Params::parse();

    // Map CLI flags into a library request.
    //
    // Keeping this mapping explicit helps:
    // - keep the library reusable (ClipRequest is the contract)
    // - keep the CLI thin (just parsing + wiring)
    let source_id = params.source_id.clone().unwrap_or_else(|| {
        params
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source".to_owned())
    });

    let request = ClipRequest {
        source_id,
        source_path: params.input.clone(),
        clip_start: params.start,
        clip_end: params.end,
        target_format: params.format,
        preset: params.preset,
        include_captions: !params.no_captions,
        adjustments: None,
        output_path: params.output.clone(),
    };

    // Transcripts come from the transcription provider as word-timing JSON.
    let transcript = match &params.transcript {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("failed to read transcript {}", path.display()))?;
            Some(serde_json::from_slice::<Transcript>(&bytes).context("invalid transcript JSON")?)
        }
        None => None,
    };

    // Production services: ffprobe/symphonia/silero/ffmpeg. A vision
    // endpoint can be attached by callers embedding the library; the CLI
    // runs with the center-crop fallback.
    let exporter = ClipExporter::new(
        Services::with_defaults(),
        Arc::new(VadCache::new()),
        params.work_dir.clone(),
    );

    let cancel = CancellationToken::new();
    let result = exporter
        .export_clip(&request, transcript.as_ref(), cancel)
        .await
        .context("export failed")?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        std::process::exit(2);
    }

    Ok(())
}

/// CLI parameters for `clipcut`.
#[derive(Parser, Debug)]
#[command(name = "clipcut")]
#[command(about = "Export a silence-trimmed, captioned clip from a source video")]
struct Params {
    /// Input video path.
    #[arg(short = 'i', long = "input", required = true)]
    pub input: PathBuf,

    /// Output clip path (.mp4).
    #[arg(short = 'o', long = "output", required = true)]
    pub output: PathBuf,

    /// Clip start in source seconds.
    #[arg(short = 's', long = "start", required = true)]
    pub start: f64,

    /// Clip end in source seconds.
    #[arg(short = 'e', long = "end", required = true)]
    pub end: f64,

    /// Silence-trimming preset.
    #[arg(short = 'p', long = "preset", value_enum, default_value_t = Preset::Linkedin)]
    pub preset: Preset,

    /// Output geometry.
    #[arg(short = 'f', long = "format", value_enum, default_value_t = TargetFormat::Linkedin)]
    pub format: TargetFormat,

    /// Word-timing transcript JSON (`{"words": [{"text", "start", "end"}]}`).
    ///
    /// When omitted, the clip is exported without captions.
    #[arg(short = 't', long = "transcript")]
    pub transcript: Option<PathBuf>,

    /// Skip caption burn-in even when a transcript is provided.
    #[arg(long = "no-captions", default_value_t = false)]
    pub no_captions: bool,

    /// Cache key identifying the source (defaults to the input file stem).
    #[arg(long = "source-id")]
    pub source_id: Option<String>,

    /// Directory for per-request scratch files.
    #[arg(long = "work-dir", default_value = "/tmp/clipcut")]
    pub work_dir: PathBuf,
}
