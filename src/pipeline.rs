// src/pipeline.rs

//! High-level orchestration for one clip export.
//!
//! Provides a single, ergonomic entry point (`ClipExporter`) that wires up
//! probe → extract → cached VAD → plan → { assemble ∥ subject+crop ∥
//! captions } → render, and owns the per-request scratch directory.
//!
//! The intent is:
//! - Construct the exporter once with its services and VAD cache.
//! - Call `export_clip` many times, concurrently if desired.
//! - Every collaborator (probe, decoder, detector, oracle, renderer) is an
//!   injected trait object, so tests run the full pipeline against doubles.
//!
//! This module is deliberately "high level": it sequences and fans out,
//! while keeping the lower-level pieces testable in their own modules.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ass_encoder::{AssEncoder, CaptionSink};
use crate::assembler;
use crate::cache::VadCache;
use crate::captions::{self, CaptionChunk, CaptionStyle, Transcript};
use crate::crop::{self, CropRegion};
use crate::error::{Error, Result};
use crate::extract::{AudioDecoder, SymphoniaDecoder};
use crate::filtergraph;
use crate::planner::{self, Adjustments, EditPlan};
use crate::presets::{Preset, TargetFormat};
use crate::probe::{FfprobeProbe, MediaProbe};
use crate::render::{self, FfmpegRenderer, Renderer};
use crate::subject::{SubjectLocalizer, SubjectPosition, VisionOracle};
use crate::timeline::TimelineMap;
use crate::vad::{self, VoiceDetector};
use crate::wav;

/// Upper bound on one VAD inference run.
const VAD_TIMEOUT: Duration = Duration::from_secs(60);

/// One export request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRequest {
    /// Stable identity of the source (cache key; survives re-uploads of the
    /// same asset under the same id).
    pub source_id: String,

    pub source_path: PathBuf,

    /// Clip window in source seconds, `0 <= start < end <= duration`.
    pub clip_start: f64,
    pub clip_end: f64,

    pub target_format: TargetFormat,
    pub preset: Preset,

    /// Burn captions when a transcript is provided.
    pub include_captions: bool,

    pub adjustments: Option<Adjustments>,

    /// Where the muxed output lands.
    pub output_path: PathBuf,
}

/// Inspectable digest of the plan that produced an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub kept_segments: usize,
    pub crossfades: usize,
    pub removed_silence_s: f64,
    pub timeline: TimelineMap,
}

impl PlanSummary {
    fn from_plan(plan: &EditPlan) -> Self {
        Self {
            kept_segments: plan.kept_segments.len(),
            crossfades: plan.kept_segments.len().saturating_sub(1),
            removed_silence_s: plan.removed_duration(),
            timeline: plan.timeline.clone(),
        }
    }
}

/// What one export produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportResult {
    pub success: bool,
    pub output_path: Option<PathBuf>,

    /// Clip window length before editing.
    pub original_duration: f64,

    /// Output length after silence removal.
    pub edited_duration: f64,

    pub time_saved: f64,

    pub subject_position: Option<SubjectPosition>,
    pub crop: Option<CropRegion>,

    /// The crop was chosen under low confidence; a human should look.
    pub needs_review: bool,

    /// Soft-failure explanation (`success == false`).
    pub failure: Option<String>,

    pub plan_summary: Option<PlanSummary>,
}

/// The pipeline's external collaborators, injected as trait objects.
#[derive(Clone)]
pub struct Services {
    pub probe: Arc<dyn MediaProbe>,
    pub decoder: Arc<dyn AudioDecoder>,
    pub detector: Arc<dyn VoiceDetector>,

    /// Optional by design: the pipeline degrades to a center crop without it.
    pub oracle: Option<Arc<dyn VisionOracle>>,

    pub renderer: Arc<dyn Renderer>,
}

impl Services {
    /// Production wiring: ffprobe, symphonia, silero, ffmpeg, no oracle.
    ///
    /// Callers with a vision endpoint attach it via the `oracle` field.
    pub fn with_defaults() -> Self {
        Self {
            probe: Arc::new(FfprobeProbe::default()),
            decoder: Arc::new(SymphoniaDecoder),
            detector: Arc::new(vad::SileroDetector::default()),
            oracle: None,
            renderer: Arc::new(FfmpegRenderer::default()),
        }
    }
}

/// The main high-level export entry point.
///
/// Reentrant: concurrent `export_clip` calls share only the VAD cache
/// (single-flight) and the render semaphore.
pub struct ClipExporter {
    services: Services,
    cache: Arc<VadCache>,
    caption_style: CaptionStyle,
    render_permits: Arc<Semaphore>,
    work_dir: PathBuf,
}

impl ClipExporter {
    pub fn new(services: Services, cache: Arc<VadCache>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            services,
            cache,
            caption_style: CaptionStyle::default(),
            // The renderer is the globally contended resource; bound it by
            // core count unless the caller decides otherwise.
            render_permits: Arc::new(Semaphore::new(num_cpus::get())),
            work_dir: work_dir.into(),
        }
    }

    pub fn with_caption_style(mut self, style: CaptionStyle) -> Self {
        self.caption_style = style;
        self
    }

    pub fn with_render_permits(mut self, permits: usize) -> Self {
        self.render_permits = Arc::new(Semaphore::new(permits.max(1)));
        self
    }

    /// The injected VAD cache (e.g. for `clear` on source deletion).
    pub fn cache(&self) -> &Arc<VadCache> {
        &self.cache
    }

    /// Run one export end to end.
    ///
    /// Cancellation kills in-flight external processes, removes the scratch
    /// directory, keeps no partial output, and returns [`Error::Cancelled`].
    pub async fn export_clip(
        &self,
        request: &ClipRequest,
        transcript: Option<&Transcript>,
        cancel: CancellationToken,
    ) -> Result<ExportResult> {
        // 1. Probe and validate before any real work.
        let probe_info = self.services.probe.probe(&request.source_path).await?;

        let valid = request.clip_start >= 0.0
            && request.clip_start < request.clip_end
            && request.clip_end <= probe_info.duration_s + 1e-6;
        if !valid {
            return Err(Error::InvalidRange {
                start: request.clip_start,
                end: request.clip_end,
                duration: probe_info.duration_s,
            });
        }
        ensure_live(&cancel)?;

        // Exclusive scratch dir, removed on every exit path (drop runs on
        // early return, cancellation, and unwind alike).
        std::fs::create_dir_all(&self.work_dir)?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("clipcut-{}-", Uuid::new_v4()))
            .tempdir_in(&self.work_dir)?;

        debug!(
            source_id = %request.source_id,
            clip_start = request.clip_start,
            clip_end = request.clip_end,
            preset = request.preset.as_str(),
            format = request.target_format.as_str(),
            "export started"
        );

        // 2. Extract the whole source once; VAD and assembly share the file.
        let pcm_path = scratch.path().join("source-pcm.wav");
        let pcm = {
            let decoder = self.services.decoder.clone();
            let source = request.source_path.clone();
            let duration = probe_info.duration_s;
            tokio::task::spawn_blocking(move || {
                decoder.extract_range(&source, 0.0, duration, wav::PIPELINE_SAMPLE_RATE, &pcm_path)
            })
            .await
            .map_err(|e| Error::Other(format!("decode task failed: {e}")))??
        };
        ensure_live(&cancel)?;

        // 3. VAD through the cache (single-flight per key).
        let analysis = self
            .cache
            .get_or_analyze(&request.source_id, request.preset, || {
                let detector = self.services.detector.clone();
                let pcm_file = pcm.path.clone();
                let threshold = request.preset.config().vad_threshold;
                let source_id = request.source_id.clone();
                let preset = request.preset;
                let duration = pcm.duration_s();
                let offset = pcm.start_s;
                async move {
                    let spans = tokio::time::timeout(
                        VAD_TIMEOUT,
                        tokio::task::spawn_blocking(move || detector.detect(&pcm_file, threshold)),
                    )
                    .await
                    .map_err(|_| Error::AnalyzerUnavailable("vad inference timed out".into()))?
                    .map_err(|e| Error::AnalyzerUnavailable(format!("vad task failed: {e}")))?
                    .map_err(|e| Error::AnalyzerUnavailable(format!("{e:#}")))?;

                    Ok(vad::analyze(&source_id, preset, duration, offset, spans))
                }
            })
            .await?;
        ensure_live(&cancel)?;

        // 4. Plan. An empty plan is a soft failure: report, don't render.
        let plan = match planner::plan(
            &analysis,
            request.clip_start,
            request.clip_end,
            request.adjustments.as_ref(),
        ) {
            Ok(plan) => plan,
            Err(Error::EmptyPlan) => {
                info!(source_id = %request.source_id, "clip window contains no speech");
                return Ok(ExportResult {
                    success: false,
                    output_path: None,
                    original_duration: request.clip_end - request.clip_start,
                    edited_duration: 0.0,
                    time_saved: 0.0,
                    subject_position: None,
                    crop: None,
                    needs_review: false,
                    failure: Some(Error::EmptyPlan.to_string()),
                    plan_summary: None,
                });
            }
            Err(e) => return Err(e),
        };

        // 5. Fan out: audio assembly, subject localization, caption
        // retiming. Joined before rendering.
        let assembled_path = scratch.path().join("assembled.wav");
        let assemble_task = {
            let pcm = pcm.clone();
            let plan = plan.clone();
            tokio::task::spawn_blocking(move || {
                assembler::assemble_to_wav(&pcm, &plan, &assembled_path)
            })
        };

        let subject_task = async {
            match &self.services.oracle {
                Some(oracle) => {
                    SubjectLocalizer::new(oracle.clone())
                        .localize(
                            &request.source_path,
                            request.clip_start,
                            request.clip_end,
                            scratch.path(),
                            &cancel,
                        )
                        .await
                }
                None => {
                    warn!("no vision oracle configured; degrading to center crop");
                    SubjectPosition::center()
                }
            }
        };

        let captions_task = async {
            match transcript {
                Some(t) if request.include_captions => {
                    captions::rebase_captions(t, &plan, &self.caption_style)
                }
                _ => Vec::new(),
            }
        };

        let (assembled, subject, caption_chunks) =
            tokio::join!(assemble_task, subject_task, captions_task);
        let assembled =
            assembled.map_err(|e| Error::Other(format!("assembly task failed: {e}")))??;
        ensure_live(&cancel)?;

        let (crop_region, needs_review) = crop::compute_crop(
            probe_info.width,
            probe_info.height,
            request.target_format,
            &subject,
        );

        let subtitles_path = if caption_chunks.is_empty() {
            None
        } else {
            let path = scratch.path().join("captions.ass");
            write_caption_file(&path, &caption_chunks, request.target_format)?;
            Some(path)
        };
        let subtitles_str = match &subtitles_path {
            Some(p) => Some(
                p.to_str()
                    .ok_or_else(|| Error::IoFailure("non-utf8 scratch path".into()))?,
            ),
            None => None,
        };

        // 6. Sync invariant, then render under the semaphore.
        render::verify_sync(&plan, &assembled, probe_info.frame_rate)?;

        let graph = filtergraph::video_filter_graph(
            &plan,
            &crop_region,
            probe_info.width,
            probe_info.height,
            request.target_format,
            subtitles_str,
        );
        let args = filtergraph::build_render_args(
            &request.source_path,
            &assembled.path,
            &graph,
            &request.output_path,
        )?;

        let permit = self
            .render_permits
            .acquire()
            .await
            .map_err(|_| Error::Other("render semaphore closed".into()))?;
        let render_result = self
            .services
            .renderer
            .run(&args, &request.output_path, &cancel)
            .await;
        drop(permit);
        render_result?;

        // 7. The result.
        let original_duration = request.clip_end - request.clip_start;
        let edited_duration = plan.estimated_output_duration;

        info!(
            source_id = %request.source_id,
            edited_duration,
            time_saved = original_duration - edited_duration,
            needs_review,
            "export complete"
        );

        Ok(ExportResult {
            success: true,
            output_path: Some(request.output_path.clone()),
            original_duration,
            edited_duration,
            time_saved: original_duration - edited_duration,
            subject_position: Some(subject),
            crop: Some(crop_region),
            needs_review,
            failure: None,
            plan_summary: Some(PlanSummary::from_plan(&plan)),
        })
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

fn write_caption_file(
    path: &std::path::Path,
    chunks: &[CaptionChunk],
    format: TargetFormat,
) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut encoder = AssEncoder::new(std::io::BufWriter::new(file), format.dimensions());

    for chunk in chunks {
        encoder.write_chunk(chunk)?;
    }
    encoder.close()
}
