//! End-to-end pipeline scenarios against trait doubles.
//!
//! Every external collaborator is faked: a fixed probe, a decoder that
//! synthesizes PCM, a scripted detector, a recording renderer, and an
//! optional canned oracle. What stays real is everything the crate owns:
//! planning, timeline math, assembly, captions, crop, filter-graph
//! emission, caching, and orchestration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use clipcut::cache::VadCache;
use clipcut::captions::{Transcript, TranscriptWord};
use clipcut::error::Error;
use clipcut::extract::{AudioDecoder, ExtractedAudio};
use clipcut::pipeline::{ClipExporter, ClipRequest, Services};
use clipcut::presets::{Preset, TargetFormat};
use clipcut::probe::{MediaInfo, MediaProbe};
use clipcut::render::Renderer;
use clipcut::subject::{SubjectPosition, VisionOracle};
use clipcut::vad::VoiceDetector;
use clipcut::wav;

struct FakeProbe {
    info: MediaInfo,
}

#[async_trait]
impl MediaProbe for FakeProbe {
    async fn probe(&self, _source: &Path) -> clipcut::Result<MediaInfo> {
        Ok(self.info)
    }
}

/// Writes the requested range as constant-amplitude PCM.
struct ToneDecoder;

impl AudioDecoder for ToneDecoder {
    fn extract_range(
        &self,
        _source: &Path,
        t0: f64,
        t1: f64,
        rate: u32,
        out: &Path,
    ) -> clipcut::Result<ExtractedAudio> {
        let count = ((t1 - t0) * rate as f64).round() as usize;
        let samples = vec![0.25f32; count];
        wav::write_mono_f32(out, &samples, rate).map_err(|e| Error::IoFailure(e.to_string()))?;
        Ok(ExtractedAudio {
            path: out.to_path_buf(),
            start_s: t0,
            sample_rate: rate,
            sample_count: count,
        })
    }
}

/// Returns a fixed set of speech spans and counts invocations.
struct ScriptedDetector {
    spans: Vec<(f64, f64)>,
    calls: AtomicUsize,
}

impl ScriptedDetector {
    fn new(spans: Vec<(f64, f64)>) -> Arc<Self> {
        Arc::new(Self {
            spans,
            calls: AtomicUsize::new(0),
        })
    }
}

impl VoiceDetector for ScriptedDetector {
    fn detect(&self, _pcm_path: &Path, _threshold: f32) -> anyhow::Result<Vec<(f64, f64)>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.spans.clone())
    }
}

/// Records every argument list instead of spawning anything.
#[derive(Default)]
struct RecordingRenderer {
    invocations: std::sync::Mutex<Vec<Vec<String>>>,
}

impl RecordingRenderer {
    fn recorded(&self) -> Vec<Vec<String>> {
        self.invocations.lock().expect("lock").clone()
    }

    fn graphs(&self) -> Vec<String> {
        self.recorded()
            .iter()
            .filter_map(|args| {
                let i = args.iter().position(|a| a == "-filter_complex")?;
                args.get(i + 1).cloned()
            })
            .collect()
    }
}

#[async_trait]
impl Renderer for RecordingRenderer {
    async fn run(
        &self,
        args: &[String],
        _output: &Path,
        _cancel: &CancellationToken,
    ) -> clipcut::Result<()> {
        self.invocations.lock().expect("lock").push(args.to_vec());
        Ok(())
    }
}

struct CannedOracle {
    position: SubjectPosition,
}

#[async_trait]
impl VisionOracle for CannedOracle {
    async fn locate(&self, _jpeg: &[u8]) -> anyhow::Result<SubjectPosition> {
        Ok(self.position)
    }
}

struct Harness {
    exporter: ClipExporter,
    detector: Arc<ScriptedDetector>,
    renderer: Arc<RecordingRenderer>,
    _work_dir: tempfile::TempDir,
}

fn harness(info: MediaInfo, speech: Vec<(f64, f64)>) -> Harness {
    let detector = ScriptedDetector::new(speech);
    let renderer = Arc::new(RecordingRenderer::default());
    let work_dir = tempfile::tempdir().expect("work dir");

    let services = Services {
        probe: Arc::new(FakeProbe { info }),
        decoder: Arc::new(ToneDecoder),
        detector: detector.clone(),
        oracle: None,
        renderer: renderer.clone(),
    };

    let exporter = ClipExporter::new(services, Arc::new(VadCache::new()), work_dir.path());
    Harness {
        exporter,
        detector,
        renderer,
        _work_dir: work_dir,
    }
}

fn hd_source(duration_s: f64) -> MediaInfo {
    MediaInfo {
        duration_s,
        sample_rate: 48_000,
        frame_rate: 30.0,
        width: 1920,
        height: 1080,
    }
}

fn request(preset: Preset, clip_start: f64, clip_end: f64) -> ClipRequest {
    ClipRequest {
        source_id: "source-1".into(),
        source_path: PathBuf::from("/media/source.mp4"),
        clip_start,
        clip_end,
        target_format: TargetFormat::Tiktok,
        preset,
        include_captions: true,
        adjustments: None,
        output_path: PathBuf::from("/tmp/clipcut-test-out.mp4"),
    }
}

#[tokio::test]
async fn linkedin_export_trims_one_long_silence() -> anyhow::Result<()> {
    // One 3.3s breath between two talks inside a 33s clip.
    let h = harness(hd_source(33.0), vec![(0.0, 10.0), (13.3, 33.0)]);
    let req = request(Preset::Linkedin, 0.0, 33.0);

    let result = h
        .exporter
        .export_clip(&req, None, CancellationToken::new())
        .await?;

    assert!(result.success);
    let summary = result.plan_summary.as_ref().expect("summary");
    assert_eq!(summary.kept_segments, 3);

    // 2.3s of silence removed plus two 10ms fade overlaps.
    assert!((result.edited_duration - 30.68).abs() < 1e-6);
    assert!((result.time_saved - 2.32).abs() < 1e-6);
    assert!(result.time_saved > 2.0 && result.time_saved < 2.5);

    // The renderer saw three trims concatenated in plan order.
    let graphs = h.renderer.graphs();
    assert_eq!(graphs.len(), 1);
    assert_eq!(graphs[0].matches("trim=start=").count(), 3);
    assert!(graphs[0].contains("concat=n=3:v=1:a=0"));
    Ok(())
}

#[tokio::test]
async fn tiktok_preset_cuts_more_than_linkedin() -> anyhow::Result<()> {
    let speech = vec![(0.0, 5.0), (6.0, 12.0), (13.5, 20.0), (21.5, 33.0)];

    let li = harness(hd_source(33.0), speech.clone());
    let li_result = li
        .exporter
        .export_clip(&request(Preset::Linkedin, 0.0, 33.0), None, CancellationToken::new())
        .await?;

    let tt = harness(hd_source(33.0), speech);
    let tt_result = tt
        .exporter
        .export_clip(&request(Preset::Tiktok, 0.0, 33.0), None, CancellationToken::new())
        .await?;

    let li_summary = li_result.plan_summary.expect("summary");
    let tt_summary = tt_result.plan_summary.expect("summary");

    assert!(tt_result.time_saved > li_result.time_saved);
    assert!(tt_summary.kept_segments >= 6);
    assert!(tt_summary.kept_segments > li_summary.kept_segments);
    Ok(())
}

#[tokio::test]
async fn pure_silence_clip_is_a_soft_failure_with_no_render() -> anyhow::Result<()> {
    let h = harness(hd_source(5.0), vec![]);
    let req = request(Preset::Linkedin, 0.0, 5.0);

    let result = h
        .exporter
        .export_clip(&req, None, CancellationToken::new())
        .await?;

    assert!(!result.success);
    assert!(result.output_path.is_none());
    assert!(
        result
            .failure
            .as_deref()
            .is_some_and(|f| f.contains("no speech"))
    );
    assert!(h.renderer.recorded().is_empty());
    Ok(())
}

#[tokio::test]
async fn omitted_transcript_emits_no_subtitles_filter() -> anyhow::Result<()> {
    let h = harness(hd_source(20.0), vec![(0.0, 20.0)]);
    let req = request(Preset::Linkedin, 0.0, 20.0);

    let result = h
        .exporter
        .export_clip(&req, None, CancellationToken::new())
        .await?;

    assert!(result.success);
    let graphs = h.renderer.graphs();
    assert_eq!(graphs.len(), 1);
    assert!(!graphs[0].contains("subtitles"));
    Ok(())
}

#[tokio::test]
async fn transcript_burns_captions_into_the_graph() -> anyhow::Result<()> {
    let h = harness(hd_source(20.0), vec![(0.0, 20.0)]);
    let req = request(Preset::Linkedin, 0.0, 20.0);

    let transcript = Transcript {
        words: vec![
            TranscriptWord {
                text: "hello".into(),
                start: 1.0,
                end: 1.4,
            },
            TranscriptWord {
                text: "clip".into(),
                start: 1.5,
                end: 1.9,
            },
        ],
    };

    let result = h
        .exporter
        .export_clip(&req, Some(&transcript), CancellationToken::new())
        .await?;

    assert!(result.success);
    let graphs = h.renderer.graphs();
    assert!(graphs[0].contains(",subtitles="));
    assert!(graphs[0].contains("captions.ass"));
    Ok(())
}

#[tokio::test]
async fn vad_runs_once_across_repeated_exports() -> anyhow::Result<()> {
    let h = harness(hd_source(33.0), vec![(0.0, 10.0), (13.3, 33.0)]);
    let req = request(Preset::Linkedin, 0.0, 33.0);

    for _ in 0..2 {
        let result = h
            .exporter
            .export_clip(&req, None, CancellationToken::new())
            .await?;
        assert!(result.success);
    }

    assert_eq!(h.detector.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.renderer.recorded().len(), 2);

    // A different preset is a different cache key.
    let tt = request(Preset::Tiktok, 0.0, 33.0);
    h.exporter
        .export_clip(&tt, None, CancellationToken::new())
        .await?;
    assert_eq!(h.detector.calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn clearing_the_cache_forces_reanalysis() -> anyhow::Result<()> {
    let h = harness(hd_source(33.0), vec![(0.0, 33.0)]);
    let req = request(Preset::Linkedin, 0.0, 33.0);

    h.exporter
        .export_clip(&req, None, CancellationToken::new())
        .await?;
    h.exporter.cache().clear("source-1").await;
    h.exporter
        .export_clip(&req, None, CancellationToken::new())
        .await?;

    assert_eq!(h.detector.calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn out_of_range_requests_are_rejected_before_any_work() -> anyhow::Result<()> {
    let h = harness(hd_source(10.0), vec![(0.0, 10.0)]);
    let req = request(Preset::Linkedin, 2.0, 15.0);

    let err = h
        .exporter
        .export_clip(&req, None, CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "invalid_range");
    assert_eq!(h.detector.calls.load(Ordering::SeqCst), 0);
    assert!(h.renderer.recorded().is_empty());
    Ok(())
}

#[tokio::test]
async fn cancelled_requests_produce_no_result() -> anyhow::Result<()> {
    let h = harness(hd_source(10.0), vec![(0.0, 10.0)]);
    let req = request(Preset::Linkedin, 0.0, 10.0);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h.exporter.export_clip(&req, None, cancel).await.unwrap_err();
    assert_eq!(err.kind(), "cancelled");
    assert!(h.renderer.recorded().is_empty());
    Ok(())
}

#[tokio::test]
async fn missing_oracle_degrades_to_center_crop_needing_review() -> anyhow::Result<()> {
    let h = harness(hd_source(20.0), vec![(0.0, 20.0)]);
    let req = request(Preset::Linkedin, 0.0, 20.0);

    let result = h
        .exporter
        .export_clip(&req, None, CancellationToken::new())
        .await?;

    assert!(result.success);
    assert!(result.needs_review);
    let subject = result.subject_position.expect("subject");
    assert_eq!((subject.nx, subject.ny), (0.5, 0.5));
    assert_eq!(subject.confidence, 0.0);

    // Center crop of a 16:9 source for 9:16 output.
    let crop = result.crop.expect("crop");
    assert_eq!(crop.h, 1079);
    assert_eq!(crop.w, 607);
    Ok(())
}

#[tokio::test]
async fn detector_failure_is_fatal_not_silent() -> anyhow::Result<()> {
    struct BrokenDetector;
    impl VoiceDetector for BrokenDetector {
        fn detect(&self, _pcm_path: &Path, _threshold: f32) -> anyhow::Result<Vec<(f64, f64)>> {
            anyhow::bail!("model not loaded")
        }
    }

    let renderer = Arc::new(RecordingRenderer::default());
    let work_dir = tempfile::tempdir()?;
    let services = Services {
        probe: Arc::new(FakeProbe {
            info: hd_source(10.0),
        }),
        decoder: Arc::new(ToneDecoder),
        detector: Arc::new(BrokenDetector),
        oracle: None,
        renderer: renderer.clone(),
    };
    let exporter = ClipExporter::new(services, Arc::new(VadCache::new()), work_dir.path());

    let err = exporter
        .export_clip(
            &request(Preset::Linkedin, 0.0, 10.0),
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "analyzer_unavailable");
    assert!(renderer.recorded().is_empty());
    Ok(())
}

#[tokio::test]
async fn oracle_position_steers_the_crop() -> anyhow::Result<()> {
    // An oracle is configured but frame extraction (ffmpeg) is unavailable
    // in tests, so localization degrades to the center fallback; the export
    // still succeeds and flags review.
    let detector = ScriptedDetector::new(vec![(0.0, 20.0)]);
    let renderer = Arc::new(RecordingRenderer::default());
    let work_dir = tempfile::tempdir()?;

    let services = Services {
        probe: Arc::new(FakeProbe {
            info: hd_source(20.0),
        }),
        decoder: Arc::new(ToneDecoder),
        detector,
        oracle: Some(Arc::new(CannedOracle {
            position: SubjectPosition {
                nx: 0.3,
                ny: 0.4,
                confidence: 0.95,
            },
        })),
        renderer: renderer.clone(),
    };
    let exporter = ClipExporter::new(services, Arc::new(VadCache::new()), work_dir.path());

    let result = exporter
        .export_clip(
            &request(Preset::Linkedin, 0.0, 20.0),
            None,
            CancellationToken::new(),
        )
        .await?;

    assert!(result.success);
    assert!(result.needs_review);
    Ok(())
}
