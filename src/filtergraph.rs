// src/filtergraph.rs

//! Filter-graph synthesis for the external renderer.
//!
//! This is the one wire format the pipeline owns bit-exactly: per kept
//! segment a `trim=start=..:end=..,setpts=PTS-STARTPTS` chain, a `concat`
//! only when there is more than one segment, then `scale` + `crop`, then an
//! optional `subtitles` filter. Tests assert on the emitted strings, so any
//! change here is a contract change.
//!
//! The trim boundaries come straight from the plan's floating-point
//! source-times. If the renderer snaps to frames it does so internally;
//! nothing upstream ever sees snapped values.

use std::path::Path;

use crate::crop::CropRegion;
use crate::error::{Error, Result};
use crate::planner::EditPlan;
use crate::presets::TargetFormat;

/// Seconds formatted for filter arguments.
///
/// Fixed six decimal places: stable for tests, microsecond resolution for
/// the tool.
fn fmt_secs(t: f64) -> String {
    format!("{t:.6}")
}

/// Scale factor geometry: scale the whole source so the crop region lands
/// exactly on the output dimensions, then crop in scaled coordinates.
fn scale_and_crop(
    crop: &CropRegion,
    src_w: u32,
    src_h: u32,
    format: TargetFormat,
) -> (u32, u32, u32, u32, u32, u32) {
    let (out_w, out_h) = format.dimensions();
    let f = out_w as f64 / crop.w as f64;

    let sw = ((src_w as f64 * f).round() as u32).max(out_w);
    let sh = ((src_h as f64 * f).round() as u32).max(out_h);

    let cx = ((crop.x as f64 * f).round() as u32).min(sw - out_w);
    let cy = ((crop.y as f64 * f).round() as u32).min(sh - out_h);

    (sw, sh, out_w, out_h, cx, cy)
}

/// Emit the complete video filter graph for one export.
///
/// `subtitles` is the burned-in caption file, already written to the scratch
/// directory; `None` emits no subtitles filter at all.
pub fn video_filter_graph(
    plan: &EditPlan,
    crop: &CropRegion,
    src_w: u32,
    src_h: u32,
    format: TargetFormat,
    subtitles: Option<&str>,
) -> String {
    let (sw, sh, cw, ch, cx, cy) = scale_and_crop(crop, src_w, src_h, format);

    let mut tail = format!("scale={sw}:{sh},crop={cw}:{ch}:{cx}:{cy}");
    if let Some(ass) = subtitles {
        tail.push_str(&format!(",subtitles={ass}"));
    }

    let trims: Vec<String> = plan
        .kept_segments
        .iter()
        .map(|seg| {
            format!(
                "trim=start={}:end={},setpts=PTS-STARTPTS",
                fmt_secs(seg.src_start),
                fmt_secs(seg.src_end)
            )
        })
        .collect();

    // Short clips often reduce to a single kept segment; that case gets a
    // single chain with no concat node.
    if trims.len() == 1 {
        return format!("[0:v]{},{tail}[vout]", trims[0]);
    }

    let mut parts: Vec<String> = trims
        .iter()
        .enumerate()
        .map(|(i, t)| format!("[0:v]{t}[v{i}]"))
        .collect();

    let inputs: String = (0..trims.len()).map(|i| format!("[v{i}]")).collect();
    parts.push(format!(
        "{inputs}concat=n={}:v=1:a=0[vcat]",
        trims.len()
    ));
    parts.push(format!("[vcat]{tail}[vout]"));

    parts.join(";")
}

/// Assemble the full renderer argument list: inputs, the filter graph, the
/// stream maps, and the encode tail.
pub fn build_render_args(
    source: &Path,
    assembled_audio: &Path,
    graph: &str,
    output: &Path,
) -> Result<Vec<String>> {
    let mut args: Vec<String> = vec!["-y".into()];

    args.extend_from_slice(&["-i".into(), path_str(source)?]);
    args.extend_from_slice(&["-i".into(), path_str(assembled_audio)?]);

    args.extend_from_slice(&["-filter_complex".into(), graph.to_owned()]);
    args.extend_from_slice(&["-map".into(), "[vout]".into()]);
    args.extend_from_slice(&["-map".into(), "1:a".into()]);

    // Output encoding: H.264 + AAC, faststart for social upload targets.
    args.extend_from_slice(&[
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "medium".into(),
        "-crf".into(),
        "23".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "192k".into(),
        "-movflags".into(),
        "+faststart".into(),
        "-shortest".into(),
    ]);

    args.push(path_str(output)?);
    Ok(args)
}

/// Convert a path to a String, failing on non-UTF8.
fn path_str(path: &Path) -> Result<String> {
    path.to_str()
        .map(|s| s.to_owned())
        .ok_or_else(|| Error::IoFailure("path contains non-UTF8 characters".into()))
}
