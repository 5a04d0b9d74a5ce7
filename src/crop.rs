// src/crop.rs

//! Crop geometry: the largest rectangle of the target aspect that fits the
//! source, positioned so the subject lands on the format's anchor point.
//!
//! Pure math, no I/O. The renderer consumes the result verbatim; keeping
//! this separate from filter-graph emission means the geometry is testable
//! without string parsing.

use serde::{Deserialize, Serialize};

use crate::presets::TargetFormat;
use crate::subject::SubjectPosition;

/// Below this confidence the chosen crop is flagged for human review.
pub const REVIEW_CONFIDENCE_FLOOR: f64 = 0.70;

/// An axis-aligned crop rectangle in source pixels.
///
/// Invariants: contained in the source frame; `w/h` matches the target
/// aspect within half a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl CropRegion {
    pub fn aspect(&self) -> f64 {
        self.w as f64 / self.h as f64
    }
}

/// Compute the crop for one source/format/subject combination.
///
/// Returns the region plus a `needs_review` flag (low localization
/// confidence). The rectangle is the largest of the target aspect that fits
/// inside the source, never smaller, so the renderer only ever downscales
/// when the source is big enough for the output.
pub fn compute_crop(
    src_w: u32,
    src_h: u32,
    format: TargetFormat,
    subject: &SubjectPosition,
) -> (CropRegion, bool) {
    let aspect = format.aspect();
    let src_aspect = src_w as f64 / src_h as f64;

    // Largest fitting rectangle: pin the constrained dimension, derive the
    // other from the aspect and round. When the derived dimension lands
    // exactly halfway (e.g. 1080 * 9/16 = 607.5), shrink the pinned one
    // until the rounded aspect error is strictly under half a pixel.
    let (mut w, mut h) = if src_aspect > aspect {
        let h = src_h;
        let w = ((src_h as f64) * aspect).round() as u32;
        (w.min(src_w), h)
    } else {
        let w = src_w;
        let h = ((src_w as f64) / aspect).round() as u32;
        (w, h.min(src_h))
    };
    while (w as f64 - h as f64 * aspect).abs() >= 0.5 && w > 1 && h > 1 {
        if src_aspect > aspect {
            h -= 1;
            w = ((h as f64) * aspect).round() as u32;
        } else {
            w -= 1;
            h = ((w as f64) / aspect).round() as u32;
        }
    }

    // Position so the subject pixel lands on the anchor, clamped into frame.
    let (anchor_x, anchor_y) = format.subject_anchor();
    let subject_x = subject.nx * src_w as f64;
    let subject_y = subject.ny * src_h as f64;

    let x = (subject_x - anchor_x * w as f64)
        .round()
        .clamp(0.0, (src_w - w) as f64) as u32;
    let y = (subject_y - anchor_y * h as f64)
        .round()
        .clamp(0.0, (src_h - h) as f64) as u32;

    let needs_review = subject.confidence < REVIEW_CONFIDENCE_FLOOR;

    (CropRegion { x, y, w, h }, needs_review)
}
