//! The source-time → output-time mapping induced by an edit plan.
//!
//! Audio assembly, caption retiming, and the renderer's filter graph all
//! read the same `TimelineMap`, so a timestamp can
//! only be remapped one way. The historical desync bug in this product class
//! came from one consumer snapping to frames on its own; keeping the mapping
//! in one place (and in floating-point) is the fix.

use serde::{Deserialize, Serialize};

/// One kept segment's span in both time bases.
///
/// Invariants (upheld by the planner):
/// - `out_end - out_start == src_end - src_start` (slope 1, no stretch)
/// - spans are ordered and non-overlapping in source-time
/// - `out_start` of span `i+1` is `out_end` of span `i`, minus the crossfade
///   at that join (fades overlap; they cost no output time)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimelineSpan {
    pub src_start: f64,
    pub src_end: f64,
    pub out_start: f64,
    pub out_end: f64,
}

/// The monotone piecewise-affine map from source seconds to output seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineMap {
    spans: Vec<TimelineSpan>,
}

impl TimelineMap {
    pub(crate) fn from_spans(spans: Vec<TimelineSpan>) -> Self {
        Self { spans }
    }

    pub fn spans(&self) -> &[TimelineSpan] {
        &self.spans
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Total output duration: `out_end` of the last span.
    pub fn output_duration(&self) -> f64 {
        self.spans.last().map(|s| s.out_end).unwrap_or(0.0)
    }

    /// The span whose source range contains `src_t`, if any.
    ///
    /// Spans are disjoint in source-time, so containment is unambiguous.
    pub fn span_for(&self, src_t: f64) -> Option<&TimelineSpan> {
        self.spans
            .iter()
            .find(|s| src_t >= s.src_start && src_t < s.src_end)
    }

    /// Map a source timestamp to output time.
    ///
    /// Returns `None` when `src_t` falls in removed material.
    ///
    /// On a crossfade the tail of span `i` and the head of span `i+1` occupy
    /// the same output interval; the overlap belongs to the later span, so
    /// tail values are clamped to the next span's `out_start`. The result is
    /// monotone and continuous across joins, with slope 1 everywhere except
    /// the clamped fade tail.
    pub fn to_output(&self, src_t: f64) -> Option<f64> {
        let idx = self
            .spans
            .iter()
            .position(|s| src_t >= s.src_start && src_t < s.src_end)?;

        let span = &self.spans[idx];
        let out = span.out_start + (src_t - span.src_start);

        match self.spans.get(idx + 1) {
            Some(next) => Some(out.min(next.out_start)),
            None => Some(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_span_map(fade: f64) -> TimelineMap {
        // [10, 12) and [15, 18) with a fade at the join.
        TimelineMap::from_spans(vec![
            TimelineSpan {
                src_start: 10.0,
                src_end: 12.0,
                out_start: 0.0,
                out_end: 2.0,
            },
            TimelineSpan {
                src_start: 15.0,
                src_end: 18.0,
                out_start: 2.0 - fade,
                out_end: 5.0 - fade,
            },
        ])
    }

    #[test]
    fn maps_interior_points_with_slope_one() {
        let map = two_span_map(0.01);
        assert_eq!(map.to_output(10.0), Some(0.0));
        assert_eq!(map.to_output(11.0), Some(1.0));
        assert_eq!(map.to_output(16.0), Some(1.0 + 2.0 - 0.01));
    }

    #[test]
    fn removed_material_maps_to_none() {
        let map = two_span_map(0.01);
        assert_eq!(map.to_output(13.0), None);
        assert_eq!(map.to_output(9.9), None);
        assert_eq!(map.to_output(18.0), None);
    }

    #[test]
    fn fade_tail_is_clamped_to_the_later_piece() {
        let map = two_span_map(0.01);
        // 11.995 maps nominally to 1.995, past the next span's 1.99 start.
        let out = map.to_output(11.995).unwrap();
        assert!((out - 1.99).abs() < 1e-9);
    }

    #[test]
    fn mapping_is_monotone_and_continuous_across_the_join() {
        let map = two_span_map(0.01);
        let mut prev = f64::MIN;
        let mut t = 10.0;
        while t < 18.0 {
            if let Some(out) = map.to_output(t) {
                assert!(out >= prev, "map went backwards at t={t}");
                prev = out;
            }
            t += 0.0005;
        }
        // End of span 0 (clamped) meets start of span 1 exactly.
        let tail = map.to_output(12.0 - 1e-9).unwrap();
        let head = map.to_output(15.0).unwrap();
        assert!((tail - head).abs() < 1e-6);
    }

    #[test]
    fn output_duration_is_last_out_end() {
        let map = two_span_map(0.01);
        assert!((map.output_duration() - 4.99).abs() < 1e-12);
        assert_eq!(TimelineMap::default().output_duration(), 0.0);
    }
}
