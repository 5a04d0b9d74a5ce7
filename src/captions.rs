// src/captions.rs

//! Rebase transcript word timings through the edit plan's timeline and group
//! the surviving words into caption chunks.
//!
//! Captions are authored upstream (word-level timings in source-time); this
//! module only re-times them. Because the remap goes through the same
//! `TimelineMap` the assembler and renderer consume, a caption can only
//! drift from speech if the plan itself is wrong, and the sync check
//! catches that before rendering.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::planner::EditPlan;

/// One word of the provided transcript, in source-time seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptWord {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// Word-level transcript for a source, as delivered by the transcription
/// provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub words: Vec<TranscriptWord>,
}

/// Chunking knobs for caption presentation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptionStyle {
    /// Upper bound on words per caption chunk.
    pub max_words_per_chunk: usize,

    /// Break a chunk when consecutive words are further apart than this
    /// (output-time).
    pub max_intra_chunk_gap_s: f64,

    /// Break a chunk rather than let it run longer than this.
    pub max_chunk_duration_s: f64,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            max_words_per_chunk: 6,
            max_intra_chunk_gap_s: 0.7,
            max_chunk_duration_s: 3.0,
        }
    }
}

/// A word with output-time timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionWord {
    pub text: String,
    pub out_start: f64,
    pub out_end: f64,
}

/// A display unit of up to `max_words_per_chunk` words.
///
/// Invariants: at least one word; word times lie inside the chunk; chunks
/// never overlap each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionChunk {
    pub words: Vec<CaptionWord>,
    pub out_start: f64,
    pub out_end: f64,
}

/// Re-time transcript words through the plan and group them into chunks.
///
/// Words whose midpoint falls in removed material are dropped: there is no
/// audio left for them to caption.
pub fn rebase_captions(
    transcript: &Transcript,
    plan: &EditPlan,
    style: &CaptionStyle,
) -> Vec<CaptionChunk> {
    let mut mapped: Vec<CaptionWord> = Vec::new();

    for word in &transcript.words {
        // Only words overlapping the clip window matter.
        if word.end <= plan.clip_start || word.start >= plan.clip_end {
            continue;
        }

        let mid = (word.start + word.end) / 2.0;
        let Some(span) = plan.timeline.span_for(mid) else {
            continue;
        };

        // Clamp the word edges into the owning segment: a word that spills
        // past a cut is shown only for its surviving part.
        let src_start = word.start.clamp(span.src_start, span.src_end);
        let src_end = word.end.clamp(span.src_start, span.src_end);

        let out_start = span.out_start + (src_start - span.src_start);
        let mut out_end = span.out_start + (src_end - span.src_start);
        if out_end <= out_start {
            out_end = out_start + 1e-3;
        }

        mapped.push(CaptionWord {
            text: word.text.clone(),
            out_start,
            out_end,
        });
    }

    mapped.sort_by(|a, b| a.out_start.total_cmp(&b.out_start));

    // Greedy chunking.
    let mut chunks: Vec<CaptionChunk> = Vec::new();
    let mut current: Vec<CaptionWord> = Vec::new();

    for word in mapped {
        if let (Some(first), Some(last)) = (current.first(), current.last()) {
            let full = current.len() >= style.max_words_per_chunk;
            let gapped = word.out_start - last.out_end > style.max_intra_chunk_gap_s;
            let overlong = word.out_end - first.out_start > style.max_chunk_duration_s;
            if full || gapped || overlong {
                chunks.push(finish_chunk(std::mem::take(&mut current)));
            }
        }
        current.push(word);
    }
    if !current.is_empty() {
        chunks.push(finish_chunk(current));
    }

    // Crossfade overlap can leave the tail of one chunk a few milliseconds
    // past the head of the next; clamp so chunks never overlap on screen.
    for i in 1..chunks.len() {
        let boundary = chunks[i].out_start;
        let prev = &mut chunks[i - 1];
        if prev.out_end > boundary {
            prev.out_end = boundary;
            if let Some(last) = prev.words.last_mut() {
                last.out_end = last.out_end.min(boundary);
                last.out_start = last.out_start.min(boundary);
            }
        }
    }

    debug!(chunks = chunks.len(), "captions rebased");
    chunks
}

fn finish_chunk(words: Vec<CaptionWord>) -> CaptionChunk {
    let out_start = words.first().map(|w| w.out_start).unwrap_or(0.0);
    let out_end = words.last().map(|w| w.out_end).unwrap_or(0.0);
    CaptionChunk {
        words,
        out_start,
        out_end,
    }
}
