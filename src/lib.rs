//! `clipcut`: a clip export pipeline engine.
//!
//! This crate turns a long-form source video plus a clip window into a
//! short, platform-ready clip:
//! - voice-activity-driven silence trimming with a per-source cache
//! - a single timeline map shared by audio, captions, and video
//! - equal-power crossfaded audio assembly
//! - subject-aware cropping with burned-in karaoke captions
//! - an edit-synchronized filter graph for the external renderer
//!
//! The library is designed to be used by both CLI tools and long-running
//! services, with every external collaborator (probe, decoder, detector,
//! vision oracle, renderer) behind an injectable trait.

// Crate-wide error type and result alias.
pub mod error;
pub use error::{Error, Result};

// Fixed preset and target-format tables.
pub mod presets;

// Source probing and PCM extraction.
pub mod extract;
pub mod probe;
pub mod wav;

// Voice activity analysis and its process-wide cache.
pub mod cache;
pub mod vad;

// Edit decision computation and the shared source→output mapping.
pub mod planner;
pub mod timeline;

// Output-side consumers of the plan.
pub mod ass_encoder;
pub mod assembler;
pub mod captions;

// Framing: subject localization and crop geometry.
pub mod crop;
pub mod subject;

// Renderer bridge: filter-graph synthesis and process invocation.
pub mod filtergraph;
pub mod render;

// High-level orchestration.
pub mod pipeline;

// Logging configuration and control.
pub mod logging;
