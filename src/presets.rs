//! Fixed preset and target-format tables.
//!
//! Presets bundle the VAD/trim/padding/fade parameters tuned per delivery
//! platform; target formats carry output dimensions and the framing anchor.
//! Both tables are compiled-in: per-request variation goes through
//! `Adjustments` on the request, never through mutation of these tables.

use serde::{Deserialize, Serialize};

/// A named bundle of silence-trimming parameters tuned per delivery platform.
///
/// Integration notes:
/// - When the `cli` feature is enabled, we derive `clap::ValueEnum` so the enum
///   can be used directly as a CLI flag.
/// - The variant set is fixed; callers tweak behavior per request via
///   `Adjustments`, not by inventing presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[cfg_attr(feature = "cli", clap(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Linkedin,
    YoutubeShorts,
    Tiktok,
    Podcast,
}

/// Trim/padding/fade parameters for one preset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PresetConfig {
    /// Silences shorter than this are kept in full.
    pub min_silence_s: f64,

    /// Longer silences are shortened to at most this duration.
    pub max_kept_silence_s: f64,

    /// Padding applied to each speech interval on both sides.
    pub speech_padding_s: f64,

    /// Nominal crossfade at each kept-segment join.
    pub crossfade_s: f64,

    /// Speech-probability threshold handed to the voice detector.
    pub vad_threshold: f32,
}

impl Preset {
    /// The fixed parameter table.
    ///
    /// `vad_threshold` is 0.5 everywhere: the silero operating point. The
    /// trim knobs are what distinguish the platforms (tiktok cuts hardest,
    /// podcast breathes the most).
    pub fn config(self) -> PresetConfig {
        match self {
            Preset::Linkedin => PresetConfig {
                min_silence_s:      0.50,
                max_kept_silence_s: 0.70,
                speech_padding_s:   0.15,
                crossfade_s:        0.010,
                vad_threshold:      0.5,
            },
            Preset::YoutubeShorts => PresetConfig {
                min_silence_s:      0.30,
                max_kept_silence_s: 0.20,
                speech_padding_s:   0.10,
                crossfade_s:        0.010,
                vad_threshold:      0.5,
            },
            Preset::Tiktok => PresetConfig {
                min_silence_s:      0.20,
                max_kept_silence_s: 0.15,
                speech_padding_s:   0.08,
                crossfade_s:        0.010,
                vad_threshold:      0.5,
            },
            Preset::Podcast => PresetConfig {
                min_silence_s:      0.80,
                max_kept_silence_s: 1.00,
                speech_padding_s:   0.20,
                crossfade_s:        0.010,
                vad_threshold:      0.5,
            },
        }
    }

    /// Stable name used in cache keys and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Preset::Linkedin      => "linkedin",
            Preset::YoutubeShorts => "youtube_shorts",
            Preset::Tiktok        => "tiktok",
            Preset::Podcast       => "podcast",
        }
    }
}

/// Output container geometry per delivery platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[cfg_attr(feature = "cli", clap(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TargetFormat {
    Tiktok,
    YoutubeShorts,
    InstagramReels,
    Linkedin,
    LinkedinSquare,
}

impl TargetFormat {
    /// Output pixel dimensions `(width, height)`.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            TargetFormat::Tiktok         => (1080, 1920),
            TargetFormat::YoutubeShorts  => (1080, 1920),
            TargetFormat::InstagramReels => (1080, 1920),
            TargetFormat::Linkedin       => (1080, 1350),
            TargetFormat::LinkedinSquare => (1080, 1080),
        }
    }

    /// Width-to-height ratio of the output.
    pub fn aspect(self) -> f64 {
        let (w, h) = self.dimensions();
        w as f64 / h as f64
    }

    /// Where the subject lands inside the output frame, as normalized
    /// `(x, y)` of the crop rectangle.
    ///
    /// Vertical formats put the subject at the upper rule-of-thirds point;
    /// the squarer formats center it.
    pub fn subject_anchor(self) -> (f64, f64) {
        match self {
            TargetFormat::Tiktok
            | TargetFormat::YoutubeShorts
            | TargetFormat::InstagramReels => (0.50, 0.35),
            TargetFormat::Linkedin => (0.50, 0.50),
            TargetFormat::LinkedinSquare => (0.50, 0.50),
        }
    }

    /// Stable name used in logs and summaries.
    pub fn as_str(self) -> &'static str {
        match self {
            TargetFormat::Tiktok         => "tiktok",
            TargetFormat::YoutubeShorts  => "youtube_shorts",
            TargetFormat::InstagramReels => "instagram_reels",
            TargetFormat::Linkedin       => "linkedin",
            TargetFormat::LinkedinSquare => "linkedin_square",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_table_matches_platform_tuning() {
        let li = Preset::Linkedin.config();
        assert_eq!(li.min_silence_s, 0.50);
        assert_eq!(li.max_kept_silence_s, 0.70);

        let tt = Preset::Tiktok.config();
        assert!(tt.min_silence_s < li.min_silence_s);
        assert!(tt.max_kept_silence_s < li.max_kept_silence_s);

        // Every preset uses the same 10ms crossfade.
        for p in [
            Preset::Linkedin,
            Preset::YoutubeShorts,
            Preset::Tiktok,
            Preset::Podcast,
        ] {
            assert_eq!(p.config().crossfade_s, 0.010);
        }
    }

    #[test]
    fn vertical_formats_share_dimensions_and_anchor() {
        for f in [
            TargetFormat::Tiktok,
            TargetFormat::YoutubeShorts,
            TargetFormat::InstagramReels,
        ] {
            assert_eq!(f.dimensions(), (1080, 1920));
            assert_eq!(f.subject_anchor(), (0.50, 0.35));
        }
        assert_eq!(TargetFormat::Linkedin.dimensions(), (1080, 1350));
        assert_eq!(TargetFormat::LinkedinSquare.aspect(), 1.0);
    }
}
