use std::io::Write;

use crate::captions::CaptionChunk;
use crate::error::{Error, Result};

/// A streaming encoder for caption chunks.
///
/// Decouples *chunk production* (the caption timer) from *chunk
/// presentation* (ASS today, anything else tomorrow).
///
/// Lifecycle:
/// - Call `write_chunk` zero or more times.
/// - Call `close` exactly once when done.
/// - Implementations should treat `close()` as idempotent (safe to call
///   multiple times).
pub trait CaptionSink {
    /// Encode and write a single chunk.
    fn write_chunk(&mut self, chunk: &CaptionChunk) -> Result<()>;

    /// Finalize the encoded output and flush any buffered data.
    fn close(&mut self) -> Result<()>;
}

/// A `CaptionSink` that writes Advanced SubStation Alpha with per-word
/// karaoke timing.
///
/// Design:
/// - Output streams directly to a `Write` implementation.
/// - The script header is written lazily on the first chunk so that callers
///   can construct the encoder without immediately producing output, and a
///   "no chunks" run still behaves predictably (close just flushes).
/// - Word highlight timing uses `\k` tags in centiseconds; a gap between
///   words inside a chunk becomes an empty `\k` tag so the sweep stays
///   aligned with speech.
pub struct AssEncoder<W: Write> {
    /// The underlying writer we stream ASS into.
    w: W,

    /// Script resolution, matching the target format's output dimensions.
    play_res: (u32, u32),

    /// Whether we've written the script header.
    started: bool,

    /// Whether the encoder has been closed.
    closed: bool,
}

impl<W: Write> AssEncoder<W> {
    pub fn new(w: W, play_res: (u32, u32)) -> Self {
        Self {
            w,
            play_res,
            started: false,
            closed: false,
        }
    }

    /// Write the script header if we haven't written it yet.
    fn start_if_needed(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }

        let (res_x, res_y) = self.play_res;
        writeln!(&mut self.w, "[Script Info]")?;
        writeln!(&mut self.w, "ScriptType: v4.00+")?;
        writeln!(&mut self.w, "PlayResX: {res_x}")?;
        writeln!(&mut self.w, "PlayResY: {res_y}")?;
        writeln!(&mut self.w, "WrapStyle: 0")?;
        writeln!(&mut self.w, "ScaledBorderAndShadow: yes")?;
        writeln!(&mut self.w)?;
        writeln!(&mut self.w, "[V4+ Styles]")?;
        writeln!(
            &mut self.w,
            "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, \
             OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, \
             ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, \
             Alignment, MarginL, MarginR, MarginV, Encoding"
        )?;
        writeln!(
            &mut self.w,
            "Style: Default,Arial,72,&H00FFFFFF,&H0000D7FF,&H00101010,&H64000000,\
             -1,0,0,0,100,100,0,0,1,4,2,2,60,60,140,1"
        )?;
        writeln!(&mut self.w)?;
        writeln!(&mut self.w, "[Events]")?;
        writeln!(
            &mut self.w,
            "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text"
        )?;

        self.started = true;
        Ok(())
    }
}

impl<W: Write> CaptionSink for AssEncoder<W> {
    /// Write one chunk as a single `Dialogue` event.
    fn write_chunk(&mut self, chunk: &CaptionChunk) -> Result<()> {
        if self.closed {
            return Err(Error::Other(
                "cannot write chunk: encoder is already closed".into(),
            ));
        }

        self.start_if_needed()?;

        let start = format_timestamp_ass(chunk.out_start);
        let end = format_timestamp_ass(chunk.out_end);
        let text = karaoke_text(chunk);

        writeln!(
            &mut self.w,
            "Dialogue: 0,{start},{end},Default,,0,0,0,,{text}"
        )?;

        // Flush so streaming consumers see output promptly.
        self.w.flush()?;
        Ok(())
    }

    /// Flush the underlying writer. This is idempotent.
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        self.w.flush()?;
        self.closed = true;
        Ok(())
    }
}

/// Per-word `\k` karaoke markup for one chunk.
///
/// Every `\k` duration is at least one centisecond so a degenerate word
/// still registers in the sweep.
fn karaoke_text(chunk: &CaptionChunk) -> String {
    let mut out = String::new();
    let mut cursor = chunk.out_start;

    for (i, word) in chunk.words.iter().enumerate() {
        let gap_cs = ((word.out_start - cursor) * 100.0).round() as i64;
        if gap_cs > 0 {
            out.push_str(&format!("{{\\k{gap_cs}}}"));
        }

        let dur_cs = (((word.out_end - word.out_start) * 100.0).round() as i64).max(1);
        out.push_str(&format!("{{\\k{dur_cs}}}{}", word.text));

        if i + 1 < chunk.words.len() {
            out.push(' ');
        }
        cursor = word.out_end;
    }

    out
}

/// Format seconds into an ASS timestamp (`H:MM:SS.CC`).
///
/// Rounding policy: round to the nearest centisecond (ASS resolution) so
/// conversions from `f64` cannot drift a whole tick.
fn format_timestamp_ass(seconds: f64) -> String {
    let total_cs = (seconds * 100.0).round() as u64;

    let cs = total_cs % 100;
    let total_s = total_cs / 100;

    let s = total_s % 60;
    let total_m = total_s / 60;

    let m = total_m % 60;
    let h = total_m / 60;

    format!("{h}:{m:02}:{s:02}.{cs:02}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captions::CaptionWord;

    fn chunk(words: &[(&str, f64, f64)]) -> CaptionChunk {
        let words: Vec<CaptionWord> = words
            .iter()
            .map(|&(text, out_start, out_end)| CaptionWord {
                text: text.into(),
                out_start,
                out_end,
            })
            .collect();
        CaptionChunk {
            out_start: words.first().map(|w| w.out_start).unwrap_or(0.0),
            out_end: words.last().map(|w| w.out_end).unwrap_or(0.0),
            words,
        }
    }

    #[test]
    fn timestamps_use_centisecond_resolution() {
        assert_eq!(format_timestamp_ass(0.0), "0:00:00.00");
        assert_eq!(format_timestamp_ass(1.234), "0:00:01.23");
        assert_eq!(format_timestamp_ass(61.5), "0:01:01.50");
        assert_eq!(format_timestamp_ass(3661.995), "1:01:02.00");
    }

    #[test]
    fn karaoke_tags_cover_words_and_gaps() {
        let c = chunk(&[("hello", 1.0, 1.4), ("world", 1.6, 2.0)]);
        let text = karaoke_text(&c);
        // 40cs word, 20cs gap, 40cs word.
        assert_eq!(text, "{\\k40}hello {\\k20}{\\k40}world");
    }

    #[test]
    fn header_is_written_once_before_the_first_dialogue() -> Result<()> {
        let mut out = Vec::new();
        let mut enc = AssEncoder::new(&mut out, (1080, 1920));

        enc.write_chunk(&chunk(&[("one", 0.0, 0.5)]))?;
        enc.write_chunk(&chunk(&[("two", 1.0, 1.5)]))?;
        enc.close()?;

        let s = String::from_utf8(out).expect("utf8");
        assert_eq!(s.matches("[Script Info]").count(), 1);
        assert_eq!(s.matches("PlayResX: 1080").count(), 1);
        assert_eq!(s.matches("PlayResY: 1920").count(), 1);
        assert_eq!(s.matches("Dialogue: 0,").count(), 2);
        assert!(s.contains("Dialogue: 0,0:00:00.00,0:00:00.50,Default,,0,0,0,,{\\k50}one"));
        Ok(())
    }

    #[test]
    fn close_is_idempotent_and_seals_the_encoder() -> Result<()> {
        let mut out = Vec::new();
        let mut enc = AssEncoder::new(&mut out, (1080, 1920));

        enc.close()?;
        enc.close()?;

        let err = enc.write_chunk(&chunk(&[("late", 0.0, 0.1)])).unwrap_err();
        assert!(err.to_string().contains("already closed"));
        Ok(())
    }

    #[test]
    fn empty_run_produces_no_output() -> Result<()> {
        let mut out = Vec::new();
        let mut enc = AssEncoder::new(&mut out, (1080, 1080));
        enc.close()?;
        assert!(out.is_empty());
        Ok(())
    }
}
