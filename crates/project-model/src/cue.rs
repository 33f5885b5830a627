//! Subtitle cues and SRT conversion.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// One timed subtitle span, active during `[start_time, end_time)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleCue {
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
}

impl SubtitleCue {
    pub fn new(start_time: f64, end_time: f64, text: impl Into<String>) -> Self {
        Self {
            start_time,
            end_time,
            text: text.into(),
        }
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Half-open activity check.
    pub fn is_active_at(&self, time: f64) -> bool {
        time >= self.start_time && time < self.end_time
    }
}

/// Parse SRT content into cues.
///
/// Multi-line cue text is joined with single spaces; the renderer re-wraps it.
pub fn parse_srt(content: &str) -> Result<Vec<SubtitleCue>, ModelError> {
    let normalized = content.replace("\r\n", "\n");
    let mut cues = Vec::new();

    for (entry, block) in normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .enumerate()
    {
        let mut lines = block.lines();
        let mut timing = lines.next().unwrap_or_default();
        if !timing.contains("-->") {
            timing = lines.next().unwrap_or_default();
        }

        let (start, end) = timing
            .split_once("-->")
            .ok_or_else(|| ModelError::InvalidSubtitle {
                entry,
                message: format!("missing timing line in block {block:?}"),
            })?;
        let start_time = parse_srt_time(start.trim()).ok_or_else(|| invalid(entry, start))?;
        let end_time = parse_srt_time(end.trim()).ok_or_else(|| invalid(entry, end))?;
        if end_time <= start_time {
            return Err(ModelError::InvalidSubtitle {
                entry,
                message: format!("end {end_time:.3}s is not after start {start_time:.3}s"),
            });
        }

        let text = lines
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        cues.push(SubtitleCue::new(start_time, end_time, text));
    }

    Ok(cues)
}

/// Read and parse an SRT file.
pub fn load_srt(path: &Path) -> Result<Vec<SubtitleCue>, ModelError> {
    let content = std::fs::read_to_string(path).map_err(|e| ModelError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_srt(content.trim_start_matches('\u{feff}'))
}

/// Generate SRT content from cues.
pub fn generate_srt(cues: &[SubtitleCue]) -> String {
    let mut output = String::new();

    for (i, cue) in cues.iter().enumerate() {
        output.push_str(&format!("{}\n", i + 1));
        output.push_str(&format!(
            "{} --> {}\n",
            format_srt_time(cue.start_time),
            format_srt_time(cue.end_time),
        ));
        output.push_str(&cue.text);
        output.push_str("\n\n");
    }

    output
}

fn invalid(entry: usize, raw: &str) -> ModelError {
    ModelError::InvalidSubtitle {
        entry,
        message: format!("unparseable timestamp {:?}", raw.trim()),
    }
}

/// Parse `HH:MM:SS,mmm` (a `.` separator is accepted too).
fn parse_srt_time(raw: &str) -> Option<f64> {
    let (hms, fraction) = raw.split_once([',', '.']).unwrap_or((raw, "0"));
    let mut parts = hms.split(':');
    let hours: u64 = parts.next()?.trim().parse().ok()?;
    let minutes: u64 = parts.next()?.trim().parse().ok()?;
    let seconds: u64 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || seconds >= 60 {
        return None;
    }
    // Fractional digits are decimal places, so `1.5` is 1.5 s.
    let fraction = fraction.trim();
    if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let fraction: f64 = format!("0.{fraction}").parse().ok()?;
    Some((hours * 3600 + minutes * 60 + seconds) as f64 + fraction)
}

/// Format seconds as SRT timestamp: HH:MM:SS,mmm
fn format_srt_time(secs: f64) -> String {
    let total_ms = (secs * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "1\r\n00:00:01,000 --> 00:00:03,500\r\nhello world\r\nthis is a long caption\r\n\r\n2\r\n00:00:03,500 --> 00:00:05,000\r\nsecond\r\n";

    #[test]
    fn test_parse_srt_joins_lines() {
        let cues = parse_srt(SAMPLE).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start_time, 1.0);
        assert_eq!(cues[0].end_time, 3.5);
        assert_eq!(cues[0].text, "hello world this is a long caption");
        assert_eq!(cues[1].text, "second");
    }

    #[test]
    fn test_parse_srt_rejects_backwards_timing() {
        let err = parse_srt("1\n00:00:05,000 --> 00:00:04,000\nnope\n").unwrap_err();
        assert!(matches!(err, ModelError::InvalidSubtitle { entry: 0, .. }));
    }

    #[test]
    fn test_generate_then_parse_preserves_timing() {
        let cues = vec![
            SubtitleCue::new(0.0, 2.5, "Hello world"),
            SubtitleCue::new(61.5, 63.0, "One minute in"),
        ];
        let srt = generate_srt(&cues);
        assert!(srt.contains("1\n00:00:00,000 --> 00:00:02,500\nHello world"));
        assert_eq!(parse_srt(&srt).unwrap(), cues);
    }

    #[test]
    fn test_cue_is_half_open() {
        let cue = SubtitleCue::new(1.0, 3.5, "x");
        assert!(cue.is_active_at(1.0));
        assert!(cue.is_active_at(3.49));
        assert!(!cue.is_active_at(3.5));
        assert!((cue.duration() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_time_formatting() {
        assert_eq!(format_srt_time(0.0), "00:00:00,000");
        assert_eq!(format_srt_time(3661.5), "01:01:01,500");
        assert_eq!(parse_srt_time("01:01:01.500"), Some(3661.5));
        assert_eq!(parse_srt_time("00:61:00,000"), None);
    }

    #[test]
    fn test_short_fractions_are_decimal_places() {
        assert_eq!(parse_srt_time("00:00:01.5"), Some(1.5));
        assert_eq!(parse_srt_time("00:00:01,25"), Some(1.25));
        let hundredths = parse_srt_time("00:00:02,05").unwrap();
        assert!((hundredths - 2.05).abs() < 1e-9);
        assert_eq!(parse_srt_time("00:00:01,"), None);
        assert_eq!(parse_srt_time("00:00:01,5x"), None);

        let cues = parse_srt("1\n00:00:01.5 --> 00:00:03.25\nHello\n").unwrap();
        assert_eq!(cues[0].start_time, 1.5);
        assert_eq!(cues[0].end_time, 3.25);
    }
}
