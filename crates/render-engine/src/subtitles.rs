//! Subtitle layout and `drawtext` overlays.
//!
//! Cues are word-wrapped to 90% of the canvas width, placed vertically per
//! [`SubtitlePosition`], and handed to the encoder as one centered `drawtext`
//! filter per line.

use std::path::Path;

use reelsmith_common::ReelResult;
use reelsmith_project_model::{FrameSize, SubtitleCue, SubtitlePosition, SubtitleStyle};

use crate::filters::{escape_filter_path, ffmpeg_color};
use crate::text::TextMeasure;

/// Share of the canvas width text may occupy.
pub const MAX_WIDTH_RATIO: f64 = 0.9;

/// Distance kept from the canvas edges in custom placement, in pixels.
pub const CUSTOM_MARGIN: f64 = 10.0;

/// A positioned subtitle, active during `[start, end)`.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayElement {
    pub lines: Vec<String>,
    pub start: f64,
    pub end: f64,

    /// Top of the text block, in pixels.
    pub y: f64,

    /// Height of the text block, in pixels.
    pub height: f64,
}

impl OverlayElement {
    pub fn is_active_at(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }
}

/// Greedy word wrap to `max_width`.
///
/// Text that already fits stays on one line. If any single word is wider
/// than `max_width`, the whole text is wrapped per character instead.
pub fn wrap_text(text: &str, max_width: f64, measure: &dyn TextMeasure) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if measure.line_width(text) <= max_width {
        return vec![text.to_string()];
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.iter().any(|word| measure.line_width(word) > max_width) {
        return wrap_chars(text, max_width, measure);
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    for word in words {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if measure.line_width(&candidate) <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn wrap_chars(text: &str, max_width: f64, measure: &dyn TextMeasure) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if measure.line_width(&current) > max_width && current.chars().count() > 1 {
            current.pop();
            let line = current.trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
            current = c.to_string();
        }
    }
    let last = current.trim();
    if !last.is_empty() {
        lines.push(last.to_string());
    }
    lines
}

/// Top of a text block of height `block_height` on a canvas of `canvas_height`.
pub fn vertical_position(style: &SubtitleStyle, canvas_height: f64, block_height: f64) -> f64 {
    match style.position {
        SubtitlePosition::Bottom => canvas_height * 0.95 - block_height,
        SubtitlePosition::Top => canvas_height * 0.05,
        SubtitlePosition::Center => (canvas_height - block_height) / 2.0,
        SubtitlePosition::Custom => {
            let free = canvas_height - block_height;
            let y = free * style.custom_position / 100.0;
            // Keep the lower bound when the block barely fits.
            y.min(free - CUSTOM_MARGIN).max(CUSTOM_MARGIN)
        }
    }
}

/// Lay out every cue on `canvas`.
pub fn layout_cues(
    cues: &[SubtitleCue],
    canvas: FrameSize,
    style: &SubtitleStyle,
    measure: &dyn TextMeasure,
) -> Vec<OverlayElement> {
    let max_width = canvas.width as f64 * MAX_WIDTH_RATIO;
    cues.iter()
        .filter_map(|cue| {
            let lines = wrap_text(&cue.text, max_width, measure);
            if lines.is_empty() || cue.end_time <= cue.start_time {
                return None;
            }
            let height = lines.len() as f64 * measure.line_height();
            Some(OverlayElement {
                y: vertical_position(style, canvas.height as f64, height),
                height,
                lines,
                start: cue.start_time,
                end: cue.end_time,
            })
        })
        .collect()
}

/// One `drawtext` filter per line of every element.
///
/// Line text goes into files under `text_dir`, so captions never need escaping.
pub fn drawtext_filters(
    elements: &[OverlayElement],
    style: &SubtitleStyle,
    line_height: f64,
    text_dir: &Path,
) -> ReelResult<Vec<String>> {
    std::fs::create_dir_all(text_dir)?;

    let font = style
        .font_path
        .as_deref()
        .map(|path| format!("fontfile={}:", escape_filter_path(path)))
        .unwrap_or_default();
    let box_opts = style
        .background_color
        .as_deref()
        .map(|color| format!(":box=1:boxcolor={}:boxborderw=8", ffmpeg_color(color)))
        .unwrap_or_default();

    let mut filters = Vec::new();
    for (index, element) in elements.iter().enumerate() {
        for (line_index, line) in element.lines.iter().enumerate() {
            let text_file = text_dir.join(format!("cue-{index:04}-{line_index:02}.txt"));
            std::fs::write(&text_file, line)?;

            let y = element.y + line_index as f64 * line_height;
            filters.push(format!(
                "drawtext={font}textfile={}:fontsize={}:fontcolor={}:borderw={:.1}:bordercolor={}\
                 :x=(w-text_w)/2:y={y:.0}{box_opts}:enable='gte(t,{:.3})*lt(t,{:.3})'",
                escape_filter_path(&text_file),
                style.font_size,
                ffmpeg_color(&style.fore_color),
                style.stroke_width,
                ffmpeg_color(&style.stroke_color),
                element.start,
                element.end,
            ));
        }
    }
    Ok(filters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::FixedAdvanceMeasure;

    /// 30 px per character, 72 px lines.
    fn measure() -> FixedAdvanceMeasure {
        FixedAdvanceMeasure {
            advance: 30.0,
            line_height: 72.0,
        }
    }

    const LONG_CAPTION: &str = "the quick brown fox jumps over the lazy dog while the \
                                narrator keeps talking about nothing in particular";

    #[test]
    fn test_long_caption_wraps_within_width() {
        let max_width = 1080.0 * MAX_WIDTH_RATIO;
        let lines = wrap_text(LONG_CAPTION, max_width, &measure());

        assert!(lines.len() >= 2);
        for line in &lines {
            assert!(measure().line_width(line) <= 972.0, "{line:?} too wide");
        }
        assert_eq!(lines.join(" "), LONG_CAPTION);
    }

    #[test]
    fn test_wrap_is_idempotent() {
        let max_width = 600.0;
        let lines = wrap_text(LONG_CAPTION, max_width, &measure());
        assert_eq!(wrap_text(&lines.join(" "), max_width, &measure()), lines);
        for line in &lines {
            assert_eq!(wrap_text(line, max_width, &measure()), vec![line.clone()]);
        }
    }

    #[test]
    fn test_overlong_word_wraps_by_character() {
        let lines = wrap_text("supercalifragilistic ok", 300.0, &measure());
        assert_eq!(lines, vec!["supercalif", "ragilistic", "ok"]);
    }

    #[test]
    fn test_short_text_single_line() {
        assert_eq!(wrap_text("  hi there ", 900.0, &measure()), vec!["hi there"]);
        assert!(wrap_text("   ", 900.0, &measure()).is_empty());
    }

    #[test]
    fn test_vertical_positions() {
        let mut style = SubtitleStyle::default();
        style.position = SubtitlePosition::Bottom;
        assert_eq!(vertical_position(&style, 1920.0, 144.0), 1824.0 - 144.0);
        style.position = SubtitlePosition::Top;
        assert_eq!(vertical_position(&style, 1920.0, 144.0), 96.0);
        style.position = SubtitlePosition::Center;
        assert_eq!(vertical_position(&style, 1920.0, 144.0), 888.0);

        style.position = SubtitlePosition::Custom;
        style.custom_position = 50.0;
        assert_eq!(vertical_position(&style, 1920.0, 144.0), 888.0);
        style.custom_position = 100.0;
        assert_eq!(vertical_position(&style, 1920.0, 144.0), 1920.0 - 144.0 - 10.0);
        style.custom_position = 0.0;
        assert_eq!(vertical_position(&style, 1920.0, 144.0), 10.0);
    }

    #[test]
    fn test_layout_cues() {
        let cues = vec![
            SubtitleCue::new(0.0, 2.0, "short"),
            SubtitleCue::new(2.0, 5.5, LONG_CAPTION),
        ];
        let elements = layout_cues(
            &cues,
            FrameSize::new(1080, 1920),
            &SubtitleStyle::default(),
            &measure(),
        );

        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].lines, vec!["short"]);
        assert_eq!(elements[0].height, 72.0);
        assert!(elements[1].lines.len() >= 2);
        assert_eq!(elements[1].y + elements[1].height, 1920.0 * 0.95);
        assert!(elements[1].is_active_at(2.0));
        assert!(!elements[1].is_active_at(5.5));
    }

    #[test]
    fn test_drawtext_writes_text_files() {
        let dir = tempfile::tempdir().unwrap();
        let element = OverlayElement {
            lines: vec!["it's: here".to_string(), "second".to_string()],
            start: 1.0,
            end: 3.25,
            y: 1700.0,
            height: 144.0,
        };
        let mut style = SubtitleStyle::default();
        style.background_color = Some("#000000".to_string());

        let filters = drawtext_filters(&[element], &style, 72.0, dir.path()).unwrap();
        assert_eq!(filters.len(), 2);
        assert!(filters[0].contains("enable='gte(t,1.000)*lt(t,3.250)'"));
        assert!(filters[0].contains(":y=1700"));
        assert!(filters[1].contains(":y=1772"));
        assert!(filters[0].contains("fontcolor=0xFFFFFF"));
        assert!(filters[0].contains("box=1:boxcolor=0x000000"));

        let written = std::fs::read_to_string(dir.path().join("cue-0000-00.txt")).unwrap();
        assert_eq!(written, "it's: here");
    }
}
