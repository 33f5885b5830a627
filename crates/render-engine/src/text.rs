//! Text measurement for subtitle layout.

use std::path::Path;

use reelsmith_common::{ReelError, ReelResult};
use rusttype::{point, Font, Scale};

/// Rendered size of text at a fixed font and size.
pub trait TextMeasure: Send + Sync {
    /// Advance width of `text` on one line, in pixels.
    fn line_width(&self, text: &str) -> f64;

    /// Height of one line, in pixels.
    fn line_height(&self) -> f64;
}

/// Metrics from a TrueType/OpenType font file.
pub struct FontMeasure {
    font: Font<'static>,
    scale: Scale,
}

impl FontMeasure {
    pub fn from_file(path: &Path, font_size: u32) -> ReelResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            ReelError::config(format!("cannot read font {}: {e}", path.display()))
        })?;
        Self::from_bytes(bytes, font_size)
            .map_err(|e| ReelError::config(format!("{}: {e}", path.display())))
    }

    pub fn from_bytes(bytes: Vec<u8>, font_size: u32) -> ReelResult<Self> {
        let font = Font::try_from_vec(bytes)
            .ok_or_else(|| ReelError::config("unsupported or corrupt font data"))?;
        Ok(Self {
            font,
            scale: Scale::uniform(font_size as f32),
        })
    }
}

impl TextMeasure for FontMeasure {
    fn line_width(&self, text: &str) -> f64 {
        self.font
            .layout(text.trim(), self.scale, point(0.0, 0.0))
            .last()
            .map(|glyph| glyph.position().x + glyph.unpositioned().h_metrics().advance_width)
            .unwrap_or(0.0) as f64
    }

    fn line_height(&self) -> f64 {
        let v = self.font.v_metrics(self.scale);
        (v.ascent - v.descent + v.line_gap) as f64
    }
}

/// Every character advances by the same amount.
///
/// Used when no font file is available; deterministic, so also handy in tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedAdvanceMeasure {
    pub advance: f64,
    pub line_height: f64,
}

impl FixedAdvanceMeasure {
    /// Rough proportions of a sans-serif face at `font_size`.
    pub fn for_font_size(font_size: u32) -> Self {
        let size = font_size as f64;
        Self {
            advance: size * 0.55,
            line_height: size * 1.2,
        }
    }
}

impl TextMeasure for FixedAdvanceMeasure {
    fn line_width(&self, text: &str) -> f64 {
        text.trim().chars().count() as f64 * self.advance
    }

    fn line_height(&self) -> f64 {
        self.line_height
    }
}

/// Font measure for `font_path`, falling back to fixed advances.
pub fn measure_for(font_path: Option<&Path>, font_size: u32) -> Box<dyn TextMeasure> {
    match font_path {
        Some(path) => match FontMeasure::from_file(path, font_size) {
            Ok(measure) => Box::new(measure),
            Err(e) => {
                tracing::warn!(error = %e, "Falling back to fixed-advance text metrics");
                Box::new(FixedAdvanceMeasure::for_font_size(font_size))
            }
        },
        None => Box::new(FixedAdvanceMeasure::for_font_size(font_size)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_advance_ignores_outer_whitespace() {
        let measure = FixedAdvanceMeasure {
            advance: 10.0,
            line_height: 20.0,
        };
        assert_eq!(measure.line_width(" abc "), 30.0);
        assert_eq!(measure.line_height(), 20.0);
    }

    #[test]
    fn test_bad_font_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ttf");
        std::fs::write(&path, b"not a font").unwrap();

        assert!(FontMeasure::from_file(&path, 60).is_err());
        let measure = measure_for(Some(&path), 60);
        assert!((measure.line_width("ab") - 66.0).abs() < 1e-9);
    }
}
