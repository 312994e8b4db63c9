//! Text measurement used by the paginator.

use unicode_segmentation::UnicodeSegmentation;

/// Font parameters for one measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    /// Font size in device pixels.
    pub font_size: f32,
    /// Line height as a multiple of the font size.
    pub line_height: f32,
}

impl TextStyle {
    /// Height of one line in device pixels.
    pub fn line_px(&self) -> f32 {
        self.font_size * self.line_height
    }
}

/// Laid-out text: total height and the byte range of every line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurement {
    pub height: f32,
    /// Contiguous `(start, end)` byte ranges covering the whole text.
    pub line_breaks: Vec<(usize, usize)>,
}

impl Measurement {
    pub fn line_count(&self) -> usize {
        self.line_breaks.len()
    }
}

/// Line-breaking collaborator. Must return identical output for identical input.
pub trait TextMetrics: Send + Sync {
    fn measure(&self, text: &str, width: f32, style: &TextStyle) -> Measurement;
}

/// Fixed advance per grapheme with greedy breaking at word boundaries.
/// Whitespace hangs past the line end, newlines force a break and words
/// longer than a line are broken between graphemes.
#[derive(Debug, Clone, Copy)]
pub struct MonospaceMetrics {
    /// Glyph advance as a fraction of the font size.
    pub advance_ratio: f32,
}

impl Default for MonospaceMetrics {
    fn default() -> Self {
        Self { advance_ratio: 0.5 }
    }
}

impl MonospaceMetrics {
    /// Graphemes that fit on one line of `width` pixels (at least one).
    pub fn columns(&self, width: f32, style: &TextStyle) -> usize {
        let advance = style.font_size * self.advance_ratio;
        if advance <= 0.0 || !advance.is_finite() {
            return usize::MAX;
        }
        ((width / advance).floor() as usize).max(1)
    }
}

impl TextMetrics for MonospaceMetrics {
    fn measure(&self, text: &str, width: f32, style: &TextStyle) -> Measurement {
        let line_breaks = wrap(text, self.columns(width, style));
        Measurement {
            height: line_breaks.len() as f32 * style.line_px(),
            line_breaks,
        }
    }
}

fn wrap(text: &str, max_cols: usize) -> Vec<(usize, usize)> {
    let mut breaks = Vec::new();
    let mut line_start = 0;
    let mut col = 0;

    for (idx, seg) in text.split_word_bound_indices() {
        if matches!(seg, "\n" | "\r\n" | "\r") {
            breaks.push((line_start, idx + seg.len()));
            line_start = idx + seg.len();
            col = 0;
            continue;
        }

        let width = seg.graphemes(true).count();
        if seg.chars().all(char::is_whitespace) {
            col += width;
            continue;
        }
        if col + width <= max_cols {
            col += width;
            continue;
        }

        if col > 0 {
            breaks.push((line_start, idx));
            line_start = idx;
            col = 0;
        }
        if width <= max_cols {
            col = width;
            continue;
        }

        for (offset, _) in seg.grapheme_indices(true) {
            if col == max_cols {
                breaks.push((line_start, idx + offset));
                line_start = idx + offset;
                col = 0;
            }
            col += 1;
        }
    }

    if line_start < text.len() {
        breaks.push((line_start, text.len()));
    }
    breaks
}
