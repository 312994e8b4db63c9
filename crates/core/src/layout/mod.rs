//! Pagination: packs a block stream into viewport-sized pages.

pub mod metrics;
pub mod paginate;
pub mod session;

use serde::{Deserialize, Serialize};

pub use metrics::{Measurement, MonospaceMetrics, TextMetrics, TextStyle};
pub use paginate::{compute_pages, compute_pages_cancellable};
pub use session::{paginate_or_scroll, PaginationSession, Presentation};

/// Drawable area in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Typography {
    pub font_size: f32,
    /// Multiple of `font_size`.
    pub line_height: f32,
    /// First-line paragraph indent in pixels.
    pub indent: f32,
    pub horizontal_padding: f32,
    pub vertical_padding: f32,
    /// Gap between consecutive blocks on a page.
    pub block_spacing: f32,
    /// Heading and chapter title size as a multiple of `font_size`.
    pub heading_scale: f32,
}

impl Default for Typography {
    fn default() -> Self {
        Self {
            font_size: 16.0,
            line_height: 1.4,
            indent: 24.0,
            horizontal_padding: 16.0,
            vertical_padding: 24.0,
            block_spacing: 8.0,
            heading_scale: 1.4,
        }
    }
}

impl Typography {
    pub fn body_style(&self) -> TextStyle {
        TextStyle {
            font_size: self.font_size,
            line_height: self.line_height,
        }
    }

    pub fn heading_style(&self) -> TextStyle {
        TextStyle {
            font_size: self.font_size * self.heading_scale,
            line_height: self.line_height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationOptions {
    /// Pages past this count are dropped.
    pub max_pages: usize,
    /// Extra height added below chapter and separator markers.
    pub marker_margin: f32,
    /// Placeholder height for image blocks, clamped to the page.
    pub image_height: f32,
    /// Synthetic spaces per em of indent when measuring a paragraph's first line.
    pub spaces_per_em: f32,
}

pub const DEFAULT_MAX_PAGES: usize = 100;
pub const SPACES_PER_EM: f32 = 4.0;

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            marker_margin: 24.0,
            image_height: 240.0,
            spaces_per_em: SPACES_PER_EM,
        }
    }
}
