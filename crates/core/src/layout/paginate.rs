use unicode_segmentation::UnicodeSegmentation;

use crate::cancel::CancelToken;
use crate::document::{Block, Fragment, Page, TextBlock, TextRole};
use crate::error::PaginationError;
use crate::layout::metrics::{TextMetrics, TextStyle};
use crate::layout::{PaginationOptions, Typography, Viewport};

/// Float slack when comparing accumulated heights.
const EPSILON: f32 = 1e-3;

/// Lay `blocks` out into pages. Pure: identical inputs give identical pages.
/// An unusable viewport yields no pages.
pub fn compute_pages(
    blocks: &[Block],
    viewport: Viewport,
    typography: &Typography,
    metrics: &dyn TextMetrics,
    opts: &PaginationOptions,
) -> Vec<Page> {
    compute_pages_cancellable(blocks, viewport, typography, metrics, opts, &CancelToken::new())
        .unwrap_or_default()
}

/// [`compute_pages`] with a cancellation checkpoint before every block.
pub fn compute_pages_cancellable(
    blocks: &[Block],
    viewport: Viewport,
    typography: &Typography,
    metrics: &dyn TextMetrics,
    opts: &PaginationOptions,
    cancel: &CancelToken,
) -> Result<Vec<Page>, PaginationError> {
    let capacity = viewport.height - 2.0 * typography.vertical_padding;
    let width = viewport.width - 2.0 * typography.horizontal_padding;
    if !(capacity > 0.0 && width > 0.0 && capacity.is_finite() && width.is_finite()) {
        return Err(PaginationError::InvalidViewport {
            width: viewport.width,
            height: viewport.height,
        });
    }

    let mut layout = Layout {
        metrics,
        typography,
        opts,
        width,
        capacity,
        pages: Vec::new(),
        current: Vec::new(),
        height: 0.0,
        first_block: 0,
    };

    for (index, block) in blocks.iter().enumerate() {
        cancel.check()?;
        if layout.full() {
            tracing::debug!("Page limit {} reached at block {}", opts.max_pages, index);
            break;
        }
        match block {
            Block::Chapter(chapter) => {
                let title = metrics.measure(&chapter.title, width, &typography.heading_style());
                layout.place_marker(block, title.height + opts.marker_margin, index);
            }
            Block::Separator => {
                let line = typography.body_style().line_px();
                layout.place_marker(block, line + opts.marker_margin, index);
            }
            Block::Image(_) => {
                let height = opts.image_height.min(capacity);
                layout.place(block.clone(), height, index);
            }
            Block::Text(text) => layout.place_text(text, index),
        }
    }

    layout.close();
    Ok(layout.pages)
}

struct Layout<'a> {
    metrics: &'a dyn TextMetrics,
    typography: &'a Typography,
    opts: &'a PaginationOptions,
    width: f32,
    capacity: f32,
    pages: Vec<Page>,
    current: Vec<Block>,
    height: f32,
    first_block: usize,
}

impl Layout<'_> {
    fn full(&self) -> bool {
        self.pages.len() >= self.opts.max_pages
    }

    fn spacing(&self) -> f32 {
        if self.current.is_empty() {
            0.0
        } else {
            self.typography.block_spacing
        }
    }

    fn fits(&self, height: f32) -> bool {
        self.height + self.spacing() + height <= self.capacity + EPSILON
    }

    /// Emit the running page if it has content.
    fn close(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let blocks = std::mem::take(&mut self.current);
        let height = std::mem::replace(&mut self.height, 0.0);
        if self.full() {
            return;
        }
        self.pages.push(Page {
            index: self.pages.len(),
            first_block: self.first_block,
            blocks,
            height,
        });
    }

    fn push(&mut self, block: Block, height: f32, index: usize) {
        if self.current.is_empty() {
            self.first_block = index;
            self.height = height;
        } else {
            self.height += self.typography.block_spacing + height;
        }
        self.current.push(block);
    }

    fn place(&mut self, block: Block, height: f32, index: usize) {
        if !self.fits(height) {
            self.close();
        }
        self.push(block, height, index);
    }

    fn place_marker(&mut self, block: &Block, height: f32, index: usize) {
        self.close();
        if !self.full() {
            self.push(block.clone(), height.min(self.capacity), index);
        }
    }

    fn style_for(&self, role: TextRole) -> TextStyle {
        match role {
            TextRole::Heading(_) => self.typography.heading_style(),
            TextRole::Paragraph | TextRole::Preformatted | TextRole::Quote | TextRole::ListItem => {
                self.typography.body_style()
            }
        }
    }

    /// Synthetic leading spaces standing in for the first-line indent.
    fn indent_prefix(&self, block: &TextBlock) -> String {
        let indented =
            block.role == TextRole::Paragraph && block.fragment != Fragment::Continuation;
        if !indented || self.typography.indent <= 0.0 || self.typography.font_size <= 0.0 {
            return String::new();
        }
        let spaces =
            (self.typography.indent / self.typography.font_size * self.opts.spaces_per_em).round();
        " ".repeat(spaces.max(0.0) as usize)
    }

    fn place_text(&mut self, block: &TextBlock, index: usize) {
        let mut piece = block.clone();
        loop {
            let prefix = self.indent_prefix(&piece);
            let measured_text = format!("{prefix}{}", piece.text);
            let m = self
                .metrics
                .measure(&measured_text, self.width, &self.style_for(piece.role));

            if self.fits(m.height) {
                self.push(Block::Text(piece), m.height, index);
                return;
            }
            if m.height <= self.capacity {
                self.close();
                if !self.full() {
                    self.push(Block::Text(piece), m.height, index);
                }
                return;
            }

            // Taller than a whole page: keep the lines that fit here.
            let lines = m.line_breaks.len().max(1);
            let line_height = m.height / lines as f32;
            let remaining = self.capacity - self.height - self.spacing();
            let mut fit = 0;
            while fit < lines && (fit + 1) as f32 * line_height <= remaining + EPSILON {
                fit += 1;
            }
            if fit == 0 {
                if !self.current.is_empty() {
                    self.close();
                    if self.full() {
                        return;
                    }
                    continue;
                }
                fit = 1;
            }

            // Leading lines may hold nothing but the indent prefix.
            let split = m
                .line_breaks
                .iter()
                .enumerate()
                .skip(fit)
                .map(|(line, &(start, _))| (line, start.saturating_sub(prefix.len())))
                .find(|&(_, at)| {
                    at > 0 && at < piece.text.len() && piece.text.is_char_boundary(at)
                });
            let (offset, used) = match split {
                Some((line, at)) => (at, line),
                None => match piece
                    .text
                    .grapheme_indices(true)
                    .nth(1)
                    .map(|(at, _)| at)
                    .filter(|_| m.line_breaks.len() > 1)
                {
                    Some(at) => (at, fit),
                    None => {
                        let height = m.height.min(self.capacity);
                        self.push(Block::Text(piece), height, index);
                        return;
                    }
                },
            };
            if used > fit && !self.current.is_empty() {
                self.close();
                if self.full() {
                    return;
                }
                continue;
            }

            let (mut head, mut tail) = piece.split_at(offset);
            head.fragment = match piece.fragment {
                Fragment::Continuation => Fragment::Continuation,
                Fragment::Whole | Fragment::ParagraphStart => Fragment::ParagraphStart,
            };
            tail.fragment = Fragment::Continuation;

            let head_height = (used as f32 * line_height).min(self.capacity);
            self.push(Block::Text(head), head_height, index);
            self.close();
            if self.full() {
                return;
            }
            piece = tail;
        }
    }
}
