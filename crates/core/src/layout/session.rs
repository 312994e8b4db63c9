use std::sync::{Mutex, PoisonError};

use crate::cancel::CancelToken;
use crate::document::{Block, Page};
use crate::error::PaginationError;
use crate::layout::metrics::TextMetrics;
use crate::layout::paginate::compute_pages_cancellable;
use crate::layout::{PaginationOptions, Typography, Viewport};

/// Restartable pagination for one reading session. Starting a computation
/// cancels the one before it, so only the latest inputs produce pages.
#[derive(Debug, Default)]
pub struct PaginationSession {
    current: Mutex<CancelToken>,
}

impl PaginationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any running computation and hand out the token for the next one.
    pub fn begin(&self) -> CancelToken {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current.cancel();
        *current = CancelToken::new();
        current.clone()
    }

    pub fn cancel(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    pub fn paginate(
        &self,
        blocks: &[Block],
        viewport: Viewport,
        typography: &Typography,
        metrics: &dyn TextMetrics,
        opts: &PaginationOptions,
    ) -> Result<Vec<Page>, PaginationError> {
        let token = self.begin();
        compute_pages_cancellable(blocks, viewport, typography, metrics, opts, &token)
    }
}

/// How the reader shows a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Presentation {
    Paged(Vec<Page>),
    /// Unpaginated scrolling, used when pagination is unavailable.
    Continuous(Vec<Block>),
}

impl Presentation {
    pub fn is_paged(&self) -> bool {
        matches!(self, Presentation::Paged(_))
    }
}

/// Pages when pagination produced some, otherwise the raw blocks for scrolling.
pub fn paginate_or_scroll(
    blocks: &[Block],
    pages: Result<Vec<Page>, PaginationError>,
) -> Presentation {
    match pages {
        Ok(pages) if !pages.is_empty() => Presentation::Paged(pages),
        Ok(_) => {
            tracing::warn!("Pagination produced no pages, falling back to continuous scroll");
            Presentation::Continuous(blocks.to_vec())
        }
        Err(e) => {
            tracing::warn!("Pagination failed ({}), falling back to continuous scroll", e);
            Presentation::Continuous(blocks.to_vec())
        }
    }
}
