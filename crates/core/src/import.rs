//! Book import: parse once to prove the book is readable, then collect the
//! metadata a library record is built from.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::archive::Archive;
use crate::cancel::CancelToken;
use crate::config::{metadata_options_from_config, parse_options_from_config, AppConfig};
use crate::cover::RasterDecoder;
use crate::document::BookMetadata;
use crate::error::{EbookError, ImportError, ParseError};
use crate::metadata::extract_metadata;
use crate::progress::ProgressHandler;
use crate::readers::epub::parse_book;
use crate::source::BookSource;
use crate::stats::DocumentStats;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportedBook {
    pub metadata: BookMetadata,
    pub stats: DocumentStats,
}

/// Import one book. Every failure collapses into [`ImportError::CouldNotAdd`];
/// the cause is logged and kept as the error source.
pub fn import_book(
    source: &dyn BookSource,
    cfg: &AppConfig,
    cancel: &CancelToken,
    progress: Option<&dyn ProgressHandler>,
) -> Result<ImportedBook, ImportError> {
    let path = source.logical_path();
    import_inner(source, cfg, cancel, progress).map_err(|e| {
        tracing::warn!("Could not import {}: {}", path, e);
        ImportError::could_not_add(path, e)
    })
}

fn import_inner(
    source: &dyn BookSource,
    cfg: &AppConfig,
    cancel: &CancelToken,
    progress: Option<&dyn ProgressHandler>,
) -> Result<ImportedBook, EbookError> {
    let parse_opts = parse_options_from_config(cfg);
    let document = parse_book(source, &parse_opts, cancel, progress)?.into_result()?;
    cancel.check().map_err(ParseError::from)?;

    let mut archive = Archive::from_source(source, &parse_opts.archive)?;
    let metadata = extract_metadata(
        &mut archive,
        source.logical_path(),
        &metadata_options_from_config(&cfg.metadata),
        &RasterDecoder,
    )?;

    tracing::info!(
        "Imported {} ({} chapters)",
        metadata.title,
        document.chapter_count
    );
    Ok(ImportedBook {
        metadata,
        stats: document.stats(),
    })
}

/// [`import_book`] on tokio's blocking pool. Dropping the future cancels the import.
pub async fn import_book_async(
    source: Arc<dyn BookSource>,
    cfg: AppConfig,
    cancel: CancelToken,
) -> Result<ImportedBook, ImportError> {
    let guard = cancel.drop_guard();
    let token = cancel.clone();
    let path = source.logical_path().to_string();
    let handle =
        tokio::task::spawn_blocking(move || import_book(source.as_ref(), &cfg, &token, None));
    let result = handle
        .await
        .map_err(|e| ImportError::could_not_add(&path, ParseError::Worker(e.to_string())))?;
    guard.disarm();
    result
}
