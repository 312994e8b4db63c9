//! EPUB reader: ZIP → diagnostics → OPF spine → chapter blocks.
//! Supports both EPUB2 (NCX navigation) and EPUB3 (NAV document) titles.

use std::sync::Arc;

use crate::archive::Archive;
use crate::cancel::CancelToken;
use crate::diagnostics;
use crate::document::{Block, Document, EmptyReason, ParseOutcome};
use crate::error::ParseError;
use crate::extract::{self, ChapterSource, ExtractContext};
use crate::markup::{HtmlBlockParser, ImageIndex, MarkupParser};
use crate::package;
use crate::progress::{emit_progress, ParsePhase, ProgressHandler};
use crate::readers::{DiagnosticsPolicy, ParseOptions};
use crate::source::BookSource;
use crate::toc;

/// Parse a book with the default HTML parser.
pub fn parse_book(
    source: &dyn BookSource,
    opts: &ParseOptions,
    cancel: &CancelToken,
    progress: Option<&dyn ProgressHandler>,
) -> Result<ParseOutcome, ParseError> {
    parse_book_with(source, opts, &HtmlBlockParser, cancel, progress)
}

/// Parse a book into blocks. An unusable-but-readable book is
/// `Ok(ParseOutcome::Empty)`; only I/O, archive and cancellation failures are errors.
pub fn parse_book_with(
    source: &dyn BookSource,
    opts: &ParseOptions,
    parser: &dyn MarkupParser,
    cancel: &CancelToken,
    progress: Option<&dyn ProgressHandler>,
) -> Result<ParseOutcome, ParseError> {
    ParsePhase::Idle.emit(progress);
    let mut archive = Archive::from_source(source, &opts.archive)?;
    ParsePhase::ContainerOpened.emit(progress);
    cancel.check()?;

    let diagnosis = diagnostics::diagnose(&archive, &opts.limits);
    if diagnosis.valid {
        ParsePhase::DiagnosticsPassed.emit(progress);
    } else {
        let codes: Vec<&str> = diagnosis.issues.iter().map(|i| i.kind.code()).collect();
        match opts.diagnostics_policy {
            DiagnosticsPolicy::Strict => {
                tracing::warn!(
                    "{}: rejected by diagnostics: {}",
                    source.display_name(),
                    codes.join(", ")
                );
                return Err(ParseError::Diagnostics {
                    count: diagnosis.issues.len(),
                });
            }
            DiagnosticsPolicy::BestEffort => {
                tracing::warn!(
                    "{}: diagnostics reported {}, continuing best-effort",
                    source.display_name(),
                    codes.join(", ")
                );
                ParsePhase::DiagnosticsFailed.emit(progress);
            }
        }
    }
    cancel.check()?;

    let package = package::load_package(&mut archive).unwrap_or_else(|e| {
        tracing::warn!("{}: package document unusable: {}", source.display_name(), e);
        None
    });
    let order = match package::resolve_with_package(archive.entries(), package.as_ref()) {
        Ok(order) => order,
        Err(ParseError::NoChapters) => {
            tracing::warn!("{}: no chapters found", source.display_name());
            ParsePhase::Done.emit(progress);
            return Ok(ParseOutcome::Empty(EmptyReason::NoChapters));
        }
        Err(e) => return Err(e),
    };
    ParsePhase::ChaptersResolved.emit(progress);
    cancel.check()?;

    let titles = if opts.use_toc {
        let nav = toc::load_navigation(&mut archive, package.as_ref());
        toc::build_title_map(nav.as_ref())
    } else {
        None
    };
    if titles.is_none() {
        tracing::info!("{}: no navigation document, titles come from text", source.display_name());
    }
    let images = ImageIndex::from_entries(archive.entries());

    // Archive reads stay on this thread; only parsing fans out.
    let total = order.entries.len() as u64;
    let mut chapters = Vec::with_capacity(order.entries.len());
    for (index, entry) in order.entries.iter().enumerate() {
        cancel.check()?;
        match archive.read_entry_string(&entry.name) {
            Ok(markup) => chapters.push(ChapterSource {
                index,
                entry: entry.name.clone(),
                markup,
            }),
            Err(e) => tracing::warn!("Skipping chapter {}: {}", entry.name, e),
        }
        emit_progress(
            progress,
            "Reading chapters",
            index as u64 + 1,
            Some(total),
            Some(&entry.name),
        );
    }

    let ctx = ExtractContext {
        titles: titles.as_ref(),
        images: &images,
        parser,
        max_workers: opts.max_workers,
    };
    let blocks = extract::extract_chapters(chapters, &ctx, cancel)?;
    ParsePhase::ChaptersExtracted.emit(progress);

    let chapter_count = blocks
        .iter()
        .filter(|b| matches!(b, Block::Chapter(_)))
        .count();
    let has_text = blocks.iter().any(|b| matches!(b, Block::Text(_)));
    if chapter_count == 0 || !has_text {
        tracing::warn!("{}: no readable content", source.display_name());
        ParsePhase::Done.emit(progress);
        return Ok(ParseOutcome::Empty(EmptyReason::NoValidBlocks));
    }
    ParsePhase::Validated.emit(progress);

    let document = Document {
        blocks,
        chapter_count,
        order_source: order.source,
        recovered: archive.recovered(),
        diagnosis,
    };
    tracing::info!(
        "{}: parsed {} chapters, {} blocks",
        source.display_name(),
        document.chapter_count,
        document.blocks.len()
    );
    ParsePhase::Done.emit(progress);
    Ok(ParseOutcome::Parsed(document))
}

/// Run [`parse_book`] on tokio's blocking pool. Dropping the returned future
/// cancels the parse at its next checkpoint.
pub async fn parse_book_async(
    source: Arc<dyn BookSource>,
    opts: ParseOptions,
    cancel: CancelToken,
) -> Result<ParseOutcome, ParseError> {
    let guard = cancel.drop_guard();
    let token = cancel.clone();
    let handle =
        tokio::task::spawn_blocking(move || parse_book(source.as_ref(), &opts, &token, None));
    let result = handle
        .await
        .map_err(|e| ParseError::Worker(e.to_string()))?;
    guard.disarm();
    result
}
