//! Per-chapter block extraction, title attachment, and the bounded worker pool.

use std::sync::{Mutex, PoisonError};

use crate::cancel::CancelToken;
use crate::document::{Block, Chapter};
use crate::error::ParseError;
use crate::markup::{ImageIndex, MarkupParser};
use crate::toc::TitleMap;

pub const DEFAULT_MAX_WORKERS: usize = 3;

/// Longest title synthesised from chapter text, in chars.
const MAX_SYNTHESIZED_TITLE: usize = 80;

/// One chapter's markup, read from the archive ahead of extraction.
#[derive(Debug, Clone)]
pub struct ChapterSource {
    /// Position in reading order.
    pub index: usize,
    pub entry: String,
    pub markup: String,
}

/// Read-only state shared by all extraction workers.
pub struct ExtractContext<'a> {
    pub titles: Option<&'a TitleMap>,
    pub images: &'a ImageIndex,
    pub parser: &'a dyn MarkupParser,
    pub max_workers: usize,
}

fn normalize_title(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Give a chapter's blocks exactly one leading `Chapter` marker.
///
/// A title from the table of contents wins; a leading text block repeating
/// it is dropped. Without one the title comes from the first line of the first
/// visible text block, which stays in place. Returns `None` when the result
/// would have no text.
pub fn attach_title(
    mut blocks: Vec<Block>,
    source: &str,
    titles: Option<&TitleMap>,
) -> Option<Vec<Block>> {
    blocks.retain(|b| !matches!(b, Block::Chapter(_)));
    let first_text = blocks
        .iter()
        .position(|b| b.as_text().is_some_and(|t| t.has_visible_text()));

    let chapter = match titles.and_then(|map| map.get(source)) {
        Some(chapter) => {
            let wanted = normalize_title(&chapter.title);
            if let Some(i) = first_text {
                let duplicate = blocks[i]
                    .as_text()
                    .is_some_and(|t| normalize_title(&t.text) == wanted);
                if duplicate {
                    blocks.remove(i);
                }
            }
            chapter.clone()
        }
        None => {
            let i = first_text?;
            let first_line = blocks[i]
                .as_text()?
                .text
                .lines()
                .find(|l| !l.trim().is_empty())?;
            let title: String = first_line
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .chars()
                .take(MAX_SYNTHESIZED_TITLE)
                .collect();
            Chapter {
                title: title.trim_end().to_string(),
                nested: false,
            }
        }
    };

    blocks.insert(0, Block::Chapter(chapter));
    let has_text = blocks.iter().any(|b| matches!(b, Block::Text(_)));
    has_text.then_some(blocks)
}

/// Parse one chapter and attach its title. `None` means the chapter is dropped.
pub fn extract_chapter(chapter: &ChapterSource, ctx: &ExtractContext<'_>) -> Option<Vec<Block>> {
    let blocks = ctx
        .parser
        .extract_blocks(&chapter.markup, &chapter.entry, ctx.images);
    tracing::debug!("{}: {} raw blocks", chapter.entry, blocks.len());

    let attached = attach_title(blocks, &chapter.entry, ctx.titles);
    if attached.is_none() {
        tracing::warn!("Discarding chapter {} with no readable text", chapter.entry);
    }
    attached
}

/// Extract all chapters on a pool of `ctx.max_workers` threads and concatenate
/// the results in reading order.
pub fn extract_chapters(
    chapters: Vec<ChapterSource>,
    ctx: &ExtractContext<'_>,
    cancel: &CancelToken,
) -> Result<Vec<Block>, ParseError> {
    cancel.check()?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ctx.max_workers.max(1))
        .thread_name(|i| format!("folio-extract-{i}"))
        .build()
        .map_err(|e| ParseError::Worker(e.to_string()))?;

    let results: Mutex<Vec<(usize, Option<Vec<Block>>)>> =
        Mutex::new(Vec::with_capacity(chapters.len()));

    pool.scope(|scope| {
        for chapter in &chapters {
            let results = &results;
            scope.spawn(move |_| {
                if cancel.is_cancelled() {
                    return;
                }
                let blocks = extract_chapter(chapter, ctx);
                results
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push((chapter.index, blocks));
            });
        }
    });
    cancel.check()?;

    let mut results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
    results.sort_by_key(|(index, _)| *index);

    let kept = results.iter().filter(|(_, b)| b.is_some()).count();
    tracing::info!("Extracted {}/{} chapters", kept, chapters.len());

    Ok(results
        .into_iter()
        .filter_map(|(_, blocks)| blocks)
        .flatten()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{TextBlock, TextRole};
    use crate::markup::HtmlBlockParser;
    use pretty_assertions::assert_eq;

    fn heading(text: &str) -> Block {
        Block::Text(TextBlock::new(text, TextRole::Heading(1)))
    }

    fn para(text: &str) -> Block {
        Block::Text(TextBlock::paragraph(text))
    }

    fn chapter(title: &str, nested: bool) -> Block {
        Block::Chapter(Chapter {
            title: title.into(),
            nested,
        })
    }

    fn toc(entries: &[(&str, &str)]) -> TitleMap {
        let mut map = TitleMap::default();
        for (source, title) in entries {
            map.insert(source, title, false);
        }
        map
    }

    #[test]
    fn test_toc_title_drops_duplicate_heading() {
        let map = toc(&[("ch1.xhtml", "The  Beginning")]);
        let blocks = vec![heading("THE BEGINNING"), para("Once upon a time.")];
        let out = attach_title(blocks, "OEBPS/ch1.xhtml", Some(&map)).unwrap();
        assert_eq!(out, vec![chapter("The  Beginning", false), para("Once upon a time.")]);
    }

    #[test]
    fn test_toc_title_keeps_distinct_text() {
        let map = toc(&[("ch1.xhtml", "One")]);
        let blocks = vec![para("Something else.")];
        let out = attach_title(blocks, "ch1.xhtml", Some(&map)).unwrap();
        assert_eq!(out, vec![chapter("One", false), para("Something else.")]);
    }

    #[test]
    fn test_synthesized_title_keeps_heading() {
        let blocks = vec![para("   "), heading("Prologue"), para("Body.")];
        let out = attach_title(blocks, "x.xhtml", None).unwrap();
        assert_eq!(
            out,
            vec![chapter("Prologue", false), para("   "), heading("Prologue"), para("Body.")]
        );
    }

    #[test]
    fn test_heading_only_divider_survives_without_toc() {
        let out = attach_title(vec![heading("Part Two")], "part2.xhtml", None).unwrap();
        assert_eq!(out, vec![chapter("Part Two", false), heading("Part Two")]);
    }

    #[test]
    fn test_synthesized_title_keeps_paragraph() {
        let blocks = vec![para("It was a dark night.\nThe rain fell.")];
        let out = attach_title(blocks, "x.xhtml", None).unwrap();
        assert_eq!(
            out,
            vec![
                chapter("It was a dark night.", false),
                para("It was a dark night.\nThe rain fell."),
            ]
        );
    }

    #[test]
    fn test_chapter_without_text_is_discarded() {
        assert_eq!(attach_title(vec![], "x.xhtml", None), None);
        assert_eq!(attach_title(vec![Block::Separator], "x.xhtml", None), None);

        let map = toc(&[("x.xhtml", "Only heading")]);
        assert_eq!(attach_title(vec![heading("Only heading")], "x.xhtml", Some(&map)), None);
    }

    #[test]
    fn test_existing_markers_are_replaced() {
        let blocks = vec![chapter("stray", true), heading("Real"), para("text")];
        let out = attach_title(blocks, "x.xhtml", None).unwrap();
        assert_eq!(out, vec![chapter("Real", false), heading("Real"), para("text")]);
    }

    #[test]
    fn test_extract_chapters_preserves_order() {
        let chapters: Vec<ChapterSource> = (0..12)
            .rev()
            .map(|i| ChapterSource {
                index: i,
                entry: format!("ch{i}.xhtml"),
                markup: format!("<h1>Chapter {i}</h1><p>Text {i}</p>"),
            })
            .collect();
        let images = ImageIndex::default();
        let ctx = ExtractContext {
            titles: None,
            images: &images,
            parser: &HtmlBlockParser,
            max_workers: 3,
        };

        let first = extract_chapters(chapters.clone(), &ctx, &CancelToken::new()).unwrap();
        for _ in 0..5 {
            let again = extract_chapters(chapters.clone(), &ctx, &CancelToken::new()).unwrap();
            assert_eq!(again, first);
        }

        let titles: Vec<&str> = first
            .iter()
            .filter_map(|b| match b {
                Block::Chapter(c) => Some(c.title.as_str()),
                _ => None,
            })
            .collect();
        let expected: Vec<String> = (0..12).map(|i| format!("Chapter {i}")).collect();
        assert_eq!(titles, expected);
    }

    /// Sleeps longer for earlier chapters so they finish last.
    struct SlowFirst {
        chapters: usize,
        finished: Mutex<Vec<usize>>,
    }

    impl MarkupParser for SlowFirst {
        fn extract_blocks(
            &self,
            markup: &str,
            chapter_path: &str,
            images: &ImageIndex,
        ) -> Vec<Block> {
            let index: usize = chapter_path
                .trim_start_matches("ch")
                .trim_end_matches(".xhtml")
                .parse()
                .unwrap();
            let delay = (self.chapters - index) as u64 * 15;
            std::thread::sleep(std::time::Duration::from_millis(delay));
            self.finished.lock().unwrap().push(index);
            HtmlBlockParser.extract_blocks(markup, chapter_path, images)
        }
    }

    #[test]
    fn test_extract_chapters_reorders_late_finishers() {
        let chapters: Vec<ChapterSource> = (0..8)
            .map(|i| ChapterSource {
                index: i,
                entry: format!("ch{i}.xhtml"),
                markup: format!("<h1>Chapter {i}</h1><p>Text {i}</p>"),
            })
            .collect();
        let parser = SlowFirst {
            chapters: chapters.len(),
            finished: Mutex::new(Vec::new()),
        };
        let images = ImageIndex::default();
        let ctx = ExtractContext {
            titles: None,
            images: &images,
            parser: &parser,
            max_workers: 3,
        };

        let blocks = extract_chapters(chapters, &ctx, &CancelToken::new()).unwrap();

        let finished = parser.finished.into_inner().unwrap();
        let in_order: Vec<usize> = (0..8).collect();
        assert_ne!(finished, in_order, "chapters completed in index order");

        let titles: Vec<&str> = blocks
            .iter()
            .filter_map(|b| match b {
                Block::Chapter(c) => Some(c.title.as_str()),
                _ => None,
            })
            .collect();
        let expected: Vec<String> = (0..8).map(|i| format!("Chapter {i}")).collect();
        assert_eq!(titles, expected);
    }

    #[test]
    fn test_empty_chapter_contributes_nothing() {
        let chapters = vec![
            ChapterSource {
                index: 0,
                entry: "a.xhtml".into(),
                markup: "<p>Alpha</p>".into(),
            },
            ChapterSource {
                index: 1,
                entry: "b.xhtml".into(),
                markup: "<html><body>   </body></html>".into(),
            },
        ];
        let images = ImageIndex::default();
        let ctx = ExtractContext {
            titles: None,
            images: &images,
            parser: &HtmlBlockParser,
            max_workers: 2,
        };
        let blocks = extract_chapters(chapters, &ctx, &CancelToken::new()).unwrap();
        assert_eq!(blocks, vec![chapter("Alpha", false), para("Alpha")]);
    }

    #[test]
    fn test_cancelled_before_start() {
        let images = ImageIndex::default();
        let ctx = ExtractContext {
            titles: None,
            images: &images,
            parser: &HtmlBlockParser,
            max_workers: 1,
        };
        let token = CancelToken::new();
        token.cancel();
        let err = extract_chapters(Vec::new(), &ctx, &token).unwrap_err();
        assert!(matches!(err, ParseError::Cancelled(_)));
    }
}
