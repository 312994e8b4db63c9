use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnosis;
use crate::error::ParseError;

/// Metadata for one file inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub size: u64,
}

/// A chapter heading resolved from the table of contents or the text itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub nested: bool,
}

/// One paginatable unit of reader content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Block {
    Text(TextBlock),
    Chapter(Chapter),
    Separator,
    Image(ImageRef),
}

impl Block {
    /// Chapter and separator markers always open a fresh page.
    pub fn is_marker(&self) -> bool {
        match self {
            Block::Chapter(_) | Block::Separator => true,
            Block::Text(_) | Block::Image(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&TextBlock> {
        match self {
            Block::Text(t) => Some(t),
            Block::Chapter(_) | Block::Separator | Block::Image(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    /// Inline styling as byte ranges into `text`.
    pub spans: Vec<InlineSpan>,
    pub role: TextRole,
    pub fragment: Fragment,
}

impl TextBlock {
    pub fn new(text: impl Into<String>, role: TextRole) -> Self {
        Self {
            text: text.into(),
            spans: Vec::new(),
            role,
            fragment: Fragment::Whole,
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new(text, TextRole::Paragraph)
    }

    pub fn has_visible_text(&self) -> bool {
        self.text.chars().any(|c| !c.is_whitespace())
    }

    /// Split at a char boundary. Spans are clipped to each side and the tail's
    /// spans are rebased to its own text. Both halves keep `self.fragment`.
    pub fn split_at(&self, at: usize) -> (TextBlock, TextBlock) {
        let (head_text, tail_text) = self.text.split_at(at);
        let mut head_spans = Vec::new();
        let mut tail_spans = Vec::new();
        for span in &self.spans {
            if span.start < at {
                head_spans.push(InlineSpan {
                    start: span.start,
                    end: span.end.min(at),
                    style: span.style.clone(),
                });
            }
            if span.end > at {
                tail_spans.push(InlineSpan {
                    start: span.start.max(at) - at,
                    end: span.end - at,
                    style: span.style.clone(),
                });
            }
        }
        let head = TextBlock {
            text: head_text.to_string(),
            spans: head_spans,
            role: self.role,
            fragment: self.fragment,
        };
        let tail = TextBlock {
            text: tail_text.to_string(),
            spans: tail_spans,
            role: self.role,
            fragment: self.fragment,
        };
        (head, tail)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineSpan {
    pub start: usize,
    pub end: usize,
    pub style: InlineStyle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InlineStyle {
    Emphasis,
    Strong,
    Code,
    Link { href: String },
    Superscript,
    Subscript,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextRole {
    Paragraph,
    Heading(u8),
    Preformatted,
    Quote,
    ListItem,
}

/// Position of a text block relative to the paragraph it was cut from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fragment {
    #[default]
    Whole,
    /// First piece of a paragraph split across pages; carries the indent.
    ParagraphStart,
    /// Any later piece; rendered without first-line indentation.
    Continuation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Archive entry holding the image bytes.
    pub entry: String,
    pub alt: Option<String>,
}

/// A viewport-sized run of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub index: usize,
    /// Index into the source block list of the block this page starts with.
    pub first_block: usize,
    pub blocks: Vec<Block>,
    /// Content height in device pixels, spacing included.
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    /// False when `author` holds the placeholder.
    pub author_known: bool,
    pub description: Option<String>,
    pub cover: Option<CoverImage>,
    pub source_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverImage {
    pub entry: String,
    pub media_type: Option<String>,
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// Which strategy produced the reading order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSource {
    Spine,
    Heuristic,
}

/// A fully extracted book, ready for pagination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub blocks: Vec<Block>,
    pub chapter_count: usize,
    pub order_source: OrderSource,
    /// True when the archive was read through duplicate-entry recovery.
    pub recovered: bool,
    pub diagnosis: Diagnosis,
}

/// Non-throwing result of a whole-file parse.
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    Parsed(Document),
    Empty(EmptyReason),
}

impl ParseOutcome {
    pub fn document(&self) -> Option<&Document> {
        match self {
            ParseOutcome::Parsed(doc) => Some(doc),
            ParseOutcome::Empty(_) => None,
        }
    }

    pub fn into_document(self) -> Option<Document> {
        match self {
            ParseOutcome::Parsed(doc) => Some(doc),
            ParseOutcome::Empty(_) => None,
        }
    }

    /// Treat an empty book as an error, for callers that need content.
    pub fn into_result(self) -> Result<Document, ParseError> {
        match self {
            ParseOutcome::Parsed(doc) => Ok(doc),
            ParseOutcome::Empty(EmptyReason::NoChapters) => Err(ParseError::NoChapters),
            ParseOutcome::Empty(EmptyReason::NoValidBlocks) => Err(ParseError::NoContent),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmptyReason {
    /// Neither the spine nor the content-file heuristic produced chapters.
    NoChapters,
    /// Chapters were found but none yielded text under a chapter marker.
    NoValidBlocks,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn styled() -> TextBlock {
        let mut block = TextBlock::paragraph("alpha beta gamma");
        block.spans.push(InlineSpan {
            start: 0,
            end: 10,
            style: InlineStyle::Strong,
        });
        block.spans.push(InlineSpan {
            start: 11,
            end: 16,
            style: InlineStyle::Emphasis,
        });
        block
    }

    #[test]
    fn test_split_at_clips_and_rebases_spans() {
        let (head, tail) = styled().split_at(6);
        assert_eq!(head.text, "alpha ");
        assert_eq!(tail.text, "beta gamma");
        assert_eq!(
            head.spans,
            vec![InlineSpan {
                start: 0,
                end: 6,
                style: InlineStyle::Strong
            }]
        );
        assert_eq!(
            tail.spans,
            vec![
                InlineSpan {
                    start: 0,
                    end: 4,
                    style: InlineStyle::Strong
                },
                InlineSpan {
                    start: 5,
                    end: 10,
                    style: InlineStyle::Emphasis
                },
            ]
        );
    }

    #[test]
    fn test_split_preserves_text() {
        let block = styled();
        let (head, tail) = block.split_at(11);
        assert_eq!(format!("{}{}", head.text, tail.text), block.text);
    }

    #[test]
    fn test_marker_classification() {
        assert!(Block::Separator.is_marker());
        assert!(Block::Chapter(Chapter {
            title: "One".into(),
            nested: false
        })
        .is_marker());
        assert!(!Block::Text(TextBlock::paragraph("x")).is_marker());
        assert!(!Block::Image(ImageRef {
            entry: "a.png".into(),
            alt: None
        })
        .is_marker());
    }

    #[test]
    fn test_visible_text() {
        assert!(!TextBlock::paragraph(" \n\t").has_visible_text());
        assert!(TextBlock::paragraph(" x ").has_visible_text());
    }
}
