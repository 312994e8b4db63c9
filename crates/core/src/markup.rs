//! Chapter markup → semantic blocks.

use scraper::{ElementRef, Html, Node};

use crate::document::{Block, Entry, ImageRef, InlineSpan, InlineStyle, TextBlock, TextRole};
use crate::paths;

/// Deeper element trees are truncated.
const MAX_NESTING_DEPTH: usize = 256;

/// Converts one chapter's markup into blocks. Implementations must tolerate
/// malformed input and be shareable across extraction workers.
pub trait MarkupParser: Send + Sync {
    fn extract_blocks(&self, markup: &str, chapter_path: &str, images: &ImageIndex) -> Vec<Block>;
}

/// Image entries of the container, used to resolve `src` attributes.
#[derive(Debug, Clone, Default)]
pub struct ImageIndex {
    names: Vec<String>,
}

impl ImageIndex {
    pub fn new(names: impl IntoIterator<Item = String>) -> Self {
        Self {
            names: names.into_iter().collect(),
        }
    }

    pub fn from_entries(entries: &[Entry]) -> Self {
        Self::new(
            entries
                .iter()
                .filter(|e| paths::is_image(&e.name))
                .map(|e| e.name.clone()),
        )
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Entry name for an image reference made from `chapter_path`.
    /// Tries the resolved path, then a path-suffix match, then the basename.
    pub fn resolve(&self, chapter_path: &str, src: &str) -> Option<&str> {
        let src = src.trim();
        if src.is_empty() || src.starts_with("data:") {
            return None;
        }
        let decoded = paths::decode_href(paths::strip_fragment(src));
        let joined = paths::join(paths::parent_dir(chapter_path), &decoded);
        if let Some(name) = self.names.iter().find(|n| n.eq_ignore_ascii_case(&joined)) {
            return Some(name);
        }

        let suffix = paths::trim_relative_prefix(&decoded).to_lowercase();
        if !suffix.is_empty() {
            let found = self.names.iter().find(|n| {
                let lower = n.to_lowercase();
                lower == suffix || lower.ends_with(&format!("/{suffix}"))
            });
            if let Some(name) = found {
                return Some(name);
            }
        }

        let base = paths::basename(&decoded).to_lowercase();
        self.names
            .iter()
            .find(|n| paths::basename(n).to_lowercase() == base)
            .map(|n| n.as_str())
    }
}

/// Default parser built on scraper's HTML5 tree builder.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlBlockParser;

impl MarkupParser for HtmlBlockParser {
    fn extract_blocks(&self, markup: &str, chapter_path: &str, images: &ImageIndex) -> Vec<Block> {
        let document = Html::parse_document(markup);
        let mut builder = BlockBuilder::new(chapter_path, images);
        builder.walk(document.root_element(), 0);
        builder.flush();
        builder.blocks
    }
}

struct BlockBuilder<'a> {
    chapter_path: &'a str,
    images: &'a ImageIndex,
    blocks: Vec<Block>,
    text: String,
    spans: Vec<InlineSpan>,
    roles: Vec<TextRole>,
    preformatted: usize,
    truncated: bool,
}

impl<'a> BlockBuilder<'a> {
    fn new(chapter_path: &'a str, images: &'a ImageIndex) -> Self {
        Self {
            chapter_path,
            images,
            blocks: Vec::new(),
            text: String::new(),
            spans: Vec::new(),
            roles: Vec::new(),
            preformatted: 0,
            truncated: false,
        }
    }

    fn role(&self) -> TextRole {
        self.roles.last().copied().unwrap_or(TextRole::Paragraph)
    }

    fn walk(&mut self, element: ElementRef<'_>, depth: usize) {
        if depth > MAX_NESTING_DEPTH {
            if !self.truncated {
                tracing::warn!(
                    "{}: nesting depth exceeds {}, truncating",
                    self.chapter_path,
                    MAX_NESTING_DEPTH
                );
                self.truncated = true;
            }
            return;
        }

        let name = element.value().name();
        match name {
            "head" | "script" | "style" | "title" | "noscript" | "template" => {}
            "br" => self.push_break(),
            "hr" => {
                self.flush();
                self.blocks.push(Block::Separator);
            }
            "img" | "image" => self.push_image(element),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name.as_bytes()[1] - b'0';
                self.block_element(element, Some(TextRole::Heading(level)), depth);
            }
            "pre" => {
                self.preformatted += 1;
                self.block_element(element, Some(TextRole::Preformatted), depth);
                self.preformatted -= 1;
            }
            "blockquote" => self.block_element(element, Some(TextRole::Quote), depth),
            "li" | "dt" | "dd" => self.block_element(element, Some(TextRole::ListItem), depth),
            "p" | "div" | "section" | "article" | "header" | "footer" | "aside" | "main"
            | "body" | "ul" | "ol" | "dl" | "table" | "tr" | "td" | "th" | "figure"
            | "figcaption" | "nav" | "address" | "center" => {
                self.block_element(element, None, depth)
            }
            _ => match inline_style(element) {
                Some(style) => {
                    let start = self.text.len();
                    self.walk_children(element, depth);
                    let end = self.text.len();
                    if end > start {
                        self.spans.push(InlineSpan { start, end, style });
                    }
                }
                None => self.walk_children(element, depth),
            },
        }
    }

    fn block_element(&mut self, element: ElementRef<'_>, role: Option<TextRole>, depth: usize) {
        self.flush();
        if let Some(role) = role {
            self.roles.push(role);
        }
        self.walk_children(element, depth);
        self.flush();
        if role.is_some() {
            self.roles.pop();
        }
    }

    fn walk_children(&mut self, element: ElementRef<'_>, depth: usize) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.push_text(text),
                Node::Element(_) => {
                    if let Some(el) = ElementRef::wrap(child) {
                        self.walk(el, depth + 1);
                    }
                }
                _ => {}
            }
        }
    }

    fn push_text(&mut self, text: &str) {
        if self.preformatted > 0 {
            self.text.push_str(text);
            return;
        }
        for c in text.chars() {
            if c.is_whitespace() {
                if self.text.chars().next_back().is_some_and(|last| !last.is_whitespace()) {
                    self.text.push(' ');
                }
            } else {
                self.text.push(c);
            }
        }
    }

    fn push_break(&mut self) {
        if self.preformatted > 0 {
            self.text.push('\n');
            return;
        }
        let trimmed = self.text.trim_end_matches(' ').len();
        self.text.truncate(trimmed);
        if !self.text.is_empty() {
            self.text.push('\n');
        }
    }

    fn push_image(&mut self, element: ElementRef<'_>) {
        let src = element
            .value()
            .attrs()
            .find(|(key, _)| matches!(*key, "src" | "href" | "xlink:href"))
            .map(|(_, value)| value);
        let Some(src) = src else {
            return;
        };
        match self.images.resolve(self.chapter_path, src) {
            Some(entry) => {
                let entry = entry.to_string();
                self.flush();
                self.blocks.push(Block::Image(ImageRef {
                    entry,
                    alt: element
                        .value()
                        .attr("alt")
                        .map(str::trim)
                        .filter(|a| !a.is_empty())
                        .map(String::from),
                }));
            }
            None => tracing::debug!("{}: unresolved image {}", self.chapter_path, src),
        }
    }

    /// Close the current text run as a block of the enclosing role.
    fn flush(&mut self) {
        let keep = self.text.trim_end().len();
        self.text.truncate(keep);
        let mut spans = std::mem::take(&mut self.spans);
        let text = std::mem::take(&mut self.text);

        let block = TextBlock::new(text, self.role());
        if !block.has_visible_text() {
            return;
        }
        spans.retain_mut(|span| {
            span.end = span.end.min(keep);
            span.start < span.end
        });
        spans.sort_by_key(|s| s.start);
        self.blocks.push(Block::Text(TextBlock { spans, ..block }));
    }
}

fn inline_style(element: ElementRef<'_>) -> Option<InlineStyle> {
    match element.value().name() {
        "em" | "i" | "cite" => Some(InlineStyle::Emphasis),
        "strong" | "b" => Some(InlineStyle::Strong),
        "code" | "kbd" | "samp" | "tt" => Some(InlineStyle::Code),
        "sup" => Some(InlineStyle::Superscript),
        "sub" => Some(InlineStyle::Subscript),
        "a" => element.value().attr("href").map(|href| InlineStyle::Link {
            href: href.to_string(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(markup: &str) -> Vec<Block> {
        let images = ImageIndex::new(vec![
            "OEBPS/Images/fig1.png".to_string(),
            "OEBPS/Images/cover.jpg".to_string(),
        ]);
        HtmlBlockParser.extract_blocks(markup, "OEBPS/Text/ch1.xhtml", &images)
    }

    fn text(block: &Block) -> &str {
        &block.as_text().unwrap().text
    }

    #[test]
    fn test_paragraphs_and_headings() {
        let blocks = parse(
            "<html><head><title>Ignored</title><style>p{}</style></head><body>\
             <h2>Chapter  One</h2>\
             <p>First   paragraph\n text.</p>\
             <p>   </p>\
             <div><p>Nested</p> tail</div>\
             </body></html>",
        );
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0].as_text().unwrap().role, TextRole::Heading(2));
        assert_eq!(text(&blocks[0]), "Chapter One");
        assert_eq!(text(&blocks[1]), "First paragraph text.");
        assert_eq!(text(&blocks[2]), "Nested");
        assert_eq!(text(&blocks[3]), "tail");
    }

    #[test]
    fn test_inline_spans() {
        let blocks = parse("<p>Some <em>very</em> <b>bold <i>mixed</i></b> words </p>");
        let block = blocks[0].as_text().unwrap();
        assert_eq!(block.text, "Some very bold mixed words");
        let styled: Vec<(&str, &InlineStyle)> = block
            .spans
            .iter()
            .map(|s| (&block.text[s.start..s.end], &s.style))
            .collect();
        assert_eq!(
            styled,
            vec![
                ("very", &InlineStyle::Emphasis),
                ("bold mixed", &InlineStyle::Strong),
                ("mixed", &InlineStyle::Emphasis),
            ]
        );
    }

    #[test]
    fn test_trailing_span_is_clipped() {
        let blocks = parse("<p>end <em>here </em></p>");
        let block = blocks[0].as_text().unwrap();
        assert_eq!(block.text, "end here");
        assert_eq!(block.spans[0].end, block.text.len());
    }

    #[test]
    fn test_preformatted_keeps_whitespace() {
        let blocks = parse("<pre>fn main() {\n    run();\n}</pre>");
        let block = blocks[0].as_text().unwrap();
        assert_eq!(block.role, TextRole::Preformatted);
        assert_eq!(block.text, "fn main() {\n    run();\n}");
    }

    #[test]
    fn test_line_breaks_and_separators() {
        let blocks = parse("<p>line one<br/>  line two</p><hr/><p>after</p>");
        assert_eq!(text(&blocks[0]), "line one\nline two");
        assert_eq!(blocks[1], Block::Separator);
        assert_eq!(text(&blocks[2]), "after");
    }

    #[test]
    fn test_images_resolve_against_index() {
        let blocks = parse(
            "<p>before</p><img src=\"../Images/fig1.png\" alt=\"Figure\"/>\
             <img src=\"missing.png\"/>\
             <svg><image xlink:href=\"../Images/cover.jpg\"/></svg>",
        );
        assert_eq!(
            blocks[1],
            Block::Image(ImageRef {
                entry: "OEBPS/Images/fig1.png".into(),
                alt: Some("Figure".into()),
            })
        );
        assert_eq!(
            blocks[2],
            Block::Image(ImageRef {
                entry: "OEBPS/Images/cover.jpg".into(),
                alt: None,
            })
        );
        assert_eq!(blocks.len(), 3);
    }

    #[test]
    fn test_malformed_markup_does_not_panic() {
        let blocks = parse("<p>unclosed <b>bold <p>next</i></div>");
        assert!(blocks.iter().all(|b| b.as_text().is_some()));
        assert!(!blocks.is_empty());
    }

    #[test]
    fn test_image_index_resolution_order() {
        let index = ImageIndex::new(vec![
            "OEBPS/img/a.png".to_string(),
            "other/img/a.png".to_string(),
            "Pics/B.PNG".to_string(),
        ]);
        assert_eq!(index.resolve("other/text/c.xhtml", "../img/a.png"), Some("other/img/a.png"));
        assert_eq!(index.resolve("x.xhtml", "img/a.png"), Some("OEBPS/img/a.png"));
        assert_eq!(index.resolve("x.xhtml", "deep/path/b.png"), Some("Pics/B.PNG"));
        assert_eq!(index.resolve("x.xhtml", "data:image/png;base64,AAAA"), None);
    }
}
