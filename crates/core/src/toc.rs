//! Navigation document (NCX / EPUB 3 nav) → chapter title map.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XmlReader;
use scraper::{ElementRef, Html, Selector};

use crate::archive::Archive;
use crate::document::Chapter;
use crate::package::Package;
use crate::paths;

/// Raw navigation document contents.
#[derive(Debug, Clone)]
pub enum NavigationDocument {
    /// EPUB 2 `toc.ncx`.
    Ncx(String),
    /// EPUB 3 XHTML navigation document.
    Xhtml(String),
}

/// Normalised source basename → chapter title, in first-encounter order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TitleMap {
    entries: Vec<(String, Chapter)>,
    index: HashMap<String, usize>,
}

impl TitleMap {
    /// Add a node, merging with an existing entry for the same source.
    pub fn insert(&mut self, source: &str, title: &str, nested: bool) {
        match self.index.get(source) {
            Some(&pos) => {
                let chapter = &mut self.entries[pos].1;
                chapter.title = format!("{} / {}", chapter.title, title);
                chapter.nested |= nested;
            }
            None => {
                self.index.insert(source.to_string(), self.entries.len());
                self.entries.push((
                    source.to_string(),
                    Chapter {
                        title: title.to_string(),
                        nested,
                    },
                ));
            }
        }
    }

    /// Look up by entry name or href; both are normalised first.
    pub fn get(&self, source: &str) -> Option<&Chapter> {
        let key = paths::normalize_source(source);
        self.index.get(&key).map(|&pos| &self.entries[pos].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Chapter)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `None` when there is no navigation document.
pub fn build_title_map(nav: Option<&NavigationDocument>) -> Option<TitleMap> {
    let map = match nav? {
        NavigationDocument::Ncx(xml) => parse_ncx(xml),
        NavigationDocument::Xhtml(html) => parse_nav(html),
    };
    tracing::debug!("Title map has {} entries", map.len());
    Some(map)
}

/// Find the navigation document: the spine's NCX, then the EPUB 3 nav item,
/// then any `.ncx` entry in the container.
pub fn load_navigation(
    archive: &mut Archive,
    package: Option<&Package>,
) -> Option<NavigationDocument> {
    if let Some(package) = package {
        let ncx = package
            .toc_id
            .as_deref()
            .and_then(|id| package.manifest.get(id))
            .map(|item| package.resolve_href(&item.href));
        if let Some(text) = ncx.and_then(|path| read_optional(archive, &path)) {
            return Some(NavigationDocument::Ncx(text));
        }
        let nav = package.nav_href.as_deref().map(|h| package.resolve_href(h));
        if let Some(text) = nav.and_then(|path| read_optional(archive, &path)) {
            return Some(NavigationDocument::Xhtml(text));
        }
    }

    let ncx = archive
        .entries()
        .iter()
        .find(|e| paths::extension(&e.name).as_deref() == Some("ncx"))
        .map(|e| e.name.clone())?;
    read_optional(archive, &ncx).map(NavigationDocument::Ncx)
}

fn read_optional(archive: &mut Archive, path: &str) -> Option<String> {
    let name = archive.find(path)?.name.clone();
    match archive.read_entry_string(&name) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!("Could not read navigation document {}: {}", name, e);
            None
        }
    }
}

#[derive(Default)]
struct NavFrame {
    label: String,
    source: Option<String>,
    emitted: bool,
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Record a node once. Blank labels and blank sources are skipped.
fn emit(map: &mut TitleMap, frame: &mut NavFrame, parent: Option<&NavFrame>) {
    if frame.emitted {
        return;
    }
    frame.emitted = true;

    let title = collapse_whitespace(&frame.label);
    let Some(source) = frame.source.as_deref() else {
        tracing::debug!("Skipping navigation node without target: {:?}", title);
        return;
    };
    if title.is_empty() {
        tracing::debug!("Skipping navigation node without label for {}", source);
        return;
    }
    let nested = parent.is_some_and(|p| p.source.as_deref() != Some(source));
    map.insert(source, &title, nested);
}

fn set_source(frame: &mut NavFrame, e: &BytesStart<'_>) {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == b"src" {
            let src = String::from_utf8_lossy(&attr.value).to_string();
            let source = paths::normalize_source(&src);
            if !source.is_empty() {
                frame.source = Some(source);
            }
        }
    }
}

/// Depth-first walk over `navPoint`. A parent is recorded before its children.
pub fn parse_ncx(content: &str) -> TitleMap {
    let mut reader = XmlReader::from_str(content);
    let mut buf = Vec::new();
    let mut map = TitleMap::default();
    let mut stack: Vec<NavFrame> = Vec::new();
    let mut in_label = false;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"navPoint" => {
                    if let Some((top, rest)) = stack.split_last_mut() {
                        emit(&mut map, top, rest.last());
                    }
                    stack.push(NavFrame::default());
                }
                b"navLabel" => in_label = true,
                b"text" if in_label => in_text = true,
                b"content" => {
                    if let Some(frame) = stack.last_mut() {
                        set_source(frame, e);
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"content" {
                    if let Some(frame) = stack.last_mut() {
                        set_source(frame, e);
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                if in_text {
                    if let Some(frame) = stack.last_mut() {
                        frame.label.push_str(&e.unescape().unwrap_or_default());
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"navPoint" => {
                    if let Some(mut frame) = stack.pop() {
                        emit(&mut map, &mut frame, stack.last());
                    }
                }
                b"navLabel" => in_label = false,
                b"text" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::warn!("Malformed NCX, keeping {} titles: {}", map.len(), e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    map
}

/// EPUB 3 `<nav epub:type="toc">`: `ol > li > (a | span)`, nesting via inner `ol`.
pub fn parse_nav(content: &str) -> TitleMap {
    let mut map = TitleMap::default();
    let document = Html::parse_document(content);
    let Ok(nav_selector) = Selector::parse("nav") else {
        return map;
    };

    let navs: Vec<ElementRef> = document.select(&nav_selector).collect();
    let toc_nav = navs
        .iter()
        .find(|nav| {
            nav.value()
                .attr("epub:type")
                .is_some_and(|t| t.split_whitespace().any(|t| t == "toc"))
        })
        .or_else(|| navs.first());

    if let Some(ol) = toc_nav.and_then(|nav| child_elements(*nav, "ol").next()) {
        walk_nav_list(ol, None, &mut map);
    }
    map
}

fn child_elements<'a>(el: ElementRef<'a>, name: &'a str) -> impl Iterator<Item = ElementRef<'a>> {
    el.children()
        .filter_map(ElementRef::wrap)
        .filter(move |c| c.value().name() == name)
}

fn walk_nav_list(ol: ElementRef<'_>, parent: Option<&NavFrame>, map: &mut TitleMap) {
    for li in child_elements(ol, "li") {
        let mut frame = NavFrame::default();
        let label = li
            .children()
            .filter_map(ElementRef::wrap)
            .find(|c| matches!(c.value().name(), "a" | "span"));
        if let Some(label) = label {
            frame.label = label.text().collect();
            if let Some(href) = label.value().attr("href") {
                let source = paths::normalize_source(href);
                if !source.is_empty() {
                    frame.source = Some(source);
                }
            }
        }

        emit(map, &mut frame, parent);
        for nested in child_elements(li, "ol") {
            walk_nav_list(nested, Some(&frame), map);
        }
    }
}
