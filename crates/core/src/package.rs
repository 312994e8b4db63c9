//! Package document (OPF) parsing and reading-order resolution.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XmlReader;

use crate::archive::Archive;
use crate::diagnostics::CONTAINER_ENTRY;
use crate::document::{Entry, OrderSource};
use crate::error::ParseError;
use crate::paths;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
    pub properties: Option<String>,
}

/// Manifest items in document order with an id index.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    items: Vec<ManifestItem>,
    by_id: HashMap<String, usize>,
}

impl Manifest {
    pub fn insert(&mut self, item: ManifestItem) {
        match self.by_id.get(&item.id) {
            Some(&pos) => self.items[pos] = item,
            None => {
                self.by_id.insert(item.id.clone(), self.items.len());
                self.items.push(item);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&ManifestItem> {
        self.by_id.get(id).map(|&pos| &self.items[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManifestItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PackageMetadata {
    pub title: Option<String>,
    pub creators: Vec<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    /// Manifest id named by `<meta name="cover">`.
    pub cover_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Package {
    /// Archive path of the package document.
    pub path: String,
    /// Directory hrefs are relative to, with trailing slash.
    pub base_dir: String,
    pub metadata: PackageMetadata,
    pub manifest: Manifest,
    /// Spine idrefs in reading order.
    pub spine: Vec<String>,
    /// Manifest id of the NCX (`<spine toc="...">`).
    pub toc_id: Option<String>,
    /// Href of the EPUB 3 navigation document.
    pub nav_href: Option<String>,
}

impl Package {
    /// Archive path for a manifest href.
    pub fn resolve_href(&self, href: &str) -> String {
        paths::join(&self.base_dir, &paths::decode_href(paths::strip_fragment(href)))
    }

    /// Manifest item flagged `properties="cover-image"`.
    pub fn cover_image_item(&self) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| {
            item.properties
                .as_deref()
                .is_some_and(|p| p.split_whitespace().any(|t| t == "cover-image"))
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChapterOrder {
    pub entries: Vec<Entry>,
    pub source: OrderSource,
}

/// Archive path of the package document: the `container.xml` rootfile when it
/// names a real entry, otherwise the first `.opf` entry.
pub fn locate_package(archive: &mut Archive) -> Option<String> {
    if let Some(container) = archive.find(CONTAINER_ENTRY).map(|e| e.name.clone()) {
        match archive.read_entry_string(&container) {
            Ok(xml) => {
                if let Some(path) = rootfile_path(&xml) {
                    if let Some(entry) = archive.find(&path) {
                        return Some(entry.name.clone());
                    }
                    tracing::warn!("container.xml names missing rootfile {}", path);
                }
            }
            Err(e) => tracing::warn!("Unreadable container.xml: {}", e),
        }
    }

    archive
        .entries()
        .iter()
        .find(|e| paths::is_package_document(&e.name))
        .map(|e| e.name.clone())
}

fn rootfile_path(container: &str) -> Option<String> {
    let mut reader = XmlReader::from_str(container);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.local_name().as_ref() == b"rootfile" =>
            {
                if let Some(path) = attr(e, b"full-path") {
                    return Some(path);
                }
            }
            Ok(Event::Eof) => return None,
            Err(e) => {
                tracing::warn!("Failed to parse container.xml: {}", e);
                return None;
            }
            _ => {}
        }
        buf.clear();
    }
}

/// Locate and parse the package document. `Ok(None)` when the container has none.
pub fn load_package(archive: &mut Archive) -> Result<Option<Package>, ParseError> {
    let Some(path) = locate_package(archive) else {
        return Ok(None);
    };
    let content = archive.read_entry_string(&path)?;
    parse_package(&content, &path).map(Some)
}

pub fn parse_package(content: &str, path: &str) -> Result<Package, ParseError> {
    let mut reader = XmlReader::from_str(content);
    let mut buf = Vec::new();

    let mut metadata = PackageMetadata::default();
    let mut manifest = Manifest::default();
    let mut spine = Vec::new();
    let mut toc_id = None;
    let mut nav_href = None;

    let mut in_metadata = false;
    let mut current_element: Option<String> = None;
    let mut current_text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = local_name(e);
                match name.as_str() {
                    "metadata" => in_metadata = true,
                    "title" | "creator" | "description" | "language" if in_metadata => {
                        current_element = Some(name);
                        current_text.clear();
                    }
                    "meta" if in_metadata => read_cover_meta(e, &mut metadata),
                    "item" => read_item(e, &mut manifest, &mut nav_href),
                    "spine" => toc_id = attr(e, b"toc"),
                    "itemref" => spine.extend(attr(e, b"idref")),
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => match local_name(e).as_str() {
                "meta" if in_metadata => read_cover_meta(e, &mut metadata),
                "item" => read_item(e, &mut manifest, &mut nav_href),
                "spine" => toc_id = attr(e, b"toc"),
                "itemref" => spine.extend(attr(e, b"idref")),
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                if current_element.is_some() {
                    current_text.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Ok(Event::CData(ref e)) => {
                if current_element.is_some() {
                    current_text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if name == "metadata" {
                    in_metadata = false;
                }
                if current_element.as_deref() == Some(name.as_str()) {
                    let text = current_text.trim().to_string();
                    if !text.is_empty() {
                        match name.as_str() {
                            "title" if metadata.title.is_none() => metadata.title = Some(text),
                            "creator" => metadata.creators.push(text),
                            "description" if metadata.description.is_none() => {
                                metadata.description = Some(text)
                            }
                            "language" if metadata.language.is_none() => {
                                metadata.language = Some(text)
                            }
                            _ => {}
                        }
                    }
                    current_element = None;
                    current_text.clear();
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ParseError::Malformed {
                    file: path.to_string(),
                    detail: e.to_string(),
                });
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(Package {
        path: path.to_string(),
        base_dir: paths::parent_dir(path).to_string(),
        metadata,
        manifest,
        spine,
        toc_id,
        nav_href,
    })
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_string()
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .map(|a| {
            a.unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&a.value).into_owned())
        })
}

fn read_cover_meta(e: &BytesStart<'_>, metadata: &mut PackageMetadata) {
    // EPUB2 style: <meta name="cover" content="cover-image-id"/>
    if attr(e, b"name").as_deref() == Some("cover") {
        if let Some(id) = attr(e, b"content").filter(|c| !c.trim().is_empty()) {
            metadata.cover_id = Some(id.trim().to_string());
        }
    }
}

fn read_item(e: &BytesStart<'_>, manifest: &mut Manifest, nav_href: &mut Option<String>) {
    let (Some(id), Some(href)) = (attr(e, b"id"), attr(e, b"href")) else {
        tracing::debug!("Skipping manifest item without id or href");
        return;
    };
    let media_type = attr(e, b"media-type").unwrap_or_default();
    let properties = attr(e, b"properties");

    if properties
        .as_deref()
        .is_some_and(|p| p.split_whitespace().any(|t| t == "nav"))
    {
        *nav_href = Some(href.clone());
    }

    manifest.insert(ManifestItem {
        id,
        href,
        media_type,
        properties,
    });
}

/// Reading order for the archive: spine first, content-file heuristic second.
pub fn resolve_chapter_order(archive: &mut Archive) -> Result<ChapterOrder, ParseError> {
    let package = match load_package(archive) {
        Ok(package) => package,
        Err(ParseError::Malformed { file, detail }) => {
            tracing::warn!("Ignoring unusable package document {}: {}", file, detail);
            None
        }
        Err(e) => return Err(e),
    };
    resolve_with_package(archive.entries(), package.as_ref())
}

pub fn resolve_with_package(
    entries: &[Entry],
    package: Option<&Package>,
) -> Result<ChapterOrder, ParseError> {
    if let Some(package) = package {
        let resolved = spine_order(entries, package);
        if !resolved.is_empty() {
            tracing::info!(
                "Resolved {} chapters from the spine of {}",
                resolved.len(),
                package.path
            );
            return Ok(ChapterOrder {
                entries: resolved,
                source: OrderSource::Spine,
            });
        }
        tracing::warn!("Spine of {} matched no archive entries", package.path);
    }

    let fallback = heuristic_order(entries);
    if fallback.is_empty() {
        return Err(ParseError::NoChapters);
    }
    tracing::info!(
        "Using file-name ordering for {} content files",
        fallback.len()
    );
    Ok(ChapterOrder {
        entries: fallback,
        source: OrderSource::Heuristic,
    })
}

/// Walk the spine and match each item to a real entry. Never re-sorts.
pub fn spine_order(entries: &[Entry], package: &Package) -> Vec<Entry> {
    let mut resolved = Vec::with_capacity(package.spine.len());
    for idref in &package.spine {
        let Some(item) = package.manifest.get(idref) else {
            tracing::debug!("Spine idref {} has no manifest item", idref);
            continue;
        };
        match match_entry(entries, &package.resolve_href(&item.href), &item.href) {
            Some(entry) => resolved.push(entry.clone()),
            None => tracing::debug!("Spine item {} ({}) not in archive", idref, item.href),
        }
    }
    resolved
}

/// Exact archive path first, then a case-insensitive basename match.
fn match_entry<'a>(entries: &'a [Entry], full_path: &str, href: &str) -> Option<&'a Entry> {
    if let Some(entry) = entries.iter().find(|e| e.name == full_path) {
        return Some(entry);
    }
    let wanted = paths::normalize_source(href);
    if wanted.is_empty() {
        return None;
    }
    entries
        .iter()
        .find(|e| paths::basename(&e.name).to_lowercase() == wanted)
}

/// All content-markup entries ordered by the first digit run in the file name.
/// Names without digits sort after every numbered name, then by name.
pub fn heuristic_order(entries: &[Entry]) -> Vec<Entry> {
    let mut content: Vec<Entry> = entries
        .iter()
        .filter(|e| paths::is_content_markup(&e.name))
        .cloned()
        .collect();
    content.sort_by(|a, b| {
        numeric_key(&a.name)
            .cmp(&numeric_key(&b.name))
            .then_with(|| a.name.cmp(&b.name))
    });
    content
}

/// First run of ASCII digits in the base name; `u64::MAX` when absent or too large.
pub fn numeric_key(name: &str) -> u64 {
    let base = paths::basename(name);
    let digits: String = base
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>The Title</dc:title>
    <dc:creator>First Author</dc:creator>
    <dc:creator>Second Author</dc:creator>
    <dc:description>&lt;p&gt;A story.&lt;/p&gt;</dc:description>
    <meta name="cover" content="cover-img"/>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="c" href="Text/c.xhtml" media-type="application/xhtml+xml"/>
    <item id="a" href="Text/a.xhtml" media-type="application/xhtml+xml"/>
    <item id="b" href="Text/b%20two.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover-img" href="Images/cover.jpg" media-type="image/jpeg"/>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="a"/>
    <itemref idref="b"/>
    <itemref idref="missing"/>
    <itemref idref="c"/>
  </spine>
</package>"#;

    fn entry(name: &str) -> Entry {
        Entry {
            name: name.to_string(),
            size: 10,
        }
    }

    fn names(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_parse_package() {
        let package = parse_package(OPF, "OEBPS/content.opf").unwrap();
        assert_eq!(package.base_dir, "OEBPS/");
        assert_eq!(package.metadata.title.as_deref(), Some("The Title"));
        assert_eq!(package.metadata.creators, vec!["First Author", "Second Author"]);
        assert_eq!(package.metadata.description.as_deref(), Some("<p>A story.</p>"));
        assert_eq!(package.metadata.cover_id.as_deref(), Some("cover-img"));
        assert_eq!(package.spine, vec!["a", "b", "missing", "c"]);
        assert_eq!(package.toc_id.as_deref(), Some("ncx"));
        assert_eq!(package.nav_href.as_deref(), Some("nav.xhtml"));
        assert_eq!(package.manifest.len(), 6);
        assert_eq!(package.resolve_href("Text/b%20two.xhtml"), "OEBPS/Text/b two.xhtml");
    }

    #[test]
    fn test_spine_order_is_authoritative() {
        let package = parse_package(OPF, "OEBPS/content.opf").unwrap();
        let entries = vec![
            entry("OEBPS/Text/c.xhtml"),
            entry("OEBPS/Text/b two.xhtml"),
            entry("OEBPS/Text/a.xhtml"),
        ];
        let order = resolve_with_package(&entries, Some(&package)).unwrap();
        assert_eq!(order.source, OrderSource::Spine);
        assert_eq!(
            names(&order.entries),
            vec!["OEBPS/Text/a.xhtml", "OEBPS/Text/b two.xhtml", "OEBPS/Text/c.xhtml"]
        );
    }

    #[test]
    fn test_spine_matches_basename_case_insensitively() {
        let opf = r#"<package><manifest>
            <item id="a" href="a.xhtml" media-type="application/xhtml+xml"/>
            <item id="b" href="b.xhtml" media-type="application/xhtml+xml"/>
            <item id="c" href="c.xhtml" media-type="application/xhtml+xml"/>
          </manifest><spine><itemref idref="a"/><itemref idref="b"/><itemref idref="c"/></spine></package>"#;
        let package = parse_package(opf, "content.opf").unwrap();
        let entries = vec![
            entry("OEBPS/C.XHTML"),
            entry("OEBPS/a.xhtml"),
            entry("OEBPS/b.xhtml"),
        ];
        let order = resolve_with_package(&entries, Some(&package)).unwrap();
        assert_eq!(
            names(&order.entries),
            vec!["OEBPS/a.xhtml", "OEBPS/b.xhtml", "OEBPS/C.XHTML"]
        );
    }

    #[test]
    fn test_empty_spine_falls_back_to_heuristic() {
        let opf = r#"<package><manifest/><spine/></package>"#;
        let package = parse_package(opf, "content.opf").unwrap();
        let entries = vec![entry("ch2.html"), entry("ch1.html")];
        let order = resolve_with_package(&entries, Some(&package)).unwrap();
        assert_eq!(order.source, OrderSource::Heuristic);
        assert_eq!(names(&order.entries), vec!["ch1.html", "ch2.html"]);
    }

    #[test]
    fn test_heuristic_order_numeric_then_sentinel() {
        let entries = vec![
            entry("text/preface.xhtml"),
            entry("text/chapter10.xhtml"),
            entry("styles.css"),
            entry("text/chapter2.xhtml"),
            entry("text/appendix.xhtml"),
            entry("text/chapter1.xhtml"),
        ];
        let ordered = heuristic_order(&entries);
        assert_eq!(
            names(&ordered),
            vec![
                "text/chapter1.xhtml",
                "text/chapter2.xhtml",
                "text/chapter10.xhtml",
                "text/appendix.xhtml",
                "text/preface.xhtml",
            ]
        );
    }

    #[test]
    fn test_no_chapters_anywhere() {
        let entries = vec![entry("mimetype"), entry("style.css")];
        assert!(matches!(
            resolve_with_package(&entries, None),
            Err(ParseError::NoChapters)
        ));
    }

    #[test]
    fn test_numeric_key() {
        assert_eq!(numeric_key("OEBPS/part3_ch12.xhtml"), 3);
        assert_eq!(numeric_key("dir9/intro.xhtml"), u64::MAX);
        assert_eq!(numeric_key("ch99999999999999999999999.xhtml"), u64::MAX);
    }

    #[test]
    fn test_malformed_package_is_error() {
        let err = parse_package("<package><manifest></spine>", "bad.opf").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }

    #[test]
    fn test_cover_image_property() {
        let opf = r#"<package><manifest>
            <item id="img" href="img/c.png" media-type="image/png" properties="cover-image"/>
          </manifest><spine/></package>"#;
        let package = parse_package(opf, "content.opf").unwrap();
        assert_eq!(package.cover_image_item().unwrap().id, "img");
    }
}
