//! Book metadata for import: title, author, description and cover.

use scraper::Html;
use serde::{Deserialize, Serialize};

use crate::archive::Archive;
use crate::cover::{self, ImageDecoder};
use crate::document::BookMetadata;
use crate::error::{MetadataError, ParseError};
use crate::package;
use crate::paths;

pub const DEFAULT_UNKNOWN_AUTHOR: &str = "Unknown author";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataOptions {
    pub extract_cover: bool,
    /// Shown when the package names no author.
    pub unknown_author: String,
}

impl Default for MetadataOptions {
    fn default() -> Self {
        Self {
            extract_cover: true,
            unknown_author: DEFAULT_UNKNOWN_AUTHOR.to_string(),
        }
    }
}

pub fn extract_metadata(
    archive: &mut Archive,
    source_path: &str,
    opts: &MetadataOptions,
    decoder: &dyn ImageDecoder,
) -> Result<BookMetadata, MetadataError> {
    let package = match package::load_package(archive) {
        Ok(Some(package)) => package,
        Ok(None) => return Err(MetadataError::NoManifest),
        Err(ParseError::Archive(e)) => return Err(MetadataError::Archive(e)),
        Err(e) => return Err(MetadataError::Malformed(e.to_string())),
    };

    let title = package
        .metadata
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .unwrap_or_else(|| paths::file_stem(source_path).to_string());

    let author = package
        .metadata
        .creators
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    let author_known = !author.is_empty();
    let author = if author_known {
        author
    } else {
        opts.unknown_author.clone()
    };

    let description = package
        .metadata
        .description
        .as_deref()
        .map(strip_markup)
        .filter(|d| !d.is_empty());

    let cover = if opts.extract_cover {
        cover::extract_cover(archive, &package, decoder)
    } else {
        None
    };

    tracing::debug!(
        "Metadata for {}: title={:?} author_known={} cover={}",
        source_path,
        title,
        author_known,
        cover.is_some()
    );

    Ok(BookMetadata {
        title,
        author,
        author_known,
        description,
        cover,
        source_path: source_path.to_string(),
    })
}

/// Text content of an HTML fragment with whitespace collapsed.
pub fn strip_markup(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text: String = fragment.root_element().text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveOptions;
    use crate::cover::RasterDecoder;
    use pretty_assertions::assert_eq;
    use std::io::{Cursor, Write};

    const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

    fn archive(opf: &str) -> Archive {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let opts = zip::write::SimpleFileOptions::default();
        for (name, data) in [
            ("mimetype", "application/epub+zip"),
            ("META-INF/container.xml", CONTAINER),
            ("OEBPS/content.opf", opf),
        ] {
            zip.start_file(name, opts).unwrap();
            zip.write_all(data.as_bytes()).unwrap();
        }
        Archive::from_bytes(zip.finish().unwrap().into_inner(), &ArchiveOptions::default()).unwrap()
    }

    #[test]
    fn test_full_metadata() {
        let mut archive = archive(
            r#"<package><metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
                <dc:title>Moby Dick</dc:title>
                <dc:creator>Herman Melville</dc:creator>
                <dc:description>&lt;p&gt;A &lt;b&gt;whale&lt;/b&gt;  of a tale.&lt;/p&gt;</dc:description>
              </metadata><manifest/><spine/></package>"#,
        );
        let meta = extract_metadata(
            &mut archive,
            "/books/moby.epub",
            &MetadataOptions::default(),
            &RasterDecoder,
        )
        .unwrap();
        assert_eq!(meta.title, "Moby Dick");
        assert_eq!(meta.author, "Herman Melville");
        assert!(meta.author_known);
        assert_eq!(meta.description.as_deref(), Some("A whale of a tale."));
        assert_eq!(meta.cover, None);
        assert_eq!(meta.source_path, "/books/moby.epub");
    }

    #[test]
    fn test_fallbacks() {
        let mut archive = archive(
            r#"<package><metadata><dc:title>  </dc:title><dc:description><![CDATA[<p> </p>]]></dc:description></metadata>
              <manifest/><spine/></package>"#,
        );
        let opts = MetadataOptions {
            unknown_author: "Auteur inconnu".into(),
            ..MetadataOptions::default()
        };
        let meta =
            extract_metadata(&mut archive, "/books/My Book.epub", &opts, &RasterDecoder).unwrap();
        assert_eq!(meta.title, "My Book");
        assert_eq!(meta.author, "Auteur inconnu");
        assert!(!meta.author_known);
        assert_eq!(meta.description, None);
    }

    #[test]
    fn test_no_manifest() {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("ch1.xhtml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"<p>hi</p>").unwrap();
        let mut archive =
            Archive::from_bytes(zip.finish().unwrap().into_inner(), &ArchiveOptions::default())
                .unwrap();
        let err = extract_metadata(&mut archive, "x.epub", &MetadataOptions::default(), &RasterDecoder)
            .unwrap_err();
        assert!(matches!(err, MetadataError::NoManifest));
    }

    #[test]
    fn test_strip_markup() {
        assert_eq!(
            strip_markup("<div><p>One</p>\n<p>Two &amp; three</p></div>"),
            "One Two & three"
        );
        assert_eq!(strip_markup("plain"), "plain");
    }
}
