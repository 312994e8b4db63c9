#![allow(dead_code)]

use std::io::{Cursor, Write};

use folio_core::source::MemorySource;

pub const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

/// Zip `files` in the given order, stored uncompressed.
pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let opts = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, data) in files {
        zip.start_file(*name, opts).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// A well-formed EPUB: mimetype, container, `OEBPS/content.opf` and `files`.
pub fn epub_bytes(opf: &str, files: &[(&str, &str)]) -> Vec<u8> {
    let mut all: Vec<(&str, &[u8])> = vec![
        ("mimetype", b"application/epub+zip"),
        ("META-INF/container.xml", CONTAINER.as_bytes()),
        ("OEBPS/content.opf", opf.as_bytes()),
    ];
    all.extend(files.iter().map(|(n, d)| (*n, d.as_bytes())));
    zip_bytes(&all)
}

pub fn source(name: &str, bytes: Vec<u8>) -> MemorySource {
    MemorySource::new(name, bytes)
}

/// Package document with one manifest item and spine entry per `(id, href)`.
pub fn opf(title: &str, items: &[(&str, &str)], ncx: Option<&str>) -> String {
    let mut manifest = String::new();
    let mut spine = String::new();
    for (id, href) in items {
        manifest.push_str(&format!(
            r#"<item id="{id}" href="{href}" media-type="application/xhtml+xml"/>"#
        ));
        spine.push_str(&format!(r#"<itemref idref="{id}"/>"#));
    }
    let toc_attr = match ncx {
        Some(href) => {
            manifest.push_str(&format!(
                r#"<item id="ncx" href="{href}" media-type="application/x-dtbncx+xml"/>"#
            ));
            r#" toc="ncx""#
        }
        None => "",
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>{title}</dc:title></metadata>
  <manifest>{manifest}</manifest>
  <spine{toc_attr}>{spine}</spine>
</package>"#
    )
}

pub fn chapter(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>x</title></head><body>{body}</body></html>"#
    )
}

/// Replace every occurrence of `from` with the same-length `to`.
pub fn replace_all(haystack: &[u8], from: &[u8], to: &[u8]) -> Vec<u8> {
    assert_eq!(from.len(), to.len());
    let mut out = haystack.to_vec();
    let mut i = 0;
    while i + from.len() <= out.len() {
        if out[i..].starts_with(from) {
            out[i..i + to.len()].copy_from_slice(to);
            i += from.len();
        } else {
            i += 1;
        }
    }
    out
}
