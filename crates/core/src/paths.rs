//! Path helpers for archive entry names and manifest hrefs.

use percent_encoding::percent_decode_str;

const CONTENT_EXTENSIONS: &[&str] = &["xhtml", "html", "htm"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "svg"];

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Last path component of an entry name or href.
pub fn basename(path: &str) -> &str {
    path.rsplit(is_separator).next().unwrap_or(path)
}

/// Directory part of a path including the trailing slash, or `""` at the root.
pub fn parent_dir(path: &str) -> &str {
    path.rfind('/').map(|i| &path[..i + 1]).unwrap_or("")
}

/// File name without its extension.
pub fn file_stem(path: &str) -> &str {
    let name = basename(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(i) => &name[..i],
    }
}

pub fn extension(path: &str) -> Option<String> {
    let name = basename(path);
    match name.rfind('.') {
        Some(i) if i + 1 < name.len() => Some(name[i + 1..].to_ascii_lowercase()),
        _ => None,
    }
}

/// Drop `#fragment` and `?query` suffixes from an href.
pub fn strip_fragment(href: &str) -> &str {
    let end = href.find(|c: char| c == '#' || c == '?').unwrap_or(href.len());
    &href[..end]
}

pub fn decode_href(href: &str) -> String {
    percent_decode_str(href).decode_utf8_lossy().into_owned()
}

/// Key used to match hrefs against entries regardless of directory layout and case.
pub fn normalize_source(href: &str) -> String {
    let decoded = decode_href(strip_fragment(href.trim()));
    basename(&decoded).to_lowercase()
}

/// Resolve `href` relative to `dir`, collapsing `.` and `..` segments.
pub fn join(dir: &str, href: &str) -> String {
    let mut parts: Vec<&str> = dir.split('/').filter(|p| !p.is_empty()).collect();
    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Href with leading `./` and `../` segments removed, for suffix matching.
pub fn trim_relative_prefix(href: &str) -> &str {
    let mut rest = href.trim_start_matches('/');
    loop {
        if let Some(r) = rest.strip_prefix("./") {
            rest = r;
        } else if let Some(r) = rest.strip_prefix("../") {
            rest = r;
        } else {
            return rest;
        }
    }
}

pub fn is_content_markup(name: &str) -> bool {
    extension(name).is_some_and(|ext| CONTENT_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_image(name: &str) -> bool {
    extension(name).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_package_document(name: &str) -> bool {
    extension(name).as_deref() == Some("opf")
}
