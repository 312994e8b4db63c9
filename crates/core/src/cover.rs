//! Locate and decode a book's cover image.

use crate::archive::Archive;
use crate::document::CoverImage;
use crate::package::{ManifestItem, Package};
use crate::paths;

/// A decoded image. Only the dimensions are kept; pixels stay with the caller's renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub media_type: Option<&'static str>,
}

/// Image decoding collaborator. Returns `None` for anything it cannot decode.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Option<DecodedImage>;
}

/// JPEG/PNG decoding through the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterDecoder;

impl ImageDecoder for RasterDecoder {
    fn decode(&self, bytes: &[u8]) -> Option<DecodedImage> {
        let media_type = image::guess_format(bytes).ok().map(|f| f.to_mime_type());
        match image::load_from_memory(bytes) {
            Ok(img) => Some(DecodedImage {
                width: img.width(),
                height: img.height(),
                media_type,
            }),
            Err(e) => {
                tracing::debug!("Cover decode failed: {}", e);
                None
            }
        }
    }
}

/// Manifest item holding the cover: the explicit cover reference first,
/// then the first item with an image media type.
pub fn cover_item(package: &Package) -> Option<&ManifestItem> {
    let explicit = package
        .metadata
        .cover_id
        .as_deref()
        .and_then(|id| package.manifest.get(id))
        .or_else(|| package.cover_image_item());
    explicit.or_else(|| {
        package
            .manifest
            .iter()
            .find(|item| item.media_type.to_ascii_lowercase().contains("image"))
    })
}

/// Archive entry whose name ends with the href, ignoring `./` and `../` prefixes.
pub fn find_entry_by_suffix<'a>(archive: &'a Archive, href: &str) -> Option<&'a str> {
    let decoded = paths::decode_href(paths::strip_fragment(href));
    let suffix = paths::trim_relative_prefix(&decoded);
    if suffix.is_empty() {
        return None;
    }
    archive
        .entries()
        .iter()
        .find(|e| e.name == suffix || e.name.ends_with(&format!("/{suffix}")))
        .or_else(|| {
            let lower = suffix.to_lowercase();
            archive
                .entries()
                .iter()
                .find(|e| e.name.to_lowercase().ends_with(&lower))
        })
        .map(|e| e.name.as_str())
}

/// Resolve, read and decode the cover. Any failure means no cover.
pub fn extract_cover(
    archive: &mut Archive,
    package: &Package,
    decoder: &dyn ImageDecoder,
) -> Option<CoverImage> {
    let item = cover_item(package)?;
    let Some(entry) = find_entry_by_suffix(archive, &item.href).map(str::to_string) else {
        tracing::debug!("Cover {} not found in archive", item.href);
        return None;
    };

    let data = match archive.read_entry(&entry) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!("Could not read cover {}: {}", entry, e);
            return None;
        }
    };

    let decoded = decoder.decode(&data)?;
    let media_type = decoded
        .media_type
        .map(String::from)
        .or_else(|| Some(item.media_type.clone()).filter(|m| !m.is_empty()));
    Some(CoverImage {
        entry,
        media_type,
        width: decoded.width,
        height: decoded.height,
        data,
    })
}
