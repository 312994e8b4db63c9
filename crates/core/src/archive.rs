//! ZIP container access.
//!
//! Archives normally open through the central directory. When that fails
//! because two entries share a name, the local file headers are walked
//! sequentially instead and the last occurrence of each name wins. Both paths
//! expose the same entry list and `read_entry` contract.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use serde::{Deserialize, Serialize};
use zip::result::ZipError;

use crate::document::Entry;
use crate::error::ArchiveError;
use crate::source::{BookSource, FileSource, MemorySource, ReadSeek};

/// Entries up to this size are kept in memory on the streaming path.
pub const DEFAULT_INLINE_LIMIT: u64 = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveOptions {
    /// Fall back to a streaming read when the central directory has duplicates.
    pub recover_duplicates: bool,
    /// Streaming path only: larger entries are re-read lazily by offset.
    pub inline_limit_bytes: u64,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            recover_duplicates: true,
            inline_limit_bytes: DEFAULT_INLINE_LIMIT,
        }
    }
}

pub struct Archive {
    entries: Vec<Entry>,
    backend: Backend,
    truncated: bool,
}

enum Backend {
    Indexed(zip::ZipArchive<Box<dyn ReadSeek>>),
    Streamed {
        source: Box<dyn ReadSeek>,
        contents: HashMap<String, StreamedEntry>,
    },
}

enum StreamedEntry {
    Inline(Vec<u8>),
    Deferred { header_offset: u64 },
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("entries", &self.entries.len())
            .field("recovered", &self.recovered())
            .field("truncated", &self.truncated)
            .finish()
    }
}

impl Archive {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        Self::open_with(path, &ArchiveOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, opts: &ArchiveOptions) -> Result<Self, ArchiveError> {
        Self::from_source(&FileSource::new(path.as_ref()), opts)
    }

    pub fn from_bytes(bytes: Vec<u8>, opts: &ArchiveOptions) -> Result<Self, ArchiveError> {
        Self::from_source(&MemorySource::new("<memory>", bytes), opts)
    }

    /// Open through the central directory, recovering from duplicate entries
    /// when `opts.recover_duplicates` is set.
    pub fn from_source(
        source: &dyn BookSource,
        opts: &ArchiveOptions,
    ) -> Result<Self, ArchiveError> {
        let reader = open_source(source)?;
        match zip::ZipArchive::new(reader) {
            Ok(zip) => Self::indexed(zip),
            Err(e) if is_duplicate_entry_error(&e) && opts.recover_duplicates => {
                tracing::warn!(
                    "{}: duplicate archive entries ({}), falling back to streaming read",
                    source.display_name(),
                    e
                );
                Self::streamed(open_source(source)?, opts)
            }
            Err(ZipError::Io(e)) => Err(ArchiveError::Unreadable(e)),
            Err(e) => Err(ArchiveError::Corrupt(e.to_string())),
        }
    }

    /// Skip the central directory and read local headers sequentially.
    pub fn open_streaming(
        source: &dyn BookSource,
        opts: &ArchiveOptions,
    ) -> Result<Self, ArchiveError> {
        Self::streamed(open_source(source)?, opts)
    }

    fn indexed(mut zip: zip::ZipArchive<Box<dyn ReadSeek>>) -> Result<Self, ArchiveError> {
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let file = zip.by_index_raw(i).map_err(zip_error)?;
            if file.is_dir() {
                continue;
            }
            entries.push(Entry {
                name: file.name().to_string(),
                size: file.size(),
            });
        }
        Ok(Self {
            entries,
            backend: Backend::Indexed(zip),
            truncated: false,
        })
    }

    fn streamed(
        mut source: Box<dyn ReadSeek>,
        opts: &ArchiveOptions,
    ) -> Result<Self, ArchiveError> {
        source.rewind().map_err(ArchiveError::Unreadable)?;

        let mut entries: Vec<Entry> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut contents: HashMap<String, StreamedEntry> = HashMap::new();
        let mut truncated = false;

        loop {
            let header_offset = source.stream_position().map_err(ArchiveError::Unreadable)?;
            let mut file = match zip::read::read_zipfile_from_stream(&mut source) {
                Ok(Some(file)) => file,
                // Central directory reached.
                Ok(None) => break,
                Err(e) if entries.is_empty() => return Err(zip_error(e)),
                Err(e) => {
                    tracing::warn!(
                        "Streaming read stopped after {} entries: {}",
                        entries.len(),
                        e
                    );
                    truncated = true;
                    break;
                }
            };
            if file.is_dir() {
                continue;
            }

            let name = file.name().to_string();
            let size = file.size();
            let content = if size <= opts.inline_limit_bytes {
                let mut buf = Vec::with_capacity(size as usize);
                file.read_to_end(&mut buf).map_err(|e| ArchiveError::Io {
                    name: name.clone(),
                    source: e,
                })?;
                StreamedEntry::Inline(buf)
            } else {
                StreamedEntry::Deferred { header_offset }
            };
            drop(file);

            match positions.get(&name) {
                Some(&pos) => {
                    tracing::debug!("Duplicate entry {}: keeping later copy", name);
                    entries[pos].size = size;
                }
                None => {
                    positions.insert(name.clone(), entries.len());
                    entries.push(Entry {
                        name: name.clone(),
                        size,
                    });
                }
            }
            contents.insert(name, content);
        }

        Ok(Self {
            entries,
            backend: Backend::Streamed { source, contents },
            truncated,
        })
    }

    /// Entries in container order, directories excluded.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when the archive was opened through the streaming fallback.
    pub fn recovered(&self) -> bool {
        matches!(self.backend, Backend::Streamed { .. })
    }

    /// True when the streaming read hit an unreadable local header and the
    /// entries after it are missing.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Exact name first, then a case-insensitive comparison.
    pub fn find(&self, name: &str) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .or_else(|| self.entries.iter().find(|e| e.name.eq_ignore_ascii_case(name)))
    }

    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        match &mut self.backend {
            Backend::Indexed(zip) => {
                let mut file = zip.by_name(name).map_err(|e| match e {
                    ZipError::FileNotFound => ArchiveError::EntryNotFound(name.to_string()),
                    other => zip_error(other),
                })?;
                let mut buf = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut buf).map_err(|e| ArchiveError::Io {
                    name: name.to_string(),
                    source: e,
                })?;
                Ok(buf)
            }
            Backend::Streamed { source, contents } => match contents.get(name) {
                Some(StreamedEntry::Inline(data)) => Ok(data.clone()),
                Some(StreamedEntry::Deferred { header_offset }) => {
                    read_deferred(source, *header_offset, name)
                }
                None => Err(ArchiveError::EntryNotFound(name.to_string())),
            },
        }
    }

    /// Read an entry as text. Invalid UTF-8 is replaced and a BOM is dropped.
    pub fn read_entry_string(&mut self, name: &str) -> Result<String, ArchiveError> {
        let bytes = self.read_entry(name)?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(text.strip_prefix('\u{feff}').unwrap_or(&text).to_string())
    }
}

fn open_source(source: &dyn BookSource) -> Result<Box<dyn ReadSeek>, ArchiveError> {
    source.open().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ArchiveError::NotFound(source.logical_path().to_string()),
        _ => ArchiveError::Unreadable(e),
    })
}

fn read_deferred(
    source: &mut Box<dyn ReadSeek>,
    header_offset: u64,
    name: &str,
) -> Result<Vec<u8>, ArchiveError> {
    let io_err = |e: std::io::Error| ArchiveError::Io {
        name: name.to_string(),
        source: e,
    };
    source.seek(SeekFrom::Start(header_offset)).map_err(io_err)?;
    let mut file = zip::read::read_zipfile_from_stream(source)
        .map_err(zip_error)?
        .ok_or_else(|| ArchiveError::Corrupt(format!("Local header for {name} vanished")))?;
    let mut buf = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut buf).map_err(io_err)?;
    Ok(buf)
}

/// Whether a central-directory error is the duplicate-name structural error.
pub fn is_duplicate_entry_error(err: &ZipError) -> bool {
    matches!(err, ZipError::InvalidArchive(_))
        && err.to_string().to_ascii_lowercase().contains("duplicate")
}

fn zip_error(e: ZipError) -> ArchiveError {
    match e {
        ZipError::Io(io) => ArchiveError::Unreadable(io),
        ZipError::FileNotFound => ArchiveError::Corrupt("Entry disappeared from archive".into()),
        other => ArchiveError::Corrupt(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn build_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let opts = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, data) in files {
            zip.start_file(*name, opts).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    /// Two entries whose names collide once the placeholder is rewritten.
    fn duplicate_zip() -> Vec<u8> {
        let bytes = build_zip(&[
            ("mimetype", b"application/epub+zip"),
            ("OEBPS/a.xhtml", b"first"),
            ("OEBPS/b.xhtml", b"other"),
            ("OEBPS/a.xhtmX", b"second"),
        ]);
        replace_all(&bytes, b"OEBPS/a.xhtmX", b"OEBPS/a.xhtml")
    }

    fn replace_all(haystack: &[u8], from: &[u8], to: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(haystack.len());
        let mut i = 0;
        while i < haystack.len() {
            if haystack[i..].starts_with(from) {
                out.extend_from_slice(to);
                i += from.len();
            } else {
                out.push(haystack[i]);
                i += 1;
            }
        }
        out
    }

    #[test]
    fn test_lists_entries_in_container_order() {
        let bytes = build_zip(&[("mimetype", b"x"), ("b.xhtml", b"bb"), ("a.xhtml", b"a")]);
        let archive = Archive::from_bytes(bytes, &ArchiveOptions::default()).unwrap();
        let names: Vec<&str> = archive.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["mimetype", "b.xhtml", "a.xhtml"]);
        assert_eq!(archive.entries()[1].size, 2);
        assert!(!archive.recovered());
    }

    #[test]
    fn test_read_entry_and_missing_entry() {
        let bytes = build_zip(&[("a.txt", b"hello")]);
        let mut archive = Archive::from_bytes(bytes, &ArchiveOptions::default()).unwrap();
        assert_eq!(archive.read_entry("a.txt").unwrap(), b"hello");
        assert!(matches!(
            archive.read_entry("nope.txt"),
            Err(ArchiveError::EntryNotFound(_))
        ));
    }

    #[test]
    fn test_read_entry_string_strips_bom() {
        let bytes = build_zip(&[("a.xhtml", "\u{feff}<html/>".as_bytes())]);
        let mut archive = Archive::from_bytes(bytes, &ArchiveOptions::default()).unwrap();
        assert_eq!(archive.read_entry_string("a.xhtml").unwrap(), "<html/>");
    }

    #[test]
    fn test_not_a_zip_is_corrupt() {
        let err = Archive::from_bytes(b"definitely not a zip".to_vec(), &ArchiveOptions::default())
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Corrupt(_) | ArchiveError::Unreadable(_)));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = Archive::open("/nonexistent/book.epub").unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound(_)));
    }

    #[test]
    fn test_duplicate_entries_keep_last_copy() {
        let source = MemorySource::new("dup.epub", duplicate_zip());
        let mut archive = Archive::from_source(&source, &ArchiveOptions::default()).unwrap();
        let count = archive
            .entries()
            .iter()
            .filter(|e| e.name == "OEBPS/a.xhtml")
            .count();
        assert_eq!(count, 1);
        assert_eq!(archive.read_entry("OEBPS/a.xhtml").unwrap(), b"second");
        assert_eq!(archive.read_entry("OEBPS/b.xhtml").unwrap(), b"other");
    }

    #[test]
    fn test_streaming_read_matches_indexed_contract() {
        let bytes = build_zip(&[("mimetype", b"application/epub+zip"), ("a.xhtml", b"abc")]);
        let source = MemorySource::new("book.epub", bytes);
        let mut indexed = Archive::from_source(&source, &ArchiveOptions::default()).unwrap();
        let mut streamed = Archive::open_streaming(&source, &ArchiveOptions::default()).unwrap();
        assert!(streamed.recovered());
        assert_eq!(indexed.entries(), streamed.entries());
        assert_eq!(
            indexed.read_entry("a.xhtml").unwrap(),
            streamed.read_entry("a.xhtml").unwrap()
        );
    }

    #[test]
    fn test_streaming_defers_large_entries() {
        let big = vec![b'z'; 64];
        let bytes = build_zip(&[("small.txt", b"ok"), ("big.bin", &big)]);
        let source = MemorySource::new("book.epub", bytes);
        let opts = ArchiveOptions {
            recover_duplicates: true,
            inline_limit_bytes: 8,
        };
        let mut archive = Archive::open_streaming(&source, &opts).unwrap();
        assert_eq!(archive.read_entry("big.bin").unwrap(), big);
        assert_eq!(archive.read_entry("small.txt").unwrap(), b"ok");
        // Deferred entries can be read more than once.
        assert_eq!(archive.read_entry("big.bin").unwrap().len(), 64);
    }

    #[test]
    fn test_streaming_duplicates_last_write_wins() {
        let source = MemorySource::new("dup.epub", duplicate_zip());
        let mut archive = Archive::open_streaming(&source, &ArchiveOptions::default()).unwrap();
        let names: Vec<&str> = archive.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["mimetype", "OEBPS/a.xhtml", "OEBPS/b.xhtml"]);
        assert_eq!(archive.read_entry("OEBPS/a.xhtml").unwrap(), b"second");
    }

    #[test]
    fn test_streaming_stops_at_bad_header_and_flags_truncation() {
        let bytes = build_zip(&[("a.txt", b"one"), ("b.txt", b"two"), ("c.txt", b"three")]);
        let second = bytes
            .windows(4)
            .enumerate()
            .filter(|(_, w)| *w == b"PK\x03\x04")
            .nth(1)
            .map(|(i, _)| i)
            .unwrap();
        let mut broken = bytes.clone();
        broken[second + 2..second + 4].copy_from_slice(b"\x09\x09");

        let source = MemorySource::new("broken.epub", broken);
        let mut archive = Archive::open_streaming(&source, &ArchiveOptions::default()).unwrap();
        assert!(archive.truncated());
        let names: Vec<&str> = archive.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt"]);
        assert_eq!(archive.read_entry("a.txt").unwrap(), b"one");

        let intact = MemorySource::new("book.epub", bytes);
        assert!(!Archive::open_streaming(&intact, &ArchiveOptions::default())
            .unwrap()
            .truncated());
    }

    #[test]
    fn test_find_is_case_insensitive_fallback() {
        let bytes = build_zip(&[("OEBPS/Content.opf", b"x")]);
        let archive = Archive::from_bytes(bytes, &ArchiveOptions::default()).unwrap();
        assert_eq!(archive.find("oebps/content.opf").unwrap().name, "OEBPS/Content.opf");
        assert!(archive.find("missing").is_none());
    }
}
