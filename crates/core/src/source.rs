//! Byte sources an archive can be opened from.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::PathBuf;
use std::sync::Arc;

/// Readable, seekable byte stream that can move to a worker thread.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Opaque provider of book bytes. `open` may be called more than once per
/// parse (the duplicate-entry recovery path re-reads from the start).
pub trait BookSource: Send + Sync {
    fn open(&self) -> std::io::Result<Box<dyn ReadSeek>>;

    /// Name shown to the user, usually the file name.
    fn display_name(&self) -> &str;

    /// Stable location of the book (file path, cache key).
    fn logical_path(&self) -> &str;
}

/// A book stored on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    display_name: String,
    logical_path: String,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let logical_path = path.display().to_string();
        Self {
            path,
            display_name,
            logical_path,
        }
    }
}

impl BookSource for FileSource {
    fn open(&self) -> std::io::Result<Box<dyn ReadSeek>> {
        let file = File::open(&self.path)?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn logical_path(&self) -> &str {
        &self.logical_path
    }
}

/// A book already held in memory (downloads, caches, tests).
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    data: Arc<[u8]>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl BookSource for MemorySource {
    fn open(&self) -> std::io::Result<Box<dyn ReadSeek>> {
        Ok(Box::new(Cursor::new(Arc::clone(&self.data))))
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn logical_path(&self) -> &str {
        &self.name
    }
}
