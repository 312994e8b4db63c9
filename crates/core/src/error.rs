use crate::cancel::Cancelled;

/// Top-level error type. All public API functions return this or one of its parts.
#[derive(Debug, thiserror::Error)]
pub enum EbookError {
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Pagination error: {0}")]
    Pagination(#[from] PaginationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Import failed: {0}")]
    Import(#[from] ImportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Unreadable archive: {0}")]
    Unreadable(#[source] std::io::Error),

    #[error("Corrupt archive: {0}")]
    Corrupt(String),

    #[error("Entry not found in archive: {0}")]
    EntryNotFound(String),

    #[error("Failed to read entry {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("No chapters found in spine or content files")]
    NoChapters,

    #[error("No readable text in any chapter")]
    NoContent,

    #[error("Malformed {file}: {detail}")]
    Malformed { file: String, detail: String },

    #[error("Container diagnostics reported {count} issue(s)")]
    Diagnostics { count: usize },

    #[error("Extraction worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("No package document found")]
    NoManifest,

    #[error("Malformed package document: {0}")]
    Malformed(String),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

#[derive(Debug, thiserror::Error)]
pub enum PaginationError {
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error("Viewport {width}x{height} leaves no room for content")]
    InvalidViewport { width: f32, height: f32 },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// User-facing import failure. The underlying cause is kept for logs only.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Could not add this book")]
    CouldNotAdd {
        path: String,
        #[source]
        source: Box<EbookError>,
    },
}

impl ImportError {
    pub fn could_not_add(path: &str, source: impl Into<EbookError>) -> Self {
        Self::CouldNotAdd {
            path: path.to_string(),
            source: Box::new(source.into()),
        }
    }
}
