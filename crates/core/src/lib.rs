pub mod archive;
pub mod cancel;
pub mod config;
pub mod cover;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod extract;
pub mod import;
pub mod layout;
pub mod markup;
pub mod metadata;
pub mod package;
pub mod paths;
pub mod progress;
pub mod readers;
pub mod source;
pub mod stats;
pub mod toc;

pub mod prelude {
    pub use crate::cancel::CancelToken;
    pub use crate::document::*;
    pub use crate::error::*;
    pub use crate::import::{import_book, ImportedBook};
    pub use crate::layout::{compute_pages, PaginationOptions, Typography, Viewport};
    pub use crate::readers::epub::parse_book;
    pub use crate::readers::ParseOptions;
    pub use crate::source::{BookSource, FileSource, MemorySource};
}
