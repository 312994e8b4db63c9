//! Whole-file readers that turn a container into a paginatable
//! [`Document`](crate::document::Document).

pub mod epub;

use serde::{Deserialize, Serialize};

use crate::archive::ArchiveOptions;
use crate::diagnostics::DiagnosticsLimits;
use crate::extract::DEFAULT_MAX_WORKERS;

/// What to do when container diagnostics report issues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticsPolicy {
    /// Log the issues and keep going; the file-name ordering is the recovery path.
    #[default]
    BestEffort,
    /// Abort the parse with `ParseError::Diagnostics`.
    Strict,
}

#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub archive: ArchiveOptions,
    pub limits: DiagnosticsLimits,
    pub diagnostics_policy: DiagnosticsPolicy,
    /// Size of the chapter extraction pool.
    pub max_workers: usize,
    /// Use the navigation document for chapter titles.
    pub use_toc: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            archive: ArchiveOptions::default(),
            limits: DiagnosticsLimits::default(),
            diagnostics_policy: DiagnosticsPolicy::default(),
            max_workers: DEFAULT_MAX_WORKERS,
            use_toc: true,
        }
    }
}
