//! Config file parsing for `~/.config/folio/config.toml`.
//!
//! Use the `*_from_config` builders to turn the loaded config into the
//! option structs the reader, metadata extractor and paginator take.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archive::ArchiveOptions;
use crate::diagnostics::DiagnosticsLimits;
use crate::error::ConfigError;
use crate::layout::{PaginationOptions, Typography};
use crate::metadata::MetadataOptions;
use crate::readers::{DiagnosticsPolicy, ParseOptions};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub recover_duplicates: Option<bool>,
    pub inline_limit_kb: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    #[serde(default)]
    pub policy: DiagnosticsPolicy,
    pub max_name_len: Option<usize>,
    pub max_entry_size_mb: Option<u64>,
    pub max_entries: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub max_workers: Option<usize>,
    #[serde(default = "default_true")]
    pub use_toc: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_workers: None,
            use_toc: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub font_size: Option<f32>,
    pub line_height: Option<f32>,
    pub indent: Option<f32>,
    pub horizontal_padding: Option<f32>,
    pub vertical_padding: Option<f32>,
    pub block_spacing: Option<f32>,
    pub heading_scale: Option<f32>,
    pub max_pages: Option<usize>,
    pub marker_margin: Option<f32>,
    pub image_height: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_true")]
    pub extract_cover: bool,
    pub unknown_author: Option<String>,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            extract_cover: true,
            unknown_author: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Load config from the default path (`~/.config/folio/config.toml`).
pub fn load_config() -> AppConfig {
    let Some(path) = config_path() else {
        return AppConfig::default();
    };
    match load_config_from(&path) {
        Ok(cfg) => cfg,
        Err(ConfigError::Io(_)) => AppConfig::default(),
        Err(e) => {
            tracing::warn!("Ignoring {}: {}", path.display(), e);
            AppConfig::default()
        }
    }
}

/// Load config from an explicit path. Unlike [`load_config`], failures are reported.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str::<AppConfig>(&content)?)
}

/// Write `cfg` to `path`, creating parent directories.
pub fn save_config(cfg: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(cfg)?)?;
    Ok(())
}

/// Return the default config file path (for init and show).
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut p| {
        p.push("folio");
        p.push("config.toml");
        p
    })
}

pub fn archive_options_from_config(c: &ArchiveConfig) -> ArchiveOptions {
    let mut opts = ArchiveOptions::default();
    if let Some(recover) = c.recover_duplicates {
        opts.recover_duplicates = recover;
    }
    if let Some(kb) = c.inline_limit_kb {
        opts.inline_limit_bytes = kb.saturating_mul(1024);
    }
    opts
}

/// Build diagnostics limits from config. Uses defaults for any unset values.
pub fn diagnostics_limits_from_config(c: &DiagnosticsConfig) -> DiagnosticsLimits {
    let mut limits = DiagnosticsLimits::default();
    if let Some(len) = c.max_name_len {
        limits.max_name_len = len;
    }
    if let Some(mb) = c.max_entry_size_mb {
        limits.max_entry_bytes = mb.saturating_mul(1024).saturating_mul(1024);
    }
    if let Some(n) = c.max_entries {
        limits.max_entries = n;
    }
    limits
}

/// Build parse options from full app config (archive + diagnostics + extraction).
pub fn parse_options_from_config(cfg: &AppConfig) -> ParseOptions {
    let defaults = ParseOptions::default();
    ParseOptions {
        archive: archive_options_from_config(&cfg.archive),
        limits: diagnostics_limits_from_config(&cfg.diagnostics),
        diagnostics_policy: cfg.diagnostics.policy,
        max_workers: cfg
            .extraction
            .max_workers
            .filter(|&n| n > 0)
            .unwrap_or(defaults.max_workers),
        use_toc: cfg.extraction.use_toc,
    }
}

pub fn typography_from_config(c: &PaginationConfig) -> Typography {
    let d = Typography::default();
    Typography {
        font_size: c.font_size.unwrap_or(d.font_size),
        line_height: c.line_height.unwrap_or(d.line_height),
        indent: c.indent.unwrap_or(d.indent),
        horizontal_padding: c.horizontal_padding.unwrap_or(d.horizontal_padding),
        vertical_padding: c.vertical_padding.unwrap_or(d.vertical_padding),
        block_spacing: c.block_spacing.unwrap_or(d.block_spacing),
        heading_scale: c.heading_scale.unwrap_or(d.heading_scale),
    }
}

pub fn pagination_options_from_config(c: &PaginationConfig) -> PaginationOptions {
    let d = PaginationOptions::default();
    PaginationOptions {
        max_pages: c.max_pages.unwrap_or(d.max_pages),
        marker_margin: c.marker_margin.unwrap_or(d.marker_margin),
        image_height: c.image_height.unwrap_or(d.image_height),
        spaces_per_em: d.spaces_per_em,
    }
}

pub fn metadata_options_from_config(c: &MetadataConfig) -> MetadataOptions {
    let mut opts = MetadataOptions {
        extract_cover: c.extract_cover,
        ..MetadataOptions::default()
    };
    if let Some(author) = c.unknown_author.as_deref().map(str::trim) {
        if !author.is_empty() {
            opts.unknown_author = author.to_string();
        }
    }
    opts
}
