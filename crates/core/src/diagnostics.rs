//! Structural checks run on a container before full parsing.
//!
//! Every check runs independently and reports through the returned
//! [`Diagnosis`]; nothing here aborts a parse. Callers decide whether an
//! invalid container is fatal.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

use crate::archive::Archive;
use crate::paths;

pub const MIMETYPE_ENTRY: &str = "mimetype";
pub const CONTAINER_ENTRY: &str = "META-INF/container.xml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsLimits {
    /// Longest accepted entry name in bytes.
    pub max_name_len: usize,
    /// Maximum uncompressed size of a single entry in bytes.
    pub max_entry_bytes: u64,
    /// Maximum number of entries in the container.
    pub max_entries: usize,
}

impl Default for DiagnosticsLimits {
    fn default() -> Self {
        Self {
            max_name_len: 255,
            max_entry_bytes: 200 * 1024 * 1024, // 200 MB
            max_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    MissingManifest,
    AmbiguousManifest,
    MissingMimetype,
    MissingContainer,
    NoContent,
    MaliciousPath,
    OversizedName,
    OversizedEntry,
    TooManyEntries,
    TruncatedArchive,
}

impl IssueKind {
    pub fn code(&self) -> &'static str {
        match self {
            IssueKind::MissingManifest => "missing-manifest",
            IssueKind::AmbiguousManifest => "ambiguous-manifest",
            IssueKind::MissingMimetype => "missing-mimetype",
            IssueKind::MissingContainer => "missing-container",
            IssueKind::NoContent => "no-content",
            IssueKind::MaliciousPath => "malicious-path",
            IssueKind::OversizedName => "oversized-name",
            IssueKind::OversizedEntry => "oversized-entry",
            IssueKind::TooManyEntries => "too-many-entries",
            IssueKind::TruncatedArchive => "truncated-archive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    /// Offending entry, for per-entry checks.
    pub entry: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureSummary {
    pub entry_count: usize,
    pub manifest_entries: Vec<String>,
    pub content_entries: usize,
    pub image_entries: usize,
    pub total_uncompressed_bytes: u64,
    pub has_mimetype: bool,
    pub has_container: bool,
    pub recovered: bool,
    /// Streaming recovery stopped before the end of the container.
    pub truncated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub valid: bool,
    pub issues: Vec<Issue>,
    pub structure: StructureSummary,
}

impl Diagnosis {
    pub fn has(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }
}

pub fn diagnose(archive: &Archive, limits: &DiagnosticsLimits) -> Diagnosis {
    let mut issues = Vec::new();
    let mut structure = StructureSummary {
        entry_count: archive.len(),
        recovered: archive.recovered(),
        truncated: archive.truncated(),
        ..StructureSummary::default()
    };

    for entry in archive.entries() {
        let name = entry.name.as_str();
        structure.total_uncompressed_bytes =
            structure.total_uncompressed_bytes.saturating_add(entry.size);

        if paths::is_package_document(name) {
            structure.manifest_entries.push(name.to_string());
        }
        if paths::is_content_markup(name) {
            structure.content_entries += 1;
        }
        if paths::is_image(name) {
            structure.image_entries += 1;
        }
        if name == MIMETYPE_ENTRY {
            structure.has_mimetype = true;
        }
        if name.eq_ignore_ascii_case(CONTAINER_ENTRY) {
            structure.has_container = true;
        }

        if is_malicious_path(name) {
            issues.push(entry_issue(IssueKind::MaliciousPath, name));
        }
        if name.len() > limits.max_name_len {
            issues.push(entry_issue(IssueKind::OversizedName, name));
        }
        if entry.size > limits.max_entry_bytes {
            issues.push(entry_issue(IssueKind::OversizedEntry, name));
        }
    }

    match structure.manifest_entries.len() {
        0 => issues.push(container_issue(IssueKind::MissingManifest)),
        1 => {}
        _ => issues.push(container_issue(IssueKind::AmbiguousManifest)),
    }
    if !structure.has_mimetype {
        issues.push(container_issue(IssueKind::MissingMimetype));
    }
    if !structure.has_container {
        issues.push(container_issue(IssueKind::MissingContainer));
    }
    if structure.content_entries == 0 {
        issues.push(container_issue(IssueKind::NoContent));
    }
    if structure.entry_count > limits.max_entries {
        issues.push(container_issue(IssueKind::TooManyEntries));
    }
    if structure.truncated {
        issues.push(container_issue(IssueKind::TruncatedArchive));
    }

    Diagnosis {
        valid: issues.is_empty(),
        issues,
        structure,
    }
}

fn entry_issue(kind: IssueKind, name: &str) -> Issue {
    Issue {
        kind,
        entry: Some(name.to_string()),
    }
}

fn container_issue(kind: IssueKind) -> Issue {
    Issue { kind, entry: None }
}

/// Parent references, absolute paths, drive letters and backslash separators.
pub fn is_malicious_path(entry_path: &str) -> bool {
    if entry_path.starts_with('/') || entry_path.contains('\\') {
        return true;
    }

    // Windows absolute paths (e.g., C:)
    if entry_path.len() >= 2 && entry_path.as_bytes()[1] == b':' {
        return true;
    }

    if entry_path.split('/').any(|segment| segment == "..") {
        return true;
    }

    Path::new(entry_path)
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
}
