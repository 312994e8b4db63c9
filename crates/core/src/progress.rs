//! Progress reporting trait and events for long-running operations.

use serde::{Deserialize, Serialize};

/// Event emitted during long-running operations.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub operation: String,
    pub current: u64,
    pub total: Option<u64>,
    pub message: Option<String>,
}

/// Trait for receiving progress updates. Implement this to integrate with
/// progress bars or UI status displays.
pub trait ProgressHandler: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

/// Helper to emit a progress event if a handler is provided.
pub fn emit_progress(
    handler: Option<&dyn ProgressHandler>,
    operation: &str,
    current: u64,
    total: Option<u64>,
    message: Option<&str>,
) {
    if let Some(h) = handler {
        h.on_progress(ProgressEvent {
            operation: operation.to_string(),
            current,
            total,
            message: message.map(|s| s.to_string()),
        });
    }
}

/// Stages of a whole-file parse, in the order they are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParsePhase {
    Idle,
    ContainerOpened,
    DiagnosticsPassed,
    DiagnosticsFailed,
    ChaptersResolved,
    ChaptersExtracted,
    Validated,
    Done,
}

impl ParsePhase {
    pub const OPERATION: &'static str = "Parsing book";

    /// Step number reported as `ProgressEvent::current`.
    pub fn step(&self) -> u64 {
        match self {
            ParsePhase::Idle => 0,
            ParsePhase::ContainerOpened => 1,
            ParsePhase::DiagnosticsPassed | ParsePhase::DiagnosticsFailed => 2,
            ParsePhase::ChaptersResolved => 3,
            ParsePhase::ChaptersExtracted => 4,
            ParsePhase::Validated => 5,
            ParsePhase::Done => 6,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ParsePhase::Idle => "Idle",
            ParsePhase::ContainerOpened => "Container opened",
            ParsePhase::DiagnosticsPassed => "Diagnostics passed",
            ParsePhase::DiagnosticsFailed => "Diagnostics failed, continuing",
            ParsePhase::ChaptersResolved => "Chapters resolved",
            ParsePhase::ChaptersExtracted => "Chapters extracted",
            ParsePhase::Validated => "Validated",
            ParsePhase::Done => "Done",
        }
    }

    pub const TOTAL_STEPS: u64 = 6;

    pub fn emit(self, handler: Option<&dyn ProgressHandler>) {
        tracing::debug!("Parse phase: {:?}", self);
        emit_progress(
            handler,
            Self::OPERATION,
            self.step(),
            Some(Self::TOTAL_STEPS),
            Some(self.label()),
        );
    }
}
