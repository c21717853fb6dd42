//! Runtime event stream payloads.

use crate::types::OpId;

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEvent {
    /// A standalone operation was committed.
    Executed {
        /// Operation id.
        id: OpId,
    },
    /// An operation joined the open composite.
    SubOperationRecorded {
        /// Open composite id.
        composite: OpId,
        /// Operation id.
        id: OpId,
    },
    /// A composite was opened.
    CompositeOpened {
        /// Transaction id.
        id: OpId,
    },
    /// A composite was committed as one undo step.
    CompositeSealed {
        /// Transaction id.
        id: OpId,
    },
    /// An empty composite was dropped.
    CompositeDiscarded,
    /// One undo step was applied.
    UndoApplied {
        /// Cursor afterwards.
        cursor: Option<usize>,
    },
    /// One redo step was applied.
    RedoApplied {
        /// Cursor afterwards.
        cursor: Option<usize>,
    },
    /// The cursor jumped.
    Jumped {
        /// Cursor afterwards.
        cursor: Option<usize>,
    },
    /// All entries were dropped.
    Cleared,
    /// A cleanup pass ran.
    CleanupCompleted {
        /// Entries evicted.
        evicted: usize,
        /// Retained bytes afterwards.
        usage: usize,
        /// True when triggered by the auto-cleanup timer.
        automatic: bool,
    },
    /// Statistics were restored from an export.
    Imported,
    /// Configuration changed.
    ConfigUpdated,
}
