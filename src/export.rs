//! Pixel-free export and import of history metadata.
//!
//! An export is a structural record of the log, not a restore point: every
//! snapshot is reduced to its shape and the pixel payload is left out.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    core::{stack::HistoryStack, stats::HistoryStats},
    op::{HistoryEntry, OperationRecord},
    snapshot::Snapshot,
    types::{now_ms, Metadata, OpId, OpType},
};

/// Version number for serialized [`HistoryExport`] documents.
pub const EXPORT_FORMAT_VERSION: u16 = 1;

/// Export encode/decode failures.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Not valid JSON or wrong shape.
    #[error("malformed history export: {0}")]
    Json(#[from] serde_json::Error),
    /// Written by a newer or unknown format.
    #[error("unsupported export format version {0}")]
    UnsupportedVersion(u16),
    /// Cursor does not address an exported entry.
    #[error("cursor {cursor} out of range for {len} entries")]
    CursorOutOfRange {
        /// Exported cursor.
        cursor: i64,
        /// Exported entry count.
        len: usize,
    },
}

/// Placeholder for a snapshot whose pixels were not exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotShape {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Byte length of the omitted buffer.
    pub byte_len: usize,
    /// Whether the omitted buffer was codec output.
    pub compressed: bool,
}

impl From<&Snapshot> for SnapshotShape {
    fn from(snap: &Snapshot) -> Self {
        Self {
            width: snap.width(),
            height: snap.height(),
            byte_len: snap.size_bytes(),
            compressed: snap.is_compressed(),
        }
    }
}

/// One exported record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedEntry {
    /// Record id.
    pub id: OpId,
    /// Record kind.
    #[serde(rename = "type")]
    pub op_type: OpType,
    /// Creation time in milliseconds since epoch.
    pub timestamp: u64,
    /// Human-readable label.
    pub description: String,
    /// Metadata bag, instrumentation included.
    #[serde(default)]
    pub metadata: Metadata,
    /// Retained bytes at export time.
    pub memory_cost: usize,
    /// Informational payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Shape of the omitted `before` snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<SnapshotShape>,
    /// Shape of the omitted `after` snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<SnapshotShape>,
    /// Composite children, empty for single edits.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_operations: Vec<ExportedEntry>,
}

impl ExportedEntry {
    fn from_record(rec: &OperationRecord, memory_cost: usize) -> Self {
        Self {
            id: rec.id,
            op_type: rec.op_type,
            timestamp: rec.timestamp_ms,
            description: rec.description.clone(),
            metadata: rec.metadata.clone(),
            memory_cost,
            payload: rec.payload.clone(),
            before: Some(rec.before().into()),
            after: Some(rec.after().into()),
            sub_operations: Vec::new(),
        }
    }

    fn from_entry(entry: &HistoryEntry) -> Self {
        let mut out = Self::from_record(entry.record(), entry.memory_cost());
        out.sub_operations = entry
            .sub_operations()
            .iter()
            .map(|rec| Self::from_record(rec, rec.memory_cost()))
            .collect();
        out
    }
}

/// Structural history document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryExport {
    /// Document format version.
    pub format_version: u16,
    /// Export time in milliseconds since epoch.
    #[serde(default)]
    pub exported_at_ms: u64,
    /// Entries oldest first.
    pub entries: Vec<ExportedEntry>,
    /// Cursor, `-1` for the virgin state.
    pub cursor: i64,
    /// Aggregate counters.
    #[serde(default)]
    pub stats: HistoryStats,
}

impl HistoryExport {
    /// Captures the stack's structure without pixel data.
    pub fn from_stack(stack: &HistoryStack) -> Self {
        Self {
            format_version: EXPORT_FORMAT_VERSION,
            exported_at_ms: now_ms(),
            entries: stack.entries().map(ExportedEntry::from_entry).collect(),
            cursor: cursor_to_wire(stack.cursor()),
            stats: stack.stats().clone(),
        }
    }

    /// Serializes the document as JSON.
    pub fn to_json_vec(&self) -> Result<Vec<u8>, ExportError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses and validates a document.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, ExportError> {
        let doc: Self = serde_json::from_slice(bytes)?;
        if doc.format_version == 0 || doc.format_version > EXPORT_FORMAT_VERSION {
            return Err(ExportError::UnsupportedVersion(doc.format_version));
        }
        cursor_from_wire(doc.cursor, doc.entries.len())?;
        Ok(doc)
    }

    /// Validated cursor as an index.
    pub fn cursor_index(&self) -> Option<usize> {
        cursor_from_wire(self.cursor, self.entries.len()).ok().flatten()
    }
}

/// `None` maps to `-1`.
pub fn cursor_to_wire(cursor: Option<usize>) -> i64 {
    cursor.map_or(-1, |c| c as i64)
}

/// Accepts `-1..len` only.
pub fn cursor_from_wire(cursor: i64, len: usize) -> Result<Option<usize>, ExportError> {
    match cursor {
        -1 => Ok(None),
        c if c >= 0 && (c as u64) < len as u64 => Ok(Some(c as usize)),
        _ => Err(ExportError::CursorOutOfRange { cursor, len }),
    }
}
