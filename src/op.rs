//! Operation records, composite transactions, and history entries.

use serde::{Deserialize, Serialize};

use crate::{
    snapshot::Snapshot,
    types::{now_ms, Metadata, OpId, OpType},
};

/// One undoable edit with its before/after captures.
#[derive(Debug, Clone)]
pub struct OperationRecord {
    /// Unique identifier.
    pub id: OpId,
    /// Edit kind.
    pub op_type: OpType,
    /// Wall-clock creation time in milliseconds since epoch.
    pub timestamp_ms: u64,
    /// Human-readable label.
    pub description: String,
    /// Open key-value bag; instrumentation writes under `perf`.
    pub metadata: Metadata,
    /// Operation parameters kept for inspection, never replayed.
    pub payload: Option<serde_json::Value>,
    before: Snapshot,
    after: Snapshot,
    memory_cost: usize,
}

impl OperationRecord {
    /// Creates a record and caches its memory cost.
    pub fn new(
        id: OpId,
        op_type: OpType,
        description: impl Into<String>,
        before: Snapshot,
        after: Snapshot,
    ) -> Self {
        let memory_cost = before.size_bytes() + after.size_bytes();
        Self {
            id,
            op_type,
            timestamp_ms: now_ms(),
            description: description.into(),
            metadata: Metadata::new(),
            payload: None,
            before,
            after,
            memory_cost,
        }
    }

    /// Sets the informational payload.
    pub fn with_payload(mut self, payload: Option<serde_json::Value>) -> Self {
        self.payload = payload;
        self
    }

    /// Replaces the metadata bag.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Surface state before the edit.
    pub fn before(&self) -> &Snapshot {
        &self.before
    }

    /// Surface state after the edit.
    pub fn after(&self) -> &Snapshot {
        &self.after
    }

    /// `size(before) + size(after)` in bytes.
    pub fn memory_cost(&self) -> usize {
        self.memory_cost
    }
}

/// Sealed group of sub-operations committed as one undo step.
#[derive(Debug, Clone)]
pub struct CompositeRecord {
    header: OperationRecord,
    sub_operations: Vec<OperationRecord>,
}

impl CompositeRecord {
    /// Returns `None` for an empty group, which is never committed.
    pub fn new(header: OperationRecord, sub_operations: Vec<OperationRecord>) -> Option<Self> {
        if sub_operations.is_empty() {
            return None;
        }
        Some(Self {
            header,
            sub_operations,
        })
    }

    /// Record spanning open (`before`) to seal (`after`).
    pub fn header(&self) -> &OperationRecord {
        &self.header
    }

    /// Sub-operations in execution order.
    pub fn sub_operations(&self) -> &[OperationRecord] {
        &self.sub_operations
    }

    /// Own snapshots plus every retained sub-operation snapshot.
    pub fn memory_cost(&self) -> usize {
        self.header.memory_cost()
            + self
                .sub_operations
                .iter()
                .map(OperationRecord::memory_cost)
                .sum::<usize>()
    }
}

/// Element of the history stack.
#[derive(Debug, Clone)]
pub enum HistoryEntry {
    /// Single edit.
    Operation(OperationRecord),
    /// Composite transaction.
    Composite(CompositeRecord),
}

impl HistoryEntry {
    /// Top-level record; the header for composites.
    pub fn record(&self) -> &OperationRecord {
        match self {
            Self::Operation(rec) => rec,
            Self::Composite(comp) => &comp.header,
        }
    }

    /// Top-level id.
    pub fn id(&self) -> OpId {
        self.record().id
    }

    /// Top-level kind.
    pub fn op_type(&self) -> OpType {
        self.record().op_type
    }

    /// Top-level label.
    pub fn description(&self) -> &str {
        &self.record().description
    }

    /// Snapshot restored by undo.
    pub fn before(&self) -> &Snapshot {
        self.record().before()
    }

    /// Snapshot restored by redo and jump.
    pub fn after(&self) -> &Snapshot {
        self.record().after()
    }

    /// Retained bytes, sub-operations included.
    pub fn memory_cost(&self) -> usize {
        match self {
            Self::Operation(rec) => rec.memory_cost(),
            Self::Composite(comp) => comp.memory_cost(),
        }
    }

    /// Empty for single operations.
    pub fn sub_operations(&self) -> &[OperationRecord] {
        match self {
            Self::Operation(_) => &[],
            Self::Composite(comp) => comp.sub_operations(),
        }
    }

    /// Ids of the entry and all of its sub-operations.
    pub fn ids(&self) -> impl Iterator<Item = OpId> + '_ {
        std::iter::once(self.id()).chain(self.sub_operations().iter().map(|rec| rec.id))
    }

    /// Looks up the entry itself or one of its sub-operations.
    pub fn find(&self, id: OpId) -> Option<&OperationRecord> {
        if self.id() == id {
            return Some(self.record());
        }
        self.sub_operations().iter().find(|rec| rec.id == id)
    }

    pub(crate) fn find_mut(&mut self, id: OpId) -> Option<&mut OperationRecord> {
        match self {
            Self::Operation(rec) => (rec.id == id).then_some(rec),
            Self::Composite(comp) => {
                if comp.header.id == id {
                    return Some(&mut comp.header);
                }
                comp.sub_operations.iter_mut().find(|rec| rec.id == id)
            }
        }
    }

    /// Pixel-free listing row.
    pub fn summary(&self, applied: bool) -> EntrySummary {
        let rec = self.record();
        EntrySummary {
            id: rec.id,
            op_type: rec.op_type,
            timestamp_ms: rec.timestamp_ms,
            description: rec.description.clone(),
            memory_cost: self.memory_cost(),
            sub_operations: self.sub_operations().len(),
            applied,
        }
    }
}

/// Lightweight listing of one history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySummary {
    /// Entry id.
    pub id: OpId,
    /// Entry kind.
    pub op_type: OpType,
    /// Creation time in milliseconds since epoch.
    pub timestamp_ms: u64,
    /// Human-readable label.
    pub description: String,
    /// Retained bytes including sub-operations.
    pub memory_cost: usize,
    /// Number of sub-operations (0 for single edits).
    pub sub_operations: usize,
    /// True when the entry is at or before the cursor.
    pub applied: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(fill: u8) -> Snapshot {
        Snapshot::new(2, 2, vec![fill; 16]).unwrap()
    }

    fn record(id: OpId) -> OperationRecord {
        OperationRecord::new(id, OpType::Draw, format!("op {id}"), snap(0), snap(1))
    }

    #[test]
    fn memory_cost_is_cached_sum_of_snapshots() {
        assert_eq!(record(1).memory_cost(), 32);
    }

    #[test]
    fn empty_composite_is_rejected() {
        let header = OperationRecord::new(1, OpType::Composite, "drag", snap(0), snap(0));
        assert!(CompositeRecord::new(header, Vec::new()).is_none());
    }

    #[test]
    fn composite_cost_includes_sub_operations() {
        let header = OperationRecord::new(10, OpType::Composite, "drag", snap(0), snap(3));
        let comp = CompositeRecord::new(header, vec![record(11), record(12)]).unwrap();
        let entry = HistoryEntry::Composite(comp);

        assert_eq!(entry.memory_cost(), 32 * 3);
        assert_eq!(entry.ids().collect::<Vec<_>>(), vec![10, 11, 12]);
        assert_eq!(entry.find(12).map(|r| r.description.as_str()), Some("op 12"));
        assert!(entry.find(13).is_none());

        let summary = entry.summary(true);
        assert_eq!(summary.sub_operations, 2);
        assert_eq!(summary.op_type, OpType::Composite);
    }
}
