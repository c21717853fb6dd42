use std::collections::VecDeque;

use tracing::debug;

use crate::{
    op::{EntrySummary, HistoryEntry, OperationRecord},
    snapshot::Snapshot,
    types::OpId,
};

use super::{indices::SeqIndex, stats::HistoryStats};

/// What a push displaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PushOutcome {
    /// Redo-tail entries truncated before the append.
    pub discarded_redo: usize,
    /// Entries dropped to honor the size cap.
    pub evicted: usize,
}

/// Ordered log of entries plus the cursor marking the applied prefix.
///
/// `cursor == None` is the virgin state before the first entry. The stack
/// never touches the surface; callers apply the snapshot returned by the
/// `*_target` methods and then commit the transition.
#[derive(Debug)]
pub struct HistoryStack {
    entries: VecDeque<HistoryEntry>,
    cursor: Option<usize>,
    max_entries: usize,
    memory_usage: usize,
    base_seq: u64,
    index: SeqIndex,
    stats: HistoryStats,
}

impl HistoryStack {
    /// Empty stack holding at most `max_entries` entries (at least 1).
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: None,
            max_entries: max_entries.max(1),
            memory_usage: 0,
            base_seq: 0,
            index: SeqIndex::new(),
            stats: HistoryStats::default(),
        }
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are retained.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the last applied entry.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// True when an entry is applied.
    pub fn can_undo(&self) -> bool {
        self.cursor.is_some()
    }

    /// True when entries follow the cursor.
    pub fn can_redo(&self) -> bool {
        match self.cursor {
            Some(c) => c + 1 < self.entries.len(),
            None => !self.entries.is_empty(),
        }
    }

    /// Current size cap.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Sum of entry costs in bytes.
    pub fn memory_usage(&self) -> usize {
        self.memory_usage
    }

    /// Lifetime counters.
    pub fn stats(&self) -> &HistoryStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut HistoryStats {
        &mut self.stats
    }

    pub(crate) fn restore_stats(&mut self, stats: HistoryStats) {
        self.stats = stats;
    }

    /// Entries oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.entries.iter()
    }

    /// Entry at `index`.
    pub fn entry(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    /// Finds a top-level entry or composite sub-operation by id.
    pub fn get(&self, id: OpId) -> Option<&OperationRecord> {
        let pos = self.position_of(id)?;
        self.entries.get(pos)?.find(id)
    }

    pub(crate) fn get_mut(&mut self, id: OpId) -> Option<&mut OperationRecord> {
        let pos = self.position_of(id)?;
        self.entries.get_mut(pos)?.find_mut(id)
    }

    /// Current index of the entry containing `id`.
    pub fn position_of(&self, id: OpId) -> Option<usize> {
        let seq = *self.index.get(&id)?;
        let pos = seq.checked_sub(self.base_seq)?;
        usize::try_from(pos).ok().filter(|p| *p < self.entries.len())
    }

    /// Listing rows, oldest first.
    pub fn summaries(&self) -> Vec<EntrySummary> {
        self.entries
            .iter()
            .enumerate()
            .map(|(pos, entry)| entry.summary(self.cursor.is_some_and(|c| pos <= c)))
            .collect()
    }

    /// Truncates the redo tail, appends, moves the cursor to the new entry,
    /// then enforces the size cap.
    pub fn push(&mut self, entry: HistoryEntry) -> PushOutcome {
        let discarded_redo = self.truncate_redo_tail();

        let seq = self.base_seq + self.entries.len() as u64;
        for id in entry.ids() {
            self.index.insert(id, seq);
        }
        self.memory_usage += entry.memory_cost();
        debug!(
            id = entry.id(),
            op_type = %entry.op_type(),
            cost = entry.memory_cost(),
            "history push"
        );
        self.entries.push_back(entry);
        self.cursor = Some(self.entries.len() - 1);
        self.stats.total_operations += 1;
        self.stats.peak_memory_bytes = self.stats.peak_memory_bytes.max(self.memory_usage as u64);

        let evicted = self.enforce_cap();
        PushOutcome {
            discarded_redo,
            evicted,
        }
    }

    /// Snapshot to apply for one undo step.
    pub fn undo_target(&self) -> Option<&Snapshot> {
        let c = self.cursor?;
        self.entries.get(c).map(HistoryEntry::before)
    }

    pub(crate) fn commit_undo(&mut self) {
        if let Some(c) = self.cursor {
            self.cursor = c.checked_sub(1);
            self.stats.undo_count += 1;
        }
    }

    /// Snapshot to apply for one redo step.
    pub fn redo_target(&self) -> Option<&Snapshot> {
        if !self.can_redo() {
            return None;
        }
        let next = self.cursor.map_or(0, |c| c + 1);
        self.entries.get(next).map(HistoryEntry::after)
    }

    pub(crate) fn commit_redo(&mut self) {
        if self.can_redo() {
            self.cursor = Some(self.cursor.map_or(0, |c| c + 1));
            self.stats.redo_count += 1;
        }
    }

    /// Moves the cursor directly. Returns false for an out-of-range index.
    pub(crate) fn set_cursor(&mut self, cursor: Option<usize>) -> bool {
        if cursor.is_some_and(|c| c >= self.entries.len()) {
            return false;
        }
        self.cursor = cursor;
        true
    }

    /// Drops everything and releases all snapshot memory. Counters survive.
    pub fn clear(&mut self) {
        self.base_seq += self.entries.len() as u64;
        self.entries.clear();
        self.index.clear();
        self.cursor = None;
        self.memory_usage = 0;
    }

    /// Changes the cap and re-enforces it. Returns the number of entries dropped.
    pub(crate) fn set_max_entries(&mut self, max_entries: usize) -> usize {
        self.max_entries = max_entries.max(1);
        self.enforce_cap()
    }

    /// Evicts the oldest entry, only while it lies strictly before the cursor.
    pub(crate) fn evict_front(&mut self) -> Option<HistoryEntry> {
        let c = self.cursor.filter(|c| *c > 0)?;
        let entry = self.entries.pop_front()?;
        self.base_seq += 1;
        self.cursor = Some(c - 1);
        self.forget(&entry);
        self.stats.evicted_entries += 1;
        Some(entry)
    }

    fn enforce_cap(&mut self) -> usize {
        let mut dropped = 0;
        while self.entries.len() > self.max_entries {
            if self.evict_front().is_some() || self.pop_redo_back().is_some() {
                dropped += 1;
            } else {
                break;
            }
        }
        if dropped > 0 {
            debug!(dropped, max = self.max_entries, "history cap enforced");
        }
        dropped
    }

    /// Falls back to the redo tail when the front cannot be evicted.
    fn pop_redo_back(&mut self) -> Option<HistoryEntry> {
        if !self.can_redo() {
            return None;
        }
        let entry = self.entries.pop_back()?;
        self.forget(&entry);
        self.stats.evicted_entries += 1;
        Some(entry)
    }

    fn truncate_redo_tail(&mut self) -> usize {
        let keep = self.cursor.map_or(0, |c| c + 1);
        if keep >= self.entries.len() {
            return 0;
        }
        let tail: Vec<HistoryEntry> = self.entries.drain(keep..).collect();
        for entry in &tail {
            self.forget(entry);
        }
        self.stats.discarded_redo_entries += tail.len() as u64;
        debug!(discarded = tail.len(), "redo tail truncated");
        tail.len()
    }

    fn forget(&mut self, entry: &HistoryEntry) {
        for id in entry.ids() {
            self.index.remove(&id);
        }
        self.memory_usage = self.memory_usage.saturating_sub(entry.memory_cost());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        op::{CompositeRecord, OperationRecord},
        types::OpType,
    };

    fn snap(fill: u8) -> Snapshot {
        Snapshot::new(1, 1, vec![fill; 4]).unwrap()
    }

    fn op(id: OpId) -> HistoryEntry {
        HistoryEntry::Operation(OperationRecord::new(
            id,
            OpType::Draw,
            format!("op {id}"),
            snap(id as u8),
            snap(id as u8 + 1),
        ))
    }

    fn ids(stack: &HistoryStack) -> Vec<OpId> {
        stack.entries().map(HistoryEntry::id).collect()
    }

    #[test]
    fn virgin_stack_has_nothing_to_do() {
        let stack = HistoryStack::new(10);
        assert!(!stack.can_undo());
        assert!(!stack.can_redo());
        assert!(stack.undo_target().is_none());
        assert!(stack.redo_target().is_none());
    }

    #[test]
    fn push_moves_cursor_and_tracks_memory() {
        let mut stack = HistoryStack::new(10);
        stack.push(op(1));
        stack.push(op(2));
        assert_eq!(stack.cursor(), Some(1));
        assert_eq!(stack.memory_usage(), 16);
        assert_eq!(stack.stats().total_operations, 2);
        assert!(stack.can_undo());
        assert!(!stack.can_redo());
    }

    #[test]
    fn undo_redo_walk_the_cursor() {
        let mut stack = HistoryStack::new(10);
        stack.push(op(1));
        stack.push(op(2));

        assert_eq!(stack.undo_target().map(|s| s.pixels()[0]), Some(2));
        stack.commit_undo();
        stack.commit_undo();
        assert_eq!(stack.cursor(), None);
        assert!(stack.can_redo());

        assert_eq!(stack.redo_target().map(|s| s.pixels()[0]), Some(2));
        stack.commit_redo();
        assert_eq!(stack.cursor(), Some(0));
        assert_eq!(stack.stats().undo_count, 2);
        assert_eq!(stack.stats().redo_count, 1);
    }

    #[test]
    fn push_after_undo_discards_redo_tail() {
        let mut stack = HistoryStack::new(10);
        stack.push(op(1));
        stack.push(op(2));
        stack.push(op(3));
        stack.commit_undo();
        stack.commit_undo();

        let outcome = stack.push(op(4));
        assert_eq!(outcome.discarded_redo, 2);
        assert_eq!(ids(&stack), vec![1, 4]);
        assert!(stack.get(2).is_none());
        assert_eq!(stack.memory_usage(), 16);
        assert!(!stack.can_redo());
    }

    #[test]
    fn cap_evicts_oldest_and_keeps_lookup_consistent() {
        let mut stack = HistoryStack::new(3);
        for id in 1..=5 {
            stack.push(op(id));
        }
        assert_eq!(ids(&stack), vec![3, 4, 5]);
        assert_eq!(stack.cursor(), Some(2));
        assert_eq!(stack.position_of(4), Some(1));
        assert!(stack.get(1).is_none());
        assert_eq!(stack.stats().evicted_entries, 2);
    }

    #[test]
    fn evict_front_never_reaches_the_cursor() {
        let mut stack = HistoryStack::new(10);
        stack.push(op(1));
        stack.push(op(2));
        stack.commit_undo();

        assert!(stack.evict_front().is_none());
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn shrinking_cap_drops_redo_tail_when_front_is_pinned() {
        let mut stack = HistoryStack::new(10);
        for id in 1..=4 {
            stack.push(op(id));
        }
        assert!(stack.set_cursor(Some(0)));

        assert_eq!(stack.set_max_entries(2), 2);
        assert_eq!(ids(&stack), vec![1, 2]);
        assert_eq!(stack.cursor(), Some(0));
    }

    #[test]
    fn sub_operation_lookup_resolves_through_composite() {
        let mut stack = HistoryStack::new(10);
        stack.push(op(1));
        let header = OperationRecord::new(2, OpType::Composite, "group", snap(0), snap(9));
        let subs = vec![
            OperationRecord::new(3, OpType::StickerMove, "a", snap(0), snap(1)),
            OperationRecord::new(4, OpType::StickerMove, "b", snap(1), snap(9)),
        ];
        stack.push(HistoryEntry::Composite(
            CompositeRecord::new(header, subs).unwrap(),
        ));

        assert_eq!(stack.position_of(4), Some(1));
        assert_eq!(stack.get(4).map(|r| r.description.as_str()), Some("b"));
        assert_eq!(stack.memory_usage(), 8 + 24);
    }

    #[test]
    fn clear_resets_cursor_and_memory_but_keeps_counters() {
        let mut stack = HistoryStack::new(10);
        stack.push(op(1));
        stack.push(op(2));
        stack.clear();

        assert!(stack.is_empty());
        assert_eq!(stack.cursor(), None);
        assert_eq!(stack.memory_usage(), 0);
        assert_eq!(stack.stats().total_operations, 2);

        stack.push(op(3));
        assert_eq!(stack.position_of(3), Some(0));
    }

    #[test]
    fn set_cursor_rejects_out_of_range() {
        let mut stack = HistoryStack::new(10);
        stack.push(op(1));
        assert!(!stack.set_cursor(Some(1)));
        assert_eq!(stack.cursor(), Some(0));
        assert!(stack.set_cursor(None));
        assert!(!stack.can_undo());
    }
}
