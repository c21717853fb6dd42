use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    config::{ConfigPatch, HistoryConfig},
    core::{
        governor::{CleanupReport, MemoryGovernor},
        stack::HistoryStack,
        stats::HistoryStats,
    },
    export::{ExportError, HistoryExport},
    op::{EntrySummary, HistoryEntry, OperationRecord},
    snapshot::Snapshot,
    surface::{SnapshotCodec, Surface, SurfaceError},
    types::{clock_now, OpId, OpType},
};

use super::{transaction::PendingComposite, HistoryError};

/// Point-in-time view returned by [`HistoryEngine::state`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryState {
    /// Index of the last applied entry, `None` in the virgin state.
    pub cursor: Option<usize>,
    /// Undo would succeed.
    pub can_undo: bool,
    /// Redo would succeed.
    pub can_redo: bool,
    /// Retained top-level entries.
    pub entry_count: usize,
    /// Retained snapshot bytes.
    pub memory_usage: usize,
    /// Configured byte ceiling.
    pub memory_limit: usize,
    /// Id of the open composite, if any.
    pub open_composite: Option<OpId>,
    /// Lifetime counters.
    pub stats: HistoryStats,
}

/// Snapshot-based undo/redo engine bound to one surface.
///
/// All mutation goes through `&mut self`; callers sharing an engine across
/// tasks serialize access themselves or go through
/// [`spawn_history`](crate::runtime::handle::spawn_history).
pub struct HistoryEngine<S> {
    pub(super) surface: S,
    pub(super) config: HistoryConfig,
    pub(super) governor: MemoryGovernor,
    pub(super) stack: HistoryStack,
    pub(super) codec: Option<Box<dyn SnapshotCodec>>,
    pub(super) pending: Option<PendingComposite>,
    imported: Option<HistoryExport>,
    next_id: OpId,
    last_cleanup: Instant,
}

impl<S: Surface> HistoryEngine<S> {
    /// Engine over `surface`; `config` is normalized first.
    pub fn new(surface: S, config: HistoryConfig) -> Self {
        let config = config.normalized();
        Self {
            surface,
            governor: MemoryGovernor::from_config(&config),
            stack: HistoryStack::new(config.max_history_size),
            config,
            codec: None,
            pending: None,
            imported: None,
            next_id: 1,
            last_cleanup: clock_now(),
        }
    }

    /// Installs the codec used when `enable_compression` is on.
    pub fn with_codec(mut self, codec: Box<dyn SnapshotCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Replaces or removes the snapshot codec.
    pub fn set_codec(&mut self, codec: Option<Box<dyn SnapshotCodec>>) {
        self.codec = codec;
    }

    /// The live surface.
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Direct surface access. Edits made here bypass the history.
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Consumes the engine, returning the surface.
    pub fn into_surface(self) -> S {
        self.surface
    }

    /// Active configuration.
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Underlying history stack.
    pub fn stack(&self) -> &HistoryStack {
        &self.stack
    }

    /// Id of the open composite, if any.
    pub fn open_composite(&self) -> Option<OpId> {
        self.pending.as_ref().map(|p| p.id)
    }

    /// True when an entry is applied.
    pub fn can_undo(&self) -> bool {
        self.stack.can_undo()
    }

    /// True when an undone entry can be re-applied.
    pub fn can_redo(&self) -> bool {
        self.stack.can_redo()
    }

    /// Retained snapshot bytes over committed entries.
    pub fn memory_usage(&self) -> usize {
        self.stack.memory_usage()
    }

    /// Lifetime counters.
    pub fn stats(&self) -> &HistoryStats {
        self.stack.stats()
    }

    /// Cursor, memory and counters in one value.
    pub fn state(&self) -> HistoryState {
        HistoryState {
            cursor: self.stack.cursor(),
            can_undo: self.stack.can_undo(),
            can_redo: self.stack.can_redo(),
            entry_count: self.stack.len(),
            memory_usage: self.stack.memory_usage(),
            memory_limit: self.governor.limit_bytes(),
            open_composite: self.open_composite(),
            stats: self.stack.stats().clone(),
        }
    }

    /// Listing of committed entries, oldest first.
    pub fn history(&self) -> Vec<EntrySummary> {
        self.stack.summaries()
    }

    /// Committed entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.stack.entries()
    }

    /// Committed entry or composite sub-operation by id.
    pub fn get_operation(&self, id: OpId) -> Option<&OperationRecord> {
        self.stack.get(id)
    }

    /// Restores the previous state. `Ok(false)` when there is nothing to undo.
    pub async fn undo(&mut self) -> Result<bool, HistoryError> {
        self.ensure_idle()?;
        let Some(snapshot) = self.stack.undo_target().cloned() else {
            return Ok(false);
        };
        self.apply_snapshot(&snapshot).await?;
        self.stack.commit_undo();
        debug!(cursor = ?self.stack.cursor(), "undo applied");
        Ok(true)
    }

    /// Re-applies the next entry. `Ok(false)` when there is nothing to redo.
    pub async fn redo(&mut self) -> Result<bool, HistoryError> {
        self.ensure_idle()?;
        let Some(snapshot) = self.stack.redo_target().cloned() else {
            return Ok(false);
        };
        self.apply_snapshot(&snapshot).await?;
        self.stack.commit_redo();
        debug!(cursor = ?self.stack.cursor(), "redo applied");
        Ok(true)
    }

    /// Moves straight to `index`; `None` blanks the surface.
    ///
    /// `Ok(false)` for an index past the last entry, with nothing changed.
    pub async fn jump_to(&mut self, index: Option<usize>) -> Result<bool, HistoryError> {
        self.ensure_idle()?;
        match index {
            None => self.surface.clear().await?,
            Some(i) => {
                let Some(snapshot) = self.stack.entry(i).map(|e| e.after().clone()) else {
                    return Ok(false);
                };
                self.apply_snapshot(&snapshot).await?;
            }
        }
        let moved = self.stack.set_cursor(index);
        debug!(cursor = ?index, "jumped");
        Ok(moved)
    }

    /// Drops every entry and any open composite. The surface is untouched.
    pub fn clear_history(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(id = pending.id, "open composite dropped by clear");
        }
        let released = self.stack.memory_usage();
        self.stack.clear();
        info!(released, "history cleared");
    }

    /// Best-effort shrink to `target` bytes (default: configured ratio of the ceiling).
    pub fn cleanup(&mut self, target: Option<usize>) -> CleanupReport {
        self.last_cleanup = clock_now();
        self.governor.cleanup(&mut self.stack, target)
    }

    /// Runs a default cleanup pass when the configured threshold has elapsed
    /// since the previous pass. `None` when not due or disabled.
    ///
    /// `now` must come from the tokio clock the engine reads elsewhere
    /// (`tokio::time::Instant::now().into_std()`).
    pub fn maybe_auto_cleanup(&mut self, now: Instant) -> Option<CleanupReport> {
        let threshold = self.config.auto_cleanup_threshold()?;
        if now.saturating_duration_since(self.last_cleanup) < threshold {
            return None;
        }
        let report = self.governor.cleanup(&mut self.stack, None);
        self.last_cleanup = now;
        Some(report)
    }

    /// Time since the last cleanup pass.
    pub fn since_last_cleanup(&self) -> Duration {
        clock_now().saturating_duration_since(self.last_cleanup)
    }

    /// Applies a sparse config update and re-enforces cap and ceiling.
    pub fn update_config(&mut self, patch: &ConfigPatch) {
        self.config.apply_patch(patch);
        self.governor = MemoryGovernor::from_config(&self.config);
        let dropped = self.stack.set_max_entries(self.config.max_history_size);
        let cleanup = self.governor.enforce(&mut self.stack);
        debug!(
            dropped,
            evicted = cleanup.map_or(0, |r| r.evicted),
            "config updated"
        );
    }

    /// Structural export (no pixel payloads) as a JSON document.
    pub fn export_history(&self) -> Result<Vec<u8>, ExportError> {
        HistoryExport::from_stack(&self.stack).to_json_vec()
    }

    /// Restores statistics and keeps the imported structure for inspection.
    ///
    /// Imported entries carry no pixels and never drive undo/redo. Malformed
    /// input returns false and leaves the engine untouched.
    pub fn import_history(&mut self, bytes: &[u8]) -> bool {
        match HistoryExport::from_json_slice(bytes) {
            Ok(doc) => {
                info!(
                    entries = doc.entries.len(),
                    total_operations = doc.stats.total_operations,
                    "history imported"
                );
                self.stack.restore_stats(doc.stats.clone());
                self.imported = Some(doc);
                true
            }
            Err(err) => {
                warn!(%err, "history import rejected");
                false
            }
        }
    }

    /// Structure loaded by the last successful [`Self::import_history`].
    pub fn imported_history(&self) -> Option<&HistoryExport> {
        self.imported.as_ref()
    }

    pub(super) fn next_op_id(&mut self) -> OpId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Pushes and runs the ceiling check. Returns the memory usage afterwards.
    pub(super) fn commit(&mut self, entry: HistoryEntry) -> usize {
        let kind = entry.op_type();
        let outcome = self.stack.push(entry);
        if kind == OpType::Composite {
            self.stack.stats_mut().composite_count += 1;
        }
        if let Some(report) = self.governor.enforce(&mut self.stack) {
            self.last_cleanup = clock_now();
            debug!(
                evicted = report.evicted,
                usage = report.usage_after,
                "ceiling cleanup after push"
            );
        }
        if outcome.evicted > 0 {
            debug!(evicted = outcome.evicted, "oldest entries dropped by cap");
        }
        self.stack.memory_usage()
    }

    /// Captures the surface, encoding through the codec when compression is on.
    pub(super) async fn capture_snapshot(
        &mut self,
    ) -> Result<(Snapshot, Option<Duration>), SurfaceError> {
        let raw = self.surface.capture().await?;
        if !self.config.enable_compression {
            return Ok((raw, None));
        }
        let Some(codec) = self.codec.as_ref() else {
            return Ok((raw, None));
        };
        let started = Instant::now();
        let encoded = codec.encode(&raw, self.config.compression_quality)?;
        Ok((encoded, Some(started.elapsed())))
    }

    /// Decodes through the codec when possible, otherwise hands the snapshot
    /// to the surface unchanged.
    pub(super) async fn apply_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), SurfaceError> {
        match self.codec.as_ref() {
            Some(codec) if snapshot.is_compressed() => {
                let decoded = codec.decode(snapshot)?;
                self.surface.apply(&decoded).await
            }
            _ => self.surface.apply(snapshot).await,
        }
    }

    fn ensure_idle(&self) -> Result<(), HistoryError> {
        match &self.pending {
            Some(pending) => Err(HistoryError::CompositeInProgress(pending.id)),
            None => Ok(()),
        }
    }
}
