use std::time::Instant;

use futures::future::BoxFuture;
use tracing::{debug, info, trace, warn};

use crate::{
    op::{CompositeRecord, HistoryEntry, OperationRecord},
    snapshot::Snapshot,
    surface::Surface,
    types::{BoxError, Metadata, OpId, OpType},
};

use super::{
    history::HistoryEngine,
    metrics::{sum_durations, OpMetrics},
    HistoryError,
};

/// Boxed surface mutator, the form commands carry across channels.
pub type BoxedMutator<S> =
    Box<dyn for<'s> FnOnce(&'s mut S) -> BoxFuture<'s, Result<(), BoxError>> + Send>;

/// Describes the edit passed to [`HistoryEngine::execute_operation`].
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRequest {
    /// Edit kind.
    pub op_type: OpType,
    /// Human-readable label.
    pub description: String,
    /// Informational parameters, never replayed.
    pub payload: Option<serde_json::Value>,
    /// Caller metadata; instrumentation adds a `perf` key.
    pub metadata: Metadata,
}

impl OperationRequest {
    /// Request with empty payload and metadata.
    pub fn new(op_type: OpType, description: impl Into<String>) -> Self {
        Self {
            op_type,
            description: description.into(),
            payload: None,
            metadata: Metadata::new(),
        }
    }

    /// Attaches an informational payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Replaces the metadata bag.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Open composite accumulating sub-operations.
#[derive(Debug)]
pub(crate) struct PendingComposite {
    pub(crate) id: OpId,
    description: String,
    metadata: Metadata,
    before: Snapshot,
    sub_operations: Vec<OperationRecord>,
    opened_at: Instant,
}

impl PendingComposite {
    fn memory_cost(&self) -> usize {
        self.before.size_bytes()
            + self
                .sub_operations
                .iter()
                .map(OperationRecord::memory_cost)
                .sum::<usize>()
    }

    /// `None` when nothing was recorded.
    fn seal(self, after: Snapshot) -> Option<CompositeRecord> {
        let header = OperationRecord::new(
            self.id,
            OpType::Composite,
            self.description,
            self.before,
            after,
        )
        .with_metadata(self.metadata);
        CompositeRecord::new(header, self.sub_operations)
    }
}

impl<S: Surface> HistoryEngine<S> {
    /// Opens a composite; later operations collect into it until
    /// [`Self::end_composite`]. Returns the transaction id.
    pub async fn start_composite(
        &mut self,
        description: impl Into<String>,
        metadata: Metadata,
    ) -> Result<OpId, HistoryError> {
        if let Some(open) = &self.pending {
            return Err(HistoryError::CompositeAlreadyOpen(open.id));
        }
        let (before, _) = self.capture_snapshot().await?;
        let id = self.next_op_id();
        let description = description.into();
        debug!(id, %description, "composite opened");
        self.pending = Some(PendingComposite {
            id,
            description,
            metadata,
            before,
            sub_operations: Vec::new(),
            opened_at: Instant::now(),
        });
        Ok(id)
    }

    /// Seals the open composite.
    ///
    /// Returns `Ok(None)` when it held no operations (discarded, history
    /// unchanged). If the final capture fails the composite stays open.
    pub async fn end_composite(&mut self) -> Result<Option<OpId>, HistoryError> {
        let pending = self.pending.take().ok_or(HistoryError::NoOpenComposite)?;
        if pending.sub_operations.is_empty() {
            debug!(id = pending.id, "empty composite discarded");
            return Ok(None);
        }

        let after = match self.capture_snapshot().await {
            Ok((after, _)) => after,
            Err(err) => {
                self.pending = Some(pending);
                return Err(err.into());
            }
        };

        let id = pending.id;
        let open_for = pending.opened_at.elapsed();
        let Some(composite) = pending.seal(after) else {
            return Ok(None);
        };
        let subs = composite.sub_operations().len();
        let usage = self.commit(HistoryEntry::Composite(composite));
        info!(id, subs, ?open_for, usage, "composite sealed");
        Ok(Some(id))
    }

    /// Runs `mutator` against the surface between two captures and records
    /// the result.
    ///
    /// Inside an open composite the record joins it; otherwise it is pushed
    /// as its own undo step. Any capture or mutator failure propagates and
    /// nothing is recorded.
    pub async fn execute_operation<F>(
        &mut self,
        request: OperationRequest,
        mutator: F,
    ) -> Result<OpId, HistoryError>
    where
        F: for<'s> FnOnce(&'s mut S) -> BoxFuture<'s, Result<(), BoxError>> + Send,
    {
        let memory_before = self.working_usage();
        let (before, encode_before) = self.capture_snapshot().await?;

        let started = Instant::now();
        if let Err(err) = mutator(&mut self.surface).await {
            warn!(op_type = %request.op_type, %err, "operation failed, not recorded");
            return Err(HistoryError::Operation(err));
        }
        let execution = started.elapsed();

        let (after, encode_after) = self.capture_snapshot().await?;

        let id = self.next_op_id();
        let record = OperationRecord::new(id, request.op_type, request.description, before, after)
            .with_payload(request.payload)
            .with_metadata(request.metadata);

        let mut metrics = OpMetrics {
            execution,
            memory_before,
            memory_after: memory_before,
            encode: sum_durations(encode_before, encode_after),
        };
        let monitored = self.config.enable_perf_monitoring;

        if let Some(pending) = self.pending.as_mut() {
            let mut record = record;
            metrics.memory_after = memory_before + record.memory_cost();
            if monitored {
                metrics.write_into(&mut record.metadata);
            }
            debug!(id, composite = pending.id, "sub-operation recorded");
            pending.sub_operations.push(record);
        } else {
            metrics.memory_after = self.commit(HistoryEntry::Operation(record));
            if monitored {
                if let Some(rec) = self.stack.get_mut(id) {
                    metrics.write_into(&mut rec.metadata);
                }
            }
        }

        if monitored {
            let stats = self.stack.stats_mut();
            stats.total_execution_micros += execution.as_micros() as u64;
            stats.measured_operations += 1;
            trace!(
                id,
                execution_micros = execution.as_micros() as u64,
                memory_delta = metrics.memory_delta(),
                "operation metrics"
            );
        }
        Ok(id)
    }

    /// Committed usage plus whatever the open composite already holds.
    fn working_usage(&self) -> usize {
        self.stack.memory_usage() + self.pending.as_ref().map_or(0, PendingComposite::memory_cost)
    }
}
