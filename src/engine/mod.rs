//! Caller-facing history engine.

/// Engine state, undo/redo, cleanup, and export entry points.
pub mod history;
/// Per-operation instrumentation.
pub mod metrics;
/// Operation execution and composite transactions.
pub mod transaction;

use thiserror::Error;

use crate::{surface::SurfaceError, types::{BoxError, OpId}};

/// Engine call failures.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// `start_composite` while another composite is open.
    #[error("composite {0} is already open")]
    CompositeAlreadyOpen(OpId),
    /// `end_composite` without an open composite.
    #[error("no composite is open")]
    NoOpenComposite,
    /// Undo, redo, or jump attempted while a composite is open.
    #[error("composite {0} is in progress")]
    CompositeInProgress(OpId),
    /// Capture, apply, or codec failure.
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    /// The caller's mutator failed; nothing was recorded.
    #[error("operation failed: {0}")]
    Operation(#[source] BoxError),
}
