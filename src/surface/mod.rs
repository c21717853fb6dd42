//! Surface adapter contract and pluggable snapshot codec.

/// In-memory RGBA surface.
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::snapshot::Snapshot;

/// Capture, apply, and codec failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    /// Zero or overflowing dimensions.
    #[error("invalid surface dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
    /// Pixel buffer does not match the dimensions.
    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    BufferLength {
        /// Required length.
        expected: usize,
        /// Supplied length.
        actual: usize,
    },
    /// Backing buffer could not be allocated.
    #[error("unable to allocate {0} bytes")]
    Allocation(usize),
    /// Encode or decode failed.
    #[error("codec failure: {0}")]
    Codec(String),
    /// The surface is gone or not ready.
    #[error("surface unavailable: {0}")]
    Unavailable(String),
}

/// Live editable surface consumed by the history engine.
///
/// The engine only ever captures and applies whole snapshots; edits happen
/// inside caller-supplied mutators.
#[async_trait]
pub trait Surface: Send {
    /// Captures current visible state.
    async fn capture(&mut self) -> Result<Snapshot, SurfaceError>;

    /// Replaces visible state, resizing when dimensions differ.
    async fn apply(&mut self, snapshot: &Snapshot) -> Result<(), SurfaceError>;

    /// Blanks the surface at its current size.
    async fn clear(&mut self) -> Result<(), SurfaceError> {
        let current = self.capture().await?;
        let blank = Snapshot::blank(current.width(), current.height())?;
        self.apply(&blank).await
    }
}

/// Optional size-reduction hook applied to retained snapshots.
pub trait SnapshotCodec: Send + Sync {
    /// Encodes `snapshot` at `quality` in `0.0..=1.0`.
    fn encode(&self, snapshot: &Snapshot, quality: f32) -> Result<Snapshot, SurfaceError>;
    /// Restores an uncompressed snapshot.
    fn decode(&self, snapshot: &Snapshot) -> Result<Snapshot, SurfaceError>;
}
