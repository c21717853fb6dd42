//! History stack, memory governor, and their shared bookkeeping.

/// Memory budget enforcement.
pub mod governor;
/// Helper index aliases.
pub mod indices;
/// Cursor-based undo/redo log.
pub mod stack;
/// Aggregate counters.
pub mod stats;
