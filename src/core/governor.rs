use tracing::{info, warn};

use crate::config::HistoryConfig;

use super::stack::HistoryStack;

/// Result of one cleanup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    /// Entries evicted by this pass.
    pub evicted: usize,
    /// Bytes released.
    pub freed_bytes: usize,
    /// Usage after the pass.
    pub usage_after: usize,
    /// Byte target the pass aimed for.
    pub target: usize,
}

impl CleanupReport {
    /// False when the pass stopped above target (degraded, best effort).
    pub fn reached_target(&self) -> bool {
        self.usage_after <= self.target
    }
}

/// Byte budget over all retained snapshots.
///
/// Evicts only from the front of the stack and only entries strictly before
/// the cursor, so undo always has something to restore.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryGovernor {
    limit_bytes: usize,
    target_ratio: f64,
    min_retained: usize,
}

impl MemoryGovernor {
    /// Governor with an explicit ceiling, cleanup ratio and retained floor.
    pub fn new(limit_bytes: usize, target_ratio: f64, min_retained: usize) -> Self {
        Self {
            limit_bytes,
            target_ratio: target_ratio.clamp(0.0, 1.0),
            min_retained,
        }
    }

    /// Governor for the limits in `cfg`.
    pub fn from_config(cfg: &HistoryConfig) -> Self {
        Self::new(
            cfg.memory_limit_bytes,
            cfg.cleanup_target_ratio,
            cfg.min_retained_entries,
        )
    }

    /// Hard ceiling in bytes.
    pub fn limit_bytes(&self) -> usize {
        self.limit_bytes
    }

    /// Cleanup target used when none is given.
    pub fn default_target(&self) -> usize {
        (self.limit_bytes as f64 * self.target_ratio) as usize
    }

    /// True when retained bytes exceed the ceiling.
    pub fn over_limit(&self, stack: &HistoryStack) -> bool {
        stack.memory_usage() > self.limit_bytes
    }

    /// Runs a cleanup pass when usage exceeds the ceiling.
    pub fn enforce(&self, stack: &mut HistoryStack) -> Option<CleanupReport> {
        self.over_limit(stack).then(|| self.cleanup(stack, None))
    }

    /// Evicts the oldest entries until usage is at most `target` (default:
    /// [`Self::default_target`]), the retained floor is reached, or the next
    /// eviction would touch the cursor. Never fails.
    pub fn cleanup(&self, stack: &mut HistoryStack, target: Option<usize>) -> CleanupReport {
        let target = target.unwrap_or_else(|| self.default_target());
        let usage_before = stack.memory_usage();
        let mut evicted = 0;

        while stack.memory_usage() > target && stack.len() > self.min_retained {
            if stack.evict_front().is_none() {
                break;
            }
            evicted += 1;
        }
        stack.stats_mut().cleanup_runs += 1;

        let report = CleanupReport {
            evicted,
            freed_bytes: usage_before.saturating_sub(stack.memory_usage()),
            usage_after: stack.memory_usage(),
            target,
        };
        if evicted > 0 {
            info!(
                evicted,
                freed = report.freed_bytes,
                usage = report.usage_after,
                "history cleanup"
            );
        }
        if !report.reached_target() {
            warn!(
                usage = report.usage_after,
                target,
                retained = stack.len(),
                "history cleanup stopped above target"
            );
        }
        report
    }
}
