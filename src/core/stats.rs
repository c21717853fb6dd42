use serde::{Deserialize, Serialize};

/// Lifetime counters of one editing session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryStats {
    /// Entries pushed (a composite counts once).
    pub total_operations: u64,
    /// Successful undo steps.
    pub undo_count: u64,
    /// Successful redo steps.
    pub redo_count: u64,
    /// Composites committed.
    pub composite_count: u64,
    /// Entries dropped by the size cap or the memory governor.
    pub evicted_entries: u64,
    /// Redo-tail entries discarded by new pushes.
    pub discarded_redo_entries: u64,
    /// Cleanup passes run, including no-op passes.
    pub cleanup_runs: u64,
    /// Highest retained byte total observed.
    pub peak_memory_bytes: u64,
    /// Summed mutator time of measured operations.
    pub total_execution_micros: u64,
    /// Operations that contributed to `total_execution_micros`.
    pub measured_operations: u64,
}

impl HistoryStats {
    /// Mean mutator time, 0 before the first measurement.
    pub fn average_execution_micros(&self) -> u64 {
        self.total_execution_micros
            .checked_div(self.measured_operations)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_handles_zero_samples() {
        let mut stats = HistoryStats::default();
        assert_eq!(stats.average_execution_micros(), 0);
        stats.total_execution_micros = 300;
        stats.measured_operations = 4;
        assert_eq!(stats.average_execution_micros(), 75);
    }
}
