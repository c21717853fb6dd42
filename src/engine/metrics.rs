use std::time::Duration;

use serde_json::{json, Value};

use crate::types::Metadata;

/// Metadata key holding per-operation metrics.
pub const METRICS_KEY: &str = "perf";

/// Diagnostics captured around one `execute_operation` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpMetrics {
    /// Mutator wall-clock time.
    pub execution: Duration,
    /// Retained bytes before the record was committed.
    pub memory_before: usize,
    /// Retained bytes after commit (and any eviction it triggered).
    pub memory_after: usize,
    /// Codec time for both captures, when compression ran.
    pub encode: Option<Duration>,
}

impl OpMetrics {
    /// Signed change in retained bytes.
    pub fn memory_delta(&self) -> i64 {
        self.memory_after as i64 - self.memory_before as i64
    }

    /// Writes the metrics under [`METRICS_KEY`].
    pub fn write_into(&self, metadata: &mut Metadata) {
        let mut perf = json!({
            "execution_micros": self.execution.as_micros() as u64,
            "memory_before": self.memory_before,
            "memory_after": self.memory_after,
            "memory_delta": self.memory_delta(),
        });
        if let (Some(encode), Some(obj)) = (self.encode, perf.as_object_mut()) {
            obj.insert(
                "encode_micros".to_string(),
                Value::from(encode.as_micros() as u64),
            );
        }
        metadata.insert(METRICS_KEY.to_string(), perf);
    }

    /// Reads metrics previously written by [`Self::write_into`].
    pub fn read_from(metadata: &Metadata) -> Option<Self> {
        let perf = metadata.get(METRICS_KEY)?.as_object()?;
        let field = |name: &str| perf.get(name).and_then(Value::as_u64);
        Some(Self {
            execution: Duration::from_micros(field("execution_micros")?),
            memory_before: field("memory_before")? as usize,
            memory_after: field("memory_after")? as usize,
            encode: field("encode_micros").map(Duration::from_micros),
        })
    }
}

pub(crate) fn sum_durations(a: Option<Duration>, b: Option<Duration>) -> Option<Duration> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or_default() + b.unwrap_or_default()),
    }
}
