//! Engine configuration and sparse runtime updates.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default memory ceiling (100 MiB).
pub const DEFAULT_MEMORY_LIMIT_BYTES: usize = 100 * 1024 * 1024;

/// Recognized engine options. Missing JSON fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of top-level entries (at least 1).
    pub max_history_size: usize,
    /// Run captured snapshots through the installed codec.
    pub enable_compression: bool,
    /// Codec quality in `0.0..=1.0`.
    pub compression_quality: f32,
    /// Hard ceiling on retained snapshot bytes.
    pub memory_limit_bytes: usize,
    /// Auto-cleanup runs once this long has passed since the last pass; 0 disables it.
    pub auto_cleanup_threshold_minutes: u64,
    /// Attach timing and memory metrics to each record.
    pub enable_perf_monitoring: bool,
    /// Cleanup never shrinks the stack below this many entries.
    pub min_retained_entries: usize,
    /// Default cleanup target as a fraction of the ceiling.
    pub cleanup_target_ratio: f64,
    /// How often the runtime checks whether auto-cleanup is due.
    pub auto_cleanup_check_interval_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history_size: 50,
            enable_compression: true,
            compression_quality: 0.8,
            memory_limit_bytes: DEFAULT_MEMORY_LIMIT_BYTES,
            auto_cleanup_threshold_minutes: 30,
            enable_perf_monitoring: true,
            min_retained_entries: 10,
            cleanup_target_ratio: 0.7,
            auto_cleanup_check_interval_secs: 60,
        }
    }
}

impl HistoryConfig {
    /// Parses JSON and normalizes out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let cfg: Self = serde_json::from_str(json)?;
        Ok(cfg.normalized())
    }

    /// Clamps every field into its valid range.
    pub fn normalized(mut self) -> Self {
        self.max_history_size = self.max_history_size.max(1);
        self.compression_quality = if self.compression_quality.is_nan() {
            Self::default().compression_quality
        } else {
            self.compression_quality.clamp(0.0, 1.0)
        };
        self.cleanup_target_ratio = if self.cleanup_target_ratio.is_nan() {
            Self::default().cleanup_target_ratio
        } else {
            self.cleanup_target_ratio.clamp(0.0, 1.0)
        };
        self.auto_cleanup_check_interval_secs = self.auto_cleanup_check_interval_secs.max(1);
        self
    }

    /// Applies every `Some` field of `patch`, then normalizes.
    pub fn apply_patch(&mut self, patch: &ConfigPatch) {
        if let Some(v) = patch.max_history_size {
            self.max_history_size = v;
        }
        if let Some(v) = patch.enable_compression {
            self.enable_compression = v;
        }
        if let Some(v) = patch.compression_quality {
            self.compression_quality = v;
        }
        if let Some(v) = patch.memory_limit_bytes {
            self.memory_limit_bytes = v;
        }
        if let Some(v) = patch.auto_cleanup_threshold_minutes {
            self.auto_cleanup_threshold_minutes = v;
        }
        if let Some(v) = patch.enable_perf_monitoring {
            self.enable_perf_monitoring = v;
        }
        if let Some(v) = patch.min_retained_entries {
            self.min_retained_entries = v;
        }
        if let Some(v) = patch.cleanup_target_ratio {
            self.cleanup_target_ratio = v;
        }
        if let Some(v) = patch.auto_cleanup_check_interval_secs {
            self.auto_cleanup_check_interval_secs = v;
        }
        *self = std::mem::take(self).normalized();
    }

    /// `None` when auto-cleanup is disabled.
    pub fn auto_cleanup_threshold(&self) -> Option<Duration> {
        (self.auto_cleanup_threshold_minutes > 0)
            .then(|| Duration::from_secs(self.auto_cleanup_threshold_minutes.saturating_mul(60)))
    }

    /// Polling period for the runtime auto-cleanup timer.
    pub fn auto_cleanup_check_interval(&self) -> Duration {
        Duration::from_secs(self.auto_cleanup_check_interval_secs.max(1))
    }
}

/// Sparse update where each `Some` field overwrites the config value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    /// Optional replacement for `max_history_size`.
    pub max_history_size: Option<usize>,
    /// Optional replacement for `enable_compression`.
    pub enable_compression: Option<bool>,
    /// Optional replacement for `compression_quality`.
    pub compression_quality: Option<f32>,
    /// Optional replacement for `memory_limit_bytes`.
    pub memory_limit_bytes: Option<usize>,
    /// Optional replacement for `auto_cleanup_threshold_minutes`.
    pub auto_cleanup_threshold_minutes: Option<u64>,
    /// Optional replacement for `enable_perf_monitoring`.
    pub enable_perf_monitoring: Option<bool>,
    /// Optional replacement for `min_retained_entries`.
    pub min_retained_entries: Option<usize>,
    /// Optional replacement for `cleanup_target_ratio`.
    pub cleanup_target_ratio: Option<f64>,
    /// Optional replacement for `auto_cleanup_check_interval_secs`.
    pub auto_cleanup_check_interval_secs: Option<u64>,
}

impl ConfigPatch {
    /// Returns true when no fields are set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
