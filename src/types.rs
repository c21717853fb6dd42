//! Shared identifiers, operation tags, and small helpers.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Monotonic operation / transaction identifier.
pub type OpId = u64;

/// Open key-value bag attached to every record.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Type-erased error returned by caller-supplied mutators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Closed set of edit kinds recorded in the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpType {
    /// Image loaded onto the surface.
    Load,
    /// Surface resized.
    Resize,
    /// Pixel filter applied.
    FilterApply,
    /// Freehand stroke or brush edit.
    Draw,
    /// Text layer added.
    TextAdd,
    /// Text layer edited.
    TextEdit,
    /// Text layer removed.
    TextRemove,
    /// Sticker placed.
    StickerAdd,
    /// Sticker moved.
    StickerMove,
    /// Sticker scaled.
    StickerScale,
    /// Sticker rotated.
    StickerRotate,
    /// Sticker removed.
    StickerRemove,
    /// Surface cleared.
    Clear,
    /// Sealed group of sub-operations.
    Composite,
}

impl OpType {
    /// Stable kebab-case tag, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Resize => "resize",
            Self::FilterApply => "filter-apply",
            Self::Draw => "draw",
            Self::TextAdd => "text-add",
            Self::TextEdit => "text-edit",
            Self::TextRemove => "text-remove",
            Self::StickerAdd => "sticker-add",
            Self::StickerMove => "sticker-move",
            Self::StickerScale => "sticker-scale",
            Self::StickerRotate => "sticker-rotate",
            Self::StickerRemove => "sticker-remove",
            Self::Clear => "clear",
            Self::Composite => "composite",
        }
    }
}

impl std::fmt::Display for OpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Monotonic now as seen by the tokio clock (pausable in tests).
pub(crate) fn clock_now() -> Instant {
    tokio::time::Instant::now().into_std()
}
