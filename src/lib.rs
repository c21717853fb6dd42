//! Memory-bounded, snapshot-based undo/redo history for an editable pixel surface.
//!
//! # Examples
//!
//! Direct usage with [`engine::history::HistoryEngine`]:
//! ```
//! use canvas_history::{
//!     config::HistoryConfig,
//!     engine::{history::HistoryEngine, transaction::OperationRequest},
//!     surface::memory::MemorySurface,
//!     types::OpType,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let surface = MemorySurface::new(64, 64).expect("surface");
//! let mut engine = HistoryEngine::new(surface, HistoryConfig::default());
//!
//! engine
//!     .execute_operation(OperationRequest::new(OpType::Draw, "red square"), |s| {
//!         Box::pin(async move {
//!             s.fill_rect(8, 8, 16, 16, [255, 0, 0, 255]);
//!             Ok(())
//!         })
//!     })
//!     .await
//!     .expect("execute");
//!
//! assert!(engine.undo().await.expect("undo"));
//! assert_eq!(engine.surface().pixel(10, 10), Some([0, 0, 0, 0]));
//! assert!(engine.redo().await.expect("redo"));
//! # }
//! ```
//!
//! Runtime usage with the single-writer handle:
//! ```no_run
//! use canvas_history::{
//!     config::HistoryConfig,
//!     engine::{history::HistoryEngine, transaction::OperationRequest},
//!     runtime::handle::{spawn_history, RuntimeConfig},
//!     surface::memory::MemorySurface,
//!     types::{Metadata, OpType},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let engine = HistoryEngine::new(MemorySurface::new(32, 32).expect("surface"), HistoryConfig::default());
//! let handle = spawn_history(engine, RuntimeConfig::default());
//!
//! handle.start_composite("drag sticker", Metadata::new()).await.expect("open");
//! for step in 0..3u32 {
//!     handle
//!         .execute_operation(OperationRequest::new(OpType::StickerMove, "move"), move |s| {
//!             Box::pin(async move {
//!                 s.fill_rect(step, step, 4, 4, [0, 0, 255, 255]);
//!                 Ok(())
//!             })
//!         })
//!         .await
//!         .expect("move");
//! }
//! handle.end_composite().await.expect("seal");
//! let _engine = handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Engine configuration and sparse updates.
pub mod config;
/// History stack, memory governor, and counters.
pub mod core;
/// Caller-facing engine, transactions, and instrumentation.
pub mod engine;
/// Pixel-free export and import.
pub mod export;
/// Operation records and history entries.
pub mod op;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Immutable surface captures.
pub mod snapshot;
/// Surface adapter contract and in-memory surface.
pub mod surface;
/// Shared identifiers and enums.
pub mod types;
