//! Context management: the budget-aware machinery that keeps a long agent
//! run inside its token window.
//!
//! - [`usage`] — token readings from backend metrics or character estimates
//! - [`monitor`] — threshold classification on every finalized message
//! - [`integrity`] — keep-window adjustment that never severs a tool-call chain
//! - [`compression`] — mechanical truncation and semantic summarization
//! - [`history`] — the append-only reasoning log that outlives compression

pub mod compression;
pub mod history;
pub mod integrity;
pub mod monitor;
pub mod usage;

pub use compression::{Compression, CompressionEngine, CompressionError, CompressionStrategy};
pub use history::{ReasoningLog, ReasoningRecord, RecordStatus};
pub use monitor::{BudgetLevel, BudgetMonitor, ContextThresholds};
pub use usage::{ESTIMATED_TOKENS_PER_CHAR, UsageEstimator, UsageReading, UsageSource};
