//! Convenience re-exports for downstream crates.
//!
//! ```ignore
//! use stint_rs::prelude::*;
//! ```

pub use crate::agent::runtime::{RunOutcome, Runtime, RuntimeConfig};
pub use crate::agent::session::{SessionState, SessionStore};
pub use crate::context::compression::{
    Compression, CompressionConfig, CompressionEngine, CompressionError, CompressionStrategy,
};
pub use crate::context::history::{ReasoningLog, ReasoningRecord, RecordInput};
pub use crate::context::monitor::{BudgetLevel, BudgetMonitor, ContextThresholds};
pub use crate::context::usage::{UsageEstimator, UsageReading, UsageSource};
pub use crate::tools::core::{FnTool, Tool, ToolFuture, ToolSet};
pub use crate::tools::gate::ToolGate;
pub use crate::{
    ChatBackend, ChatCompletion, ChatFuture, ChatRequest, FunctionCallData, HttpBackend, Message,
    MessageRole, ToolCall, ToolDef, UsageInfo, json_schema_for,
};
