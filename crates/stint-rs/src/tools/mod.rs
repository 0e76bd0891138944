//! Tool abstraction and budget gating.
//!
//! - [`core`] — the [`Tool`](core::Tool) trait and [`ToolSet`](core::ToolSet) dispatch
//! - [`gate`] — the budget gate that refuses tools near the context limit
//! - [`builtin`] — definitions for the context tools served by the runtime

pub mod builtin;
pub mod core;
pub mod gate;

pub use builtin::{QUERY_REASONING_HISTORY, RECORD_REASONING, SUMMARIZE_CONTEXT};
pub use core::{FnTool, Tool, ToolFuture, ToolSet};
pub use gate::ToolGate;
