//! The agent layer: the execution loop and durable session state.

pub mod runtime;
pub mod session;

pub use runtime::{RunOutcome, Runtime, RuntimeConfig};
pub use session::{CompressionStats, SessionState, SessionStore};
