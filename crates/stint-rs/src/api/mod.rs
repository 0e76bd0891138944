//! Backend-call policies.

pub mod retry;

pub use retry::{RetryConfig, is_permanent_error, is_transient_error};
