//! Token usage readings: backend metrics when available, character-count
//! estimates when not.
//!
//! Every reading is tagged with its [`UsageSource`] so callers that need to
//! distinguish "no data" from "zero usage" can do so without sentinel values.

use crate::{Message, UsageInfo};

/// Empirical tokens-per-character ratio for mixed-language text, used when
/// the backend reports no usage metrics.
pub const ESTIMATED_TOKENS_PER_CHAR: f64 = 0.35;

/// Where a usage reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageSource {
    /// Backend-reported token metrics.
    Metrics,
    /// Character-count estimate.
    Estimated,
    /// No metrics and no content to estimate from.
    Unavailable,
}

impl std::fmt::Display for UsageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UsageSource::Metrics => write!(f, "metrics"),
            UsageSource::Estimated => write!(f, "estimated"),
            UsageSource::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// A usage snapshot: total tokens and percentage of the configured budget.
#[derive(Debug, Clone, Copy)]
pub struct UsageReading {
    pub total_tokens: u64,
    /// Percentage of `max_context_tokens` (0–100+), clamped non-negative.
    pub usage_percentage: f64,
    pub source: UsageSource,
}

impl UsageReading {
    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "context: {} tokens ({:.1}%, {})",
            self.total_tokens, self.usage_percentage, self.source,
        )
    }
}

/// Derives [`UsageReading`]s against a fixed token budget.
#[derive(Debug, Clone, Copy)]
pub struct UsageEstimator {
    max_context_tokens: u64,
}

impl UsageEstimator {
    pub fn new(max_context_tokens: u64) -> Self {
        Self { max_context_tokens }
    }

    pub fn max_context_tokens(&self) -> u64 {
        self.max_context_tokens
    }

    /// Build a reading from a known token total.
    pub fn reading(&self, total_tokens: u64, source: UsageSource) -> UsageReading {
        let pct = if self.max_context_tokens > 0 {
            (total_tokens as f64 / self.max_context_tokens as f64 * 100.0).max(0.0)
        } else {
            100.0
        };
        UsageReading {
            total_tokens,
            usage_percentage: pct,
            source,
        }
    }

    /// Reading from backend metrics, if the metrics carry a usable total.
    pub fn from_metrics(&self, usage: &UsageInfo) -> Option<UsageReading> {
        usage.total().map(|t| self.reading(t, UsageSource::Metrics))
    }

    /// Character-count estimate over an entire message sequence. Counts
    /// message content plus serialized tool-call arguments, which also
    /// occupy the context window.
    pub fn estimate_sequence(&self, messages: &[Message]) -> UsageReading {
        let chars: usize = messages
            .iter()
            .map(|m| {
                let call_chars: usize = m
                    .tool_calls
                    .iter()
                    .flatten()
                    .map(|c| c.function.name.len() + c.function.arguments.chars().count())
                    .sum();
                m.content_chars() + call_chars
            })
            .sum();
        let tokens = (chars as f64 * ESTIMATED_TOKENS_PER_CHAR) as u64;
        self.reading(tokens, UsageSource::Estimated)
    }

    /// Reading for a finalized message: its own metrics when present (the
    /// backend reports cumulative usage for the turn), otherwise an estimate
    /// over the whole live sequence.
    pub fn read(&self, messages: &[Message]) -> UsageReading {
        if let Some(reading) = messages
            .last()
            .and_then(|m| m.usage.as_ref())
            .and_then(|u| self.from_metrics(u))
        {
            return reading;
        }
        if messages.is_empty() {
            return UsageReading {
                total_tokens: 0,
                usage_percentage: 0.0,
                source: UsageSource::Unavailable,
            };
        }
        self.estimate_sequence(messages)
    }
}
