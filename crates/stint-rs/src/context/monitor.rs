//! Budget monitoring: classify usage against configured thresholds on every
//! finalized message.
//!
//! The monitor emits exactly one log line per observation, at the highest
//! applicable level, and persists the latest token total into
//! [`SessionState`] so the next run can make a pre-flight compression
//! decision before spending new tokens.

use crate::Message;
use crate::agent::session::SessionState;
use crate::context::usage::{UsageEstimator, UsageReading, UsageSource};
use tracing::{info, trace, warn};

/// Thresholds as fractions of `max_context_tokens`.
#[derive(Debug, Clone, Copy)]
pub struct ContextThresholds {
    /// First informational notice.
    pub notice: f64,
    /// Usage is getting high; the agent should start wrapping up.
    pub warning: f64,
    /// Compression fires synchronously at or above this fraction.
    pub critical: f64,
    /// The tool gate refuses non-compression tools at or above this fraction.
    pub tool_block: f64,
}

impl Default for ContextThresholds {
    fn default() -> Self {
        Self {
            notice: 0.30,
            warning: 0.70,
            critical: 0.80,
            tool_block: 0.85,
        }
    }
}

impl ContextThresholds {
    /// Validate that the thresholds are ascending and within (0, 1].
    pub fn validate(&self) -> Result<(), String> {
        let ordered = [self.notice, self.warning, self.critical, self.tool_block];
        if ordered.iter().any(|t| *t <= 0.0 || *t > 1.0) {
            return Err(format!("thresholds must be within (0, 1]: {self:?}"));
        }
        if ordered.windows(2).any(|w| w[0] > w[1]) {
            return Err(format!(
                "thresholds must be ascending (notice <= warning <= critical <= tool_block): {self:?}"
            ));
        }
        Ok(())
    }
}

/// Classification of a single usage observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BudgetLevel {
    Silent,
    Notice,
    Warning,
    Critical,
}

impl std::fmt::Display for BudgetLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BudgetLevel::Silent => write!(f, "silent"),
            BudgetLevel::Notice => write!(f, "notice"),
            BudgetLevel::Warning => write!(f, "warning"),
            BudgetLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Observes finalized messages and classifies cumulative usage.
#[derive(Debug)]
pub struct BudgetMonitor {
    estimator: UsageEstimator,
    thresholds: ContextThresholds,
    last_reading: Option<UsageReading>,
}

impl BudgetMonitor {
    pub fn new(max_context_tokens: u64, thresholds: ContextThresholds) -> Self {
        Self {
            estimator: UsageEstimator::new(max_context_tokens),
            thresholds,
            last_reading: None,
        }
    }

    pub fn estimator(&self) -> &UsageEstimator {
        &self.estimator
    }

    pub fn thresholds(&self) -> &ContextThresholds {
        &self.thresholds
    }

    /// Classify a usage percentage into exactly one level.
    pub fn classify(&self, usage_percentage: f64) -> BudgetLevel {
        if usage_percentage >= self.thresholds.critical * 100.0 {
            BudgetLevel::Critical
        } else if usage_percentage >= self.thresholds.warning * 100.0 {
            BudgetLevel::Warning
        } else if usage_percentage >= self.thresholds.notice * 100.0 {
            BudgetLevel::Notice
        } else {
            BudgetLevel::Silent
        }
    }

    /// Observe the sequence after a message was finalized.
    ///
    /// Emits one log line at the highest applicable level and persists the
    /// token total into the session, regardless of level. A `Critical`
    /// return means the caller must compress before the next model call.
    pub fn observe(&mut self, messages: &[Message], session: &mut SessionState) -> BudgetLevel {
        let reading = self.estimator.read(messages);
        let level = self.classify(reading.usage_percentage);

        match level {
            BudgetLevel::Silent => trace!("{}", reading.to_log_string()),
            BudgetLevel::Notice => info!("{}", reading.to_log_string()),
            BudgetLevel::Warning => warn!("context warning: {}", reading.to_log_string()),
            BudgetLevel::Critical => {
                warn!("context critical, compression required: {}", reading.to_log_string());
            }
        }

        session.last_run_token_usage = reading.total_tokens;
        self.last_reading = Some(reading);
        level
    }

    /// The most recent in-run reading, if any.
    pub fn last_reading(&self) -> Option<UsageReading> {
        self.last_reading
    }

    /// Current usage percentage for gating decisions: the last in-run
    /// reading when one exists, otherwise the persisted figure from the
    /// previous run.
    pub fn usage_percentage(&self, session: &SessionState) -> f64 {
        match self.last_reading {
            Some(reading) => reading.usage_percentage,
            None => {
                self.estimator
                    .reading(session.last_run_token_usage, UsageSource::Metrics)
                    .usage_percentage
            }
        }
    }

    /// Pre-flight classification from the previous run's persisted usage.
    pub fn preflight_level(&self, session: &SessionState) -> BudgetLevel {
        let reading = self
            .estimator
            .reading(session.last_run_token_usage, UsageSource::Metrics);
        self.classify(reading.usage_percentage)
    }

    /// Reset in-run state at the start of a new run.
    pub fn begin_run(&mut self) {
        self.last_reading = None;
    }
}
