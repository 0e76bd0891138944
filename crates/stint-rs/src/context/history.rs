//! Structured reasoning history: an append-only log that outlives context
//! compression.
//!
//! Each record is one completed hypothesis/challenge/adaptation cycle. The
//! log lives in [`SessionState`](crate::agent::session::SessionState), not in
//! the raw message sequence, so the agent can recover prior reasoning even
//! after the messages that produced it were truncated or summarized away.
//! Records are never mutated or deleted after append.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Status of a reasoning record.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    #[default]
    Completed,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordStatus::Pending => write!(f, "pending"),
            RecordStatus::Completed => write!(f, "completed"),
        }
    }
}

/// One completed unit of reasoning.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReasoningRecord {
    /// Sequential id, `HCA-001` style.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub hypothesis: String,
    pub challenge: String,
    pub adaptation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_analyzed: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools_used: Vec<String>,
}

/// Input for a new record. Required fields are validated on append.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordInput {
    pub hypothesis: String,
    pub challenge: String,
    pub adaptation: String,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub status: RecordStatus,
    #[serde(default)]
    pub cvss_score: Option<f32>,
    #[serde(default)]
    pub files_analyzed: Vec<String>,
    #[serde(default)]
    pub tools_used: Vec<String>,
}

/// A partially-completed cycle, held outside the append log until finalized.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DraftRecord {
    pub hypothesis: String,
    pub started_at: DateTime<Utc>,
}

/// Append-only reasoning log with an in-progress draft slot.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ReasoningLog {
    records: Vec<ReasoningRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    draft: Option<DraftRecord>,
}

impl ReasoningLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ReasoningRecord] {
        &self.records
    }

    pub fn draft(&self) -> Option<&DraftRecord> {
        self.draft.as_ref()
    }

    /// Start a new in-progress cycle. A previous unfinalized draft is
    /// replaced — it was never part of the append log.
    pub fn begin(&mut self, hypothesis: impl Into<String>) -> Result<(), String> {
        let hypothesis = hypothesis.into();
        if hypothesis.trim().is_empty() {
            return Err("hypothesis must not be empty".to_string());
        }
        if let Some(ref old) = self.draft {
            warn!("replacing unfinalized reasoning draft: {}", old.hypothesis);
        }
        self.draft = Some(DraftRecord {
            hypothesis,
            started_at: Utc::now(),
        });
        Ok(())
    }

    /// Append a completed record. Errors on missing required fields rather
    /// than silently dropping data — losing a completed reasoning unit is
    /// worse than halting. Clears the draft slot.
    pub fn record(&mut self, input: RecordInput) -> Result<&ReasoningRecord, String> {
        for (field, value) in [
            ("hypothesis", &input.hypothesis),
            ("challenge", &input.challenge),
            ("adaptation", &input.adaptation),
        ] {
            if value.trim().is_empty() {
                return Err(format!("reasoning record rejected: {field} must not be empty"));
            }
        }

        let record = ReasoningRecord {
            id: format!("HCA-{:03}", self.records.len() + 1),
            timestamp: Utc::now(),
            hypothesis: input.hypothesis,
            challenge: input.challenge,
            adaptation: input.adaptation,
            evidence: input.evidence,
            status: input.status,
            cvss_score: input.cvss_score,
            files_analyzed: input.files_analyzed,
            tools_used: input.tools_used,
        };
        self.draft = None;
        self.records.push(record);
        self.records
            .last()
            .ok_or_else(|| "reasoning log append failed".to_string())
    }

    /// Read-only query: case-insensitive keyword match over each record's
    /// serialized form, then the most recent `tail` records. `tail` of
    /// `None` or a negative value returns everything that matched.
    pub fn query(&self, keyword: Option<&str>, tail: Option<i64>) -> Vec<&ReasoningRecord> {
        let needle = keyword.map(|k| k.to_lowercase());
        let matched: Vec<&ReasoningRecord> = self
            .records
            .iter()
            .filter(|r| match needle {
                Some(ref n) => serde_json::to_string(r)
                    .map(|s| s.to_lowercase().contains(n))
                    .unwrap_or(false),
                None => true,
            })
            .collect();

        match tail {
            Some(n) if n >= 0 => {
                let n = n as usize;
                let skip = matched.len().saturating_sub(n);
                matched.into_iter().skip(skip).collect()
            }
            _ => matched,
        }
    }

    /// Render matched records as the text report returned by the query tool.
    pub fn render_report(records: &[&ReasoningRecord], total: usize) -> String {
        if records.is_empty() {
            return "No reasoning records matched.".to_string();
        }

        let mut out = format!("Reasoning history: {} of {total} records\n", records.len());
        for record in records {
            out.push_str(&format!(
                "\n[{}] {} — {}\n  Hypothesis: {}\n  Challenge: {}\n  Adaptation: {}\n",
                record.id,
                record.timestamp.to_rfc3339(),
                record.status,
                record.hypothesis,
                record.challenge,
                record.adaptation,
            ));
            if let Some(ref evidence) = record.evidence {
                out.push_str(&format!("  Evidence: {evidence}\n"));
            }
            if let Some(score) = record.cvss_score {
                out.push_str(&format!("  CVSS: {score:.1}\n"));
            }
            if !record.files_analyzed.is_empty() {
                out.push_str(&format!("  Files: {}\n", record.files_analyzed.join(", ")));
            }
            if !record.tools_used.is_empty() {
                out.push_str(&format!("  Tools: {}\n", record.tools_used.join(", ")));
            }
        }

        let completed = records
            .iter()
            .filter(|r| r.status == RecordStatus::Completed)
            .count();
        out.push_str(&format!("\nCompleted: {completed} of {} shown.", records.len()));
        out
    }
}
