//! Context compression: mechanical truncation and semantic summarization.
//!
//! Two interchangeable strategies, both routed through the integrity
//! analyzer before any destructive edit:
//!
//! - **Truncation** drops the oldest messages down to a retention ratio and
//!   prepends a keyword digest of what was dropped. No LLM call, always
//!   available.
//! - **Summarization** sends the oldest non-user messages to a secondary,
//!   independent model and replaces them with a short narrative synopsis.
//!   User messages are kept verbatim — user intent is never paraphrased.
//!
//! Outcomes are explicit enums rather than error strings: callers branch on
//! [`Compression`] / [`CompressionError`] kinds, never on message text.

use crate::agent::session::SessionState;
use crate::api::retry::{RetryConfig, is_permanent_error, is_transient_error};
use crate::context::integrity::{adjust_keep_count, has_unanswered_calls};
use crate::{ChatBackend, ChatCompletion, ChatRequest, Message, MessageRole};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Prefix of the digest message that replaces a truncated span.
pub const TRUNCATION_NOTICE_PREFIX: &str = "[Context truncated:";

/// Prompt for the secondary summarization model. The character budget is
/// appended at request-build time.
const SUMMARIZATION_PROMPT: &str = "\
Compress the following conversation excerpt into a synopsis organized by \
topic, not chronology. Retain:
- Technical findings and their evidence (file paths, line numbers, values)
- Tool-call results that later steps may depend on
- Decisions made and the reasons stated for them
- Failed approaches, so they are not repeated

Rules:
- Only include facts explicitly stated in the excerpt. Do not infer.
- Preserve identifiers, paths, and error messages verbatim.
- Plain text, no markdown headings.";

/// Configuration for both compression strategies.
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Fraction of the sequence retained by truncation (and protected by
    /// summarization).
    pub keep_ratio: f64,
    /// Maximum characters for any synopsis, machine- or agent-authored.
    pub summary_char_budget: usize,
    /// Keywords whose lines are quoted into the truncation digest.
    pub signal_keywords: Vec<String>,
    /// Tool-result messages at the end of the sequence that are never
    /// shrunk in place.
    pub protected_recent_tool_messages: usize,
    /// Maximum characters for older tool-result messages.
    pub max_tool_message_chars: usize,
    /// Model for the secondary summarization call (`None` = backend default).
    pub summary_model: Option<String>,
    /// Response token cap for the summarization call.
    pub summary_max_tokens: u32,
    /// Per-attempt deadline for the summarization call; an elapsed deadline
    /// counts as a transient failure for the retry policy.
    pub summary_timeout: Duration,
    /// Retry policy for transient summarization failures.
    pub retry: RetryConfig,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            keep_ratio: 0.5,
            summary_char_budget: 1200,
            signal_keywords: [
                "vulnerab",
                "exploit",
                "finding",
                "hypothesis",
                "injection",
                "credential",
                "error",
                "failed",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            protected_recent_tool_messages: 2,
            max_tool_message_chars: 1200,
            summary_model: None,
            summary_max_tokens: 1024,
            summary_timeout: Duration::from_secs(60),
            retry: RetryConfig::with_retries(3),
        }
    }
}

/// Which strategy produced a compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionStrategy {
    Truncation,
    Summarization,
}

impl std::fmt::Display for CompressionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompressionStrategy::Truncation => write!(f, "truncation"),
            CompressionStrategy::Summarization => write!(f, "summarization"),
        }
    }
}

/// Outcome of a compression attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// The sequence was rewritten.
    Applied {
        strategy: CompressionStrategy,
        dropped: usize,
        retained: usize,
    },
    /// Nothing to compress; the sequence is unchanged.
    NoOp,
    /// A tool call is in flight; retry after the next observation.
    Deferred,
}

/// Failure of a compression attempt. Distinct from [`Compression::NoOp`]
/// and [`Compression::Deferred`], which are not failures.
#[derive(Debug, Clone, PartialEq)]
pub enum CompressionError {
    /// An agent-authored synopsis exceeded the character budget.
    SynopsisTooLong { length: usize, budget: usize },
    /// Every non-protected message is a user message; summarization has no
    /// target. Callers fall back to truncation.
    NothingToSummarize,
    /// The secondary model call failed (after retries, for transient errors).
    Backend(String),
}

impl std::fmt::Display for CompressionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompressionError::SynopsisTooLong { length, budget } => {
                write!(f, "synopsis is {length} chars, budget is {budget}")
            }
            CompressionError::NothingToSummarize => write!(f, "no summarizable messages"),
            CompressionError::Backend(e) => write!(f, "summarization call failed: {e}"),
        }
    }
}

impl std::error::Error for CompressionError {}

/// Applies compression strategies to a live message sequence.
#[derive(Debug, Clone, Default)]
pub struct CompressionEngine {
    config: CompressionConfig,
}

impl CompressionEngine {
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    fn nominal_keep_count(&self, len: usize) -> usize {
        ((len as f64 * self.config.keep_ratio).floor() as usize).max(1)
    }

    // ── Strategy A: mechanical truncation ──────────────────────────

    /// Drop the oldest messages down to the retention ratio and prepend a
    /// digest of what was dropped.
    pub fn truncate(&self, messages: &mut Vec<Message>, session: &mut SessionState) -> Compression {
        if has_unanswered_calls(messages) {
            debug!("truncation deferred: tool call in flight");
            return Compression::Deferred;
        }

        let len = messages.len();
        let keep = adjust_keep_count(messages, self.nominal_keep_count(len));
        if keep >= len {
            return Compression::NoOp;
        }

        let dropped: Vec<Message> = messages.drain(..len - keep).collect();
        self.shrink_stale_tool_results(messages);
        messages.insert(0, Message::system(self.digest(&dropped)));

        #[cfg(debug_assertions)]
        crate::context::integrity::assert_no_severed_chains(messages);

        session.compression.record_truncation();
        info!(
            "context truncated: dropped {} messages, retained {}",
            dropped.len(),
            keep,
        );
        Compression::Applied {
            strategy: CompressionStrategy::Truncation,
            dropped: dropped.len(),
            retained: keep,
        }
    }

    /// Truncation with an agent-authored synopsis instead of the machine
    /// digest. Runs even while a tool call is in flight (the integrity
    /// adjustment keeps the pending chain in the window) because the agent
    /// invokes this mid-turn, from inside its own tool call.
    pub fn truncate_with_synopsis(
        &self,
        messages: &mut Vec<Message>,
        synopsis: &str,
        session: &mut SessionState,
    ) -> Result<Compression, CompressionError> {
        let length = synopsis.chars().count();
        if length > self.config.summary_char_budget {
            return Err(CompressionError::SynopsisTooLong {
                length,
                budget: self.config.summary_char_budget,
            });
        }

        let len = messages.len();
        let keep = adjust_keep_count(messages, self.nominal_keep_count(len)).min(len);
        let dropped = len - keep;
        if dropped == 0 {
            debug!("agent-invoked compression: nothing to drop");
            return Ok(Compression::NoOp);
        }
        messages.drain(..dropped);
        self.shrink_stale_tool_results(messages);

        // The synopsis goes in front of the retained sequence, after a
        // leading system message when one is retained.
        let at = usize::from(
            messages
                .first()
                .is_some_and(|m| m.role == MessageRole::System),
        );
        messages.insert(at, Message::user(format!("[Context synopsis]\n{synopsis}")));

        #[cfg(debug_assertions)]
        crate::context::integrity::assert_no_severed_chains(messages);

        session.compression.record_truncation();
        info!("agent-invoked compression: dropped {dropped} messages, retained {keep}");
        Ok(Compression::Applied {
            strategy: CompressionStrategy::Truncation,
            dropped,
            retained: keep,
        })
    }

    // ── Strategy B: semantic summarization ─────────────────────────

    /// Replace the oldest non-user messages with a model-written synopsis.
    ///
    /// User messages outside the protected tail are kept verbatim and moved
    /// ahead of the synopsis. The call goes to `backend`, which must be an
    /// independent handle from the primary loop's backend.
    pub async fn summarize(
        &self,
        messages: &mut Vec<Message>,
        backend: &dyn ChatBackend,
        session: &mut SessionState,
    ) -> Result<Compression, CompressionError> {
        if has_unanswered_calls(messages) {
            debug!("summarization deferred: tool call in flight");
            return Ok(Compression::Deferred);
        }

        let len = messages.len();
        let protect = adjust_keep_count(messages, self.nominal_keep_count(len)).min(len);
        let boundary = len - protect;

        let preserved_users: Vec<Message> = messages[..boundary]
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .cloned()
            .collect();
        let target: Vec<&Message> = messages[..boundary]
            .iter()
            .filter(|m| m.role != MessageRole::User)
            .collect();
        if target.is_empty() {
            return Err(CompressionError::NothingToSummarize);
        }

        let request = self.summarization_request(&target);
        let completion = self.call_with_retry(backend, &request).await?;
        let text = completion
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| CompressionError::Backend("empty summarization response".into()))?;
        let synopsis_text = truncate_chars(text.trim(), self.config.summary_char_budget);
        let dropped = target.len();

        let tail: Vec<Message> = messages[boundary..].to_vec();
        // Two consecutive assistant messages are rejected by most backends,
        // so the synopsis takes the user role when the tail opens with an
        // assistant message.
        let synopsis_role = if tail.first().is_some_and(|m| m.role == MessageRole::Assistant) {
            MessageRole::User
        } else {
            MessageRole::Assistant
        };
        let synopsis = Message {
            role: synopsis_role,
            content: Some(format!("[Conversation synopsis]\n{synopsis_text}")),
            tool_calls: None,
            tool_call_id: None,
            usage: None,
        };

        let mut rebuilt = preserved_users;
        rebuilt.push(synopsis);
        rebuilt.extend(tail);
        *messages = rebuilt;

        #[cfg(debug_assertions)]
        crate::context::integrity::assert_no_severed_chains(messages);

        session.compression.record_summarization();
        info!(
            "context summarized: {} messages replaced, {} in sequence",
            dropped,
            messages.len(),
        );
        Ok(Compression::Applied {
            strategy: CompressionStrategy::Summarization,
            dropped,
            retained: messages.len(),
        })
    }

    async fn call_with_retry(
        &self,
        backend: &dyn ChatBackend,
        request: &ChatRequest,
    ) -> Result<ChatCompletion, CompressionError> {
        let mut attempt: u32 = 0;
        loop {
            let result = match tokio::time::timeout(self.config.summary_timeout, backend.chat(request))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(format!(
                    "summarization request timed out after {:.0}s",
                    self.config.summary_timeout.as_secs_f64(),
                )),
            };
            match result {
                Ok(completion) => return Ok(completion),
                Err(e) if is_permanent_error(&e) => {
                    return Err(CompressionError::Backend(e));
                }
                Err(e) if is_transient_error(&e) && attempt < self.config.retry.max_retries => {
                    let delay = self.config.retry.delay_for_attempt(attempt);
                    warn!(
                        "summarization attempt {} failed ({e}), retrying in {:.0}ms",
                        attempt + 1,
                        delay.as_secs_f64() * 1000.0,
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(CompressionError::Backend(e)),
            }
        }
    }

    fn summarization_request(&self, target: &[&Message]) -> ChatRequest {
        let mut excerpt = String::new();
        for msg in target {
            if let Some(ref content) = msg.content {
                excerpt.push_str(&format!("[{}]: {content}\n", msg.role));
            }
            for call in msg.tool_calls.iter().flatten() {
                excerpt.push_str(&format!(
                    "[{} called {}({})]\n",
                    msg.role,
                    call.function.name,
                    truncate_chars(&call.function.arguments, 120),
                ));
            }
        }

        let system = format!(
            "{SUMMARIZATION_PROMPT}\n- At most {} characters total.",
            self.config.summary_char_budget,
        );
        ChatRequest {
            model: self.config.summary_model.clone(),
            messages: vec![Message::system(system), Message::user(excerpt)],
            max_tokens: self.config.summary_max_tokens,
            temperature: 0.2,
            ..Default::default()
        }
    }

    // ── Shared helpers ──────────────────────────────────────────────

    /// Shrink tool-result messages older than the protected recent window
    /// down to the configured character cap, in place. Linkage fields are
    /// untouched. Returns the number of messages shrunk.
    pub fn shrink_stale_tool_results(&self, messages: &mut [Message]) -> usize {
        let tool_indexes: Vec<usize> = messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role == MessageRole::Tool)
            .map(|(i, _)| i)
            .collect();
        let stale_count = tool_indexes
            .len()
            .saturating_sub(self.config.protected_recent_tool_messages);

        let mut shrunk = 0;
        for &i in &tool_indexes[..stale_count] {
            if let Some(content) = messages[i].content.as_ref() {
                let chars = content.chars().count();
                if chars > self.config.max_tool_message_chars {
                    let head: String =
                        content.chars().take(self.config.max_tool_message_chars).collect();
                    messages[i].content =
                        Some(format!("{head}\n(content truncated, original {chars} chars)"));
                    shrunk += 1;
                }
            }
        }
        shrunk
    }

    /// Best-effort textual digest of a dropped span: signal-keyword lines,
    /// tool names invoked, and the dropped-message count.
    fn digest(&self, dropped: &[Message]) -> String {
        let mut tool_names: Vec<&str> = Vec::new();
        for call in dropped.iter().filter_map(|m| m.tool_calls.as_ref()).flatten() {
            if !tool_names.contains(&call.function.name.as_str()) {
                tool_names.push(&call.function.name);
            }
        }

        let keywords: Vec<String> = self
            .config
            .signal_keywords
            .iter()
            .map(|k| k.to_lowercase())
            .collect();
        let mut notable: Vec<String> = Vec::new();
        for msg in dropped {
            let Some(ref content) = msg.content else { continue };
            for line in content.lines() {
                let lower = line.to_lowercase();
                if keywords.iter().any(|k| lower.contains(k)) {
                    notable.push(truncate_chars(line.trim(), 160));
                }
            }
        }

        let mut digest = format!(
            "{TRUNCATION_NOTICE_PREFIX} {} earlier messages dropped.]",
            dropped.len(),
        );
        if !tool_names.is_empty() {
            digest.push_str(&format!("\nTools invoked: {}.", tool_names.join(", ")));
        }
        if !notable.is_empty() {
            digest.push_str("\nNotable lines:");
            for line in &notable {
                digest.push_str(&format!("\n- {line}"));
            }
        }
        truncate_chars(&digest, self.config.summary_char_budget)
    }
}

/// Truncate a string to at most `max` characters, appending an ellipsis if
/// trimmed. Character-based, so multi-byte content never splits.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{head}...")
    }
}
