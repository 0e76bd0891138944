//! Budget gate for tool execution.
//!
//! Above the tool-block threshold, every tool call except the context
//! summarization tool is refused with an instruction to compress first.
//! The refusal is returned as an ordinary tool result, so the model sees
//! it inline and can self-correct without the runtime aborting the turn.

use crate::tools::builtin::SUMMARIZE_CONTEXT;
use tracing::warn;

/// Gates tool execution on context budget.
#[derive(Debug, Clone)]
pub struct ToolGate {
    /// Usage percentage at or above which non-exempt tools are blocked.
    block_at_percent: f64,
    /// Character budget quoted in the refusal text.
    summary_char_budget: usize,
}

impl ToolGate {
    pub fn new(block_at_percent: f64, summary_char_budget: usize) -> Self {
        Self {
            block_at_percent,
            summary_char_budget,
        }
    }

    /// Check whether a tool call is allowed at the given usage percentage.
    ///
    /// Returns `None` when the call may proceed, or `Some(refusal)` to be
    /// delivered as the tool result instead of executing the tool. The
    /// summarization tool is always exempt — it is the way out.
    pub fn check(&self, tool_name: &str, usage_percentage: f64) -> Option<String> {
        if tool_name == SUMMARIZE_CONTEXT {
            return None;
        }
        if usage_percentage < self.block_at_percent {
            return None;
        }

        warn!(
            "blocking tool '{tool_name}' at {usage_percentage:.1}% context usage \
             (limit {:.1}%)",
            self.block_at_percent
        );
        Some(format!(
            "Error: context usage is at {usage_percentage:.1}%, above the {:.1}% limit for \
             tool execution. Call the `{SUMMARIZE_CONTEXT}` tool now with a summary of your \
             work so far (at most {} characters), then retry this call.",
            self.block_at_percent, self.summary_char_budget,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> ToolGate {
        ToolGate::new(85.0, 1200)
    }

    #[test]
    fn below_threshold_allowed() {
        assert!(gate().check("read_file", 84.9).is_none());
    }

    #[test]
    fn at_threshold_blocked() {
        let refusal = gate().check("read_file", 85.0);
        let text = refusal.unwrap();
        assert!(text.contains("summarize_context"));
        assert!(text.contains("1200"));
    }

    #[test]
    fn summarize_context_always_exempt() {
        assert!(gate().check(SUMMARIZE_CONTEXT, 99.9).is_none());
    }

    #[test]
    fn refusal_names_the_usage() {
        let text = gate().check("run_command", 91.3).unwrap();
        assert!(text.contains("91.3%"));
    }
}
