//! Definitions for the context-management tools served by the runtime.
//!
//! These tools never reach the [`ToolSet`](crate::tools::ToolSet): the
//! runtime intercepts their calls and answers them from the session state,
//! because they need access to the live message sequence and the reasoning
//! log. Only their definitions live here, so the model can see them
//! alongside the user-registered tools.

use crate::{ToolDef, json_schema_for};
use schemars::JsonSchema;
use serde::Deserialize;

/// Proactive context compression, invoked by the model itself.
pub const SUMMARIZE_CONTEXT: &str = "summarize_context";
/// Read-only query over the append-only reasoning log.
pub const QUERY_REASONING_HISTORY: &str = "query_reasoning_history";
/// Append a completed reasoning cycle to the log.
pub const RECORD_REASONING: &str = "record_reasoning";

/// Arguments for [`SUMMARIZE_CONTEXT`].
#[derive(Deserialize, JsonSchema, Debug)]
pub struct SummarizeContextArgs {
    /// Model-authored synopsis of the work so far. Must fit the character
    /// budget quoted in the tool description.
    pub summary: String,
}

/// Arguments for [`QUERY_REASONING_HISTORY`].
#[derive(Deserialize, JsonSchema, Debug, Default)]
pub struct QueryHistoryArgs {
    /// Case-insensitive keyword matched against every field of each record.
    #[serde(default)]
    pub keyword: Option<String>,
    /// Return only the most recent N matching records. Negative means all.
    #[serde(default)]
    pub tail: Option<i64>,
}

/// Arguments for [`RECORD_REASONING`]. Mirrors
/// [`RecordInput`](crate::context::history::RecordInput) with a schema.
#[derive(Deserialize, JsonSchema, Debug)]
pub struct RecordReasoningArgs {
    /// The hypothesis that was investigated.
    pub hypothesis: String,
    /// What challenged or tested the hypothesis.
    pub challenge: String,
    /// How the approach was adapted as a result.
    pub adaptation: String,
    /// Supporting evidence, if any.
    #[serde(default)]
    pub evidence: Option<String>,
    /// CVSS score when the record describes a vulnerability finding.
    #[serde(default)]
    pub cvss_score: Option<f32>,
    /// Files examined during this cycle.
    #[serde(default)]
    pub files_analyzed: Vec<String>,
    /// Tools invoked during this cycle.
    #[serde(default)]
    pub tools_used: Vec<String>,
}

impl From<RecordReasoningArgs> for crate::context::history::RecordInput {
    fn from(args: RecordReasoningArgs) -> Self {
        Self {
            hypothesis: args.hypothesis,
            challenge: args.challenge,
            adaptation: args.adaptation,
            evidence: args.evidence,
            status: Default::default(),
            cvss_score: args.cvss_score,
            files_analyzed: args.files_analyzed,
            tools_used: args.tools_used,
        }
    }
}

/// Definitions for all built-in context tools.
pub fn builtin_definitions(summary_char_budget: usize) -> Vec<ToolDef> {
    vec![
        ToolDef::new(
            SUMMARIZE_CONTEXT,
            format!(
                "Compress the conversation context now. Provide a synopsis of the work so \
                 far ({summary_char_budget} characters maximum) covering objectives, key \
                 findings with exact identifiers, and next steps. Older messages are \
                 replaced; your synopsis and recent messages are kept. Use this before \
                 long tool-heavy stretches or when warned that context is running low."
            ),
            json_schema_for::<SummarizeContextArgs>(),
        ),
        ToolDef::new(
            QUERY_REASONING_HISTORY,
            "Search the persistent reasoning history. Records survive context \
             compression, so use this to recover hypotheses and findings from earlier \
             in the session. Optionally filter by keyword and limit to the most recent \
             N records.",
            json_schema_for::<QueryHistoryArgs>(),
        ),
        ToolDef::new(
            RECORD_REASONING,
            "Record a completed reasoning cycle (hypothesis, challenge, adaptation) in \
             the persistent history. Do this whenever you finish investigating a \
             hypothesis — the record outlives context compression.",
            json_schema_for::<RecordReasoningArgs>(),
        ),
    ]
}

/// Whether a tool name belongs to the built-in context tools.
pub fn is_builtin(name: &str) -> bool {
    matches!(
        name,
        SUMMARIZE_CONTEXT | QUERY_REASONING_HISTORY | RECORD_REASONING
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_builtin_definitions() {
        let defs = builtin_definitions(1200);
        assert_eq!(defs.len(), 3);
        let names: Vec<_> = defs.iter().map(|d| d.function.name.as_str()).collect();
        assert!(names.contains(&SUMMARIZE_CONTEXT));
        assert!(names.contains(&QUERY_REASONING_HISTORY));
        assert!(names.contains(&RECORD_REASONING));
    }

    #[test]
    fn summarize_description_quotes_budget() {
        let defs = builtin_definitions(900);
        let def = defs
            .iter()
            .find(|d| d.function.name == SUMMARIZE_CONTEXT)
            .unwrap();
        assert!(def.function.description.contains("900 characters"));
    }

    #[test]
    fn builtin_names_recognized() {
        assert!(is_builtin("summarize_context"));
        assert!(is_builtin("record_reasoning"));
        assert!(!is_builtin("read_file"));
    }

    #[test]
    fn record_args_convert_to_input() {
        let args: RecordReasoningArgs = serde_json::from_str(
            r#"{"hypothesis": "h", "challenge": "c", "adaptation": "a", "cvss_score": 5.0}"#,
        )
        .unwrap();
        let input: crate::context::history::RecordInput = args.into();
        assert_eq!(input.hypothesis, "h");
        assert_eq!(input.cvss_score, Some(5.0));
        assert!(input.files_analyzed.is_empty());
    }

    #[test]
    fn query_args_default_to_everything() {
        let args: QueryHistoryArgs = serde_json::from_str("{}").unwrap();
        assert!(args.keyword.is_none());
        assert!(args.tail.is_none());
    }
}
