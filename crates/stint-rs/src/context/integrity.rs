//! Tool-call integrity: keep-window adjustment that never severs a
//! tool-call request from its tool-response messages.
//!
//! Chat-completion backends reject a sequence where a tool message has no
//! preceding assistant `tool_calls` entry, or where an assistant's call is
//! answered by nothing. Both compression strategies consult
//! [`adjust_keep_count`] before any destructive edit, and refuse to compress
//! at all (via [`has_unanswered_calls`]) while a call is still in flight.

use crate::{Message, MessageRole};
use std::collections::HashSet;

/// Adjust a proposed keep count (the number of trailing messages to retain)
/// so the retained window never severs a tool-call chain.
///
/// Two independent checks, the larger adjustment wins:
/// 1. If the most recent assistant message with `tool_calls` has any call
///    still unanswered, the window extends back to that assistant message.
/// 2. If the proposed window would open on a tool message, the window
///    extends back to the assistant message that issued the matching call.
pub fn adjust_keep_count(messages: &[Message], proposed_keep_count: usize) -> usize {
    let len = messages.len();
    if len == 0 {
        return 0;
    }
    let proposed = proposed_keep_count.min(len);
    let mut adjusted = proposed;

    // Most recent assistant message carrying tool calls.
    let last_caller = messages.iter().enumerate().rev().find_map(|(i, m)| {
        m.tool_calls
            .as_ref()
            .filter(|calls| !calls.is_empty())
            .map(|calls| (i, calls))
    });

    if let Some((idx, calls)) = last_caller {
        let answered: HashSet<&str> = messages
            .get(idx + 1..)
            .unwrap_or_default()
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        if calls.iter().any(|c| !answered.contains(c.id.as_str())) {
            adjusted = adjusted.max(len - idx);
        }
    }

    // A window opening on a tool message must include its issuing assistant.
    if proposed > 0 && proposed < len {
        let first_kept = len - proposed;
        if let Some(first) = messages.get(first_kept)
            && first.role == MessageRole::Tool
            && let Some(call_id) = first.tool_call_id.as_deref()
        {
            for i in (0..first_kept).rev() {
                let issued = messages[i]
                    .tool_calls
                    .as_ref()
                    .is_some_and(|calls| calls.iter().any(|c| c.id == call_id));
                if issued {
                    adjusted = adjusted.max(len - i);
                    break;
                }
            }
        }
    }

    adjusted.min(len)
}

/// Whether any assistant tool call anywhere in the sequence lacks a
/// tool-response message.
pub fn has_unanswered_calls(messages: &[Message]) -> bool {
    let answered: HashSet<&str> = messages
        .iter()
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    messages
        .iter()
        .filter_map(|m| m.tool_calls.as_ref())
        .flatten()
        .any(|c| !answered.contains(c.id.as_str()))
}

/// Debug check used by the compression paths after an edit: every retained
/// tool message must still have its issuing assistant call in the window.
#[cfg(debug_assertions)]
pub(crate) fn assert_no_severed_chains(messages: &[Message]) {
    let issued: HashSet<&str> = messages
        .iter()
        .filter_map(|m| m.tool_calls.as_ref())
        .flatten()
        .map(|c| c.id.as_str())
        .collect();
    for msg in messages {
        if let Some(id) = msg.tool_call_id.as_deref() {
            debug_assert!(issued.contains(id), "severed tool chain: orphan response {id}");
        }
    }
}
