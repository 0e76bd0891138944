//! The agent execution loop.
//!
//! [`Runtime::run`] drives one user turn to completion: send the request,
//! execute any tool calls, feed results back, repeat until the model
//! produces a final text answer or the round limit is reached. Context
//! budget is observed after every message; compression fires synchronously
//! at the critical threshold, and the tool gate blocks non-exempt tools
//! above the block threshold.

use crate::context::{
    BudgetLevel, BudgetMonitor, Compression, CompressionEngine, ContextThresholds,
};
use crate::context::compression::CompressionConfig;
use crate::context::history::ReasoningLog;
use crate::tools::builtin::{
    self, QUERY_REASONING_HISTORY, RECORD_REASONING, SUMMARIZE_CONTEXT, QueryHistoryArgs,
    RecordReasoningArgs, SummarizeContextArgs,
};
use crate::tools::core::{ToolSet, parse_tool_args};
use crate::tools::gate::ToolGate;
use crate::agent::session::SessionState;
use crate::{ChatBackend, ChatRequest, DEFAULT_MODEL, Message, MessageRole, ToolCall};
use tracing::{debug, info, warn};

// ── Configuration ──────────────────────────────────────────────────

/// Configuration for the agent runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Model identifier for the primary backend.
    pub model: String,
    /// System prompt placed at the head of the sequence, if any.
    pub system_prompt: Option<String>,
    /// Context window size the budget is measured against.
    pub max_context_tokens: u64,
    /// Budget thresholds as fractions of the window.
    pub thresholds: ContextThresholds,
    /// Compression tuning.
    pub compression: CompressionConfig,
    /// Maximum request/tool rounds per user turn.
    pub max_rounds: u32,
    /// `max_tokens` for completion requests (0 = omit).
    pub max_tokens: u32,
    /// Sampling temperature (0.0 = omit).
    pub temperature: f32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_prompt: None,
            max_context_tokens: 25_000,
            thresholds: ContextThresholds::default(),
            compression: CompressionConfig::default(),
            max_rounds: 30,
            max_tokens: 0,
            temperature: 0.0,
        }
    }
}

impl RuntimeConfig {
    /// Config with a model and system prompt; everything else defaulted.
    pub fn new(model: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: Some(system_prompt.into()),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_context_tokens(mut self, tokens: u64) -> Self {
        self.max_context_tokens = tokens;
        self
    }

    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds;
        self
    }
}

/// Result of one completed user turn.
#[derive(Debug)]
pub struct RunOutcome {
    /// The model's final text answer, if it produced one before the round
    /// limit.
    pub text_output: Option<String>,
    /// Rounds consumed (one round = one completion request).
    pub rounds: u32,
    /// Compressions applied during this turn.
    pub compressions: u32,
}

impl RunOutcome {
    /// The final answer, or an empty string when the round limit hit first.
    pub fn text(&self) -> &str {
        self.text_output.as_deref().unwrap_or("")
    }
}

// ── Runtime ────────────────────────────────────────────────────────

/// Observer callback invoked for every message appended to the sequence.
pub type MessageObserver = Box<dyn Fn(&Message) + Send + Sync>;

/// The agent execution engine.
///
/// Borrows its backends and tool set so callers keep ownership; per-turn
/// state lives in the [`SessionState`] passed to [`Runtime::run`].
pub struct Runtime<'a> {
    backend: &'a dyn ChatBackend,
    /// Secondary backend for summarization. When absent, compression falls
    /// back to mechanical truncation.
    summary_backend: Option<&'a dyn ChatBackend>,
    tools: &'a ToolSet,
    config: RuntimeConfig,
    monitor: BudgetMonitor,
    engine: CompressionEngine,
    gate: ToolGate,
    observers: Vec<MessageObserver>,
}

impl<'a> Runtime<'a> {
    pub fn new(
        backend: &'a dyn ChatBackend,
        tools: &'a ToolSet,
        config: RuntimeConfig,
    ) -> Result<Self, String> {
        config.thresholds.validate()?;

        let monitor = BudgetMonitor::new(config.max_context_tokens, config.thresholds.clone());
        let engine = CompressionEngine::new(config.compression.clone());
        let gate = ToolGate::new(
            config.thresholds.tool_block * 100.0,
            config.compression.summary_char_budget,
        );

        Ok(Self {
            backend,
            summary_backend: None,
            tools,
            config,
            monitor,
            engine,
            gate,
            observers: Vec::new(),
        })
    }

    /// Use a secondary backend for summarization-based compression.
    pub fn with_summary_backend(mut self, backend: &'a dyn ChatBackend) -> Self {
        self.summary_backend = Some(backend);
        self
    }

    /// Register an observer for every message appended to the live sequence.
    pub fn on_message(mut self, observer: impl Fn(&Message) + Send + Sync + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn notify(&self, message: &Message) {
        for observer in &self.observers {
            observer(message);
        }
    }

    // ── Main loop ──────────────────────────────────────────────────

    /// Run one user turn to completion.
    pub async fn run(
        &mut self,
        session: &mut SessionState,
        user_input: &str,
    ) -> Result<RunOutcome, String> {
        self.monitor.begin_run();
        let compressions_before = session.compression.total();

        let mut live = self.build_live_sequence(session);

        // Compress before spending tokens when the previous run ended hot.
        if self.monitor.preflight_level(session) >= BudgetLevel::Critical {
            info!("preflight: previous run ended near the budget, compressing first");
            self.compress(&mut live, session).await;
        }

        let user_message = Message::user(user_input);
        self.notify(&user_message);
        live.push(user_message);

        let tool_definitions = {
            let mut defs = self.tools.definitions();
            defs.extend(builtin::builtin_definitions(
                self.engine.config().summary_char_budget,
            ));
            Some(defs)
        };

        let mut text_output = None;
        let mut rounds = 0;

        for round in 0..self.config.max_rounds {
            rounds = round + 1;

            let request = ChatRequest {
                model: Some(self.config.model.clone()),
                messages: live.iter().map(Message::without_usage).collect(),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
                tools: tool_definitions.clone(),
                ..Default::default()
            };

            // Flush on failure too: earlier rounds already executed tools,
            // and a retry run must see their results.
            let completion = match self.backend.chat(&request).await {
                Ok(completion) => completion,
                Err(e) => {
                    session.history = live;
                    return Err(e);
                }
            };

            let assistant = Message {
                role: MessageRole::Assistant,
                content: completion.content.clone(),
                tool_calls: if completion.tool_calls.is_empty() {
                    None
                } else {
                    Some(completion.tool_calls.clone())
                },
                tool_call_id: None,
                usage: completion.usage,
            };
            self.notify(&assistant);
            live.push(assistant);

            if self.monitor.observe(&live, session) >= BudgetLevel::Critical {
                self.compress(&mut live, session).await;
            }

            if completion.tool_calls.is_empty() {
                text_output = completion.content;
                break;
            }

            // One observation per finalized tool message, so a usage spike
            // from one result gates the round's remaining calls. Compression
            // defers while sibling calls are still unanswered.
            for call in &completion.tool_calls {
                let result = self.dispatch_tool_call(call, &mut live, session).await;
                let tool_message = Message::tool_result(call.id.clone(), result);
                self.notify(&tool_message);
                live.push(tool_message);

                if self.monitor.observe(&live, session) >= BudgetLevel::Critical {
                    self.compress(&mut live, session).await;
                }
            }
        }

        if text_output.is_none() {
            warn!("round limit {} reached without a final answer", self.config.max_rounds);
        }

        session.history = live;
        Ok(RunOutcome {
            text_output,
            rounds,
            compressions: session.compression.total() - compressions_before,
        })
    }

    /// Start from the persisted history, ensuring the system prompt leads.
    fn build_live_sequence(&self, session: &SessionState) -> Vec<Message> {
        let mut live = session.history.clone();
        if let Some(ref prompt) = self.config.system_prompt
            && !live.first().is_some_and(|m| m.role == MessageRole::System)
        {
            live.insert(0, Message::system(prompt.clone()));
        }
        live
    }

    // ── Tool dispatch ──────────────────────────────────────────────

    /// Gate, intercept, or execute one tool call, returning the result text.
    async fn dispatch_tool_call(
        &mut self,
        call: &ToolCall,
        live: &mut Vec<Message>,
        session: &mut SessionState,
    ) -> String {
        let name = call.function.name.as_str();

        if let Some(refusal) = self
            .gate
            .check(name, self.monitor.usage_percentage(session))
        {
            return refusal;
        }

        if builtin::is_builtin(name) {
            return self.serve_builtin(call, live, session).await;
        }

        self.tools.execute(name, &call.function.arguments).await
    }

    /// Answer a built-in context tool from the session state.
    async fn serve_builtin(
        &mut self,
        call: &ToolCall,
        live: &mut Vec<Message>,
        session: &mut SessionState,
    ) -> String {
        match call.function.name.as_str() {
            SUMMARIZE_CONTEXT => {
                let args: SummarizeContextArgs = match parse_tool_args(&call.function.arguments) {
                    Ok(a) => a,
                    Err(e) => return e,
                };
                match self.engine.truncate_with_synopsis(live, &args.summary, session) {
                    Ok(Compression::Applied { dropped, retained, .. }) => format!(
                        "Context compressed: {dropped} older messages replaced by your \
                         synopsis, {retained} recent messages kept."
                    ),
                    Ok(_) => "Context is already compact; nothing was removed.".to_string(),
                    Err(e) => format!("Error: {e}"),
                }
            }
            QUERY_REASONING_HISTORY => {
                let args: QueryHistoryArgs = match parse_tool_args(&call.function.arguments) {
                    Ok(a) => a,
                    Err(e) => return e,
                };
                let hits = session
                    .reasoning_log
                    .query(args.keyword.as_deref(), args.tail);
                ReasoningLog::render_report(&hits, session.reasoning_log.len())
            }
            RECORD_REASONING => {
                let args: RecordReasoningArgs = match parse_tool_args(&call.function.arguments) {
                    Ok(a) => a,
                    Err(e) => return e,
                };
                match session.reasoning_log.record(args.into()) {
                    Ok(record) => format!("Recorded {}.", record.id),
                    Err(e) => format!("Error: {e}"),
                }
            }
            other => format!("Error: unknown tool '{other}'"),
        }
    }

    // ── Compression ────────────────────────────────────────────────

    /// Compress the live sequence: summarization when a secondary backend is
    /// configured, mechanical truncation otherwise or on failure.
    async fn compress(&self, live: &mut Vec<Message>, session: &mut SessionState) {
        if let Some(backend) = self.summary_backend {
            match self.engine.summarize(live, backend, session).await {
                Ok(outcome) => {
                    debug!("summarization outcome: {outcome:?}");
                    return;
                }
                Err(e) => {
                    warn!("summarization failed ({e}), falling back to truncation");
                }
            }
        }

        let outcome = self.engine.truncate(live, session);
        debug!("truncation outcome: {outcome:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::core::FnTool;
    use crate::{ChatCompletion, ChatFuture, ToolDef, UsageInfo, json_schema_for};
    use schemars::JsonSchema;
    use serde::Deserialize;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Backend that replays a fixed script of completions.
    struct ScriptedBackend {
        script: Mutex<VecDeque<ChatCompletion>>,
    }

    impl ScriptedBackend {
        fn new(completions: Vec<ChatCompletion>) -> Self {
            Self {
                script: Mutex::new(completions.into()),
            }
        }
    }

    impl ChatBackend for ScriptedBackend {
        fn chat<'b>(&'b self, _request: &'b ChatRequest) -> ChatFuture<'b> {
            Box::pin(async move {
                self.script
                    .lock()
                    .map_err(|e| format!("script lock poisoned: {e}"))?
                    .pop_front()
                    .ok_or_else(|| "scripted backend exhausted".to_string())
            })
        }
    }

    fn tool_call_completion(id: &str, name: &str, arguments: &str) -> ChatCompletion {
        ChatCompletion {
            content: None,
            tool_calls: vec![ToolCall::function(id, name, arguments)],
            usage: None,
            finish_reason: Some("tool_calls".into()),
        }
    }

    fn with_usage(mut completion: ChatCompletion, total_tokens: u64) -> ChatCompletion {
        completion.usage = Some(UsageInfo {
            total_tokens: Some(total_tokens),
            ..Default::default()
        });
        completion
    }

    #[derive(Deserialize, JsonSchema)]
    struct PingArgs {}

    fn counting_tool(counter: &'static AtomicU32) -> FnTool {
        FnTool::new(
            ToolDef::new("ping", "Increment a counter", json_schema_for::<PingArgs>()),
            move |_: PingArgs| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                "pong".to_string()
            },
        )
    }

    #[tokio::test]
    async fn plain_text_turn_completes_in_one_round() {
        let backend = ScriptedBackend::new(vec![ChatCompletion::text("done")]);
        let tools = ToolSet::new();
        let mut runtime = Runtime::new(&backend, &tools, RuntimeConfig::default()).unwrap();

        let mut session = SessionState::new("t");
        let outcome = runtime.run(&mut session, "hello").await.unwrap();

        assert_eq!(outcome.text_output.as_deref(), Some("done"));
        assert_eq!(outcome.rounds, 1);
        // user + assistant
        assert_eq!(session.history.len(), 2);
    }

    #[tokio::test]
    async fn tool_round_feeds_result_back() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let backend = ScriptedBackend::new(vec![
            tool_call_completion("c1", "ping", "{}"),
            ChatCompletion::text("pinged"),
        ]);
        let tools = ToolSet::new().with(counting_tool(&COUNTER));
        let mut runtime = Runtime::new(&backend, &tools, RuntimeConfig::default()).unwrap();

        let mut session = SessionState::new("t");
        let outcome = runtime.run(&mut session, "go").await.unwrap();

        assert_eq!(COUNTER.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.rounds, 2);
        let tool_msg = session
            .history
            .iter()
            .find(|m| m.role == MessageRole::Tool)
            .unwrap();
        assert_eq!(tool_msg.content.as_deref(), Some("pong"));
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn record_reasoning_intercepted_into_session_log() {
        let backend = ScriptedBackend::new(vec![
            tool_call_completion(
                "c1",
                RECORD_REASONING,
                r#"{"hypothesis": "h", "challenge": "c", "adaptation": "a"}"#,
            ),
            ChatCompletion::text("recorded"),
        ]);
        let tools = ToolSet::new();
        let mut runtime = Runtime::new(&backend, &tools, RuntimeConfig::default()).unwrap();

        let mut session = SessionState::new("t");
        runtime.run(&mut session, "go").await.unwrap();

        assert_eq!(session.reasoning_log.len(), 1);
        let tool_msg = session
            .history
            .iter()
            .find(|m| m.role == MessageRole::Tool)
            .unwrap();
        assert_eq!(tool_msg.content.as_deref(), Some("Recorded HCA-001."));
    }

    #[tokio::test]
    async fn gate_blocks_tool_above_block_threshold() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        // 24_000 of 25_000 tokens = 96%, above the 85% block threshold.
        let backend = ScriptedBackend::new(vec![
            with_usage(tool_call_completion("c1", "ping", "{}"), 24_000),
            ChatCompletion::text("stopped"),
        ]);
        let tools = ToolSet::new().with(counting_tool(&COUNTER));
        let mut runtime = Runtime::new(&backend, &tools, RuntimeConfig::default()).unwrap();

        let mut session = SessionState::new("t");
        runtime.run(&mut session, "go").await.unwrap();

        assert_eq!(COUNTER.load(Ordering::SeqCst), 0, "tool must not execute");
        let tool_msg = session
            .history
            .iter()
            .find(|m| m.role == MessageRole::Tool)
            .unwrap();
        assert!(tool_msg.content.as_deref().unwrap().contains("summarize_context"));
    }

    #[tokio::test]
    async fn usage_spike_mid_round_blocks_sibling_tool() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let dump = FnTool::new(
            ToolDef::new("dump", "Return a large blob", json_schema_for::<PingArgs>()),
            |_: PingArgs| async move { "x".repeat(20_000) },
        );
        // One assistant turn with two calls: the first result alone blows
        // past the block threshold of a 1000-token window.
        let backend = ScriptedBackend::new(vec![
            ChatCompletion {
                content: None,
                tool_calls: vec![
                    ToolCall::function("c1", "dump", "{}"),
                    ToolCall::function("c2", "ping", "{}"),
                ],
                usage: None,
                finish_reason: Some("tool_calls".into()),
            },
            ChatCompletion::text("done"),
        ]);
        let tools = ToolSet::new().with(dump).with(counting_tool(&COUNTER));
        let config = RuntimeConfig::default().with_max_context_tokens(1000);
        let mut runtime = Runtime::new(&backend, &tools, config).unwrap();

        let mut session = SessionState::new("t");
        runtime.run(&mut session, "go").await.unwrap();

        assert_eq!(
            COUNTER.load(Ordering::SeqCst),
            0,
            "second tool must be blocked by the first result's usage spike",
        );
        let refusal = session
            .history
            .iter()
            .find(|m| m.tool_call_id.as_deref() == Some("c2"))
            .and_then(|m| m.content.as_deref())
            .unwrap();
        assert!(refusal.contains("summarize_context"));
    }

    #[tokio::test]
    async fn history_flushed_when_backend_fails_mid_run() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        // Round 1 executes a tool; round 2's chat call fails (script empty).
        let backend = ScriptedBackend::new(vec![tool_call_completion("c1", "ping", "{}")]);
        let tools = ToolSet::new().with(counting_tool(&COUNTER));
        let mut runtime = Runtime::new(&backend, &tools, RuntimeConfig::default()).unwrap();

        let mut session = SessionState::new("t");
        let err = runtime.run(&mut session, "go").await.unwrap_err();
        assert!(err.contains("exhausted"));

        assert_eq!(COUNTER.load(Ordering::SeqCst), 1);
        let tool_msg = session
            .history
            .iter()
            .find(|m| m.role == MessageRole::Tool)
            .expect("executed tool result must be persisted despite the failure");
        assert_eq!(tool_msg.content.as_deref(), Some("pong"));
    }

    #[tokio::test]
    async fn system_prompt_leads_the_sequence() {
        let backend = ScriptedBackend::new(vec![ChatCompletion::text("ok")]);
        let tools = ToolSet::new();
        let config = RuntimeConfig::default().with_system_prompt("be terse");
        let mut runtime = Runtime::new(&backend, &tools, config).unwrap();

        let mut session = SessionState::new("t");
        runtime.run(&mut session, "hi").await.unwrap();

        assert_eq!(session.history[0].role, MessageRole::System);
        assert_eq!(session.history[0].content.as_deref(), Some("be terse"));
    }

    #[tokio::test]
    async fn invalid_thresholds_rejected_at_construction() {
        let backend = ScriptedBackend::new(vec![]);
        let tools = ToolSet::new();
        let mut config = RuntimeConfig::default();
        config.thresholds.notice = 0.9; // above warning
        assert!(Runtime::new(&backend, &tools, config).is_err());
    }

    #[tokio::test]
    async fn blocked_tool_succeeds_after_agent_compression() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let backend = ScriptedBackend::new(vec![
            with_usage(tool_call_completion("c1", "ping", "{}"), 24_000),
            tool_call_completion(
                "c2",
                SUMMARIZE_CONTEXT,
                r#"{"summary": "Probing the service; ping was blocked at the budget."}"#,
            ),
            tool_call_completion("c3", "ping", "{}"),
            ChatCompletion::text("done"),
        ]);
        let tools = ToolSet::new().with(counting_tool(&COUNTER));
        let mut runtime = Runtime::new(&backend, &tools, RuntimeConfig::default()).unwrap();

        let mut session = SessionState::new("t");
        let outcome = runtime.run(&mut session, "go").await.unwrap();

        assert_eq!(outcome.text_output.as_deref(), Some("done"));
        assert_eq!(COUNTER.load(Ordering::SeqCst), 1, "only the retry executes");
        assert_eq!(session.compression.truncations, 1);

        let tool_contents: Vec<&str> = session
            .history
            .iter()
            .filter(|m| m.role == MessageRole::Tool)
            .filter_map(|m| m.content.as_deref())
            .collect();
        assert!(tool_contents[0].contains("summarize_context"), "first call refused");
        assert!(tool_contents.contains(&"pong"), "retry executed");
        assert!(
            session
                .history
                .iter()
                .any(|m| m.content.as_deref().is_some_and(|c| c.contains("[Context synopsis]"))),
        );
    }

    #[tokio::test]
    async fn preflight_summarization_preserves_user_messages() {
        let backend = ScriptedBackend::new(vec![ChatCompletion::text("ok")]);
        let summary_backend =
            ScriptedBackend::new(vec![ChatCompletion::text("Earlier: set up the scan.")]);
        let tools = ToolSet::new();
        let mut runtime = Runtime::new(&backend, &tools, RuntimeConfig::default())
            .unwrap()
            .with_summary_backend(&summary_backend);

        let mut session = SessionState::new("t");
        for i in 0..4 {
            session.history.push(Message::user(format!("question {i}")));
            session.history.push(Message::assistant_text(format!("answer {i}")));
        }
        // Previous run ended at 96% of a 25k window: preflight compresses.
        session.last_run_token_usage = 24_000;

        runtime.run(&mut session, "continue").await.unwrap();

        assert_eq!(session.compression.summarizations, 1);
        for i in 0..4 {
            let wanted = format!("question {i}");
            assert!(
                session
                    .history
                    .iter()
                    .any(|m| m.content.as_deref() == Some(wanted.as_str())),
                "user message '{wanted}' must survive verbatim",
            );
        }
        assert!(
            session.history.iter().any(|m| {
                m.content
                    .as_deref()
                    .is_some_and(|c| c.contains("[Conversation synopsis]"))
            }),
        );
        // The oldest assistant turns were replaced by the synopsis.
        assert!(
            !session
                .history
                .iter()
                .any(|m| m.content.as_deref() == Some("answer 0")),
        );
    }

    #[tokio::test]
    async fn reasoning_records_outlive_truncation() {
        let backend = ScriptedBackend::new(vec![
            tool_call_completion(
                "c1",
                RECORD_REASONING,
                r#"{"hypothesis": "token leaks via referrer", "challenge": "only on GET",
                    "adaptation": "moved token to a header"}"#,
            ),
            ChatCompletion::text("noted"),
            tool_call_completion("c2", QUERY_REASONING_HISTORY, r#"{"keyword": "referrer"}"#),
            ChatCompletion::text("recovered"),
        ]);
        let tools = ToolSet::new();
        let mut runtime = Runtime::new(&backend, &tools, RuntimeConfig::default()).unwrap();

        let mut session = SessionState::new("t");
        runtime.run(&mut session, "investigate").await.unwrap();

        // Wipe the conversational record the way repeated truncation would.
        let engine = CompressionEngine::new(CompressionConfig {
            keep_ratio: 0.1,
            ..CompressionConfig::default()
        });
        let mut messages = std::mem::take(&mut session.history);
        engine.truncate(&mut messages, &mut session);
        session.history = messages;

        runtime.run(&mut session, "what did we learn?").await.unwrap();
        let report = session
            .history
            .iter()
            .filter(|m| m.role == MessageRole::Tool)
            .filter_map(|m| m.content.as_deref())
            .find(|c| c.contains("Reasoning history"))
            .unwrap();
        assert!(report.contains("HCA-001"));
        assert!(report.contains("token leaks via referrer"));
    }

    #[tokio::test]
    async fn round_limit_exhaustion_reports_no_text() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let backend = ScriptedBackend::new(vec![
            tool_call_completion("c1", "ping", "{}"),
            tool_call_completion("c2", "ping", "{}"),
        ]);
        let tools = ToolSet::new().with(counting_tool(&COUNTER));
        let config = RuntimeConfig::default().with_max_rounds(2);
        let mut runtime = Runtime::new(&backend, &tools, config).unwrap();

        let mut session = SessionState::new("t");
        let outcome = runtime.run(&mut session, "loop").await.unwrap();

        assert!(outcome.text_output.is_none());
        assert_eq!(outcome.rounds, 2);
    }
}
