//! Session state and filesystem persistence.
//!
//! A session is the durable unit of agent work: the message history, the
//! reasoning log, and compression bookkeeping, all serialized to a single
//! JSON file per session under a root directory. Writes are atomic (temp
//! file + rename) so a crash mid-save never leaves a half-written session.

use crate::Message;
use crate::context::history::ReasoningLog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

// ── CompressionStats ───────────────────────────────────────────────

/// Counters for compression events over the session's lifetime.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CompressionStats {
    /// Mechanical truncations applied.
    pub truncations: u32,
    /// LLM-backed summarizations applied.
    pub summarizations: u32,
    /// When the most recent compression of either kind happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_compression_at: Option<DateTime<Utc>>,
}

impl CompressionStats {
    pub fn record_truncation(&mut self) {
        self.truncations += 1;
        self.last_compression_at = Some(Utc::now());
    }

    pub fn record_summarization(&mut self) {
        self.summarizations += 1;
        self.last_compression_at = Some(Utc::now());
    }

    /// Total compressions of either kind.
    pub fn total(&self) -> u32 {
        self.truncations + self.summarizations
    }
}

// ── SessionState ───────────────────────────────────────────────────

/// The durable state of one agent session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionState {
    /// Session identifier (also the filename stem on disk).
    pub session_id: String,
    /// The message history as of the last completed run.
    #[serde(default)]
    pub history: Vec<Message>,
    /// Token usage reported (or estimated) at the end of the last run.
    #[serde(default)]
    pub last_run_token_usage: u64,
    /// Compression bookkeeping.
    #[serde(default)]
    pub compression: CompressionStats,
    /// Append-only reasoning history. Survives compression.
    #[serde(default)]
    pub reasoning_log: ReasoningLog,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            history: Vec::new(),
            last_run_token_usage: 0,
            compression: CompressionStats::default(),
            reasoning_log: ReasoningLog::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the session as touched. Called by the store on save.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ── SessionStore ───────────────────────────────────────────────────

/// Filesystem store for sessions: one `{session_id}.json` per session.
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    /// Create a store, ensuring the root directory exists.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, String> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| format!("failed to create session dir {}: {e}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("{session_id}.json"))
    }

    /// Atomic write: serialize to a temp file, then rename into place.
    pub fn save(&self, session: &mut SessionState) -> Result<(), String> {
        session.touch();

        let final_path = self.path_for(&session.session_id);
        let tmp_path = self.root.join(format!(".{}.json.tmp", session.session_id));

        let json = serde_json::to_string_pretty(session)
            .map_err(|e| format!("failed to serialize session: {e}"))?;
        std::fs::write(&tmp_path, json)
            .map_err(|e| format!("failed to write temp session file: {e}"))?;
        std::fs::rename(&tmp_path, &final_path)
            .map_err(|e| format!("failed to rename session file: {e}"))?;

        debug!(
            "saved session {} ({} messages, {} reasoning records)",
            session.session_id,
            session.history.len(),
            session.reasoning_log.len()
        );
        Ok(())
    }

    /// Load a session. Returns `None` if no file exists for the id.
    pub fn load(&self, session_id: &str) -> Result<Option<SessionState>, String> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&path)
            .map_err(|e| format!("failed to read session file: {e}"))?;
        let session: SessionState =
            serde_json::from_str(&json).map_err(|e| format!("failed to parse session file: {e}"))?;
        Ok(Some(session))
    }

    /// Load an existing session or create a fresh one with the given id.
    pub fn load_or_create(&self, session_id: &str) -> Result<SessionState, String> {
        Ok(self
            .load(session_id)?
            .unwrap_or_else(|| SessionState::new(session_id)))
    }

    /// Delete a session's file. Succeeds if the file never existed.
    pub fn delete(&self, session_id: &str) -> Result<(), String> {
        let path = self.path_for(session_id);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| format!("failed to delete session file: {e}"))?;
        }
        Ok(())
    }
}
