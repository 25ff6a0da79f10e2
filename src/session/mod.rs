//! UI-facing suggestion session: one request/review/apply cycle per
//! user action.
//!
//! The session never touches documents or providers directly — every
//! effect goes through a [`MessageBus`], so the same state machine runs
//! against an in-process daemon (tests, embedded UI) or a remote one.
//! There is no cancellation: a dismissed session simply drops the
//! eventual response.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::settings::{QuickContext, QuickQuery};
use crate::AppContext;

// ─── Bus ─────────────────────────────────────────────────────────────────────

/// Request/response transport to the coordinator.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> anyhow::Result<Value>;
}

/// In-process bus that routes straight into the daemon's dispatch table,
/// bypassing WebSocket framing.
pub struct LocalBus {
    ctx: Arc<AppContext>,
}

impl LocalBus {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn request(&self, method: &str, params: Value) -> anyhow::Result<Value> {
        crate::ipc::dispatch(method, params, &self.ctx).await
    }
}

// ─── State machine ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingSelection,
    Ready,
    Generating,
    Reviewing,
    Applied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateStatus {
    Pending,
}

/// One generated rewrite awaiting user action. Text is mutable so the
/// user can touch it up before applying or copying.
#[derive(Debug, Clone)]
pub struct SuggestionCandidate {
    pub id: Uuid,
    pub text: String,
    pub status: CandidateStatus,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Precondition(String),

    #[error("operation not allowed in state {0:?}")]
    WrongState(SessionState),

    #[error("unknown candidate {0}")]
    UnknownCandidate(Uuid),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("apply failed: {0}")]
    ApplyFailed(String),

    #[error("bus error: {0}")]
    Bus(String),
}

pub struct SuggestionSession {
    bus: Arc<dyn MessageBus>,
    state: SessionState,
    /// Working text: the captured selection, or whatever the user typed
    /// in manual-entry mode.
    buffer: String,
    query: String,
    manual_context: String,
    model: String,
    n: u8,
    /// False when the capture yielded nothing — apply is impossible and
    /// copy takes its place.
    page_bound: bool,
    element_preview: Option<String>,
    quick_queries: Vec<QuickQuery>,
    quick_contexts: Vec<QuickContext>,
    debug_enabled: bool,
    mock_suggestion: String,
    candidates: Vec<SuggestionCandidate>,
    last_error: Option<String>,
}

impl SuggestionSession {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self {
            bus,
            state: SessionState::Idle,
            buffer: String::new(),
            query: String::new(),
            manual_context: String::new(),
            model: String::new(),
            n: 1,
            page_bound: false,
            element_preview: None,
            quick_queries: Vec::new(),
            quick_contexts: Vec::new(),
            debug_enabled: false,
            mock_suggestion: String::new(),
            candidates: Vec::new(),
            last_error: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn set_buffer(&mut self, text: impl Into<String>) {
        self.buffer = text.into();
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn set_context(&mut self, context: impl Into<String>) {
        self.manual_context = context.into();
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_n(&mut self, n: u8) {
        self.n = n;
    }

    pub fn page_bound(&self) -> bool {
        self.page_bound
    }

    pub fn element_preview(&self) -> Option<&str> {
        self.element_preview.as_deref()
    }

    pub fn candidates(&self) -> &[SuggestionCandidate] {
        &self.candidates
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn quick_queries(&self) -> &[QuickQuery] {
        &self.quick_queries
    }

    pub fn quick_contexts(&self) -> &[QuickContext] {
        &self.quick_contexts
    }

    /// Set the instruction from a stored snippet.
    pub fn use_quick_query(&mut self, id: &str) -> bool {
        if let Some(q) = self.quick_queries.iter().find(|q| q.id == id) {
            self.query = q.query.clone();
            true
        } else {
            false
        }
    }

    /// Toggle a stored context snippet on or off for this session.
    pub fn toggle_quick_context(&mut self, id: &str) -> bool {
        if let Some(c) = self.quick_contexts.iter_mut().find(|c| c.id == id) {
            c.enabled = !c.enabled;
            true
        } else {
            false
        }
    }

    /// Open the session: read the current page selection and seed the
    /// working buffer with it. A failed or empty capture is not an error
    /// — the session opens in manual-entry mode with nothing to write
    /// back to.
    pub async fn open(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::WrongState(self.state));
        }
        self.state = SessionState::AwaitingSelection;

        let settings = self.bus_call("settings.get", Value::Null).await?;
        self.model = settings["defaultModel"].as_str().unwrap_or_default().to_string();
        self.query = settings["lastUsedQuery"].as_str().unwrap_or_default().to_string();
        self.n = settings["lastUsedN"].as_u64().unwrap_or(1).clamp(1, 5) as u8;
        self.debug_enabled = settings["debugMode"].as_bool().unwrap_or(false);
        self.mock_suggestion = settings["mockSuggestion"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        self.quick_queries =
            serde_json::from_value(settings["quickQueries"].clone()).unwrap_or_default();
        self.quick_contexts =
            serde_json::from_value(settings["quickContexts"].clone()).unwrap_or_default();

        let reply = self.bus_call("page.getSelectedText", Value::Null).await?;
        match reply["selectedText"].as_str() {
            Some(text) if !text.trim().is_empty() => {
                self.buffer = text.to_string();
                self.page_bound = true;
                self.element_preview = reply["elementPreview"].as_str().map(String::from);
            }
            _ => {
                if let Some(err) = reply["error"].as_str() {
                    debug!(err, "selection unavailable, opening in manual-entry mode");
                }
                self.buffer.clear();
                self.page_bound = false;
                self.element_preview = None;
            }
        }

        self.state = SessionState::Ready;
        Ok(())
    }

    /// Request `n` rewrites of the working buffer. On success the session
    /// moves to reviewing with exactly `n` fresh candidates; on failure
    /// it stays ready with the error recorded.
    pub async fn request_changes(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Ready {
            return Err(SessionError::WrongState(self.state));
        }
        self.check_preconditions()?;

        // Remember the instruction and count for the next session before
        // the call, matching what the user actually asked for even if
        // generation fails.
        let _ = self
            .bus_call(
                "settings.update",
                json!({
                    "lastUsedQuery": self.query,
                    "lastUsedN": self.n,
                }),
            )
            .await;

        self.state = SessionState::Generating;
        self.last_error = None;

        let reply = match self
            .bus_call(
                "ai.processText",
                json!({
                    "text": self.buffer,
                    "query": self.query,
                    "context": self.combined_context(),
                    "model": self.model,
                    "n": self.n,
                    "debug": {
                        "enabled": self.debug_enabled,
                        "mockSuggestion": self.mock_suggestion,
                    },
                }),
            )
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                self.state = SessionState::Ready;
                return Err(e);
            }
        };

        if let Some(err) = reply["error"].as_str() {
            warn!(err, "generation failed");
            self.last_error = Some(err.to_string());
            self.state = SessionState::Ready;
            return Err(SessionError::Generation(err.to_string()));
        }

        let suggestions: Vec<String> =
            serde_json::from_value(reply["suggestions"].clone()).unwrap_or_default();
        self.candidates = suggestions
            .into_iter()
            .map(|text| SuggestionCandidate {
                id: Uuid::new_v4(),
                text,
                status: CandidateStatus::Pending,
            })
            .collect();
        info!(candidates = self.candidates.len(), "entering review");
        self.state = SessionState::Reviewing;
        Ok(())
    }

    /// In-place candidate edit before apply/copy. No round-trip.
    pub fn edit_candidate(&mut self, id: Uuid, text: impl Into<String>) -> Result<(), SessionError> {
        if self.state != SessionState::Reviewing {
            return Err(SessionError::WrongState(self.state));
        }
        let candidate = self
            .candidates
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(SessionError::UnknownCandidate(id))?;
        candidate.text = text.into();
        Ok(())
    }

    /// Write a candidate back into the captured page target. On failure
    /// the review surface stays open so the user can retry or copy.
    pub async fn apply(&mut self, id: Uuid) -> Result<(), SessionError> {
        if self.state != SessionState::Reviewing {
            return Err(SessionError::WrongState(self.state));
        }
        let text = self.candidate_text(id)?;

        let reply = self
            .bus_call("page.applyChanges", json!({ "text": text }))
            .await?;
        if reply["success"].as_bool().unwrap_or(false) {
            self.state = SessionState::Applied;
            Ok(())
        } else {
            let err = reply["error"].as_str().unwrap_or("apply failed").to_string();
            self.last_error = Some(err.clone());
            Err(SessionError::ApplyFailed(err))
        }
    }

    /// Take a candidate's text for the clipboard. Only offered when the
    /// capture yielded nothing page-bound, so there is no apply target.
    pub fn copy(&mut self, id: Uuid) -> Result<String, SessionError> {
        if self.state != SessionState::Reviewing {
            return Err(SessionError::WrongState(self.state));
        }
        if self.page_bound {
            return Err(SessionError::Precondition(
                "A page target is captured; apply instead of copying.".to_string(),
            ));
        }
        let text = self.candidate_text(id)?;
        self.state = SessionState::Applied;
        Ok(text)
    }

    /// Move a candidate into the working buffer for another round,
    /// discarding the rest and clearing instruction and context.
    pub fn reedit(&mut self, id: Uuid) -> Result<(), SessionError> {
        if self.state != SessionState::Reviewing {
            return Err(SessionError::WrongState(self.state));
        }
        self.buffer = self.candidate_text(id)?;
        self.query.clear();
        self.manual_context.clear();
        for c in &mut self.quick_contexts {
            c.enabled = false;
        }
        self.candidates.clear();
        self.last_error = None;
        self.state = SessionState::Ready;
        Ok(())
    }

    fn candidate_text(&self, id: Uuid) -> Result<String, SessionError> {
        self.candidates
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.text.clone())
            .ok_or(SessionError::UnknownCandidate(id))
    }

    fn check_preconditions(&self) -> Result<(), SessionError> {
        if self.buffer.trim().is_empty() {
            return Err(SessionError::Precondition("No text to process.".to_string()));
        }
        if self.query.trim().is_empty() {
            return Err(SessionError::Precondition(
                "No instruction provided.".to_string(),
            ));
        }
        if self.model.is_empty() {
            return Err(SessionError::Precondition("No model selected.".to_string()));
        }
        if !(1..=5).contains(&self.n) {
            return Err(SessionError::Precondition(
                "Suggestion count must be between 1 and 5.".to_string(),
            ));
        }
        Ok(())
    }

    /// Enabled context snippets followed by the manually entered context,
    /// newline-joined; empty when nothing is set.
    fn combined_context(&self) -> String {
        let mut parts: Vec<&str> = self
            .quick_contexts
            .iter()
            .filter(|c| c.enabled)
            .map(|c| c.context.as_str())
            .collect();
        let manual = self.manual_context.trim();
        if !manual.is_empty() {
            parts.push(manual);
        }
        parts.join("\n")
    }

    async fn bus_call(&self, method: &str, params: Value) -> Result<Value, SessionError> {
        self.bus
            .request(method, params)
            .await
            .map_err(|e| SessionError::Bus(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn page_session() -> (Arc<AppContext>, SuggestionSession) {
        let ctx = crate::test_context().await;
        crate::ipc::dispatch(
            "tab.open",
            json!({ "elements": [{ "kind": "plainField", "text": "I has a apple" }] }),
            &ctx,
        )
        .await
        .unwrap();
        crate::ipc::dispatch(
            "tab.select",
            json!({ "elementId": 1, "start": 0, "end": 13 }),
            &ctx,
        )
        .await
        .unwrap();
        let session = SuggestionSession::new(Arc::new(LocalBus::new(ctx.clone())));
        (ctx, session)
    }

    #[tokio::test]
    async fn open_seeds_buffer_from_selection() {
        let (_ctx, mut session) = page_session().await;
        session.open().await.unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.page_bound());
        assert_eq!(session.buffer(), "I has a apple");
        assert_eq!(session.model(), "gemini-1.5-flash");
    }

    #[tokio::test]
    async fn open_without_tab_enters_manual_entry_mode() {
        let ctx = crate::test_context().await;
        let mut session = SuggestionSession::new(Arc::new(LocalBus::new(ctx)));
        session.open().await.unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert!(!session.page_bound());
        assert_eq!(session.buffer(), "");
    }

    #[tokio::test]
    async fn missing_instruction_keeps_session_ready() {
        let (_ctx, mut session) = page_session().await;
        session.open().await.unwrap();
        session.set_query("");
        let err = session.request_changes().await.unwrap_err();
        assert!(matches!(err, SessionError::Precondition(_)));
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn mock_generation_reaches_review_with_n_candidates() {
        let (ctx, mut session) = page_session().await;
        ctx.settings
            .update(|s| {
                s.debug_mode = true;
                s.last_used_n = 3;
            })
            .await
            .unwrap();
        session.open().await.unwrap();
        session.set_query("Fix grammar");
        session.request_changes().await.unwrap();
        assert_eq!(session.state(), SessionState::Reviewing);
        assert_eq!(session.candidates().len(), 3);
        assert!(session
            .candidates()
            .iter()
            .all(|c| c.text == "This is a mock AI suggestion."));
    }

    #[tokio::test]
    async fn apply_writes_candidate_back_to_page() {
        let (ctx, mut session) = page_session().await;
        ctx.settings.update(|s| s.debug_mode = true).await.unwrap();
        session.open().await.unwrap();
        session.set_query("Fix grammar");
        session.set_n(1);
        session.request_changes().await.unwrap();

        let id = session.candidates()[0].id;
        session.edit_candidate(id, "I have an apple").unwrap();
        session.apply(id).await.unwrap();
        assert_eq!(session.state(), SessionState::Applied);

        let page = crate::ipc::dispatch("tab.read", json!({}), &ctx).await.unwrap();
        assert_eq!(page["elements"][0]["text"], "I have an apple");
    }

    #[tokio::test]
    async fn copy_requires_no_page_target() {
        let ctx = crate::test_context().await;
        ctx.settings.update(|s| s.debug_mode = true).await.unwrap();
        let mut session = SuggestionSession::new(Arc::new(LocalBus::new(ctx)));
        session.open().await.unwrap();
        session.set_buffer("typed by hand");
        session.set_query("Fix grammar");
        session.request_changes().await.unwrap();

        let id = session.candidates()[0].id;
        let text = session.copy(id).unwrap();
        assert_eq!(text, "This is a mock AI suggestion.");
        assert_eq!(session.state(), SessionState::Applied);
    }

    #[tokio::test]
    async fn reedit_moves_candidate_into_buffer() {
        let (ctx, mut session) = page_session().await;
        ctx.settings.update(|s| s.debug_mode = true).await.unwrap();
        session.open().await.unwrap();
        session.set_query("Fix grammar");
        session.toggle_quick_context("default-brit");
        session.request_changes().await.unwrap();

        let id = session.candidates()[0].id;
        session.reedit(id).unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.buffer(), "This is a mock AI suggestion.");
        assert_eq!(session.query(), "");
        assert!(session.candidates().is_empty());
        assert!(session.quick_contexts().iter().all(|c| !c.enabled));
    }

    #[tokio::test]
    async fn generation_error_records_and_returns_to_ready() {
        let (_ctx, mut session) = page_session().await;
        session.open().await.unwrap();
        session.set_query("Fix grammar");
        session.set_model("gpt-9-imaginary");
        let err = session.request_changes().await.unwrap_err();
        assert!(matches!(err, SessionError::Generation(_)));
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.last_error().unwrap().contains("gpt-9-imaginary"));
    }
}
