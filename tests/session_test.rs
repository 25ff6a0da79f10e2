//! End-to-end suggestion-session tests over an in-process bus: the same
//! state machine the popup UI drives, wired straight into the daemon's
//! dispatch table.

use redraft::session::{LocalBus, SessionError, SessionState, SuggestionSession};
use redraft::{config::DaemonConfig, AppContext};
use serde_json::json;
use std::sync::Arc;

async fn test_ctx() -> Arc<AppContext> {
    let data_dir = tempfile::tempdir().unwrap().keep();
    let config = DaemonConfig::new(Some(0), Some(data_dir), Some("warn".to_string()), None);
    AppContext::bootstrap(config).await.unwrap()
}

async fn ctx_with_page(text: &str) -> Arc<AppContext> {
    let ctx = test_ctx().await;
    redraft::ipc::dispatch(
        "tab.open",
        json!({ "elements": [{ "kind": "plainField", "text": text }] }),
        &ctx,
    )
    .await
    .unwrap();
    redraft::ipc::dispatch(
        "tab.select",
        json!({ "elementId": 1, "start": 0, "end": text.chars().count() }),
        &ctx,
    )
    .await
    .unwrap();
    ctx
}

fn session_for(ctx: &Arc<AppContext>) -> SuggestionSession {
    SuggestionSession::new(Arc::new(LocalBus::new(ctx.clone())))
}

#[tokio::test]
async fn full_cycle_against_live_page() {
    let ctx = ctx_with_page("I has a apple").await;
    ctx.settings.update(|s| s.debug_mode = true).await.unwrap();

    let mut session = session_for(&ctx);
    session.open().await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert!(session.page_bound());
    assert_eq!(session.buffer(), "I has a apple");

    session.set_query("Check and correct grammar, spelling, and general writing errors.");
    session.set_n(2);
    session.request_changes().await.unwrap();
    assert_eq!(session.state(), SessionState::Reviewing);
    assert_eq!(session.candidates().len(), 2);

    // Touch up the candidate before applying — no round-trip.
    let id = session.candidates()[0].id;
    session.edit_candidate(id, "I have an apple").unwrap();
    session.apply(id).await.unwrap();
    assert_eq!(session.state(), SessionState::Applied);

    let page = redraft::ipc::dispatch("tab.read", json!({}), &ctx)
        .await
        .unwrap();
    assert_eq!(page["elements"][0]["text"], "I have an apple");
}

#[tokio::test]
async fn open_loads_last_used_settings() {
    let ctx = ctx_with_page("whatever").await;
    ctx.settings
        .update(|s| {
            s.last_used_query = "Make this text clearer.".to_string();
            s.last_used_n = 4;
        })
        .await
        .unwrap();

    let mut session = session_for(&ctx);
    session.open().await.unwrap();
    assert_eq!(session.query(), "Make this text clearer.");
    assert_eq!(session.model(), "gemini-1.5-flash");
}

#[tokio::test]
async fn request_changes_persists_last_used() {
    let ctx = ctx_with_page("some text").await;
    ctx.settings.update(|s| s.debug_mode = true).await.unwrap();

    let mut session = session_for(&ctx);
    session.open().await.unwrap();
    session.set_query("Make this text more formal.");
    session.set_n(3);
    session.request_changes().await.unwrap();

    let saved = ctx.settings.snapshot().await;
    assert_eq!(saved.last_used_query, "Make this text more formal.");
    assert_eq!(saved.last_used_n, 3);
}

#[tokio::test]
async fn quick_snippets_feed_query_and_context() {
    let ctx = ctx_with_page("colorful text").await;
    ctx.settings.update(|s| s.debug_mode = true).await.unwrap();

    let mut session = session_for(&ctx);
    session.open().await.unwrap();

    assert!(session.use_quick_query("default-grammar"));
    assert_eq!(
        session.query(),
        "Check and correct grammar, spelling, and general writing errors."
    );
    assert!(session.toggle_quick_context("default-brit"));
    assert!(!session.use_quick_query("no-such-snippet"));

    session.request_changes().await.unwrap();
    assert_eq!(session.state(), SessionState::Reviewing);
}

#[tokio::test]
async fn precondition_failures_stay_ready() {
    let ctx = ctx_with_page("text").await;
    let mut session = session_for(&ctx);
    session.open().await.unwrap();

    // No instruction.
    session.set_query("");
    assert!(matches!(
        session.request_changes().await,
        Err(SessionError::Precondition(_))
    ));

    // Out-of-range count.
    session.set_query("Fix");
    session.set_n(6);
    assert!(matches!(
        session.request_changes().await,
        Err(SessionError::Precondition(_))
    ));
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn manual_entry_uses_copy_instead_of_apply() {
    let ctx = test_ctx().await;
    ctx.settings.update(|s| s.debug_mode = true).await.unwrap();

    // No tab at all — selection read fails, session opens detached.
    let mut session = session_for(&ctx);
    session.open().await.unwrap();
    assert!(!session.page_bound());

    session.set_buffer("typed into the popup");
    session.set_query("Make this text shorter.");
    session.set_n(1);
    session.request_changes().await.unwrap();

    let id = session.candidates()[0].id;
    assert!(matches!(
        session.apply(id).await,
        Err(SessionError::ApplyFailed(_))
    ));
    let text = session.copy(id).unwrap();
    assert_eq!(text, "This is a mock AI suggestion.");
    assert_eq!(session.state(), SessionState::Applied);
}

#[tokio::test]
async fn reedit_starts_a_new_round() {
    let ctx = ctx_with_page("rough draft").await;
    ctx.settings.update(|s| s.debug_mode = true).await.unwrap();

    let mut session = session_for(&ctx);
    session.open().await.unwrap();
    session.set_query("Make this text clearer.");
    session.request_changes().await.unwrap();

    let id = session.candidates()[0].id;
    session.reedit(id).unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.buffer(), "This is a mock AI suggestion.");
    assert_eq!(session.query(), "");
    assert!(session.candidates().is_empty());

    // The buffer from the previous round feeds the next request.
    session.set_query("Make this text more casual.");
    session.request_changes().await.unwrap();
    assert_eq!(session.state(), SessionState::Reviewing);
}

#[tokio::test]
async fn generation_error_leaves_prior_state_untouched() {
    let ctx = ctx_with_page("unchanged").await;
    let mut session = session_for(&ctx);
    session.open().await.unwrap();
    session.set_query("Fix");
    session.set_model("model-that-does-not-exist");

    assert!(matches!(
        session.request_changes().await,
        Err(SessionError::Generation(_))
    ));
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.buffer(), "unchanged");
    assert!(session.candidates().is_empty());
    assert!(session.last_error().is_some());
}
