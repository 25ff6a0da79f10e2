//! Integration tests for the redraft JSON-RPC server.
//! Spins up a real daemon on a free port and drives the full
//! select → generate → apply cycle over WebSocket.

use futures_util::{SinkExt, StreamExt};
use redraft::ai::tokens::estimate_tokens;
use redraft::{config::DaemonConfig, AppContext};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Start a daemon on a random port and return the WebSocket URL.
async fn start_test_daemon() -> (String, Arc<AppContext>) {
    let data_dir = tempfile::tempdir().unwrap().keep();
    let port = get_free_port();

    let config = DaemonConfig::new(
        Some(port),
        Some(data_dir),
        Some("warn".to_string()),
        None,
    );
    let ctx = AppContext::bootstrap(config).await.unwrap();

    let ctx_server = ctx.clone();
    tokio::spawn(async move {
        redraft::ipc::run(ctx_server).await.ok();
    });

    // Give server a moment to bind
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let url = format!("ws://127.0.0.1:{}", ctx.config.port);
    (url, ctx)
}

fn get_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn ws_rpc(url: &str, method: &str, params: Value) -> Value {
    let (mut ws, _) = connect_async(url).await.expect("ws connect failed");

    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params
    });
    ws.send(Message::Text(serde_json::to_string(&request).unwrap()))
        .await
        .unwrap();

    // Read messages until we get the response (skip notifications)
    loop {
        let msg = ws.next().await.unwrap().unwrap();
        if let Message::Text(text) = msg {
            let v: Value = serde_json::from_str(&text).unwrap();
            if v.get("id").is_some() {
                return v;
            }
        }
    }
}

/// Open a tab with one plain field and select `start..end` in it.
async fn open_and_select(url: &str, text: &str, start: usize, end: usize) -> u64 {
    let resp = ws_rpc(
        url,
        "tab.open",
        json!({ "elements": [{ "kind": "plainField", "text": text }] }),
    )
    .await;
    let tab_id = resp["result"]["tabId"].as_u64().unwrap();
    let resp = ws_rpc(
        url,
        "tab.select",
        json!({ "tabId": tab_id, "elementId": 1, "start": start, "end": end }),
    )
    .await;
    assert_eq!(resp["result"]["success"], true);
    tab_id
}

const GRAMMAR_QUERY: &str = "Check and correct grammar, spelling, and general writing errors.";
const MOCK: &str = "This is a mock AI suggestion.";

fn debug_params(text: &str, n: usize) -> Value {
    json!({
        "text": text,
        "query": GRAMMAR_QUERY,
        "context": "",
        "model": "gemini-1.5-flash",
        "n": n,
        "debug": { "enabled": true, "mockSuggestion": MOCK },
    })
}

#[tokio::test]
async fn test_daemon_ping() {
    let (url, _ctx) = start_test_daemon().await;
    let resp = ws_rpc(&url, "daemon.ping", json!({})).await;
    assert_eq!(resp["result"]["pong"], true);
}

#[tokio::test]
async fn test_daemon_status() {
    let (url, _ctx) = start_test_daemon().await;
    let resp = ws_rpc(&url, "daemon.status", json!({})).await;
    assert_eq!(resp["result"]["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(resp["result"]["openTabs"], 0);
}

#[tokio::test]
async fn test_health_endpoint() {
    let (url, ctx) = start_test_daemon().await;
    let _ = url;
    let body = reqwest::get(format!("http://127.0.0.1:{}/health", ctx.config.port))
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["uptime"].is_number());
    assert_eq!(body["tokenCount"], 0);
}

#[tokio::test]
async fn test_list_models() {
    let (url, _ctx) = start_test_daemon().await;
    let resp = ws_rpc(&url, "ai.listModels", json!({})).await;
    let models = resp["result"]["models"].as_array().unwrap();
    assert!(models.iter().any(|m| m["id"] == "gemini-1.5-flash"));
    assert!(models.iter().any(|m| m["id"] == "gpt-4o"));
    for m in models {
        assert!(m["name"].is_string());
        assert!(m["tokensPerMinute"].is_number());
    }
}

#[tokio::test]
async fn test_full_select_generate_apply_cycle() {
    let (url, _ctx) = start_test_daemon().await;
    open_and_select(&url, "I has a apple", 0, 13).await;

    let resp = ws_rpc(&url, "page.getSelectedText", json!({})).await;
    assert_eq!(resp["result"]["selectedText"], "I has a apple");
    assert_eq!(resp["result"]["elementPreview"], "I has a apple");

    let resp = ws_rpc(&url, "ai.processText", debug_params("I has a apple", 3)).await;
    let suggestions = resp["result"]["suggestions"].as_array().unwrap();
    assert_eq!(suggestions.len(), 3);
    assert!(suggestions.iter().all(|s| s == MOCK));

    // Mock token accounting: estimate over text+query+context+mock, × n.
    let combined = format!("I has a apple{GRAMMAR_QUERY}{MOCK}");
    let expected = estimate_tokens(&combined) * 3;
    let resp = ws_rpc(&url, "usage.get", json!({})).await;
    assert_eq!(resp["result"]["tokenCount"], expected);

    let resp = ws_rpc(&url, "page.applyChanges", json!({ "text": "I have an apple" })).await;
    assert_eq!(resp["result"]["success"], true);

    let resp = ws_rpc(&url, "tab.read", json!({})).await;
    assert_eq!(resp["result"]["elements"][0]["text"], "I have an apple");

    let resp = ws_rpc(&url, "usage.reset", json!({})).await;
    assert_eq!(resp["result"]["success"], true);
    let resp = ws_rpc(&url, "usage.get", json!({})).await;
    assert_eq!(resp["result"]["tokenCount"], 0);
}

#[tokio::test]
async fn test_apply_without_capture_mutates_nothing() {
    let (url, _ctx) = start_test_daemon().await;
    let resp = ws_rpc(
        &url,
        "tab.open",
        json!({ "elements": [{ "kind": "plainField", "text": "untouched" }] }),
    )
    .await;
    assert!(resp["result"]["tabId"].is_number());

    // No binding was ever injected (no getSelectedText), so apply has
    // nowhere to write.
    let resp = ws_rpc(&url, "page.applyChanges", json!({ "text": "new" })).await;
    assert_eq!(resp["result"]["success"], false);
    assert!(resp["result"]["error"].is_string());

    let resp = ws_rpc(&url, "tab.read", json!({})).await;
    assert_eq!(resp["result"]["elements"][0]["text"], "untouched");
}

#[tokio::test]
async fn test_apply_after_detach_fails_cleanly() {
    let (url, _ctx) = start_test_daemon().await;
    open_and_select(&url, "soon gone", 0, 9).await;

    let resp = ws_rpc(&url, "page.getSelectedText", json!({})).await;
    assert_eq!(resp["result"]["selectedText"], "soon gone");

    let resp = ws_rpc(&url, "tab.detachElement", json!({ "elementId": 1 })).await;
    assert_eq!(resp["result"]["success"], true);

    let resp = ws_rpc(&url, "page.applyChanges", json!({ "text": "replacement" })).await;
    assert_eq!(resp["result"]["success"], false);
    assert!(resp["result"]["error"].is_string());
}

#[tokio::test]
async fn test_sequential_applies_stack() {
    let (url, _ctx) = start_test_daemon().await;
    open_and_select(&url, "abcdef", 2, 4).await;

    let resp = ws_rpc(&url, "page.getSelectedText", json!({})).await;
    assert_eq!(resp["result"]["selectedText"], "cd");

    // First apply replaces the selection; the caret lands after the
    // inserted text, so the second apply inserts there instead of
    // overwriting.
    let resp = ws_rpc(&url, "page.applyChanges", json!({ "text": "XYZ" })).await;
    assert_eq!(resp["result"]["success"], true);
    let resp = ws_rpc(&url, "page.applyChanges", json!({ "text": "W" })).await;
    assert_eq!(resp["result"]["success"], true);

    let resp = ws_rpc(&url, "tab.read", json!({})).await;
    assert_eq!(resp["result"]["elements"][0]["text"], "abXYZWef");
}

#[tokio::test]
async fn test_selection_survives_blur() {
    let (url, _ctx) = start_test_daemon().await;
    open_and_select(&url, "sticky text", 0, 6).await;

    // First read captures the target inside the binding.
    let resp = ws_rpc(&url, "page.getSelectedText", json!({})).await;
    assert_eq!(resp["result"]["selectedText"], "sticky");

    // The popup steals focus the instant it opens; the capture must hold.
    let resp = ws_rpc(&url, "tab.blur", json!({})).await;
    assert_eq!(resp["result"]["success"], true);

    let resp = ws_rpc(&url, "page.applyChanges", json!({ "text": "kept" })).await;
    assert_eq!(resp["result"]["success"], true);
    let resp = ws_rpc(&url, "tab.read", json!({})).await;
    assert_eq!(resp["result"]["elements"][0]["text"], "kept text");
}

#[tokio::test]
async fn test_get_selected_text_without_tab() {
    let (url, _ctx) = start_test_daemon().await;
    let resp = ws_rpc(&url, "page.getSelectedText", json!({})).await;
    assert!(resp["result"]["selectedText"].is_null());
    assert_eq!(resp["result"]["error"], "No active tab found.");
}

#[tokio::test]
async fn test_exactly_n_for_all_valid_counts() {
    let (url, _ctx) = start_test_daemon().await;
    for n in 1..=5 {
        let resp = ws_rpc(&url, "ai.processText", debug_params("some text", n)).await;
        let suggestions = resp["result"]["suggestions"].as_array().unwrap();
        assert_eq!(suggestions.len(), n, "n={n} must yield exactly {n} items");
    }
}

#[tokio::test]
async fn test_grammar_example_shape() {
    let (url, _ctx) = start_test_daemon().await;
    let resp = ws_rpc(&url, "ai.processText", debug_params("I has a apple", 2)).await;
    let suggestions = resp["result"]["suggestions"].as_array().unwrap();
    assert_eq!(suggestions.len(), 2);
    for s in suggestions {
        let s = s.as_str().unwrap();
        assert!(!s.is_empty());
        assert_ne!(s, "I has a apple");
    }
}

#[tokio::test]
async fn test_unknown_model_is_domain_error() {
    let (url, _ctx) = start_test_daemon().await;
    let resp = ws_rpc(
        &url,
        "ai.processText",
        json!({ "text": "t", "query": "q", "model": "nope-1" }),
    )
    .await;
    assert_eq!(resp["result"]["error"], "Model nope-1 not found or supported.");
    assert!(resp["result"].get("suggestions").is_none());
}

#[tokio::test]
async fn test_missing_credential_is_domain_error() {
    let (url, _ctx) = start_test_daemon().await;
    let resp = ws_rpc(
        &url,
        "ai.processText",
        json!({ "text": "t", "query": "q", "model": "gpt-4o" }),
    )
    .await;
    let err = resp["result"]["error"].as_str().unwrap();
    assert!(err.contains("API key for openai"));
}

#[tokio::test]
async fn test_concurrent_generations_both_count() {
    let (url, ctx) = start_test_daemon().await;

    // Two overlapping requests over two connections; each increment is
    // an exclusive read-modify-write, so the total is exact regardless
    // of completion order.
    let a = ws_rpc(&url, "ai.processText", debug_params("first text", 2));
    let b = ws_rpc(&url, "ai.processText", debug_params("second body", 3));
    let (ra, rb) = tokio::join!(a, b);
    assert_eq!(ra["result"]["suggestions"].as_array().unwrap().len(), 2);
    assert_eq!(rb["result"]["suggestions"].as_array().unwrap().len(), 3);

    let expected_a = estimate_tokens(&format!("first text{GRAMMAR_QUERY}{MOCK}")) * 2;
    let expected_b = estimate_tokens(&format!("second body{GRAMMAR_QUERY}{MOCK}")) * 3;
    assert_eq!(ctx.settings.token_count().await, expected_a + expected_b);
}

#[tokio::test]
async fn test_settings_roundtrip() {
    let (url, _ctx) = start_test_daemon().await;
    let resp = ws_rpc(&url, "settings.get", json!({})).await;
    assert_eq!(resp["result"]["defaultModel"], "gemini-1.5-flash");
    assert_eq!(resp["result"]["defaultN"], 1);

    let resp = ws_rpc(
        &url,
        "settings.update",
        json!({ "defaultN": 3, "debugMode": true }),
    )
    .await;
    assert_eq!(resp["result"]["defaultN"], 3);
    assert_eq!(resp["result"]["debugMode"], true);

    let resp = ws_rpc(&url, "settings.get", json!({})).await;
    assert_eq!(resp["result"]["defaultN"], 3);
}

#[tokio::test]
async fn test_usage_notification_broadcast() {
    let (url, _ctx) = start_test_daemon().await;

    let (mut ws, _) = connect_async(&url).await.unwrap();
    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "ai.processText",
        "params": debug_params("notify me", 1),
    });
    ws.send(Message::Text(serde_json::to_string(&request).unwrap()))
        .await
        .unwrap();

    let mut saw_usage_event = false;
    let mut saw_response = false;
    while !(saw_usage_event && saw_response) {
        let msg = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for usage notification")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = msg {
            let v: Value = serde_json::from_str(&text).unwrap();
            if v["method"] == "usage.updated" {
                assert!(v["params"]["tokenCount"].as_u64().unwrap() > 0);
                saw_usage_event = true;
            } else if v.get("id").is_some() {
                saw_response = true;
            }
        }
    }
}

#[tokio::test]
async fn test_rich_text_multiline_apply() {
    let (url, _ctx) = start_test_daemon().await;
    let resp = ws_rpc(
        &url,
        "tab.open",
        json!({ "elements": [{ "kind": "richText", "text": "draft line" }] }),
    )
    .await;
    assert!(resp["result"]["tabId"].is_number());
    let resp = ws_rpc(
        &url,
        "tab.select",
        json!({ "elementId": 1, "nodeIndex": 0, "start": 0, "end": 10 }),
    )
    .await;
    assert_eq!(resp["result"]["success"], true);

    let resp = ws_rpc(&url, "page.getSelectedText", json!({})).await;
    assert_eq!(resp["result"]["selectedText"], "draft line");

    // Literal newlines become the surface's line breaks.
    let resp = ws_rpc(&url, "page.applyChanges", json!({ "text": "one\ntwo" })).await;
    assert_eq!(resp["result"]["success"], true);
    let resp = ws_rpc(&url, "tab.read", json!({})).await;
    assert_eq!(resp["result"]["elements"][0]["text"], "one\ntwo");
}

#[tokio::test]
async fn test_tab_lifecycle() {
    let (url, _ctx) = start_test_daemon().await;
    let t1 = ws_rpc(
        &url,
        "tab.open",
        json!({ "elements": [{ "kind": "plainField", "text": "first" }] }),
    )
    .await["result"]["tabId"]
        .as_u64()
        .unwrap();
    let t2 = ws_rpc(
        &url,
        "tab.open",
        json!({ "elements": [{ "kind": "plainField", "text": "second" }] }),
    )
    .await["result"]["tabId"]
        .as_u64()
        .unwrap();

    // Latest open becomes active.
    let resp = ws_rpc(&url, "daemon.status", json!({})).await;
    assert_eq!(resp["result"]["openTabs"], 2);
    assert_eq!(resp["result"]["activeTab"], t2);

    let resp = ws_rpc(&url, "tab.activate", json!({ "tabId": t1 })).await;
    assert_eq!(resp["result"]["success"], true);
    let resp = ws_rpc(&url, "tab.read", json!({})).await;
    assert_eq!(resp["result"]["elements"][0]["text"], "first");

    let resp = ws_rpc(&url, "tab.close", json!({ "tabId": t1 })).await;
    assert_eq!(resp["result"]["success"], true);

    // Closing an unknown tab is a protocol-level error.
    let resp = ws_rpc(&url, "tab.close", json!({ "tabId": t1 })).await;
    assert_eq!(resp["error"]["code"], -32001);
}
