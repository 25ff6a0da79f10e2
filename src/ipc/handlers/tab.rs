//! `tab.*` handlers: the simulated host pages the daemon edits against.
//!
//! Tabs stand in for whatever document surfaces the coordinator is
//! attached to. Each tab owns one [`Document`]; bindings are injected
//! lazily by the `page.*` handlers, never here.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::page::{DocEvent, ElementSpec};
use crate::tabs::TabId;
use crate::AppContext;

#[derive(Debug, Deserialize)]
struct OpenParams {
    elements: Vec<ElementSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TabParams {
    tab_id: TabId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectParams {
    /// Defaults to the active tab.
    tab_id: Option<TabId>,
    element_id: u64,
    #[serde(default)]
    node_index: usize,
    start: usize,
    end: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetachParams {
    tab_id: Option<TabId>,
    element_id: u64,
}

pub async fn open(params: Value, ctx: &AppContext) -> Result<Value> {
    let params: OpenParams = serde_json::from_value(params)?;
    let tab_id = ctx.tabs.open(&params.elements).await;
    let doc = ctx.tabs.document(tab_id).await?;

    // Forward host-visible mutation events to connected clients so they
    // can observe their own applied edits.
    let mut events = doc.lock().expect("document lock").subscribe();
    let broadcaster = ctx.broadcaster.clone();
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(e) => e,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            let (kind, element) = match event {
                DocEvent::Input { element } => ("input", element),
                DocEvent::Change { element } => ("change", element),
                DocEvent::SelectionChanged => continue,
            };
            broadcaster.broadcast(
                "page.event",
                json!({ "tabId": tab_id, "kind": kind, "elementId": element }),
            );
        }
    });

    info!(tab_id, elements = params.elements.len(), "tab opened");
    Ok(json!({ "tabId": tab_id }))
}

pub async fn activate(params: Value, ctx: &AppContext) -> Result<Value> {
    let params: TabParams = serde_json::from_value(params)?;
    ctx.tabs.activate(params.tab_id).await?;
    debug!(tab_id = params.tab_id, "tab activated");
    Ok(json!({ "success": true }))
}

pub async fn close(params: Value, ctx: &AppContext) -> Result<Value> {
    let params: TabParams = serde_json::from_value(params)?;
    ctx.tabs.close(params.tab_id).await?;
    info!(tab_id = params.tab_id, "tab closed");
    Ok(json!({ "success": true }))
}

async fn resolve_tab(requested: Option<TabId>, ctx: &AppContext) -> Result<Option<TabId>> {
    Ok(match requested {
        Some(id) => Some(id),
        None => ctx.tabs.active().await,
    })
}

pub async fn select(params: Value, ctx: &AppContext) -> Result<Value> {
    let params: SelectParams = serde_json::from_value(params)?;
    let Some(tab) = resolve_tab(params.tab_id, ctx).await? else {
        return Ok(json!({ "success": false, "error": "No open tab." }));
    };
    let doc = ctx.tabs.document(tab).await?;
    let outcome = doc.lock().expect("document lock").select(
        params.element_id,
        params.node_index,
        params.start,
        params.end,
    );
    match outcome {
        Ok(()) => Ok(json!({ "success": true })),
        Err(e) => Ok(json!({ "success": false, "error": e.to_string() })),
    }
}

pub async fn blur(params: Value, ctx: &AppContext) -> Result<Value> {
    let tab_id = params
        .get("tabId")
        .and_then(Value::as_u64)
        .or(ctx.tabs.active().await);
    let Some(tab) = tab_id else {
        return Ok(json!({ "success": false, "error": "No open tab." }));
    };
    let doc = ctx.tabs.document(tab).await?;
    doc.lock().expect("document lock").blur();
    Ok(json!({ "success": true }))
}

pub async fn detach_element(params: Value, ctx: &AppContext) -> Result<Value> {
    let params: DetachParams = serde_json::from_value(params)?;
    let Some(tab) = resolve_tab(params.tab_id, ctx).await? else {
        return Ok(json!({ "success": false, "error": "No open tab." }));
    };
    let doc = ctx.tabs.document(tab).await?;
    let detached = doc
        .lock()
        .expect("document lock")
        .detach(params.element_id);
    Ok(json!({ "success": detached }))
}

/// Full text of every attached element in a tab, for verification by
/// clients and tests.
pub async fn read(params: Value, ctx: &AppContext) -> Result<Value> {
    let tab_id = params
        .get("tabId")
        .and_then(Value::as_u64)
        .or(ctx.tabs.active().await);
    let Some(tab) = tab_id else {
        return Ok(json!({ "elements": [], "error": "No open tab." }));
    };
    let doc = ctx.tabs.document(tab).await?;
    let elements: Vec<Value> = {
        let guard = doc.lock().expect("document lock");
        guard
            .elements()
            .iter()
            .map(|el| {
                json!({
                    "id": el.id,
                    "editable": el.is_editable(),
                    "text": el.text(),
                })
            })
            .collect()
    };
    Ok(json!({ "tabId": tab, "elements": elements }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_select_read_roundtrip() {
        let ctx = crate::test_context().await;
        let out = open(
            json!({ "elements": [{ "kind": "plainField", "text": "I has a apple" }] }),
            &ctx,
        )
        .await
        .unwrap();
        let tab_id = out["tabId"].as_u64().unwrap();

        let out = select(
            json!({ "tabId": tab_id, "elementId": 1, "start": 0, "end": 5 }),
            &ctx,
        )
        .await
        .unwrap();
        assert_eq!(out["success"], true);

        let out = read(json!({}), &ctx).await.unwrap();
        assert_eq!(out["tabId"], tab_id);
        assert_eq!(out["elements"][0]["text"], "I has a apple");
        assert_eq!(out["elements"][0]["editable"], true);
    }

    #[tokio::test]
    async fn close_unknown_tab_is_an_error() {
        let ctx = crate::test_context().await;
        assert!(close(json!({ "tabId": 99 }), &ctx).await.is_err());
    }

    #[tokio::test]
    async fn detach_removes_element_from_read() {
        let ctx = crate::test_context().await;
        open(
            json!({ "elements": [
                { "kind": "plainField", "text": "one" },
                { "kind": "static", "text": "two" },
            ] }),
            &ctx,
        )
        .await
        .unwrap();
        let out = detach_element(json!({ "elementId": 1 }), &ctx).await.unwrap();
        assert_eq!(out["success"], true);
        let out = read(json!({}), &ctx).await.unwrap();
        let elements = out["elements"].as_array().unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0]["text"], "two");
    }
}
