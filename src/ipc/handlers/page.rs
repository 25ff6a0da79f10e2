//! Selection capture and write-back, routed through the active tab's
//! page binding.
//!
//! Every failure on this path — no tab, injection failure, a binding
//! that stopped answering — degrades to a structured error field in an
//! otherwise successful response. The UI treats a null selection as
//! manual-entry mode, so nothing here may reject the RPC itself.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::AppContext;

pub async fn get_selected_text(_params: Value, ctx: &AppContext) -> Result<Value> {
    let Some(tab) = ctx.tabs.active().await else {
        return Ok(json!({ "selectedText": null, "error": "No active tab found." }));
    };

    // Probe-then-inject happens inside ensure_binding; the extract is
    // only sent once the probe (or a fresh injection) has settled, so
    // the two messages never race each other on the binding channel.
    let binding = match ctx.tabs.ensure_binding(tab).await {
        Ok(binding) => binding,
        Err(e) => {
            warn!(tab, err = %e, "binding unavailable for selection read");
            return Ok(json!({ "selectedText": null, "error": e.to_string() }));
        }
    };

    match binding.extract().await {
        Ok(reply) => Ok(json!({
            "selectedText": reply.selected_text,
            "elementPreview": reply.element_preview,
        })),
        Err(e) => Ok(json!({ "selectedText": null, "error": e.to_string() })),
    }
}

#[derive(Deserialize)]
struct ApplyParams {
    text: String,
}

pub async fn apply_changes(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ApplyParams = serde_json::from_value(params)?;
    if p.text.is_empty() {
        return Ok(json!({ "success": false, "error": "No text provided to apply." }));
    }

    let Some(tab) = ctx.tabs.active().await else {
        return Ok(json!({ "success": false, "error": "No active tab found." }));
    };

    // Apply goes to the binding that captured the target; if none was
    // ever injected there is by definition nothing to write back to.
    let Some(binding) = ctx.tabs.binding(tab).await? else {
        return Ok(json!({
            "success": false,
            "error": "No page binding installed in the active tab.",
        }));
    };

    match binding.apply(p.text).await {
        Ok(()) => Ok(json!({ "success": true })),
        Err(e) => Ok(json!({ "success": false, "error": e.to_string() })),
    }
}
