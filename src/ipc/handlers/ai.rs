//! `ai.*` handlers: suggestion generation and the model catalog.
//!
//! Generation failures are part of the domain, not the protocol: a
//! missing key, an unknown model, or a provider error all come back as
//! an `error` field in a successful response so the session layer can
//! show them to the user without tearing down the connection.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::ai::{find_model, GenerationRequest, SUPPORTED_MODELS};
use crate::AppContext;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugOptions {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    mock_suggestion: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessTextParams {
    text: String,
    query: String,
    #[serde(default)]
    context: String,
    model: String,
    #[serde(default = "default_n")]
    n: usize,
    #[serde(default)]
    debug: Option<DebugOptions>,
}

fn default_n() -> usize {
    1
}

pub async fn process_text(params: Value, ctx: &AppContext) -> Result<Value> {
    let params: ProcessTextParams = serde_json::from_value(params)?;

    let Some(model) = find_model(&params.model) else {
        return Ok(json!({
            "error": format!("Model {} not found or supported.", params.model),
        }));
    };

    let settings = ctx.settings.snapshot().await;
    let debug_enabled = params
        .debug
        .as_ref()
        .map(|d| d.enabled)
        .unwrap_or(settings.debug_mode);
    let mock = if debug_enabled {
        Some(
            params
                .debug
                .as_ref()
                .and_then(|d| d.mock_suggestion.clone())
                .unwrap_or_else(|| settings.mock_suggestion.clone()),
        )
    } else {
        None
    };

    let api_key = ctx.settings.api_key(model.provider.key()).await;
    if mock.is_none() && api_key.is_none() {
        return Ok(json!({
            "error": format!(
                "API key for {} is not set. Please set it in the extension options.",
                model.provider.key(),
            ),
        }));
    }

    let request = GenerationRequest {
        text: &params.text,
        query: &params.query,
        context: &params.context,
        model,
        api_key: api_key.as_deref(),
        n: params.n.clamp(1, 5),
        mock: mock.as_deref(),
    };

    match ctx.ai.generate(&request).await {
        Ok(outcome) => {
            if outcome.tokens_used > 0 {
                let total = ctx.settings.add_usage(outcome.tokens_used).await?;
                ctx.broadcaster
                    .broadcast("usage.updated", json!({ "tokenCount": total }));
            }
            info!(
                model = model.id,
                n = outcome.suggestions.len(),
                tokens = outcome.tokens_used,
                "processText complete"
            );
            Ok(json!({ "suggestions": outcome.suggestions }))
        }
        Err(e) => {
            warn!(model = model.id, error = %e, "processText failed");
            Ok(json!({ "error": e.to_string() }))
        }
    }
}

pub async fn list_models(_params: Value, _ctx: &AppContext) -> Result<Value> {
    Ok(json!({ "models": SUPPORTED_MODELS }))
}
