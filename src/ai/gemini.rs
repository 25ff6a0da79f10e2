//! Gemini wire contract — `generateContent` with a schema-constrained
//! JSON-array response. The credential travels in the query string.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::normalize;
use super::tokens::estimate_tokens;
use super::GenerationOutcome;
use crate::error::RedraftError;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const PROVIDER: &str = "Gemini";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    total_token_count: Option<u64>,
}

pub async fn generate(
    http: &Client,
    base_url: &str,
    model_id: &str,
    api_key: &str,
    prompt: &str,
    n: usize,
    query: &str,
) -> Result<GenerationOutcome, RedraftError> {
    let url = format!("{base_url}/models/{model_id}:generateContent?key={api_key}");
    let body = GenerateContentRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: prompt.to_string(),
            }],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            // Constrain the model to a bare JSON array of strings.
            response_schema: json!({
                "type": "ARRAY",
                "items": { "type": "STRING" }
            }),
        },
    };

    debug!(model = model_id, n, "calling Gemini generateContent");
    let response = http
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|e| RedraftError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RedraftError::Http {
            provider: "gemini",
            status: status.as_u16(),
            body,
        });
    }

    let data: GenerateContentResponse = response
        .json()
        .await
        .map_err(|e| RedraftError::Transport(e.to_string()))?;

    let payload = data
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .and_then(|c| c.parts.first())
        .and_then(|p| p.text.as_deref());

    let suggestions = match payload {
        Some(raw) => match normalize::decode_string_array(raw) {
            Ok(list) => normalize::fit_to_count(list, n, PROVIDER, query),
            Err(failure) => normalize::decode_failure_placeholders(failure, n, PROVIDER, query),
        },
        None => normalize::empty_response_placeholders(n, PROVIDER, query),
    };

    let tokens_used = match data.usage_metadata.and_then(|u| u.total_token_count) {
        Some(total) => total,
        None => estimate_tokens(prompt) + estimate_tokens(&suggestions.join(" ")),
    };

    Ok(GenerationOutcome {
        suggestions,
        tokens_used,
    })
}
