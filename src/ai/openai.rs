//! OpenAI wire contract — chat completions with Bearer auth. The model
//! answers with a single completion whose content is a JSON object
//! (`{"suggestions": [...]}`), often wrapped in a fenced code block.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::normalize;
use super::tokens::estimate_tokens;
use super::GenerationOutcome;
use crate::error::RedraftError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const PROVIDER: &str = "OpenAI";

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    /// One completion carrying the whole suggestions object; the fan-out
    /// to `n` rewrites happens inside the prompt, not here.
    n: u8,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: Option<u64>,
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
    let url = format!("{base_url}/chat/completions");
    let body = ChatCompletionRequest {
        model: model_id,
        messages: vec![ChatMessage {
            role: "user",
            content: prompt,
        }],
        response_format: ResponseFormat {
            kind: "json_object",
        },
        n: 1,
    };

    debug!(model = model_id, n, "calling OpenAI chat completions");
    let response = http
        .post(&url)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
        .map_err(|e| RedraftError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RedraftError::Http {
            provider: "openai",
            status: status.as_u16(),
            body,
        });
    }

    let data: ChatCompletionResponse = response
        .json()
        .await
        .map_err(|e| RedraftError::Transport(e.to_string()))?;

    let payload = data
        .choices
        .first()
        .and_then(|c| c.message.as_ref())
        .and_then(|m| m.content.as_deref());

    let suggestions = match payload {
        Some(raw) => match normalize::decode_suggestions_object(raw) {
            Ok(list) => normalize::fit_to_count(list, n, PROVIDER, query),
            Err(failure) => normalize::decode_failure_placeholders(failure, n, PROVIDER, query),
        },
        None => normalize::empty_response_placeholders(n, PROVIDER, query),
    };

    let tokens_used = match data.usage.and_then(|u| u.total_tokens) {
        Some(total) => total,
        None => estimate_tokens(prompt) + estimate_tokens(&suggestions.join(" ")),
    };

    Ok(GenerationOutcome {
        suggestions,
        tokens_used,
    })
}
