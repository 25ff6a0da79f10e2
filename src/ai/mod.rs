//! Provider adapter — one internal request shape in, one normalized
//! result shape out, regardless of which provider answered.

pub mod gemini;
pub mod normalize;
pub mod openai;
pub mod prompt;
pub mod tokens;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::DaemonConfig;
use crate::error::RedraftError;
use tokens::estimate_tokens;

// ─── Model catalog ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    OpenAi,
}

impl ProviderKind {
    /// The key this provider uses in the credential map.
    pub fn key(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
        }
    }
}

/// Static catalog entry for one selectable model.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub provider: ProviderKind,
    pub tokens_per_minute: u32,
    pub requests_per_minute: u32,
}

/// All selectable models. Immutable; looked up by id.
pub const SUPPORTED_MODELS: &[ModelDescriptor] = &[
    ModelDescriptor {
        id: "gemini-1.5-flash",
        name: "Gemini 1.5 Flash",
        description: "Fast and versatile multimodal model for scaling across diverse tasks.",
        provider: ProviderKind::Gemini,
        tokens_per_minute: 1_000_000,
        requests_per_minute: 60,
    },
    ModelDescriptor {
        id: "gemini-1.5-pro",
        name: "Gemini 1.5 Pro",
        description: "Mid-size multimodal model optimized for complex reasoning tasks.",
        provider: ProviderKind::Gemini,
        tokens_per_minute: 2_000_000,
        requests_per_minute: 10,
    },
    ModelDescriptor {
        id: "gemini-1.0-pro",
        name: "Gemini 1.0 Pro",
        description: "Balanced performance for moderate reasoning tasks.",
        provider: ProviderKind::Gemini,
        tokens_per_minute: 1_000_000,
        requests_per_minute: 60,
    },
    ModelDescriptor {
        id: "gemini-2.5-flash-preview-05-20",
        name: "Gemini 2.5 Flash Preview 05-20",
        description: "Preview model showcasing adaptive thinking and cost efficiency.",
        provider: ProviderKind::Gemini,
        tokens_per_minute: 1_000_000,
        requests_per_minute: 60,
    },
    ModelDescriptor {
        id: "gemini-2.5-pro-preview-05-06",
        name: "Gemini 2.5 Pro Preview 05-06",
        description: "Powerful reasoning model capable of complex problem-solving and \
                      long-context understanding.",
        provider: ProviderKind::Gemini,
        tokens_per_minute: 2_000_000,
        requests_per_minute: 10,
    },
    ModelDescriptor {
        id: "gpt-4o",
        name: "OpenAI GPT-4o",
        description: "Multimodal model supporting text, audio, images, and video for \
                      advanced reasoning.",
        provider: ProviderKind::OpenAi,
        tokens_per_minute: 600_000,
        requests_per_minute: 5_000,
    },
    ModelDescriptor {
        id: "gpt-4-turbo",
        name: "OpenAI GPT-4 Turbo",
        description: "Optimized for low latency and high throughput across diverse tasks.",
        provider: ProviderKind::OpenAi,
        tokens_per_minute: 600_000,
        requests_per_minute: 5_000,
    },
];

pub fn find_model(id: &str) -> Option<&'static ModelDescriptor> {
    SUPPORTED_MODELS.iter().find(|m| m.id == id)
}

// ─── Generation ──────────────────────────────────────────────────────────────

/// One internal generation request, provider-agnostic.
pub struct GenerationRequest<'a> {
    pub text: &'a str,
    pub query: &'a str,
    pub context: &'a str,
    pub model: &'static ModelDescriptor,
    pub api_key: Option<&'a str>,
    pub n: usize,
    /// Debug short-circuit: when set, the mock is repeated `n` times and
    /// no network call is made.
    pub mock: Option<&'a str>,
}

/// The uniform result shape every provider is normalized into.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    /// Always exactly `n` entries.
    pub suggestions: Vec<String>,
    /// Provider-reported usage when available, otherwise an estimate.
    pub tokens_used: u64,
}

pub struct AiClient {
    http: reqwest::Client,
    gemini_base: String,
    openai_base: String,
}

impl AiClient {
    pub fn new(config: &DaemonConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            gemini_base: config
                .gemini_base_url
                .clone()
                .unwrap_or_else(|| gemini::DEFAULT_BASE_URL.to_string()),
            openai_base: config
                .openai_base_url
                .clone()
                .unwrap_or_else(|| openai::DEFAULT_BASE_URL.to_string()),
        }
    }

    /// Produce exactly `n` rewrites of `text` per `query`.
    ///
    /// HTTP failures propagate as [`RedraftError::Http`]; malformed
    /// payloads do not — they degrade to placeholders inside a successful
    /// outcome. There is no retry at this layer or any other.
    pub async fn generate(
        &self,
        req: &GenerationRequest<'_>,
    ) -> Result<GenerationOutcome, RedraftError> {
        if let Some(mock) = req.mock {
            debug!(n = req.n, "debug mock supplied, skipping provider call");
            let combined = format!("{}{}{}{}", req.text, req.query, req.context, mock);
            return Ok(GenerationOutcome {
                suggestions: vec![mock.to_string(); req.n],
                tokens_used: estimate_tokens(&combined) * req.n as u64,
            });
        }

        let api_key = req
            .api_key
            .ok_or(RedraftError::MissingCredential(req.model.provider.key()))?;
        let prompt = prompt::build_prompt(req.text, req.query, req.context, req.n);

        let outcome = match req.model.provider {
            ProviderKind::Gemini => {
                gemini::generate(
                    &self.http,
                    &self.gemini_base,
                    req.model.id,
                    api_key,
                    &prompt,
                    req.n,
                    req.query,
                )
                .await?
            }
            ProviderKind::OpenAi => {
                openai::generate(
                    &self.http,
                    &self.openai_base,
                    req.model.id,
                    api_key,
                    &prompt,
                    req.n,
                    req.query,
                )
                .await?
            }
        };

        info!(
            model = req.model.id,
            suggestions = outcome.suggestions.len(),
            tokens = outcome.tokens_used,
            "generation complete"
        );
        Ok(outcome)
    }
}
