use thiserror::Error;

/// Failure taxonomy for the rewrite pipeline.
///
/// Domain failures are carried inside successful bus responses as an
/// `error` field (see `ipc::handlers`); only malformed requests become
/// JSON-RPC error objects. Provider responses with the wrong shape are
/// recovered locally by `ai::normalize` and never surface here.
#[derive(Debug, Error)]
pub enum RedraftError {
    /// Apply was attempted without a valid capture, or the captured
    /// element has been detached from its document.
    #[error("no editable target captured — the original text field is no longer available")]
    NoTarget,

    /// The insertion primitive failed after a valid capture.
    #[error("failed to apply text: {0}")]
    Apply(String),

    #[error("model {0} not found or supported")]
    UnknownModel(String),

    /// No credential configured for the model's provider and debug mode
    /// is off. Reported without contacting the provider.
    #[error("API key for {0} is not set — configure it in settings")]
    MissingCredential(&'static str),

    /// Non-success HTTP status from a provider. Never retried.
    #[error("{provider} API error: {status}\n{body}")]
    Http {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// Messaging failure: binding channel closed, injection failed,
    /// or the network layer gave up before an HTTP status existed.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("tab {0} not found")]
    TabNotFound(u64),
}
