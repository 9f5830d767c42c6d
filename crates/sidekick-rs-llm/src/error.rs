use sidekick_rs_config::ConfigError;
use thiserror::Error;

/// Errors raised by model provider adapters.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No API key was configured inline or in the environment.
    #[error("{provider} api key not configured (set {env})")]
    MissingApiKey { provider: String, env: String },
    /// Transport-level failure.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider answered with a non-success status.
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    /// Response body did not match the expected shape.
    #[error("unexpected provider response: {0}")]
    Decode(String),
    /// Requested feature is not available for this provider.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Remote file staging failed.
    #[error("file staging failed: {0}")]
    Staging(String),
    /// Provider settings could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ProviderError {
    /// Whether the provider rejected the credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, ProviderError::MissingApiKey { .. })
            || matches!(self, ProviderError::Status { status, .. } if *status == 401 || *status == 403)
    }
}
