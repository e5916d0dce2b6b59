use thiserror::Error;

/// Failure reported by a chat or image provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("the API key was rejected or has expired; check the provider configuration")]
    Unauthorized,
    #[error("too many requests; wait a moment and try again")]
    RateLimited,
    #[error("the request timed out; check the network or try again later")]
    Timeout,
    #[error("could not connect to the provider: {0}")]
    Connection(String),
    #[error("provider call failed: {0}")]
    Provider(String),
}

impl ProviderError {
    /// Maps a non-success HTTP status (plus a body excerpt) onto the taxonomy.
    pub fn from_status(code: u16, body: &str) -> Self {
        match code {
            401 | 403 => Self::Unauthorized,
            429 => Self::RateLimited,
            408 | 504 => Self::Timeout,
            _ => Self::Provider(format!("HTTP {code}: {}", truncate_text(body.trim(), 512))),
        }
    }

    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        if err.is_connect() {
            return Self::Connection(err.to_string());
        }
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), "");
        }
        Self::Provider(err.to_string())
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        Self::from_transport(&err)
    }
}

/// Terminal failure of an AI text or image task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("{0} is not configured; set an API key first")]
    NotConfigured(&'static str),
    #[error("the prompt document is empty")]
    EmptyDocument,
    #[error("a task of this kind is already running")]
    Busy,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("unexpected error: {0}")]
    Unknown(String),
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
