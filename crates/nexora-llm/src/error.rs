#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited")]
    RateLimited,

    #[error("provider unavailable")]
    Unavailable,

    #[error("{provider} API request failed (status {status})")]
    Api { provider: &'static str, status: u16 },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("embedding not supported by {provider}")]
    EmbedUnsupported { provider: &'static str },

    #[error("generation not supported by {provider}")]
    GenerateUnsupported { provider: &'static str },

    #[error("expected {expected} embeddings, got {got}")]
    BatchMismatch { expected: usize, got: usize },

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Quota exhaustion. Never retried automatically.
    #[must_use]
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    /// Timeouts, connection failures and server-side (5xx) errors.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            Self::Unavailable => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Map a non-success HTTP status to an error, separating quota from server faults.
    #[must_use]
    pub fn from_status(provider: &'static str, status: reqwest::StatusCode) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited
        } else if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            Self::Unavailable
        } else {
            Self::Api {
                provider,
                status: status.as_u16(),
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_is_quota_not_transient() {
        let err = LlmError::RateLimited;
        assert!(err.is_quota());
        assert!(!err.is_transient());
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(
            LlmError::Api {
                provider: "gemini",
                status: 502
            }
            .is_transient()
        );
        assert!(
            !LlmError::Api {
                provider: "gemini",
                status: 400
            }
            .is_transient()
        );
        assert!(LlmError::Unavailable.is_transient());
    }

    #[test]
    fn from_status_classifies() {
        assert!(matches!(
            LlmError::from_status("openai", reqwest::StatusCode::TOO_MANY_REQUESTS),
            LlmError::RateLimited
        ));
        assert!(matches!(
            LlmError::from_status("openai", reqwest::StatusCode::SERVICE_UNAVAILABLE),
            LlmError::Unavailable
        ));
        assert!(matches!(
            LlmError::from_status("openai", reqwest::StatusCode::UNAUTHORIZED),
            LlmError::Api { status: 401, .. }
        ));
    }

    #[test]
    fn display_includes_provider() {
        let err = LlmError::EmptyResponse { provider: "ollama" };
        assert_eq!(err.to_string(), "empty response from ollama");
    }
}
