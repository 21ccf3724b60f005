use nexora_llm::LlmError;
use nexora_memory::document::{DocumentError, SplitterError};
use nexora_memory::{MemoryError, VectorIndexError};

/// Caller-facing error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Dependency,
    StorageUnavailable,
    NotFound,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Dependency => "dependency",
            Self::StorageUnavailable => "storage_unavailable",
            Self::NotFound => "not_found",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage that ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Embedding,
    Retrieval,
    Generation,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Embedding => "embedding",
            Self::Retrieval => "retrieval",
            Self::Generation => "generation",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("embedding failed: {0}")]
    Embedding(#[source] LlmError),

    #[error("generation failed: {0}")]
    Generation(#[source] LlmError),

    #[error("{stage} timed out")]
    Timeout { stage: Stage },

    #[error("vector index error: {0}")]
    Index(#[from] VectorIndexError),

    #[error("storage error: {0}")]
    Storage(#[source] MemoryError),

    #[error("not found: {0}")]
    NotFound(String),
}

const UNAVAILABLE_MESSAGE: &str = "The service is temporarily unavailable. Please try again later.";

impl RagError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Embedding(_) | Self::Generation(_) => ErrorKind::Dependency,
            Self::Timeout { stage } => match stage {
                Stage::Retrieval => ErrorKind::StorageUnavailable,
                Stage::Embedding | Stage::Generation => ErrorKind::Dependency,
            },
            Self::Index(e) => match e {
                VectorIndexError::DimensionMismatch { .. } => ErrorKind::Validation,
                _ => ErrorKind::StorageUnavailable,
            },
            Self::Storage(e) => match e {
                MemoryError::Invalid { .. } => ErrorKind::Validation,
                MemoryError::SessionNotFound(_) => ErrorKind::NotFound,
                _ => ErrorKind::StorageUnavailable,
            },
            Self::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Transient failures worth another attempt. Quota errors never are.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Embedding(e) | Self::Generation(e) => e.is_transient(),
            Self::Timeout { .. } => true,
            Self::Index(e) => e.is_unavailable(),
            Self::Storage(e) => e.is_unavailable(),
            Self::Validation(_) | Self::NotFound(_) => false,
        }
    }

    #[must_use]
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::Embedding(e) | Self::Generation(e) if e.is_quota())
    }

    /// Text safe to show to a tenant's end user. Dependency and storage details stay
    /// in the logs.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::NotFound => self.to_string(),
            ErrorKind::Dependency | ErrorKind::StorageUnavailable => {
                UNAVAILABLE_MESSAGE.to_owned()
            }
        }
    }
}

impl From<MemoryError> for RagError {
    fn from(e: MemoryError) -> Self {
        match e {
            MemoryError::VectorIndex(inner) => Self::Index(inner),
            MemoryError::SessionNotFound(id) => Self::NotFound(format!("session {id}")),
            MemoryError::Invalid { field, reason } => {
                Self::Validation(format!("{field} {reason}"))
            }
            other => Self::Storage(other),
        }
    }
}

impl From<SplitterError> for RagError {
    fn from(e: SplitterError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<DocumentError> for RagError {
    fn from(e: DocumentError) -> Self {
        match e {
            DocumentError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                Self::NotFound(io.to_string())
            }
            other => Self::Validation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(RagError::Validation("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(
            RagError::Generation(LlmError::Unavailable).kind(),
            ErrorKind::Dependency
        );
        assert_eq!(
            RagError::Index(VectorIndexError::Unavailable("down".into())).kind(),
            ErrorKind::StorageUnavailable
        );
        assert_eq!(
            RagError::Timeout {
                stage: Stage::Retrieval
            }
            .kind(),
            ErrorKind::StorageUnavailable
        );
        assert_eq!(RagError::NotFound("s".into()).kind(), ErrorKind::NotFound);
    }

    #[test]
    fn quota_is_not_retryable() {
        let err = RagError::Generation(LlmError::RateLimited);
        assert!(err.is_quota());
        assert!(!err.is_retryable());
        assert!(RagError::Generation(LlmError::Unavailable).is_retryable());
        assert!(!RagError::Validation("bad".into()).is_retryable());
    }

    #[test]
    fn user_message_hides_dependency_details() {
        let err = RagError::Generation(LlmError::Api {
            provider: "gemini",
            status: 500,
        });
        let msg = err.user_message();
        assert!(!msg.contains("gemini"));
        assert!(msg.contains("temporarily unavailable"));

        let err = RagError::Validation("question must not be empty".into());
        assert!(err.user_message().contains("question must not be empty"));
    }

    #[test]
    fn memory_errors_are_classified() {
        let err: RagError = MemoryError::Invalid {
            field: "tenant_id",
            reason: "must not be empty",
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err: RagError = MemoryError::SessionNotFound("s-1".into()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: RagError = MemoryError::Other("disk full".into()).into();
        assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
        assert!(!err.is_retryable());

        let err: RagError = MemoryError::VectorIndex(VectorIndexError::Unavailable("x".into())).into();
        assert!(matches!(err, RagError::Index(_)));
        assert!(err.is_retryable());
    }
}
