#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("Qdrant error: {0}")]
    Qdrant(#[from] Box<qdrant_client::QdrantError>),

    #[error("vector index error: {0}")]
    VectorIndex(#[from] crate::vector_index::VectorIndexError),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("integer conversion: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),

    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },

    #[error("corrupt row: {0}")]
    CorruptRow(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("{0}")]
    Other(String),
}

impl MemoryError {
    /// Connectivity-class failures of the backing store.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Sqlite(e) => is_sqlx_unavailable(e),
            Self::Qdrant(_) => true,
            Self::VectorIndex(e) => e.is_unavailable(),
            _ => false,
        }
    }
}

pub(crate) fn is_sqlx_unavailable(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_unavailable() {
        assert!(MemoryError::Sqlite(sqlx::Error::PoolTimedOut).is_unavailable());
        assert!(!MemoryError::Sqlite(sqlx::Error::RowNotFound).is_unavailable());
    }

    #[test]
    fn invalid_display() {
        let err = MemoryError::Invalid {
            field: "tenant_id",
            reason: "must not be empty",
        };
        assert_eq!(err.to_string(), "invalid tenant_id: must not be empty");
    }
}
