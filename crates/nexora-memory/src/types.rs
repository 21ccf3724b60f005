use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

const MAX_ID_LEN: usize = 128;

fn validate_id(field: &'static str, value: &str) -> Result<(), MemoryError> {
    if value.trim().is_empty() {
        return Err(MemoryError::Invalid {
            field,
            reason: "must not be empty",
        });
    }
    if value.len() > MAX_ID_LEN {
        return Err(MemoryError::Invalid {
            field,
            reason: "must be at most 128 bytes",
        });
    }
    if value.chars().any(char::is_control) {
        return Err(MemoryError::Invalid {
            field,
            reason: "must not contain control characters",
        });
    }
    Ok(())
}

/// Isolation boundary: every stored chunk and session belongs to exactly one tenant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// # Errors
    ///
    /// Returns [`MemoryError::Invalid`] for empty, oversized or control-character ids.
    pub fn new(value: impl Into<String>) -> Result<Self, MemoryError> {
        let value = value.into();
        validate_id("tenant_id", &value)?;
        Ok(Self(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct SessionId(String);

impl SessionId {
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// # Errors
    ///
    /// Returns [`MemoryError::Invalid`] for empty, oversized or control-character ids.
    pub fn parse(value: impl Into<String>) -> Result<Self, MemoryError> {
        let value = value.into();
        validate_id("session_id", &value)?;
        Ok(Self(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Origin of ingested content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Web,
    Pdf,
    Docx,
    #[default]
    Text,
    Upload,
}

impl SourceType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Text => "text",
            Self::Upload => "upload",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "web" => Ok(Self::Web),
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "text" => Ok(Self::Text),
            "upload" => Ok(Self::Upload),
            _ => Err(MemoryError::Invalid {
                field: "source_type",
                reason: "expected one of web, pdf, docx, text, upload",
            }),
        }
    }
}

/// Validate a source URL used as part of the chunk key.
///
/// # Errors
///
/// Returns [`MemoryError::Invalid`] for empty or control-character values.
pub fn validate_source_url(source_url: &str) -> Result<(), MemoryError> {
    if source_url.trim().is_empty() {
        return Err(MemoryError::Invalid {
            field: "source_url",
            reason: "must not be empty",
        });
    }
    if source_url.chars().any(char::is_control) {
        return Err(MemoryError::Invalid {
            field: "source_url",
            reason: "must not contain control characters",
        });
    }
    Ok(())
}

/// Atomic retrieval unit: a span of source text with its embedding.
///
/// Keyed by `(tenant_id, source_url, chunk_index)`; `id` is derived from that key so
/// re-ingesting the same chunk overwrites it in every backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub tenant_id: TenantId,
    pub source_url: String,
    pub source_type: SourceType,
    pub content: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    pub embedding_model: String,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    /// Deterministic point id for a chunk key.
    #[must_use]
    pub fn point_id(tenant_id: &TenantId, source_url: &str, chunk_index: u32) -> uuid::Uuid {
        let name = format!("{tenant_id}\n{source_url}\n{chunk_index}");
        uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, name.as_bytes())
    }

    /// Ordering key used for deterministic tie-breaks.
    #[must_use]
    pub fn key(&self) -> (&str, u32) {
        (&self.source_url, self.chunk_index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub(crate) fn parse(s: &str) -> Result<Self, MemoryError> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(MemoryError::CorruptRow(format!("unknown message role '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub sources: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            sources: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            sources,
            timestamp: Utc::now(),
        }
    }
}

/// Session metadata. Messages are read through the session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatSession {
    pub id: SessionId,
    pub tenant_id: TenantId,
    pub user_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
