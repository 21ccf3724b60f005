use serde::{Deserialize, Serialize};

use crate::vault::Secret;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Qdrant,
    #[default]
    Sqlite,
    Memory,
}

impl IndexBackend {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Qdrant => "qdrant",
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

impl std::fmt::Display for IndexBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Hashing,
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
    #[cfg(feature = "mock")]
    Mock,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hashing => "hashing",
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
            #[cfg(feature = "mock")]
            Self::Mock => "mock",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub backend: IndexBackend,
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

fn default_collection() -> String {
    nexora_memory::qdrant::DEFAULT_COLLECTION.into()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::default(),
            qdrant_url: default_qdrant_url(),
            collection: default_collection(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

fn default_sqlite_path() -> String {
    "./data/nexora.db".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: ProviderKind,
    /// Model name for remote providers. Ignored by the hashing embedder.
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Output dimension of the hashing embedder.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn default_embedding_provider() -> ProviderKind {
    ProviderKind::Hashing
}

fn default_embedding_model() -> String {
    "text-embedding-004".into()
}

fn default_dimension() -> usize {
    nexora_llm::hashing::DEFAULT_DIMENSION
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimension: default_dimension(),
            base_url: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: ProviderKind,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_generation_provider() -> ProviderKind {
    ProviderKind::Gemini
}

fn default_generation_model() -> String {
    "gemini-2.5-flash".into()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_output_tokens() -> u32 {
    1000
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            base_url: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    50
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub min_score: f32,
    /// Prior turns (user + assistant pairs) sent to the generator.
    #[serde(default = "default_history_turns")]
    pub history_turns: u32,
    #[serde(default = "default_true")]
    pub rewrite_queries: bool,
}

fn default_top_k() -> usize {
    5
}

fn default_history_turns() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: 0.0,
            history_turns: default_history_turns(),
            rewrite_queries: true,
        }
    }
}

/// Stage timeouts in seconds.
#[derive(Debug, Deserialize, Serialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_retrieval_timeout")]
    pub retrieval: u64,
    #[serde(default = "default_generation_timeout")]
    pub generation: u64,
    #[serde(default = "default_embedding_timeout")]
    pub embedding: u64,
}

fn default_retrieval_timeout() -> u64 {
    5
}

fn default_generation_timeout() -> u64 {
    30
}

fn default_embedding_timeout() -> u64 {
    30
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            retrieval: default_retrieval_timeout(),
            generation: default_generation_timeout(),
            embedding: default_embedding_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    200
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct JobsConfig {
    /// Finished jobs kept for status queries before the oldest are evicted.
    #[serde(default = "default_max_retained")]
    pub max_retained: usize,
}

fn default_max_retained() -> usize {
    256
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_retained: default_max_retained(),
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_gateway_rate_limit")]
    pub rate_limit: u32,
    #[serde(default = "default_gateway_max_body")]
    pub max_body_size: usize,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("bind", &self.bind)
            .field("port", &self.port)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("rate_limit", &self.rate_limit)
            .field("max_body_size", &self.max_body_size)
            .finish()
    }
}

fn default_gateway_bind() -> String {
    "127.0.0.1".into()
}

fn default_gateway_port() -> u16 {
    8090
}

fn default_gateway_rate_limit() -> u32 {
    120
}

fn default_gateway_max_body() -> usize {
    1_048_576
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_gateway_bind(),
            port: default_gateway_port(),
            auth_token: None,
            rate_limit: default_gateway_rate_limit(),
            max_body_size: default_gateway_max_body(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ResolvedSecrets {
    pub gemini_api_key: Option<Secret>,
    pub openai_api_key: Option<Secret>,
}
