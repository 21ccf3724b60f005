use super::{Config, IndexBackend, ProviderKind};

fn parse_enum<T: serde::de::DeserializeOwned>(v: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(v.to_owned())).ok()
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_backends();
        self.apply_env_overrides_pipeline();
        self.apply_env_overrides_gateway();
    }

    fn apply_env_overrides_backends(&mut self) {
        if let Ok(v) = std::env::var("NEXORA_INDEX_BACKEND") {
            if let Some(backend) = parse_enum::<IndexBackend>(&v) {
                self.index.backend = backend;
            } else {
                tracing::warn!("ignoring invalid NEXORA_INDEX_BACKEND value: {v}");
            }
        }
        if let Ok(v) = std::env::var("NEXORA_QDRANT_URL") {
            self.index.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("NEXORA_QDRANT_COLLECTION") {
            self.index.collection = v;
        }
        if let Ok(v) = std::env::var("NEXORA_SQLITE_PATH") {
            self.storage.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("NEXORA_EMBEDDING_PROVIDER") {
            if let Some(kind) = parse_enum::<ProviderKind>(&v) {
                self.embedding.provider = kind;
            } else {
                tracing::warn!("ignoring invalid NEXORA_EMBEDDING_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("NEXORA_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Ok(v) = std::env::var("NEXORA_EMBEDDING_BASE_URL") {
            self.embedding.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("NEXORA_EMBEDDING_DIMENSION")
            && let Ok(dim) = v.parse::<usize>()
        {
            self.embedding.dimension = dim;
        }
        if let Ok(v) = std::env::var("NEXORA_GENERATION_PROVIDER") {
            if let Some(kind) = parse_enum::<ProviderKind>(&v) {
                self.generation.provider = kind;
            } else {
                tracing::warn!("ignoring invalid NEXORA_GENERATION_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("NEXORA_GENERATION_MODEL") {
            self.generation.model = v;
        }
        if let Ok(v) = std::env::var("NEXORA_GENERATION_BASE_URL") {
            self.generation.base_url = Some(v);
        }
    }

    fn apply_env_overrides_pipeline(&mut self) {
        if let Ok(v) = std::env::var("NEXORA_CHUNK_SIZE") {
            if let Ok(size) = v.parse::<usize>() {
                self.chunking.chunk_size = size;
            } else {
                tracing::warn!("ignoring invalid NEXORA_CHUNK_SIZE value: {v}");
            }
        }
        if let Ok(v) = std::env::var("NEXORA_CHUNK_OVERLAP") {
            if let Ok(overlap) = v.parse::<usize>() {
                self.chunking.chunk_overlap = overlap;
            } else {
                tracing::warn!("ignoring invalid NEXORA_CHUNK_OVERLAP value: {v}");
            }
        }
        if let Ok(v) = std::env::var("NEXORA_RETRIEVAL_TOP_K")
            && let Ok(top_k) = v.parse::<usize>()
        {
            self.retrieval.top_k = top_k;
        }
        if let Ok(v) = std::env::var("NEXORA_RETRIEVAL_MIN_SCORE") {
            if let Ok(score) = v.parse::<f32>() {
                self.retrieval.min_score = score;
            } else {
                tracing::warn!("ignoring invalid NEXORA_RETRIEVAL_MIN_SCORE value: {v}");
            }
        }
        if let Ok(v) = std::env::var("NEXORA_RETRIEVAL_HISTORY_TURNS")
            && let Ok(turns) = v.parse::<u32>()
        {
            self.retrieval.history_turns = turns;
        }
        if let Ok(v) = std::env::var("NEXORA_RETRIEVAL_REWRITE")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.retrieval.rewrite_queries = enabled;
        }
        if let Ok(v) = std::env::var("NEXORA_TIMEOUT_RETRIEVAL")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.retrieval = secs;
        }
        if let Ok(v) = std::env::var("NEXORA_TIMEOUT_GENERATION")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.generation = secs;
        }
        if let Ok(v) = std::env::var("NEXORA_TIMEOUT_EMBEDDING")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.embedding = secs;
        }
        if let Ok(v) = std::env::var("NEXORA_RETRY_MAX_ATTEMPTS")
            && let Ok(n) = v.parse::<u32>()
        {
            self.retry.max_attempts = n;
        }
    }

    fn apply_env_overrides_gateway(&mut self) {
        if let Ok(v) = std::env::var("NEXORA_GATEWAY_BIND") {
            self.gateway.bind = v;
        }
        if let Ok(v) = std::env::var("NEXORA_GATEWAY_PORT")
            && let Ok(port) = v.parse::<u16>()
        {
            self.gateway.port = port;
        }
        if let Ok(v) = std::env::var("NEXORA_GATEWAY_TOKEN") {
            self.gateway.auth_token = Some(v);
        }
        if let Ok(v) = std::env::var("NEXORA_GATEWAY_RATE_LIMIT")
            && let Ok(limit) = v.parse::<u32>()
        {
            self.gateway.rate_limit = limit;
        }
        if let Ok(v) = std::env::var("NEXORA_GATEWAY_MAX_BODY_SIZE")
            && let Ok(size) = v.parse::<usize>()
        {
            self.gateway.max_body_size = size;
        }
    }
}
