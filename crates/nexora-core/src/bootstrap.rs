//! Wiring of providers, index backend and stores from a loaded [`Config`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use nexora_llm::any::AnyProvider;
use nexora_llm::gemini::GeminiProvider;
use nexora_llm::hashing::HashingEmbedder;
use nexora_llm::ollama::OllamaProvider;
use nexora_llm::openai::OpenAiProvider;
use nexora_memory::{InMemoryIndex, QdrantIndex, SqliteIndex, SqliteStore, VectorIndex};

use crate::config::{Config, IndexBackend, ProviderKind};
use crate::service::{RagService, ServiceOptions};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

pub type DefaultService = RagService<AnyProvider, AnyProvider>;

/// Explicit path first, then `NEXORA_CONFIG`, then `config/default.toml`.
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("NEXORA_CONFIG")
        && !path.is_empty()
    {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

fn gemini_key(config: &Config) -> anyhow::Result<String> {
    Ok(config
        .secrets
        .gemini_api_key
        .as_ref()
        .context("NEXORA_GEMINI_API_KEY (or GOOGLE_API_KEY) not found in vault")?
        .expose()
        .to_owned())
}

fn openai_key(config: &Config) -> anyhow::Result<String> {
    Ok(config
        .secrets
        .openai_api_key
        .as_ref()
        .context("NEXORA_OPENAI_API_KEY not found in vault")?
        .expose()
        .to_owned())
}

/// # Errors
///
/// Returns an error if the selected provider needs an API key that was not resolved.
pub fn create_embedder(config: &Config) -> anyhow::Result<AnyProvider> {
    let emb = &config.embedding;
    let provider = match emb.provider {
        ProviderKind::Hashing => AnyProvider::Hashing(HashingEmbedder::new(emb.dimension)),
        ProviderKind::Gemini => {
            let mut gemini = GeminiProvider::new(gemini_key(config)?, config.generation.model.clone())
                .with_embedding_model(emb.model.clone());
            if let Some(base) = &emb.base_url {
                gemini = gemini.with_base_url(base.clone());
            }
            AnyProvider::Gemini(gemini)
        }
        ProviderKind::OpenAi => AnyProvider::OpenAi(OpenAiProvider::new(
            openai_key(config)?,
            emb.base_url.clone().unwrap_or_else(|| OPENAI_BASE_URL.into()),
            config.generation.model.clone(),
            config.generation.max_output_tokens,
            Some(emb.model.clone()),
        )),
        ProviderKind::Ollama => AnyProvider::Ollama(OllamaProvider::new(
            emb.base_url.as_deref().unwrap_or(OLLAMA_BASE_URL),
            config.generation.model.clone(),
            emb.model.clone(),
        )),
        #[cfg(feature = "mock")]
        ProviderKind::Mock => AnyProvider::Mock(nexora_llm::mock::MockProvider::default()),
    };
    Ok(provider)
}

/// # Errors
///
/// Returns an error for the hashing provider, which cannot generate, or a missing key.
pub fn create_generator(config: &Config) -> anyhow::Result<AnyProvider> {
    let generation = &config.generation;
    let provider = match generation.provider {
        ProviderKind::Hashing => anyhow::bail!("generation.provider 'hashing' cannot generate text"),
        ProviderKind::Gemini => {
            let mut gemini = GeminiProvider::new(gemini_key(config)?, generation.model.clone())
                .with_generation(generation.temperature, generation.max_output_tokens);
            if let Some(base) = &generation.base_url {
                gemini = gemini.with_base_url(base.clone());
            }
            AnyProvider::Gemini(gemini)
        }
        ProviderKind::OpenAi => AnyProvider::OpenAi(
            OpenAiProvider::new(
                openai_key(config)?,
                generation
                    .base_url
                    .clone()
                    .unwrap_or_else(|| OPENAI_BASE_URL.into()),
                generation.model.clone(),
                generation.max_output_tokens,
                None,
            )
            .with_temperature(generation.temperature),
        ),
        ProviderKind::Ollama => AnyProvider::Ollama(OllamaProvider::new(
            generation.base_url.as_deref().unwrap_or(OLLAMA_BASE_URL),
            generation.model.clone(),
            config.embedding.model.clone(),
        )),
        #[cfg(feature = "mock")]
        ProviderKind::Mock => AnyProvider::Mock(nexora_llm::mock::MockProvider::default()),
    };
    Ok(provider)
}

/// # Errors
///
/// Returns an error if the Qdrant client cannot be built.
pub fn create_index(config: &Config, store: &SqliteStore) -> anyhow::Result<Arc<dyn VectorIndex>> {
    let index: Arc<dyn VectorIndex> = match config.index.backend {
        IndexBackend::Qdrant => Arc::new(
            QdrantIndex::new(&config.index.qdrant_url, config.index.collection.clone())
                .context("failed to build Qdrant client")?,
        ),
        IndexBackend::Sqlite => Arc::new(SqliteIndex::new(store.pool().clone())),
        IndexBackend::Memory => Arc::new(InMemoryIndex::new()),
    };
    Ok(index)
}

/// Open the stores and build the service. Secrets must already be resolved.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, a provider cannot be created, or
/// the `SQLite` database cannot be opened.
pub async fn build_service(config: &Config) -> anyhow::Result<DefaultService> {
    config.validate()?;

    if let Some(parent) = Path::new(&config.storage.sqlite_path).parent()
        && !parent.as_os_str().is_empty()
        && config.storage.sqlite_path != ":memory:"
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let store = SqliteStore::new(&config.storage.sqlite_path)
        .await
        .context("failed to open SQLite store")?;

    let embedder = create_embedder(config)?;
    let generator = create_generator(config)?;
    let index = create_index(config, &store)?;

    tracing::info!(
        index = index.name(),
        embedder = %config.embedding.provider,
        generator = %config.generation.provider,
        "service configured"
    );

    Ok(RagService::new(
        embedder,
        generator,
        index,
        store,
        ServiceOptions::from_config(config),
    )?)
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::vault::Secret;

    #[test]
    #[serial]
    fn explicit_path_wins() {
        let path = resolve_config_path(Some(Path::new("/etc/nexora.toml")));
        assert_eq!(path, PathBuf::from("/etc/nexora.toml"));
    }

    #[test]
    #[serial]
    fn config_path_falls_back_to_default() {
        unsafe { std::env::remove_var("NEXORA_CONFIG") };
        assert_eq!(
            resolve_config_path(None),
            PathBuf::from("config/default.toml")
        );
    }

    #[test]
    fn gemini_generator_requires_key() {
        let config = Config::default();
        let err = create_generator(&config).unwrap_err();
        assert!(err.to_string().contains("NEXORA_GEMINI_API_KEY"));
    }

    #[test]
    fn hashing_cannot_generate() {
        let mut config = Config::default();
        config.generation.provider = ProviderKind::Hashing;
        assert!(create_generator(&config).is_err());
    }

    #[test]
    fn providers_follow_config() {
        let mut config = Config::default();
        config.secrets.gemini_api_key = Some(Secret::new("k"));
        assert!(matches!(
            create_embedder(&config).unwrap(),
            AnyProvider::Hashing(_)
        ));
        assert!(matches!(
            create_generator(&config).unwrap(),
            AnyProvider::Gemini(_)
        ));
    }

    #[tokio::test]
    async fn service_builds_on_sqlite_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.secrets.gemini_api_key = Some(Secret::new("k"));
        config.storage.sqlite_path = dir
            .path()
            .join("nested/nexora.db")
            .to_string_lossy()
            .into_owned();

        let service = build_service(&config).await.unwrap();
        assert_eq!(service.index_backend(), "sqlite");
    }
}
