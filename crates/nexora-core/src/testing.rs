//! Shared fixtures for unit tests: a service wired to mock providers, an in-memory
//! index and an in-memory `SQLite` store.

use std::sync::Arc;
use std::time::Duration;

use nexora_llm::mock::MockProvider;
use nexora_memory::{InMemoryIndex, SqliteStore, TenantId};

use crate::pipeline::PipelineSettings;
use crate::retry::RetryPolicy;
use crate::service::{RagService, ServiceOptions};

pub(crate) struct Harness {
    pub service: Arc<RagService<MockProvider, MockProvider>>,
    pub generator: MockProvider,
    pub index: Arc<InMemoryIndex>,
    pub store: SqliteStore,
}

pub(crate) fn fast_options() -> ServiceOptions {
    ServiceOptions {
        pipeline: PipelineSettings {
            retry: RetryPolicy {
                max_attempts: 3,
                base_backoff: Duration::from_millis(1),
            },
            ..PipelineSettings::default()
        },
        embedding_timeout: Duration::from_secs(5),
        ..ServiceOptions::default()
    }
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(MockProvider::default(), MockProvider::default(), fast_options()).await
    }

    pub async fn with_failing_embedder() -> Self {
        let mut embedder = MockProvider::default();
        embedder.fail_embed = true;
        Self::build(embedder, MockProvider::default(), fast_options()).await
    }

    pub async fn with_generator(generator: MockProvider) -> Self {
        Self::build(MockProvider::default(), generator, fast_options()).await
    }

    pub async fn build(
        embedder: MockProvider,
        generator: MockProvider,
        options: ServiceOptions,
    ) -> Self {
        let index = Arc::new(InMemoryIndex::new());
        let store = SqliteStore::new(":memory:").await.unwrap();
        let service = RagService::new(
            embedder,
            generator.clone(),
            index.clone(),
            store.clone(),
            options,
        )
        .unwrap();
        Self {
            service: Arc::new(service),
            generator,
            index,
            store,
        }
    }

    pub fn tenant(&self, id: &str) -> TenantId {
        TenantId::new(id).unwrap()
    }
}
