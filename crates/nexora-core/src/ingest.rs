//! Embedding and storing chunk text handed over by ingestion collaborators.
//!
//! Re-ingesting a source replaces it: chunks are upserted by key first, then the tail
//! of the previous version beyond the new chunk count is removed, so the source never
//! vanishes mid-update.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use nexora_llm::Embedder;
use nexora_memory::document::{TextSplitter, loader_for};
use nexora_memory::types::validate_source_url;
use nexora_memory::{Chunk, SourceType, TenantId, VectorIndex};
use tokio::sync::OnceCell;

use crate::embedder::EmbeddingService;
use crate::error::RagError;
use crate::registry::ModelRegistry;
use crate::retry::RetryPolicy;

/// Texts sent to the embedding model per request.
const EMBED_BATCH: usize = 64;

pub struct IngestService<E> {
    embedder: Arc<EmbeddingService<E>>,
    index: Arc<dyn VectorIndex>,
    registry: ModelRegistry,
    splitter: TextSplitter,
    retry: RetryPolicy,
    index_ready: OnceCell<()>,
}

impl<E: Embedder> IngestService<E> {
    #[must_use]
    pub fn new(
        embedder: Arc<EmbeddingService<E>>,
        index: Arc<dyn VectorIndex>,
        registry: ModelRegistry,
        splitter: TextSplitter,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            embedder,
            index,
            registry,
            splitter,
            retry,
            index_ready: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn splitter(&self) -> &TextSplitter {
        &self.splitter
    }

    /// Embed `chunks` and store them as the current content of `source_url`.
    ///
    /// Returns the number of chunks stored. An empty list removes the source.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] for an invalid source URL or an embedding model
    /// other than the tenant's registered one, and dependency or storage errors from the
    /// embedder and index.
    pub async fn ingest_chunks(
        &self,
        tenant: &TenantId,
        source_url: &str,
        source_type: SourceType,
        chunks: Vec<String>,
    ) -> Result<usize, RagError> {
        validate_source_url(source_url)?;
        let total = u32::try_from(chunks.len())
            .map_err(|_| RagError::Validation("too many chunks for one source".into()))?;

        if chunks.is_empty() {
            let removed = self.delete_tail(tenant, source_url, 0).await?;
            tracing::info!(tenant = %tenant, source = source_url, removed, "empty source ingested");
            return Ok(0);
        }

        let dimension = self.embedder.dimension().await?;
        self.registry
            .ensure_registered(tenant, self.embedder.model_id(), dimension)
            .await?;
        self.ensure_index_ready(dimension).await?;

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH) {
            vectors.extend(self.embedder.embed(batch).await?);
        }

        let created_at = Utc::now();
        let model = self.embedder.model_id().to_owned();
        let records: Vec<Chunk> = chunks
            .into_iter()
            .zip(vectors)
            .zip(0u32..)
            .map(|((content, embedding), chunk_index)| Chunk {
                id: Chunk::point_id(tenant, source_url, chunk_index).to_string(),
                tenant_id: tenant.clone(),
                source_url: source_url.to_owned(),
                source_type,
                content,
                chunk_index,
                total_chunks: total,
                embedding,
                embedding_model: model.clone(),
                created_at,
            })
            .collect();
        let stored = records.len();

        let index = &self.index;
        let records = &records;
        self.retry
            .run("upsert", move || async move {
                Ok(index.upsert(tenant, records.clone()).await?)
            })
            .await?;
        let stale = self.delete_tail(tenant, source_url, total).await?;

        tracing::info!(
            tenant = %tenant,
            source = source_url,
            chunks = stored,
            stale,
            "source ingested"
        );
        Ok(stored)
    }

    /// Chunk `text` with the configured splitter, then [`Self::ingest_chunks`].
    ///
    /// # Errors
    ///
    /// See [`Self::ingest_chunks`].
    pub async fn ingest_document(
        &self,
        tenant: &TenantId,
        source_url: &str,
        source_type: SourceType,
        text: &str,
    ) -> Result<usize, RagError> {
        let chunks = self.splitter.split(text);
        tracing::debug!(
            tenant = %tenant,
            source = source_url,
            chars = text.chars().count(),
            chunks = chunks.len(),
            "document chunked"
        );
        self.ingest_chunks(tenant, source_url, source_type, chunks)
            .await
    }

    /// Load a file, chunk it and ingest it. The source URL defaults to the canonical
    /// path and the source type to the loader's.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] for unsupported, oversized or non-UTF-8 files,
    /// [`RagError::NotFound`] for a missing file, and the errors of
    /// [`Self::ingest_chunks`].
    pub async fn ingest_file(
        &self,
        tenant: &TenantId,
        path: &Path,
        source_url: Option<&str>,
        source_type: Option<SourceType>,
    ) -> Result<usize, RagError> {
        let loader = loader_for(path)?;
        let document = loader.load(path).await?;
        let source_url = source_url.unwrap_or(&document.source);
        let source_type = source_type.unwrap_or(document.source_type);
        self.ingest_document(tenant, source_url, source_type, &document.content)
            .await
    }

    /// # Errors
    ///
    /// Returns a storage error if the index is unreachable after retries.
    pub async fn delete_source(&self, tenant: &TenantId, source_url: &str) -> Result<u64, RagError> {
        validate_source_url(source_url)?;
        let index = &self.index;
        let deleted = self
            .retry
            .run("delete_source", move || async move {
                Ok(index.delete_by_source(tenant, source_url).await?)
            })
            .await?;
        tracing::info!(tenant = %tenant, source = source_url, deleted, "source deleted");
        Ok(deleted)
    }

    async fn delete_tail(
        &self,
        tenant: &TenantId,
        source_url: &str,
        keep_below: u32,
    ) -> Result<u64, RagError> {
        let index = &self.index;
        self.retry
            .run("delete_stale", move || async move {
                Ok(index.delete_stale(tenant, source_url, keep_below).await?)
            })
            .await
    }

    async fn ensure_index_ready(&self, dimension: usize) -> Result<(), RagError> {
        self.index_ready
            .get_or_try_init(|| async {
                self.index.ensure_ready(dimension).await?;
                tracing::debug!(backend = self.index.name(), dimension, "vector index ready");
                Ok::<_, RagError>(())
            })
            .await
            .map(|_| ())
    }
}
