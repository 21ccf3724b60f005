use std::collections::HashMap;
use std::sync::Arc;

use nexora_llm::Embedder;
use nexora_memory::vector_index::rank;
use nexora_memory::{ScoredChunk, TenantId, VectorIndex};

use crate::embedder::EmbeddingService;
use crate::error::RagError;
use crate::registry::ModelRegistry;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    pub top_k: usize,
    pub min_score: f32,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.0,
        }
    }
}

/// Embeds queries and ranks the tenant's stored chunks against them.
pub struct Retriever<E> {
    embedder: Arc<EmbeddingService<E>>,
    index: Arc<dyn VectorIndex>,
    registry: ModelRegistry,
}

impl<E: Embedder> Retriever<E> {
    #[must_use]
    pub fn new(
        embedder: Arc<EmbeddingService<E>>,
        index: Arc<dyn VectorIndex>,
        registry: ModelRegistry,
    ) -> Self {
        Self {
            embedder,
            index,
            registry,
        }
    }

    /// Chunks of `tenant` most similar to `query`, best first, scoring at least
    /// `params.min_score`. An empty result means "no context" and is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or the index query fails, or if the tenant's corpus
    /// was built with a different embedding model.
    pub async fn retrieve(
        &self,
        tenant: &TenantId,
        query: &str,
        params: RetrievalParams,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        self.retrieve_many(tenant, &[query], params).await
    }

    /// Retrieve for several phrasings of one question and merge the results by chunk
    /// key, keeping each chunk's best score.
    ///
    /// # Errors
    ///
    /// See [`Self::retrieve`].
    pub async fn retrieve_many(
        &self,
        tenant: &TenantId,
        queries: &[&str],
        params: RetrievalParams,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        if queries.is_empty() || params.top_k == 0 {
            return Ok(Vec::new());
        }

        let dimension = self.embedder.dimension().await?;
        self.registry
            .check(tenant, self.embedder.model_id(), dimension)
            .await?;

        let texts: Vec<String> = queries.iter().map(|q| (*q).to_owned()).collect();
        let vectors = self.embedder.embed(&texts).await?;

        let mut merged: HashMap<(String, u32), ScoredChunk> = HashMap::new();
        for vector in vectors {
            let hits = self.index.query(tenant, vector, params.top_k).await?;
            for hit in hits {
                if hit.chunk.tenant_id != *tenant || hit.score < params.min_score {
                    continue;
                }
                let key = (hit.chunk.source_url.clone(), hit.chunk.chunk_index);
                match merged.get_mut(&key) {
                    Some(existing) if existing.score >= hit.score => {}
                    Some(existing) => *existing = hit,
                    None => {
                        merged.insert(key, hit);
                    }
                }
            }
        }

        let mut results: Vec<ScoredChunk> = merged.into_values().collect();
        rank(&mut results, params.top_k);
        tracing::debug!(
            tenant = %tenant,
            queries = queries.len(),
            hits = results.len(),
            "retrieval complete"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use nexora_llm::hashing::HashingEmbedder;
    use nexora_memory::{Chunk, InMemoryIndex, SourceType, SqliteStore};

    use super::*;
    use crate::error::ErrorKind;

    struct Fixture {
        retriever: Retriever<HashingEmbedder>,
        index: Arc<InMemoryIndex>,
        embedder: Arc<EmbeddingService<HashingEmbedder>>,
        registry: ModelRegistry,
    }

    async fn fixture() -> Fixture {
        let embedder = Arc::new(EmbeddingService::new(
            HashingEmbedder::new(128),
            Duration::from_secs(5),
        ));
        let index = Arc::new(InMemoryIndex::new());
        let registry = ModelRegistry::new(SqliteStore::new(":memory:").await.unwrap());
        let retriever = Retriever::new(
            Arc::clone(&embedder),
            Arc::clone(&index) as Arc<dyn VectorIndex>,
            registry.clone(),
        );
        Fixture {
            retriever,
            index,
            embedder,
            registry,
        }
    }

    async fn store(f: &Fixture, tenant: &str, source: &str, texts: &[&str]) {
        let tenant = TenantId::new(tenant).unwrap();
        let owned: Vec<String> = texts.iter().map(|t| (*t).to_owned()).collect();
        let vectors = f.embedder.embed(&owned).await.unwrap();
        let total = u32::try_from(texts.len()).unwrap();
        let chunks = owned
            .into_iter()
            .zip(vectors)
            .zip(0u32..)
            .map(|((content, embedding), i)| Chunk {
                id: Chunk::point_id(&tenant, source, i).to_string(),
                tenant_id: tenant.clone(),
                source_url: source.into(),
                source_type: SourceType::Text,
                content,
                chunk_index: i,
                total_chunks: total,
                embedding,
                embedding_model: f.embedder.model_id().to_owned(),
                created_at: Utc::now(),
            })
            .collect();
        f.index.upsert(&tenant, chunks).await.unwrap();
    }

    #[tokio::test]
    async fn empty_corpus_returns_no_context() {
        let f = fixture().await;
        let t = TenantId::new("a").unwrap();
        let results = f
            .retriever
            .retrieve(&t, "anything", RetrievalParams::default())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn best_match_ranks_first() {
        let f = fixture().await;
        store(
            &f,
            "a",
            "wiki/python",
            &["Python is a language.", "It was created in 1991."],
        )
        .await;
        store(&f, "a", "wiki/rust", &["Rust has ownership and borrowing."]).await;

        let t = TenantId::new("a").unwrap();
        let results = f
            .retriever
            .retrieve(&t, "What is Python?", RetrievalParams::default())
            .await
            .unwrap();
        assert_eq!(results[0].chunk.source_url, "wiki/python");
        assert_eq!(results[0].chunk.chunk_index, 0);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn min_score_filters_weak_hits() {
        let f = fixture().await;
        store(&f, "a", "doc", &["Python is a language.", "Bananas are yellow."]).await;
        let t = TenantId::new("a").unwrap();
        let results = f
            .retriever
            .retrieve(
                &t,
                "Python language",
                RetrievalParams {
                    top_k: 5,
                    min_score: 0.9,
                },
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].score >= 0.9);
    }

    #[tokio::test]
    async fn retrieval_is_tenant_isolated() {
        let f = fixture().await;
        store(&f, "a", "wiki/python", &["Python is a language."]).await;
        store(&f, "b", "wiki/python", &["Python is a snake."]).await;

        let b = TenantId::new("b").unwrap();
        let results = f
            .retriever
            .retrieve(&b, "Python", RetrievalParams::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results.iter().all(|r| r.chunk.tenant_id == b));
    }

    #[tokio::test]
    async fn merged_queries_keep_best_score_once() {
        let f = fixture().await;
        store(&f, "a", "doc", &["Python is a language.", "It was created in 1991."]).await;
        let t = TenantId::new("a").unwrap();
        let results = f
            .retriever
            .retrieve_many(
                &t,
                &["Python language", "Python created 1991"],
                RetrievalParams::default(),
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        let keys: Vec<_> = results.iter().map(|r| r.chunk.key()).collect();
        assert!(keys.contains(&("doc", 0)));
        assert!(keys.contains(&("doc", 1)));
    }

    #[tokio::test]
    async fn mismatched_model_is_rejected() {
        let f = fixture().await;
        let t = TenantId::new("a").unwrap();
        f.registry
            .ensure_registered(&t, "text-embedding-004", 768)
            .await
            .unwrap();
        let err = f
            .retriever
            .retrieve(&t, "anything", RetrievalParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
