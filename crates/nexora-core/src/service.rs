use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use nexora_llm::{Embedder, Generator};
use nexora_memory::document::{SplitterConfig, TextSplitter};
use nexora_memory::{ChatMessage, SessionId, SourceType, SqliteStore, TenantId, VectorIndex};
use serde::Serialize;
use uuid::Uuid;

use crate::config::Config;
use crate::embedder::EmbeddingService;
use crate::error::RagError;
use crate::ingest::IngestService;
use crate::jobs::{JobStatus, JobTracker};
use crate::pipeline::{Answer, AnswerPipeline, AskRequest, PipelineSettings};
use crate::registry::ModelRegistry;
use crate::retriever::{RetrievalParams, Retriever};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions {
    pub splitter: SplitterConfig,
    pub pipeline: PipelineSettings,
    pub embedding_timeout: Duration,
    pub max_retained_jobs: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            splitter: SplitterConfig::default(),
            pipeline: PipelineSettings::default(),
            embedding_timeout: Duration::from_secs(30),
            max_retained_jobs: 256,
        }
    }
}

impl ServiceOptions {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            splitter: SplitterConfig {
                chunk_size: config.chunking.chunk_size,
                chunk_overlap: config.chunking.chunk_overlap,
            },
            pipeline: PipelineSettings {
                retrieval: RetrievalParams {
                    top_k: config.retrieval.top_k,
                    min_score: config.retrieval.min_score,
                },
                history_turns: config.retrieval.history_turns,
                rewrite_queries: config.retrieval.rewrite_queries,
                retrieval_timeout: config.retrieval_timeout(),
                generation_timeout: config.generation_timeout(),
                retry: RetryPolicy::from(&config.retry),
            },
            embedding_timeout: config.embedding_timeout(),
            max_retained_jobs: config.jobs.max_retained,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TenantStats {
    pub chunks: u64,
    pub sessions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub chunks_deleted: u64,
    pub sessions_deleted: u64,
}

/// Entry point for the API and CLI layers. Owns every injected resource.
pub struct RagService<E, G> {
    ingest: IngestService<E>,
    pipeline: AnswerPipeline<E, G>,
    index: Arc<dyn VectorIndex>,
    store: SqliteStore,
    registry: ModelRegistry,
    jobs: JobTracker,
}

impl<E: Embedder, G: Generator> RagService<E, G> {
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] if the chunking options are invalid.
    pub fn new(
        embedder: E,
        generator: G,
        index: Arc<dyn VectorIndex>,
        store: SqliteStore,
        options: ServiceOptions,
    ) -> Result<Self, RagError> {
        let splitter = TextSplitter::new(options.splitter)?;
        let embedder = Arc::new(EmbeddingService::new(embedder, options.embedding_timeout));
        let registry = ModelRegistry::new(store.clone());

        let retriever = Retriever::new(
            Arc::clone(&embedder),
            Arc::clone(&index),
            registry.clone(),
        );
        let pipeline = AnswerPipeline::new(retriever, generator, store.clone(), options.pipeline);
        let ingest = IngestService::new(
            embedder,
            Arc::clone(&index),
            registry.clone(),
            splitter,
            options.pipeline.retry,
        );

        Ok(Self {
            ingest,
            pipeline,
            index,
            store,
            registry,
            jobs: JobTracker::new(options.max_retained_jobs),
        })
    }

    #[must_use]
    pub fn pipeline(&self) -> &AnswerPipeline<E, G> {
        &self.pipeline
    }

    #[must_use]
    pub fn jobs(&self) -> &JobTracker {
        &self.jobs
    }

    #[must_use]
    pub fn index_backend(&self) -> &'static str {
        self.index.name()
    }

    /// `ask(tenant_id, question, session_id?) → {answer, sources, session_id}`.
    ///
    /// # Errors
    ///
    /// See [`AnswerPipeline::ask`].
    pub async fn ask(&self, request: AskRequest) -> Result<Answer, RagError> {
        self.pipeline.ask(request).await
    }

    /// Embed and upsert chunk text for one source. Returns the number stored.
    ///
    /// # Errors
    ///
    /// See [`IngestService::ingest_chunks`].
    pub async fn ingest_chunks(
        &self,
        tenant: &TenantId,
        source_url: &str,
        source_type: SourceType,
        chunks: Vec<String>,
    ) -> Result<usize, RagError> {
        self.ingest
            .ingest_chunks(tenant, source_url, source_type, chunks)
            .await
    }

    /// # Errors
    ///
    /// See [`IngestService::ingest_document`].
    pub async fn ingest_document(
        &self,
        tenant: &TenantId,
        source_url: &str,
        source_type: SourceType,
        text: &str,
    ) -> Result<usize, RagError> {
        self.ingest
            .ingest_document(tenant, source_url, source_type, text)
            .await
    }

    /// # Errors
    ///
    /// See [`IngestService::ingest_file`].
    pub async fn ingest_file(
        &self,
        tenant: &TenantId,
        path: &Path,
        source_url: Option<&str>,
        source_type: Option<SourceType>,
    ) -> Result<usize, RagError> {
        self.ingest
            .ingest_file(tenant, path, source_url, source_type)
            .await
    }

    /// Remove every chunk of `source_url`. Deleting an unknown source returns 0.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the index is unreachable.
    pub async fn delete_source(&self, tenant: &TenantId, source_url: &str) -> Result<u64, RagError> {
        self.ingest.delete_source(tenant, source_url).await
    }

    /// Full ordered message list of a session.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotFound`] if the session does not exist for `tenant`.
    pub async fn get_history(
        &self,
        tenant: &TenantId,
        session: &SessionId,
    ) -> Result<Vec<ChatMessage>, RagError> {
        if self.store.find_session(tenant, session).await?.is_none() {
            return Err(RagError::NotFound(format!("session {session}")));
        }
        Ok(self.store.messages(tenant, session).await?)
    }

    /// Idempotent: returns whether a session was removed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the session store fails.
    pub async fn delete_session(
        &self,
        tenant: &TenantId,
        session: &SessionId,
    ) -> Result<bool, RagError> {
        let deleted = self.store.delete_session(tenant, session).await?;
        tracing::info!(tenant = %tenant, session = %session, deleted, "session delete");
        Ok(deleted)
    }

    /// Remove all chunks, sessions and the model registration of `tenant`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if either store fails.
    pub async fn purge_tenant(&self, tenant: &TenantId) -> Result<PurgeReport, RagError> {
        let chunks_deleted = self.index.delete_all(tenant).await?;
        let sessions_deleted = self.store.delete_sessions(tenant).await?;
        self.registry.clear(tenant).await?;
        tracing::info!(
            tenant = %tenant,
            chunks = chunks_deleted,
            sessions = sessions_deleted,
            "tenant purged"
        );
        Ok(PurgeReport {
            chunks_deleted,
            sessions_deleted,
        })
    }

    /// # Errors
    ///
    /// Returns a storage error if either store fails.
    pub async fn stats(&self, tenant: &TenantId) -> Result<TenantStats, RagError> {
        Ok(TenantStats {
            chunks: self.index.count(tenant).await?,
            sessions: self.store.count_sessions(tenant).await?,
        })
    }

    /// # Errors
    ///
    /// Returns [`RagError::NotFound`] for unknown jobs and jobs of other tenants.
    pub fn job_status(&self, tenant: &TenantId, id: Uuid) -> Result<JobStatus, RagError> {
        self.jobs.get_status(tenant, id)
    }
}

impl<E, G> RagService<E, G>
where
    E: Embedder + 'static,
    G: Generator + 'static,
{
    /// Chunk and ingest `text` in the background. Poll with [`Self::job_status`].
    pub fn submit_document(
        self: &Arc<Self>,
        tenant: TenantId,
        source_url: String,
        source_type: SourceType,
        text: String,
    ) -> Uuid {
        let service = Arc::clone(self);
        let job_tenant = tenant.clone();
        let label = source_url.clone();
        self.jobs.submit(tenant, label, async move {
            service
                .ingest_document(&job_tenant, &source_url, source_type, &text)
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use nexora_memory::MessageRole;

    use crate::error::ErrorKind;
    use crate::jobs::JobState;
    use crate::prompt::NO_CONTEXT_ANSWER;
    use crate::testing::Harness;

    use super::*;

    #[tokio::test]
    async fn history_of_unknown_session_is_not_found() {
        let h = Harness::new().await;
        let t = h.tenant("acme");
        let err = h
            .service
            .get_history(&t, &SessionId::parse("nope").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn history_is_hidden_from_other_tenants() {
        let h = Harness::new().await;
        let a = h.tenant("a");
        let answer = h
            .service
            .ask(AskRequest::new(a.clone(), "Hello?"))
            .await
            .unwrap();
        let err = h
            .service
            .get_history(&h.tenant("b"), &answer.session_id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(
            h.service.get_history(&a, &answer.session_id).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn delete_session_is_idempotent() {
        let h = Harness::new().await;
        let t = h.tenant("acme");
        let answer = h.service.ask(AskRequest::new(t.clone(), "Hi")).await.unwrap();
        assert!(h.service.delete_session(&t, &answer.session_id).await.unwrap());
        assert!(!h.service.delete_session(&t, &answer.session_id).await.unwrap());
    }

    #[tokio::test]
    async fn purge_clears_everything_for_tenant_only() {
        let h = Harness::new().await;
        let a = h.tenant("a");
        let b = h.tenant("b");
        for t in [&a, &b] {
            h.service
                .ingest_chunks(t, "wiki/python", SourceType::Web, vec!["Python is a language.".into()])
                .await
                .unwrap();
            h.service.ask(AskRequest::new(t.clone(), "What is Python?")).await.unwrap();
        }

        let report = h.service.purge_tenant(&a).await.unwrap();
        assert_eq!(
            report,
            PurgeReport {
                chunks_deleted: 1,
                sessions_deleted: 1
            }
        );
        assert_eq!(
            h.service.stats(&a).await.unwrap(),
            TenantStats {
                chunks: 0,
                sessions: 0
            }
        );
        assert_eq!(
            h.service.stats(&b).await.unwrap(),
            TenantStats {
                chunks: 1,
                sessions: 1
            }
        );
    }

    #[tokio::test]
    async fn background_document_job_completes() {
        let h = Harness::new().await;
        let t = h.tenant("acme");
        let id = h.service.submit_document(
            t.clone(),
            "wiki/python".into(),
            SourceType::Web,
            "Python is a language. It was created in 1991.".into(),
        );

        let mut status = h.service.job_status(&t, id).unwrap();
        for _ in 0..500 {
            if status.state.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            status = h.service.job_status(&t, id).unwrap();
        }
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.chunks_stored, 1);

        let answer = h
            .service
            .ask(AskRequest::new(t, "What is Python?"))
            .await
            .unwrap();
        assert_eq!(answer.sources, vec!["wiki/python"]);
    }

    #[tokio::test]
    async fn empty_corpus_answer_is_persisted() {
        let h = Harness::new().await;
        let t = h.tenant("acme");
        let answer = h.service.ask(AskRequest::new(t.clone(), "anything")).await.unwrap();
        assert_eq!(answer.answer, NO_CONTEXT_ANSWER);
        let history = h.service.get_history(&t, &answer.session_id).await.unwrap();
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[1].content, NO_CONTEXT_ANSWER);
        assert!(history[1].sources.is_empty());
    }
}
