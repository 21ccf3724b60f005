//! Answer pipeline: `RECEIVED → RETRIEVING → GENERATING → ANSWERED`, or `FAILED`.
//!
//! Calls on the same `(tenant, session)` are serialized so turns are appended in arrival
//! order. The user and assistant messages of a turn are written together, and only
//! after generation succeeded, so a failed or dropped request leaves the session
//! untouched.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use nexora_llm::{Embedder, Generator, Message};
use nexora_memory::{ChatMessage, ChatSession, ScoredChunk, SessionId, SqliteStore, TenantId};
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;

use crate::error::{RagError, Stage};
use crate::prompt::{NO_CONTEXT_ANSWER, build_messages, distinct_sources};
use crate::retriever::{RetrievalParams, Retriever};
use crate::retry::RetryPolicy;
use crate::rewrite::rewrite_query;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    Retrieving,
    Generating,
    Answered,
    Failed,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Received => "RECEIVED",
            Self::Retrieving => "RETRIEVING",
            Self::Generating => "GENERATING",
            Self::Answered => "ANSWERED",
            Self::Failed => "FAILED",
        })
    }
}

#[derive(Debug, Clone)]
pub struct AskRequest {
    pub tenant: TenantId,
    pub question: String,
    pub session_id: Option<SessionId>,
    pub user_ref: Option<String>,
}

impl AskRequest {
    #[must_use]
    pub fn new(tenant: TenantId, question: impl Into<String>) -> Self {
        Self {
            tenant,
            question: question.into(),
            session_id: None,
            user_ref: None,
        }
    }

    #[must_use]
    pub fn in_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<String>,
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub retrieval: RetrievalParams,
    pub history_turns: u32,
    pub rewrite_queries: bool,
    pub retrieval_timeout: Duration,
    pub generation_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            retrieval: RetrievalParams::default(),
            history_turns: 3,
            rewrite_queries: true,
            retrieval_timeout: Duration::from_secs(5),
            generation_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

type LockKey = (TenantId, SessionId);

/// Per-session async mutexes. Entries disappear once no request holds them.
#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<LockKey, Weak<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    pub async fn acquire(&self, tenant: &TenantId, session: &SessionId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            map.retain(|_, weak| weak.strong_count() > 0);
            let key = (tenant.clone(), session.clone());
            if let Some(existing) = map.get(&key).and_then(Weak::upgrade) {
                existing
            } else {
                let fresh = Arc::new(tokio::sync::Mutex::new(()));
                map.insert(key, Arc::downgrade(&fresh));
                fresh
            }
        };
        lock.lock_owned().await
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        map.values().filter(|w| w.strong_count() > 0).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct AnswerPipeline<E, G> {
    retriever: Retriever<E>,
    generator: G,
    sessions: SqliteStore,
    locks: SessionLocks,
    settings: PipelineSettings,
}

impl<E: Embedder, G: Generator> AnswerPipeline<E, G> {
    #[must_use]
    pub fn new(
        retriever: Retriever<E>,
        generator: G,
        sessions: SqliteStore,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            retriever,
            generator,
            sessions,
            locks: SessionLocks::default(),
            settings,
        }
    }

    #[must_use]
    pub fn generator(&self) -> &G {
        &self.generator
    }

    #[must_use]
    pub fn retriever(&self) -> &Retriever<E> {
        &self.retriever
    }

    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    #[must_use]
    pub fn locks(&self) -> &SessionLocks {
        &self.locks
    }

    /// Answer a question from the tenant's corpus and record the turn in its session.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] for a blank question. Dependency and storage
    /// failures are retried per the retry policy and then returned; nothing is written
    /// to the session in that case.
    pub async fn ask(&self, request: AskRequest) -> Result<Answer, RagError> {
        let AskRequest {
            tenant,
            question,
            session_id,
            user_ref,
        } = request;

        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::Validation("question must not be empty".into()));
        }

        let session = self
            .sessions
            .resolve_session(&tenant, session_id.as_ref(), user_ref.as_deref())
            .await?;
        let _guard = self.locks.acquire(&tenant, &session.id).await;
        tracing::debug!(tenant = %tenant, session = %session.id, state = %PipelineState::Received, "ask");

        let mut state = PipelineState::Received;
        match self.run(&session, question, &mut state).await {
            Ok(answer) => Ok(answer),
            Err(e) => {
                tracing::warn!(
                    tenant = %tenant,
                    session = %session.id,
                    from = %state,
                    state = %PipelineState::Failed,
                    kind = %e.kind(),
                    "ask failed: {e}"
                );
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        chat: &ChatSession,
        question: &str,
        state: &mut PipelineState,
    ) -> Result<Answer, RagError> {
        let (tenant, session) = (&chat.tenant_id, &chat.id);
        let history_limit = self.settings.history_turns.saturating_mul(2);
        let history = if history_limit == 0 {
            Vec::new()
        } else {
            self.sessions
                .recent_messages(tenant, session, history_limit)
                .await?
        };

        transition(tenant, session, state, PipelineState::Retrieving);
        let rewrite = if self.settings.rewrite_queries {
            rewrite_query(question, &history, self.settings.history_turns as usize)
        } else {
            None
        };
        if let Some(rewritten) = &rewrite {
            tracing::debug!(tenant = %tenant, session = %session, rewritten = %rewritten, "query rewritten");
        }
        let mut queries = vec![question];
        if let Some(rewritten) = rewrite.as_deref() {
            queries.push(rewritten);
        }
        let chunks = self.retrieve(tenant, &queries).await?;

        let (answer, sources) = if chunks.is_empty() {
            tracing::debug!(tenant = %tenant, session = %session, "no context, skipping generation");
            (NO_CONTEXT_ANSWER.to_owned(), Vec::new())
        } else {
            transition(tenant, session, state, PipelineState::Generating);
            let messages = build_messages(question, &chunks, &history);
            let answer = self.generate(&messages).await?;
            if answer.trim().is_empty() {
                (NO_CONTEXT_ANSWER.to_owned(), Vec::new())
            } else {
                (answer, distinct_sources(&chunks))
            }
        };

        self.sessions
            .append_turn(
                chat,
                &ChatMessage::user(question),
                &ChatMessage::assistant(&answer, sources.clone()),
            )
            .await?;
        transition(tenant, session, state, PipelineState::Answered);

        Ok(Answer {
            answer,
            sources,
            session_id: session.clone(),
        })
    }

    async fn retrieve(
        &self,
        tenant: &TenantId,
        queries: &[&str],
    ) -> Result<Vec<ScoredChunk>, RagError> {
        let retriever = &self.retriever;
        let params = self.settings.retrieval;
        let limit = self.settings.retrieval_timeout;
        self.settings
            .retry
            .run("retrieval", move || async move {
                match tokio::time::timeout(limit, retriever.retrieve_many(tenant, queries, params))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(RagError::Timeout {
                        stage: Stage::Retrieval,
                    }),
                }
            })
            .await
    }

    async fn generate(&self, messages: &[Message]) -> Result<String, RagError> {
        let generator = &self.generator;
        let limit = self.settings.generation_timeout;
        self.settings
            .retry
            .run("generation", move || async move {
                match tokio::time::timeout(limit, generator.generate(messages)).await {
                    Ok(Ok(answer)) => Ok(answer),
                    Ok(Err(e)) => Err(RagError::Generation(e)),
                    Err(_) => Err(RagError::Timeout {
                        stage: Stage::Generation,
                    }),
                }
            })
            .await
    }
}

fn transition(
    tenant: &TenantId,
    session: &SessionId,
    state: &mut PipelineState,
    next: PipelineState,
) {
    tracing::debug!(tenant = %tenant, session = %session, from = %state, state = %next, "pipeline transition");
    *state = next;
}
