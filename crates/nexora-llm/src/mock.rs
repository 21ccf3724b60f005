//! Test-only mock provider.
//!
//! Embeds through a [`HashingEmbedder`] so retrieval behaves realistically, and
//! generates from a queue of canned responses.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::LlmError;
use crate::hashing::HashingEmbedder;
use crate::provider::{Embedder, Generator, Message};

#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<String>>>,
    pub default_response: String,
    pub fail_generate: bool,
    pub fail_embed: bool,
    pub quota_exhausted: bool,
    /// Number of upcoming generate calls that fail with a transient error.
    transient_failures: Arc<AtomicU32>,
    generate_calls: Arc<AtomicUsize>,
    embed_calls: Arc<AtomicUsize>,
    last_messages: Arc<Mutex<Vec<Message>>>,
    /// Milliseconds to sleep before returning a response.
    pub delay_ms: u64,
    embedder: HashingEmbedder,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            default_response: "mock response".into(),
            fail_generate: false,
            fail_embed: false,
            quota_exhausted: false,
            transient_failures: Arc::new(AtomicU32::new(0)),
            generate_calls: Arc::new(AtomicUsize::new(0)),
            embed_calls: Arc::new(AtomicUsize::new(0)),
            last_messages: Arc::new(Mutex::new(Vec::new())),
            delay_ms: 0,
            embedder: HashingEmbedder::default(),
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_generate: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.embedder = HashingEmbedder::new(dimension);
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    #[must_use]
    pub fn with_transient_failures(self, count: u32) -> Self {
        self.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    #[must_use]
    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// Messages passed to the most recent `generate` call.
    #[must_use]
    pub fn last_messages(&self) -> Vec<Message> {
        self.last_messages.lock().unwrap().clone()
    }
}

impl Generator for MockProvider {
    async fn generate(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock().unwrap() = messages.to_vec();

        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.quota_exhausted {
            return Err(LlmError::RateLimited);
        }
        if self.fail_generate {
            return Err(LlmError::Other("mock LLM error".into()));
        }
        if self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(LlmError::Unavailable);
        }

        let mut responses = self.responses.lock().unwrap();
        Ok(responses
            .pop_front()
            .unwrap_or_else(|| self.default_response.clone()))
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}

impl Embedder for MockProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail_embed {
            return Err(LlmError::Unavailable);
        }
        self.embedder.embed_batch(texts).await
    }

    fn model_id(&self) -> &str {
        Embedder::model_id(&self.embedder)
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}
