use ollama_rs::Ollama;
use ollama_rs::generation::chat::ChatMessage;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};

use crate::error::LlmError;
use crate::provider::{Embedder, Generator, Message, Role, check_batch_len};

/// Local Ollama server. Used for both chat and embeddings.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Ollama,
    model: String,
    embedding_model: String,
}

impl OllamaProvider {
    #[must_use]
    pub fn new(base_url: &str, model: String, embedding_model: String) -> Self {
        let (host, port) = parse_host_port(base_url);
        Self {
            client: Ollama::new(host, port),
            model,
            embedding_model,
        }
    }

    /// Check if Ollama is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Unavailable`] if the server cannot be contacted.
    pub async fn health_check(&self) -> Result<(), LlmError> {
        self.client.list_local_models().await.map_err(|e| {
            tracing::warn!("failed to connect to Ollama: {e}");
            LlmError::Unavailable
        })?;
        Ok(())
    }
}

impl Generator for OllamaProvider {
    async fn generate(&self, messages: &[Message]) -> Result<String, LlmError> {
        let ollama_messages: Vec<ChatMessage> = messages.iter().map(convert_message).collect();
        let request = ChatMessageRequest::new(self.model.clone(), ollama_messages);

        let response = self.client.send_chat_messages(request).await.map_err(|e| {
            tracing::error!("Ollama chat request failed: {e}");
            LlmError::Unavailable
        })?;

        let content = response.message.content;
        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse { provider: "ollama" });
        }
        Ok(content)
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "ollama"
    }
}

impl Embedder for OllamaProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = GenerateEmbeddingsRequest::new(
            self.embedding_model.clone(),
            EmbeddingsInput::Multiple(texts.to_vec()),
        );

        let response = self.client.generate_embeddings(request).await.map_err(|e| {
            tracing::error!("Ollama embedding request failed: {e}");
            LlmError::Unavailable
        })?;

        check_batch_len(texts.len(), response.embeddings.len())?;
        Ok(response.embeddings)
    }

    fn model_id(&self) -> &str {
        &self.embedding_model
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "ollama"
    }
}

fn convert_message(msg: &Message) -> ChatMessage {
    let text = msg.content.clone();
    match msg.role {
        Role::System => ChatMessage::system(text),
        Role::User => ChatMessage::user(text),
        Role::Assistant => ChatMessage::assistant(text),
    }
}

fn parse_host_port(url: &str) -> (String, u16) {
    let url = url.trim_end_matches('/');
    if let Some(colon_pos) = url.rfind(':') {
        let port_str = &url[colon_pos + 1..];
        if let Ok(port) = port_str.parse::<u16>() {
            return (url[..colon_pos].to_string(), port);
        }
    }
    (url.to_string(), 11434)
}
