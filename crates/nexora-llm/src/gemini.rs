use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::http::trim_base_url;
use crate::provider::{Embedder, Generator, Message, Role, check_batch_len};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini via the Generative Language REST API.
///
/// System messages are folded into `systemInstruction`; assistant turns are sent with
/// the `model` role as the API expects.
#[derive(Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: Option<String>,
    temperature: f32,
    max_output_tokens: u32,
}

impl fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish_non_exhaustive()
    }
}

impl GeminiProvider {
    #[must_use]
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: crate::http::default_client(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_owned(),
            model,
            embedding_model: None,
            temperature: 0.7,
            max_output_tokens: 1000,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = trim_base_url(base_url);
        self
    }

    #[must_use]
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_generation(mut self, temperature: f32, max_output_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_output_tokens = max_output_tokens;
        self
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn call<B: Serialize + ?Sized>(
        &self,
        model: &str,
        method: &str,
        body: &B,
    ) -> Result<String, LlmError> {
        let response = self
            .client
            .post(format!("{}/models/{model}:{method}", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.map_err(LlmError::Http)?;
        if !status.is_success() {
            tracing::error!("Gemini {method} error {status}: {text}");
            return Err(LlmError::from_status("gemini", status));
        }
        Ok(text)
    }
}

fn split_messages(messages: &[Message]) -> (Option<Content<'_>>, Vec<Content<'_>>) {
    let mut system = Vec::new();
    let mut contents = Vec::new();
    for msg in messages {
        let part = Part { text: &msg.content };
        match msg.role {
            Role::System => system.push(part),
            Role::User => contents.push(Content {
                role: Some("user"),
                parts: vec![part],
            }),
            Role::Assistant => contents.push(Content {
                role: Some("model"),
                parts: vec![part],
            }),
        }
    }
    let instruction = (!system.is_empty()).then_some(Content {
        role: None,
        parts: system,
    });
    (instruction, contents)
}

impl Generator for GeminiProvider {
    async fn generate(&self, messages: &[Message]) -> Result<String, LlmError> {
        let (system_instruction, contents) = split_messages(messages);
        let body = GenerateRequest {
            system_instruction,
            contents,
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let text = self.call(&self.model, "generateContent", &body).await?;
        let resp: GenerateResponse = serde_json::from_str(&text)?;

        let answer: String = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if answer.trim().is_empty() {
            return Err(LlmError::EmptyResponse { provider: "gemini" });
        }
        Ok(answer)
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "gemini"
    }
}

impl Embedder for GeminiProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let model = self
            .embedding_model
            .as_deref()
            .ok_or(LlmError::EmbedUnsupported { provider: "gemini" })?;

        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let qualified = format!("models/{model}");
        let body = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|t| EmbedRequest {
                    model: &qualified,
                    content: Content {
                        role: None,
                        parts: vec![Part { text: t }],
                    },
                    task_type: "RETRIEVAL_DOCUMENT",
                })
                .collect(),
        };

        let text = self.call(model, "batchEmbedContents", &body).await?;
        let resp: BatchEmbedResponse = serde_json::from_str(&text)?;
        check_batch_len(texts.len(), resp.embeddings.len())?;
        Ok(resp.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn model_id(&self) -> &str {
        self.embedding_model.as_deref().unwrap_or("")
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "gemini"
    }
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: &'static str,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn provider(base_url: &str) -> GeminiProvider {
        GeminiProvider::new("g-key".into(), "gemini-2.5-flash".into())
            .with_base_url(base_url.into())
            .with_embedding_model("text-embedding-004")
    }

    #[test]
    fn system_messages_become_instruction() {
        let msgs = [
            Message::system("rules"),
            Message::user("q"),
            Message::assistant("a"),
        ];
        let (instruction, contents) = split_messages(&msgs);
        let instruction = instruction.unwrap();
        assert!(instruction.role.is_none());
        assert_eq!(instruction.parts[0].text, "rules");
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].role, Some("user"));
        assert_eq!(contents[1].role, Some("model"));
    }

    #[test]
    fn debug_hides_key() {
        let dbg = format!("{:?}", provider("http://localhost"));
        assert!(!dbg.contains("g-key"));
    }

    #[tokio::test]
    async fn generate_joins_candidate_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "g-key"))
            .and(body_partial_json(serde_json::json!({
                "systemInstruction": {"parts": [{"text": "be brief"}]},
                "generationConfig": {"maxOutputTokens": 1000}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"role": "model", "parts": [
                    {"text": "Refunds take "}, {"text": "14 days [Document 1]."}
                ]}}]
            })))
            .mount(&server)
            .await;

        let answer = provider(&server.uri())
            .generate(&[Message::system("be brief"), Message::user("refunds?")])
            .await
            .unwrap();
        assert_eq!(answer, "Refunds take 14 days [Document 1].");
    }

    #[tokio::test]
    async fn generate_without_candidates_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": []
            })))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .generate(&[Message::user("q")])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { provider: "gemini" }));
    }

    #[tokio::test]
    async fn generate_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .generate(&[Message::user("q")])
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn batch_embed_returns_vectors_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/text-embedding-004:batchEmbedContents"))
            .and(body_partial_json(serde_json::json!({
                "requests": [
                    {"model": "models/text-embedding-004", "taskType": "RETRIEVAL_DOCUMENT"},
                    {"model": "models/text-embedding-004", "taskType": "RETRIEVAL_DOCUMENT"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [{"values": [0.5, 0.5]}, {"values": [1.0, 0.0]}]
            })))
            .mount(&server)
            .await;

        let vectors = provider(&server.uri())
            .embed_batch(&["a".to_owned(), "b".to_owned()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![0.5, 0.5], vec![1.0, 0.0]]);
    }

    #[tokio::test]
    async fn embed_quota_error_is_not_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .embed_batch(&["a".to_owned()])
            .await
            .unwrap_err();
        assert!(err.is_quota());
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn empty_batch_skips_request() {
        let vectors = provider("http://127.0.0.1:1").embed_batch(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }
}
