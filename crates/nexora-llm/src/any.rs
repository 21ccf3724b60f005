use crate::error::LlmError;
use crate::gemini::GeminiProvider;
use crate::hashing::HashingEmbedder;
#[cfg(feature = "mock")]
use crate::mock::MockProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;
use crate::provider::{Embedder, Generator, Message};

/// Generates a match over all `AnyProvider` variants, binding the inner provider
/// and evaluating the given expression for each arm.
macro_rules! delegate_provider {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyProvider::Gemini($p) => $expr,
            AnyProvider::OpenAi($p) => $expr,
            AnyProvider::Ollama($p) => $expr,
            AnyProvider::Hashing($p) => $expr,
            #[cfg(feature = "mock")]
            AnyProvider::Mock($p) => $expr,
        }
    };
}

/// Provider selected from configuration at startup.
///
/// Used for both the embedding and the generation role; a variant that cannot serve a
/// role returns [`LlmError::EmbedUnsupported`] or [`LlmError::GenerateUnsupported`].
#[derive(Debug, Clone)]
pub enum AnyProvider {
    Gemini(GeminiProvider),
    OpenAi(OpenAiProvider),
    Ollama(OllamaProvider),
    Hashing(HashingEmbedder),
    #[cfg(feature = "mock")]
    Mock(MockProvider),
}

impl Embedder for AnyProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        delegate_provider!(self, |p| p.embed_batch(texts).await)
    }

    fn model_id(&self) -> &str {
        delegate_provider!(self, |p| p.model_id())
    }

    fn name(&self) -> &str {
        delegate_provider!(self, |p| Embedder::name(p))
    }
}

impl Generator for AnyProvider {
    async fn generate(&self, messages: &[Message]) -> Result<String, LlmError> {
        delegate_provider!(self, |p| p.generate(messages).await)
    }

    fn name(&self) -> &str {
        delegate_provider!(self, |p| Generator::name(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashing_variant_embeds_but_cannot_generate() {
        let provider = AnyProvider::Hashing(HashingEmbedder::new(16));
        let vectors = provider.embed_batch(&["alpha beta".into()]).await.unwrap();
        assert_eq!(vectors[0].len(), 16);
        assert_eq!(provider.model_id(), "hashing-16");
        assert_eq!(Embedder::name(&provider), "hashing");

        let err = provider.generate(&[Message::user("q")]).await.unwrap_err();
        assert!(matches!(err, LlmError::GenerateUnsupported { .. }));
    }

    #[test]
    fn delegates_names() {
        let gemini = AnyProvider::Gemini(GeminiProvider::new("k".into(), "m".into()));
        assert_eq!(Generator::name(&gemini), "gemini");
        let ollama = AnyProvider::Ollama(OllamaProvider::new(
            "http://localhost:11434",
            "m".into(),
            "e".into(),
        ));
        assert_eq!(Embedder::name(&ollama), "ollama");
    }
}
