use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Text → vector model.
///
/// Implementations must be pure with respect to their inputs: embedding a batch yields
/// the same vectors as embedding each text on its own, in input order.
pub trait Embedder: Send + Sync {
    /// Embed `texts`, returning exactly one vector per input in the same order.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream model fails or its response is malformed.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send;

    /// Identifier of the model producing the vectors (provider-qualified).
    fn model_id(&self) -> &str;

    fn name(&self) -> &str;
}

/// Chat-style text generator.
pub trait Generator: Send + Sync {
    /// Send messages to the model and return the assistant response.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response is invalid.
    fn generate(&self, messages: &[Message])
    -> impl Future<Output = Result<String, LlmError>> + Send;

    fn name(&self) -> &str;
}

/// Reject upstream responses that do not carry one vector per input.
pub(crate) fn check_batch_len(expected: usize, got: usize) -> Result<(), LlmError> {
    if expected == got {
        Ok(())
    } else {
        Err(LlmError::BatchMismatch { expected, got })
    }
}
