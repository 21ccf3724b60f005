mod env;
mod types;


pub use types::*;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};

use crate::vault::VaultProvider;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Resolve provider API keys and the gateway token through the vault.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault backend fails.
    pub async fn resolve_secrets(&mut self, vault: &dyn VaultProvider) -> anyhow::Result<()> {
        use crate::vault::Secret;

        if let Some(val) = vault.get_secret("NEXORA_GEMINI_API_KEY").await? {
            self.secrets.gemini_api_key = Some(Secret::new(val));
        } else if let Some(val) = vault.get_secret("GOOGLE_API_KEY").await? {
            self.secrets.gemini_api_key = Some(Secret::new(val));
        }
        if let Some(val) = vault.get_secret("NEXORA_OPENAI_API_KEY").await? {
            self.secrets.openai_api_key = Some(Secret::new(val));
        }
        if let Some(val) = vault.get_secret("NEXORA_GATEWAY_TOKEN").await? {
            self.gateway.auth_token = Some(val);
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be greater than 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be greater than 0");
        }
        if !(-1.0..=1.0).contains(&self.retrieval.min_score) {
            bail!(
                "retrieval.min_score must be within [-1, 1], got {}",
                self.retrieval.min_score
            );
        }
        if self.timeouts.retrieval == 0
            || self.timeouts.generation == 0
            || self.timeouts.embedding == 0
        {
            bail!("timeouts must be greater than 0 seconds");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if self.embedding.provider == ProviderKind::Hashing && self.embedding.dimension == 0 {
            bail!("embedding.dimension must be greater than 0");
        }
        if self.generation.provider == ProviderKind::Hashing {
            bail!("generation.provider 'hashing' cannot generate text");
        }
        Ok(())
    }

    #[must_use]
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.retrieval)
    }

    #[must_use]
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.generation)
    }

    #[must_use]
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.embedding)
    }
}
