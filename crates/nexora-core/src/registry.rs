use nexora_memory::{SqliteStore, TenantId};

use crate::error::RagError;

/// Keeps a tenant's corpus and queries on the embedding model it was built with.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    store: SqliteStore,
}

fn mismatch(tenant: &TenantId, registered: &str, dim: usize, active: &str) -> RagError {
    RagError::Validation(format!(
        "corpus of tenant {tenant} was embedded with model {registered} ({dim} dims), \
         active model is {active}; re-ingest required"
    ))
}

impl ModelRegistry {
    #[must_use]
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    /// Register the active model on first ingestion, or confirm it matches.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] when the tenant is registered with another model.
    pub async fn ensure_registered(
        &self,
        tenant: &TenantId,
        model: &str,
        dimension: usize,
    ) -> Result<(), RagError> {
        let registered = self.store.register_model(tenant, model, dimension).await?;
        if registered.model != model || registered.dimension != dimension {
            return Err(mismatch(tenant, &registered.model, registered.dimension, model));
        }
        Ok(())
    }

    /// Reject queries embedded with a model other than the registered one. Tenants
    /// without a corpus accept any model.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] on mismatch.
    pub async fn check(
        &self,
        tenant: &TenantId,
        model: &str,
        dimension: usize,
    ) -> Result<(), RagError> {
        if let Some(registered) = self.store.registered_model(tenant).await?
            && (registered.model != model || registered.dimension != dimension)
        {
            return Err(mismatch(tenant, &registered.model, registered.dimension, model));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn clear(&self, tenant: &TenantId) -> Result<bool, RagError> {
        Ok(self.store.clear_model(tenant).await?)
    }
}
