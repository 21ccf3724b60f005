use chrono::Utc;

use super::SqliteStore;
use crate::error::MemoryError;
use crate::types::TenantId;

/// Embedding model a tenant's corpus was built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredModel {
    pub model: String,
    pub dimension: usize,
}

impl SqliteStore {
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn registered_model(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<RegisteredModel>, MemoryError> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT model, dimension FROM embedding_models WHERE tenant_id = ?")
                .bind(tenant)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(model, dimension)| {
            Ok::<_, MemoryError>(RegisteredModel {
                model,
                dimension: usize::try_from(dimension)?,
            })
        })
        .transpose()
    }

    /// Record `model` for `tenant` unless one is already registered, and return the
    /// registered entry. The first registration wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert or query fails.
    pub async fn register_model(
        &self,
        tenant: &TenantId,
        model: &str,
        dimension: usize,
    ) -> Result<RegisteredModel, MemoryError> {
        sqlx::query(
            "INSERT OR IGNORE INTO embedding_models (tenant_id, model, dimension, registered_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(tenant)
        .bind(model)
        .bind(i64::try_from(dimension)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.registered_model(tenant)
            .await?
            .ok_or_else(|| MemoryError::Other(format!("model registration lost for {tenant}")))
    }

    /// Forget the tenant's model so the next ingestion may register a new one.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn clear_model(&self, tenant: &TenantId) -> Result<bool, MemoryError> {
        let result = sqlx::query("DELETE FROM embedding_models WHERE tenant_id = ?")
            .bind(tenant)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
