use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};

use super::SqliteStore;
use crate::error::MemoryError;
use crate::types::{ChatMessage, ChatSession, MessageRole, SessionId, TenantId};

type MessageRow = (String, String, String, DateTime<Utc>);

fn row_to_message(
    (role, content, sources, timestamp): MessageRow,
) -> Result<ChatMessage, MemoryError> {
    Ok(ChatMessage {
        role: MessageRole::parse(&role)?,
        content,
        sources: serde_json::from_str(&sources)?,
        timestamp,
    })
}

async fn insert_messages(
    tx: &mut Transaction<'_, Sqlite>,
    tenant: &TenantId,
    session: &SessionId,
    messages: &[ChatMessage],
) -> Result<(), MemoryError> {
    let touched = sqlx::query("UPDATE sessions SET updated_at = ? WHERE id = ? AND tenant_id = ?")
        .bind(Utc::now())
        .bind(session)
        .bind(tenant)
        .execute(&mut **tx)
        .await?;
    if touched.rows_affected() == 0 {
        return Err(MemoryError::SessionNotFound(session.to_string()));
    }

    for message in messages {
        let sources = serde_json::to_string(&message.sources)?;
        sqlx::query(
            "INSERT INTO messages (session_id, role, content, sources, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(session)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(sources)
        .bind(message.timestamp)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

impl SqliteStore {
    /// Look up a session owned by `tenant`. Sessions of other tenants are invisible.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn find_session(
        &self,
        tenant: &TenantId,
        id: &SessionId,
    ) -> Result<Option<ChatSession>, MemoryError> {
        let row: Option<(Option<String>, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT user_ref, created_at, updated_at FROM sessions WHERE id = ? AND tenant_id = ?",
        )
        .bind(id)
        .bind(tenant)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(user_ref, created_at, updated_at)| ChatSession {
            id: id.clone(),
            tenant_id: tenant.clone(),
            user_ref,
            created_at,
            updated_at,
        }))
    }

    /// Return the requested session, or a new unsaved one with a generated id when
    /// `id` is absent or unknown to `tenant`.
    ///
    /// A new session is persisted by its first [`append_turn`](Self::append_turn), so a
    /// request that fails before completing a turn leaves no row behind.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub async fn resolve_session(
        &self,
        tenant: &TenantId,
        id: Option<&SessionId>,
        user_ref: Option<&str>,
    ) -> Result<ChatSession, MemoryError> {
        if let Some(id) = id
            && let Some(session) = self.find_session(tenant, id).await?
        {
            return Ok(session);
        }

        let now = Utc::now();
        Ok(ChatSession {
            id: SessionId::generate(),
            tenant_id: tenant.clone(),
            user_ref: user_ref.map(str::to_owned),
            created_at: now,
            updated_at: now,
        })
    }

    /// Append one message at the end of an existing session.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::SessionNotFound`] if the session does not belong to
    /// `tenant`, or a database error.
    pub async fn append_message(
        &self,
        tenant: &TenantId,
        session: &SessionId,
        message: &ChatMessage,
    ) -> Result<(), MemoryError> {
        let mut tx = self.pool.begin().await?;
        insert_messages(&mut tx, tenant, session, std::slice::from_ref(message)).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Append the user and assistant messages of one turn atomically, creating the
    /// session row first if it was never stored.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::SessionNotFound`] if the session id belongs to another
    /// tenant, or a database error. Nothing is written on error.
    pub async fn append_turn(
        &self,
        session: &ChatSession,
        user: &ChatMessage,
        assistant: &ChatMessage,
    ) -> Result<(), MemoryError> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query(
            "INSERT INTO sessions (id, tenant_id, user_ref, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) ON CONFLICT(id) DO NOTHING",
        )
        .bind(&session.id)
        .bind(&session.tenant_id)
        .bind(&session.user_ref)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&mut *tx)
        .await?;

        insert_messages(
            &mut tx,
            &session.tenant_id,
            &session.id,
            &[user.clone(), assistant.clone()],
        )
        .await?;
        tx.commit().await?;

        if created.rows_affected() > 0 {
            tracing::debug!(tenant = %session.tenant_id, session = %session.id, "session created");
        }
        Ok(())
    }

    /// The most recent `limit` messages in chronological order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn recent_messages(
        &self,
        tenant: &TenantId,
        session: &SessionId,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, MemoryError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT role, content, sources, created_at FROM (\
                SELECT m.id, m.role, m.content, m.sources, m.created_at FROM messages m \
                JOIN sessions s ON s.id = m.session_id \
                WHERE m.session_id = ? AND s.tenant_id = ? \
                ORDER BY m.id DESC \
                LIMIT ?\
             ) ORDER BY id ASC",
        )
        .bind(session)
        .bind(tenant)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_message).collect()
    }

    /// Every message of the session in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn messages(
        &self,
        tenant: &TenantId,
        session: &SessionId,
    ) -> Result<Vec<ChatMessage>, MemoryError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT m.role, m.content, m.sources, m.created_at FROM messages m \
             JOIN sessions s ON s.id = m.session_id \
             WHERE m.session_id = ? AND s.tenant_id = ? \
             ORDER BY m.id ASC",
        )
        .bind(session)
        .bind(tenant)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_message).collect()
    }

    /// Remove a session and its messages. Returns whether anything was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_session(
        &self,
        tenant: &TenantId,
        session: &SessionId,
    ) -> Result<bool, MemoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ? AND tenant_id = ?")
            .bind(session)
            .bind(tenant)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove every session of `tenant`, returning how many were deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_sessions(&self, tenant: &TenantId) -> Result<u64, MemoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE tenant_id = ?")
            .bind(tenant)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count_sessions(&self, tenant: &TenantId) -> Result<u64, MemoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE tenant_id = ?")
            .bind(tenant)
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count)?)
    }
}
