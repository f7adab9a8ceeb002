use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use tenderflow_core::domain::session::{SessionId, SessionState};

use crate::connection::DbPool;
use crate::stores::{SessionStore, StoreError};

#[derive(Clone)]
pub struct SqlSessionStore {
    pool: DbPool,
}

impl SqlSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SqlSessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionState>, StoreError> {
        let row = sqlx::query("SELECT document FROM session_state WHERE id = ?1")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let document: String = row.try_get("document")?;
                let state = serde_json::from_str(&document)
                    .map_err(|err| StoreError::Decode(err.to_string()))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, state: &SessionState) -> Result<(), StoreError> {
        let document =
            serde_json::to_string(state).map_err(|err| StoreError::Decode(err.to_string()))?;

        sqlx::query(
            "INSERT INTO session_state (id, stage, document, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (id) DO UPDATE SET
                 stage = excluded.stage,
                 document = excluded.document,
                 updated_at = excluded.updated_at",
        )
        .bind(&state.id.0)
        .bind(state.stage.as_str())
        .bind(document)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
