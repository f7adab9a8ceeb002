use async_trait::async_trait;
use sqlx::Row;

use tenderflow_core::audit::AuditEvent;
use tenderflow_core::domain::session::SessionId;

use crate::connection::DbPool;
use crate::stores::{AuditStore, StoreError};

#[derive(Clone)]
pub struct SqlAuditStore {
    pool: DbPool,
}

impl SqlAuditStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for SqlAuditStore {
    async fn append(&self, event: &AuditEvent) -> Result<(), StoreError> {
        let document =
            serde_json::to_string(event).map_err(|err| StoreError::Decode(err.to_string()))?;

        sqlx::query(
            "INSERT INTO audit_event (event_id, session_id, event_type, document, occurred_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&event.event_id)
        .bind(event.session_id.as_ref().map(|id| id.0.clone()))
        .bind(&event.event_type)
        .bind(document)
        .bind(event.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn for_session(&self, session: &SessionId) -> Result<Vec<AuditEvent>, StoreError> {
        let rows = sqlx::query(
            "SELECT document FROM audit_event WHERE session_id = ?1 ORDER BY occurred_at, event_id",
        )
        .bind(&session.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let document: String = row.try_get("document")?;
                serde_json::from_str(&document).map_err(|err| StoreError::Decode(err.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use tenderflow_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
    use tenderflow_core::domain::session::SessionId;

    use crate::connection::connect;
    use crate::schema::ensure_schema;
    use crate::stores::{AuditStore, SqlAuditStore};

    async fn store() -> SqlAuditStore {
        let pool = connect("sqlite::memory:").await.expect("pool");
        ensure_schema(&pool).await.expect("schema");
        SqlAuditStore::new(pool)
    }

    fn event(session: &str, event_type: &str) -> AuditEvent {
        AuditEvent::new(
            Some(SessionId(session.to_owned())),
            "req-1",
            event_type,
            AuditCategory::Routing,
            "workflow-router",
            AuditOutcome::Success,
        )
        .with_metadata("from", "scanning")
    }

    #[tokio::test]
    async fn appended_events_come_back_for_their_session_only() {
        let store = store().await;

        store.append(&event("sess-1", "workflow.route_decided")).await.expect("append");
        store.append(&event("sess-1", "workflow.stage_completed")).await.expect("append");
        store.append(&event("sess-2", "workflow.route_decided")).await.expect("append");

        let events = store.for_session(&SessionId("sess-1".to_owned())).await.expect("query");
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|event| event.session_id == Some(SessionId("sess-1".to_owned()))));
        assert_eq!(events[0].metadata.get("from").map(String::as_str), Some("scanning"));
    }

    #[tokio::test]
    async fn sessionless_events_are_kept_but_not_returned_per_session() {
        let store = store().await;

        let system_event = AuditEvent::new(
            None,
            "req-2",
            "system.startup",
            tenderflow_core::audit::AuditCategory::System,
            "server",
            tenderflow_core::audit::AuditOutcome::Success,
        );
        store.append(&system_event).await.expect("append");

        let events = store.for_session(&SessionId("sess-1".to_owned())).await.expect("query");
        assert!(events.is_empty());
    }
}
