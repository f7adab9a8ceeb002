use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use tenderflow_agent::llm::{client_from_config, LlmError};
use tenderflow_agent::runtime::{AgentRuntime, RuntimeOptions};
use tenderflow_core::audit::{AuditEvent, AuditSink};
use tenderflow_core::config::{AppConfig, ConfigError, LoadOptions};
use tenderflow_db::{
    connect_from_config, ensure_schema, AuditStore, DbPool, SessionStore, SqlAuditStore,
    SqlCatalogStore, SqlOpportunityStore, SqlSessionStore,
};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<AgentRuntime>,
    pub sessions: Arc<dyn SessionStore>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("schema application failed: {0}")]
    Schema(#[source] sqlx::Error),
    #[error("llm client construction failed: {0}")]
    Llm(#[source] LlmError),
}

/// Audit events are produced synchronously inside the turn loop; persisting
/// them must not block or fail the turn, so the append runs on a spawned task
/// and a failed write is logged and dropped.
struct StoreAuditSink {
    store: Arc<SqlAuditStore>,
}

impl AuditSink for StoreAuditSink {
    fn emit(&self, event: AuditEvent) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(error) = store.append(&event).await {
                tracing::warn!(
                    event_name = "audit.append_failed",
                    correlation_id = %event.correlation_id,
                    error = %error,
                    "audit event was not persisted"
                );
            }
        });
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        session_id = "unknown",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        session_id = "unknown",
        "database connection established"
    );

    ensure_schema(&db_pool).await.map_err(BootstrapError::Schema)?;
    info!(
        event_name = "system.bootstrap.schema_applied",
        correlation_id = "bootstrap",
        session_id = "unknown",
        "database schema applied"
    );

    let sessions: Arc<dyn SessionStore> = Arc::new(SqlSessionStore::new(db_pool.clone()));
    let opportunities = Arc::new(SqlOpportunityStore::new(db_pool.clone()));
    let catalog = Arc::new(SqlCatalogStore::new(db_pool.clone()));
    let audit =
        Arc::new(StoreAuditSink { store: Arc::new(SqlAuditStore::new(db_pool.clone())) });
    let llm = client_from_config(&config.llm).map_err(BootstrapError::Llm)?;

    let runtime = Arc::new(AgentRuntime::new(
        sessions.clone(),
        opportunities,
        catalog,
        audit,
        llm,
        RuntimeOptions::from_config(&config),
    ));

    Ok(Application { config, db_pool, runtime, sessions })
}

#[cfg(test)]
mod tests {
    use tenderflow_core::config::{ConfigOverrides, LlmProvider, LoadOptions};
    use tenderflow_db::AuditStore;

    use crate::bootstrap::bootstrap;

    fn valid_overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_when_a_hosted_provider_has_no_key() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                llm_provider: Some(LlmProvider::OpenAi),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("llm.api_key"));
    }

    #[tokio::test]
    async fn integration_smoke_covers_startup_and_a_full_chat_turn() {
        let app = bootstrap(valid_overrides("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('session_state', 'opportunity', 'product', 'test_price', 'audit_event')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected foundation tables to be available after bootstrap");
        assert_eq!(table_count, 5, "bootstrap should expose the baseline tables");

        let session_id = tenderflow_core::domain::session::SessionId("sess-boot".to_string());
        let outcome = app
            .runtime
            .handle_message(&session_id, "scan for tenders")
            .await
            .expect("a scan turn should succeed against an empty opportunity table");
        assert_eq!(outcome.workflow.stage, "scanning");
        assert_eq!(outcome.workflow.opportunities_found, 0);

        // The router transition is persisted through the spawned audit task.
        let audit = tenderflow_db::SqlAuditStore::new(app.db_pool.clone());
        let mut events = Vec::new();
        for _ in 0..50 {
            events = audit.for_session(&session_id).await.expect("audit query");
            if !events.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(
            events.iter().any(|event| event.event_type == "workflow.route_decided"),
            "routing decisions should reach the audit trail"
        );

        app.db_pool.close().await;
    }
}
