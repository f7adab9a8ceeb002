pub mod audit;
pub mod catalog;
pub mod memory;
pub mod opportunity;
pub mod session;

use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use tenderflow_core::audit::AuditEvent;
use tenderflow_core::domain::opportunity::{Opportunity, OpportunityId, RawOpportunityRecord};
use tenderflow_core::domain::product::Product;
use tenderflow_core::domain::session::{SessionId, SessionState};

pub use audit::SqlAuditStore;
pub use catalog::SqlCatalogStore;
pub use memory::{
    InMemoryAuditStore, InMemoryCatalogStore, InMemoryOpportunityStore, InMemorySessionStore,
};
pub use opportunity::SqlOpportunityStore;
pub use session::SqlSessionStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored document could not be decoded: {0}")]
    Decode(String),
    #[error("record rejected at ingestion: {0}")]
    InvalidRecord(String),
}

/// Session documents between turns. One row per session; `save` replaces the
/// whole document.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionState>, StoreError>;
    async fn save(&self, state: &SessionState) -> Result<(), StoreError>;
}

/// Tender records. External records pass through [`RawOpportunityRecord::normalize`]
/// on the way in, so everything read back carries a canonical identifier.
#[async_trait]
pub trait OpportunityStore: Send + Sync {
    async fn ingest(&self, record: RawOpportunityRecord) -> Result<Opportunity, StoreError>;
    async fn get(&self, id: &OpportunityId) -> Result<Option<Opportunity>, StoreError>;
    async fn list(&self) -> Result<Vec<Opportunity>, StoreError>;
}

/// Product catalog and the per-test price list used by pricing.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;
    async fn save_product(&self, product: &Product) -> Result<(), StoreError>;
    async fn test_price_table(&self) -> Result<BTreeMap<String, Decimal>, StoreError>;
    async fn save_test_price(&self, test_name: &str, price: Decimal) -> Result<(), StoreError>;
}

/// Append-only audit trail.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> Result<(), StoreError>;
    async fn for_session(&self, session: &SessionId) -> Result<Vec<AuditEvent>, StoreError>;
}
