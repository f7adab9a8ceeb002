pub mod connection;
pub mod fixtures;
pub mod schema;
pub mod stores;

pub use connection::{connect, connect_from_config, connect_with_settings, DbPool};
pub use fixtures::{OpportunitySeedInfo, SeedDataset, SeedResult, VerificationResult};
pub use schema::ensure_schema;
pub use stores::{
    AuditStore, CatalogStore, InMemoryAuditStore, InMemoryCatalogStore, InMemoryOpportunityStore,
    InMemorySessionStore, OpportunityStore, SessionStore, SqlAuditStore, SqlCatalogStore,
    SqlOpportunityStore, SqlSessionStore, StoreError,
};
