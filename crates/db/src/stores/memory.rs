//! In-memory store implementations for tests and ephemeral runs. Behavior
//! mirrors the SQL stores, including listing order.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use tenderflow_core::audit::AuditEvent;
use tenderflow_core::domain::opportunity::{Opportunity, OpportunityId, RawOpportunityRecord};
use tenderflow_core::domain::product::Product;
use tenderflow_core::domain::session::{SessionId, SessionState};

use crate::stores::{
    AuditStore, CatalogStore, OpportunityStore, SessionStore, StoreError,
};

#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionState>>>,
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionState>, StoreError> {
        Ok(self.sessions.read().await.get(&id.0).cloned())
    }

    async fn save(&self, state: &SessionState) -> Result<(), StoreError> {
        self.sessions.write().await.insert(state.id.0.clone(), state.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryOpportunityStore {
    opportunities: Arc<RwLock<Vec<Opportunity>>>,
}

#[async_trait]
impl OpportunityStore for InMemoryOpportunityStore {
    async fn ingest(&self, record: RawOpportunityRecord) -> Result<Opportunity, StoreError> {
        let opportunity =
            record.normalize().map_err(|err| StoreError::InvalidRecord(err.to_string()))?;

        let mut opportunities = self.opportunities.write().await;
        match opportunities.iter_mut().find(|existing| existing.id == opportunity.id) {
            Some(existing) => *existing = opportunity.clone(),
            None => opportunities.push(opportunity.clone()),
        }
        Ok(opportunity)
    }

    async fn get(&self, id: &OpportunityId) -> Result<Option<Opportunity>, StoreError> {
        Ok(self
            .opportunities
            .read()
            .await
            .iter()
            .find(|opportunity| opportunity.id == *id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Opportunity>, StoreError> {
        Ok(self.opportunities.read().await.clone())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryCatalogStore {
    products: Arc<RwLock<Vec<Product>>>,
    test_prices: Arc<RwLock<BTreeMap<String, Decimal>>>,
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let mut products = self.products.read().await.clone();
        products.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(products)
    }

    async fn save_product(&self, product: &Product) -> Result<(), StoreError> {
        let mut products = self.products.write().await;
        match products.iter_mut().find(|existing| existing.id == product.id) {
            Some(existing) => *existing = product.clone(),
            None => products.push(product.clone()),
        }
        Ok(())
    }

    async fn test_price_table(&self) -> Result<BTreeMap<String, Decimal>, StoreError> {
        Ok(self.test_prices.read().await.clone())
    }

    async fn save_test_price(&self, test_name: &str, price: Decimal) -> Result<(), StoreError> {
        self.test_prices.write().await.insert(test_name.to_owned(), price);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAuditStore {
    events: Arc<RwLock<Vec<AuditEvent>>>,
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, event: &AuditEvent) -> Result<(), StoreError> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn for_session(&self, session: &SessionId) -> Result<Vec<AuditEvent>, StoreError> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|event| event.session_id.as_ref() == Some(session))
            .cloned()
            .collect())
    }
}
