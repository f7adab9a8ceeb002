use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use tenderflow_core::domain::opportunity::{Opportunity, OpportunityId, RawOpportunityRecord};

use crate::connection::DbPool;
use crate::stores::{OpportunityStore, StoreError};

#[derive(Clone)]
pub struct SqlOpportunityStore {
    pool: DbPool,
}

impl SqlOpportunityStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn upsert(&self, opportunity: &Opportunity) -> Result<(), StoreError> {
        let document =
            serde_json::to_string(opportunity).map_err(|err| StoreError::Decode(err.to_string()))?;

        sqlx::query(
            "INSERT INTO opportunity (id, document, ingested_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (id) DO UPDATE SET document = excluded.document",
        )
        .bind(&opportunity.id.0)
        .bind(document)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn decode(document: &str) -> Result<Opportunity, StoreError> {
    serde_json::from_str(document).map_err(|err| StoreError::Decode(err.to_string()))
}

#[async_trait]
impl OpportunityStore for SqlOpportunityStore {
    async fn ingest(&self, record: RawOpportunityRecord) -> Result<Opportunity, StoreError> {
        let opportunity =
            record.normalize().map_err(|err| StoreError::InvalidRecord(err.to_string()))?;
        self.upsert(&opportunity).await?;
        Ok(opportunity)
    }

    async fn get(&self, id: &OpportunityId) -> Result<Option<Opportunity>, StoreError> {
        let row = sqlx::query("SELECT document FROM opportunity WHERE id = ?1")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let document: String = row.try_get("document")?;
                Ok(Some(decode(&document)?))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Opportunity>, StoreError> {
        let rows = sqlx::query("SELECT document FROM opportunity ORDER BY ingested_at, id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let document: String = row.try_get("document")?;
                decode(&document)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use tenderflow_core::domain::opportunity::{OpportunityId, RawOpportunityRecord};

    use crate::connection::connect;
    use crate::schema::ensure_schema;
    use crate::stores::{OpportunityStore, SqlOpportunityStore, StoreError};

    async fn store() -> SqlOpportunityStore {
        let pool = connect("sqlite::memory:").await.expect("pool");
        ensure_schema(&pool).await.expect("schema");
        SqlOpportunityStore::new(pool)
    }

    fn record(id: Option<&str>, rfp_id: Option<&str>) -> RawOpportunityRecord {
        RawOpportunityRecord {
            id: id.map(str::to_owned),
            rfp_id: rfp_id.map(str::to_owned),
            title: "Cable supply".to_owned(),
            client: "Metro Rail Corp".to_owned(),
            description: String::new(),
            estimated_value: Decimal::new(1_500_000, 0),
            submission_deadline: NaiveDate::from_ymd_opt(2026, 9, 30).unwrap(),
            location: "Delhi".to_owned(),
            line_items: Vec::new(),
        }
    }

    #[tokio::test]
    async fn ingestion_normalizes_and_persists_the_record() {
        let store = store().await;

        let ingested = store.ingest(record(None, Some("TOT-2026-001"))).await.expect("ingest");
        assert_eq!(ingested.id.0, "TOT-2026-001");

        let fetched = store
            .get(&OpportunityId("TOT-2026-001".to_owned()))
            .await
            .expect("get")
            .expect("present");
        assert_eq!(fetched, ingested);
    }

    #[tokio::test]
    async fn divergent_identifiers_survive_the_round_trip_as_alias() {
        let store = store().await;

        store.ingest(record(Some("OPP-17"), Some("TOT-2026-001"))).await.expect("ingest");

        let fetched = store
            .get(&OpportunityId("OPP-17".to_owned()))
            .await
            .expect("get")
            .expect("present");
        assert_eq!(fetched.alias.as_deref(), Some("TOT-2026-001"));
        assert!(fetched.identifier_matches("tot-2026-001"));
    }

    #[tokio::test]
    async fn reingesting_the_same_identifier_replaces_the_document() {
        let store = store().await;

        store.ingest(record(Some("TOT-1"), None)).await.expect("first ingest");
        let mut updated = record(Some("TOT-1"), None);
        updated.title = "Revised cable supply".to_owned();
        store.ingest(updated).await.expect("second ingest");

        let all = store.list().await.expect("list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Revised cable supply");
    }

    #[tokio::test]
    async fn identifierless_records_are_rejected_not_stored() {
        let store = store().await;

        let error = store.ingest(record(None, None)).await.expect_err("must reject");
        assert!(matches!(error, StoreError::InvalidRecord(_)));
        assert!(store.list().await.expect("list").is_empty());
    }
}
