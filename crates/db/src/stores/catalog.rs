use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::Row;

use tenderflow_core::domain::product::{Product, ProductAttributes, ProductId};

use crate::connection::DbPool;
use crate::stores::{CatalogStore, StoreError};

#[derive(Clone)]
pub struct SqlCatalogStore {
    pool: DbPool,
}

impl SqlCatalogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_money(raw: &str, column: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(raw)
        .map_err(|err| StoreError::Decode(format!("{column} '{raw}' is not a decimal: {err}")))
}

#[async_trait]
impl CatalogStore for SqlCatalogStore {
    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows =
            sqlx::query("SELECT id, name, price_per_km, attributes FROM product ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                let name: String = row.try_get("name")?;
                let price_raw: String = row.try_get("price_per_km")?;
                let attributes_raw: String = row.try_get("attributes")?;

                let attributes: ProductAttributes = serde_json::from_str(&attributes_raw)
                    .map_err(|err| StoreError::Decode(err.to_string()))?;

                Ok(Product {
                    id: ProductId(id),
                    name,
                    price_per_km: parse_money(&price_raw, "price_per_km")?,
                    attributes,
                })
            })
            .collect()
    }

    async fn save_product(&self, product: &Product) -> Result<(), StoreError> {
        let attributes = serde_json::to_string(&product.attributes)
            .map_err(|err| StoreError::Decode(err.to_string()))?;

        sqlx::query(
            "INSERT INTO product (id, name, price_per_km, attributes)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (id) DO UPDATE SET
                 name = excluded.name,
                 price_per_km = excluded.price_per_km,
                 attributes = excluded.attributes",
        )
        .bind(&product.id.0)
        .bind(&product.name)
        .bind(product.price_per_km.to_string())
        .bind(attributes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn test_price_table(&self) -> Result<BTreeMap<String, Decimal>, StoreError> {
        let rows = sqlx::query("SELECT name, price FROM test_price")
            .fetch_all(&self.pool)
            .await?;

        let mut table = BTreeMap::new();
        for row in rows {
            let name: String = row.try_get("name")?;
            let price_raw: String = row.try_get("price")?;
            table.insert(name, parse_money(&price_raw, "price")?);
        }
        Ok(table)
    }

    async fn save_test_price(&self, test_name: &str, price: Decimal) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO test_price (name, price)
             VALUES (?1, ?2)
             ON CONFLICT (name) DO UPDATE SET price = excluded.price",
        )
        .bind(test_name)
        .bind(price.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
