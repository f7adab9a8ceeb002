use chrono::NaiveDate;
use rust_decimal::Decimal;

use tenderflow_core::domain::opportunity::{LineItem, RawOpportunityRecord};
use tenderflow_core::domain::product::{Product, ProductAttributes, ProductId};

use crate::connection::DbPool;
use crate::stores::{
    CatalogStore, OpportunityStore, SqlCatalogStore, SqlOpportunityStore, StoreError,
};

/// Canonical seeds and verification contract for the end-to-end tender flow:
/// scan, select, analyze, price, compile.
const SEED_OPPORTUNITIES: &[SeedOpportunityContract] = &[
    SeedOpportunityContract {
        opportunity_id: "TOT-2026-001",
        title: "Supply of 11 kV XLPE Cables for Metro Project",
        client: "Delhi Metro Rail Corporation",
        location: "Delhi",
        estimated_value_inr: 1_500_000,
        deadline: (2026, 9, 10),
        line_count: 1,
        description: "Supply of 11 kV XLPE insulated, 3 core x 300 sq.mm aluminium conductor \
                      armoured power cable for underground metro feeder lines. Quantity: 50 km.",
        exists_label: "opportunity-metro",
        lines_label: "opportunity-metro-lines",
    },
    SeedOpportunityContract {
        opportunity_id: "TOT-2026-002",
        title: "Wires and Cables for Smart City Infrastructure",
        client: "Pune Smart City Development Corporation",
        location: "Pune",
        estimated_value_inr: 8_500_000,
        deadline: (2026, 10, 5),
        line_count: 1,
        description: "6.6 kV XLPE insulated 240 sq.mm aluminium conductor cable for underground \
                      smart city power distribution. Quantity: 40 km.",
        exists_label: "opportunity-smartcity",
        lines_label: "opportunity-smartcity-lines",
    },
    SeedOpportunityContract {
        opportunity_id: "TOT-2026-003",
        title: "Control Cables for Substation Automation",
        client: "Gujarat State Transmission Corporation",
        location: "Ahmedabad",
        estimated_value_inr: 600_000,
        deadline: (2026, 8, 20),
        line_count: 1,
        description: "1.1 kV PVC insulated 12 core x 2.5 sq.mm copper control cable for \
                      substation automation panels. Quantity: 8 km.",
        exists_label: "opportunity-substation",
        lines_label: "opportunity-substation-lines",
    },
];

const SEED_PRODUCT_IDS: &[&str] = &[
    "CAB-PVC-1K-12C25",
    "CAB-XLPE-11K-3C300",
    "CAB-XLPE-33K-3C400",
    "CAB-XLPE-6K6-3C240",
];

const SEED_TEST_PRICES: &[(&str, i64)] = &[
    ("High Voltage Test", 5_000),
    ("Impulse Voltage Test", 7_500),
    ("Water Penetration Test", 3_000),
    ("Mechanical Test", 2_500),
    ("Partial Discharge Test", 4_000),
];

/// Deterministic seed dataset for E2E runs: three tenders spanning the
/// qualified / marginal / under-value spectrum, a small cable catalog, and the
/// full acceptance-test price list.
pub struct SeedDataset;

impl SeedDataset {
    pub async fn load(pool: &DbPool) -> Result<SeedResult, StoreError> {
        let opportunities = SqlOpportunityStore::new(pool.clone());
        let catalog = SqlCatalogStore::new(pool.clone());

        for contract in SEED_OPPORTUNITIES {
            opportunities.ingest(contract.record()).await?;
        }
        for product in seed_products() {
            catalog.save_product(&product).await?;
        }
        for (name, price) in SEED_TEST_PRICES {
            catalog.save_test_price(name, Decimal::new(*price, 0)).await?;
        }

        let opportunities_seeded = SEED_OPPORTUNITIES
            .iter()
            .map(|contract| OpportunitySeedInfo {
                opportunity_id: contract.opportunity_id,
                title: contract.title,
                client: contract.client,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult { opportunities_seeded })
    }

    /// Verify that seed data exists and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, StoreError> {
        let mut checks = Vec::new();

        for contract in SEED_OPPORTUNITIES {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM opportunity WHERE id = ?1)",
            )
            .bind(contract.opportunity_id)
            .fetch_one(pool)
            .await?;
            checks.push((contract.exists_label, exists == 1));

            let line_count: Option<i64> = sqlx::query_scalar(
                "SELECT json_array_length(json_extract(document, '$.line_items'))
                 FROM opportunity WHERE id = ?1",
            )
            .bind(contract.opportunity_id)
            .fetch_optional(pool)
            .await?
            .flatten();
            checks.push((contract.lines_label, line_count == Some(contract.line_count)));
        }

        let quoted_products = sql_array_from_ids(SEED_PRODUCT_IDS);
        let product_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM product WHERE id IN {quoted_products}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("catalog-products", product_count == SEED_PRODUCT_IDS.len() as i64));

        for (name, expected) in SEED_TEST_PRICES {
            let price: Option<String> =
                sqlx::query_scalar("SELECT price FROM test_price WHERE name = ?1")
                    .bind(name)
                    .fetch_optional(pool)
                    .await?;
            checks.push((*name, price.as_deref() == Some(expected.to_string().as_str())));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Clean up seeded fixtures from a test database.
    pub async fn clean(pool: &DbPool) -> Result<(), StoreError> {
        let opportunity_ids: Vec<&str> =
            SEED_OPPORTUNITIES.iter().map(|contract| contract.opportunity_id).collect();
        let quoted_opportunities = sql_array_from_ids(&opportunity_ids);
        let quoted_products = sql_array_from_ids(SEED_PRODUCT_IDS);
        let test_names: Vec<&str> = SEED_TEST_PRICES.iter().map(|(name, _)| *name).collect();
        let quoted_tests = sql_array_from_ids(&test_names);

        let mut tx = pool.begin().await?;
        sqlx::query(&format!("DELETE FROM opportunity WHERE id IN {quoted_opportunities}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM product WHERE id IN {quoted_products}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM test_price WHERE name IN {quoted_tests}"))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedOpportunityContract {
    opportunity_id: &'static str,
    title: &'static str,
    client: &'static str,
    location: &'static str,
    estimated_value_inr: i64,
    deadline: (i32, u32, u32),
    line_count: i64,
    description: &'static str,
    exists_label: &'static str,
    lines_label: &'static str,
}

impl SeedOpportunityContract {
    fn record(&self) -> RawOpportunityRecord {
        let (year, month, day) = self.deadline;
        RawOpportunityRecord {
            id: None,
            rfp_id: Some(self.opportunity_id.to_owned()),
            title: self.title.to_owned(),
            client: self.client.to_owned(),
            description: self.description.to_owned(),
            estimated_value: Decimal::new(self.estimated_value_inr, 0),
            submission_deadline: NaiveDate::from_ymd_opt(year, month, day)
                .unwrap_or(NaiveDate::MAX),
            location: self.location.to_owned(),
            line_items: vec![LineItem { description: self.description.to_owned(), quantity: 1 }],
        }
    }
}

fn seed_products() -> Vec<Product> {
    vec![
        Product {
            id: ProductId("CAB-XLPE-11K-3C300".to_owned()),
            name: "11 kV XLPE 3C x 300 sq.mm Aluminium Armoured Power Cable".to_owned(),
            price_per_km: Decimal::new(1_850_000, 0),
            attributes: ProductAttributes {
                voltage_grade: Some("11 kV".to_owned()),
                insulation: Some("XLPE".to_owned()),
                cores: Some(3),
                conductor_size_sqmm: Some(Decimal::new(300, 0)),
                conductor_material: Some("Aluminium".to_owned()),
                armoured: Some(true),
                cable_type: Some("Power".to_owned()),
                application: Some("Underground".to_owned()),
            },
        },
        Product {
            id: ProductId("CAB-XLPE-6K6-3C240".to_owned()),
            name: "6.6 kV XLPE 3C x 240 sq.mm Aluminium Power Cable".to_owned(),
            price_per_km: Decimal::new(1_320_000, 0),
            attributes: ProductAttributes {
                voltage_grade: Some("6.6 kV".to_owned()),
                insulation: Some("XLPE".to_owned()),
                cores: Some(3),
                conductor_size_sqmm: Some(Decimal::new(240, 0)),
                conductor_material: Some("Aluminium".to_owned()),
                armoured: Some(false),
                cable_type: Some("Power".to_owned()),
                application: Some("Underground".to_owned()),
            },
        },
        Product {
            id: ProductId("CAB-XLPE-33K-3C400".to_owned()),
            name: "33 kV XLPE 3C x 400 sq.mm Aluminium Armoured Power Cable".to_owned(),
            price_per_km: Decimal::new(3_250_000, 0),
            attributes: ProductAttributes {
                voltage_grade: Some("33 kV".to_owned()),
                insulation: Some("XLPE".to_owned()),
                cores: Some(3),
                conductor_size_sqmm: Some(Decimal::new(400, 0)),
                conductor_material: Some("Aluminium".to_owned()),
                armoured: Some(true),
                cable_type: Some("Power".to_owned()),
                application: Some("Underground".to_owned()),
            },
        },
        Product {
            id: ProductId("CAB-PVC-1K-12C25".to_owned()),
            name: "1.1 kV PVC 12C x 2.5 sq.mm Copper Control Cable".to_owned(),
            price_per_km: Decimal::new(185_000, 0),
            attributes: ProductAttributes {
                voltage_grade: Some("1.1 kV".to_owned()),
                insulation: Some("PVC".to_owned()),
                cores: Some(12),
                conductor_size_sqmm: Some(Decimal::new(25, 1)),
                conductor_material: Some("Copper".to_owned()),
                armoured: Some(false),
                cable_type: Some("Control".to_owned()),
                application: None,
            },
        },
    ]
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub opportunities_seeded: Vec<OpportunitySeedInfo>,
}

#[derive(Debug)]
pub struct OpportunitySeedInfo {
    pub opportunity_id: &'static str,
    pub title: &'static str,
    pub client: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
