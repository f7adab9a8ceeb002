use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

/// Catalog attributes are optional; an absent attribute is treated as unknown
/// by the matcher, not as a mismatch guarantee.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductAttributes {
    pub voltage_grade: Option<String>,
    pub insulation: Option<String>,
    pub cores: Option<u32>,
    pub conductor_size_sqmm: Option<Decimal>,
    pub conductor_material: Option<String>,
    pub armoured: Option<bool>,
    pub cable_type: Option<String>,
    pub application: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price_per_km: Decimal,
    pub attributes: ProductAttributes,
}
