use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingBreakdown {
    pub material_cost: Decimal,
    pub testing_cost: Decimal,
    pub subtotal: Decimal,
    pub overhead_cost: Decimal,
    pub contingency_cost: Decimal,
    pub grand_total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingAnalysis {
    pub recommended_tests: Vec<String>,
    pub breakdown: PricingBreakdown,
    pub currency: String,
}
