use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::pricing::{PricingAnalysis, PricingBreakdown};
use crate::domain::product::Product;

/// Tokens that mark an opportunity as a voltage-class job. Matched as
/// substrings of the lowercased requirement text.
const VOLTAGE_TEST_TOKENS: [&str; 5] = ["high voltage", "hv", "33kv", "11kv", "kv"];

const HIGH_VOLTAGE_TEST: &str = "High Voltage Test";
const IMPULSE_VOLTAGE_TEST: &str = "Impulse Voltage Test";
const WATER_PENETRATION_TEST: &str = "Water Penetration Test";
const MECHANICAL_TEST: &str = "Mechanical Test";
const PARTIAL_DISCHARGE_TEST: &str = "Partial Discharge Test";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricingSettings {
    pub overhead_pct: Decimal,
    pub contingency_pct: Decimal,
    pub assumed_length_km: Decimal,
    pub currency: String,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            overhead_pct: Decimal::new(5, 2),
            contingency_pct: Decimal::new(3, 2),
            assumed_length_km: Decimal::ONE,
            currency: "INR".to_owned(),
        }
    }
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Recommend the tests an opportunity needs, in a fixed emission order.
/// Tests without a price table entry are dropped silently so a thinner
/// table degrades the estimate instead of failing it.
pub fn recommend_tests(
    requirement_text: &str,
    price_table: &BTreeMap<String, Decimal>,
) -> Vec<String> {
    let text = requirement_text.to_lowercase();
    let mut tests: Vec<&str> = Vec::new();

    if VOLTAGE_TEST_TOKENS.iter().any(|token| text.contains(token)) {
        tests.push(HIGH_VOLTAGE_TEST);
        tests.push(IMPULSE_VOLTAGE_TEST);
    }
    if text.contains("underground") {
        tests.push(WATER_PENETRATION_TEST);
    }
    tests.push(MECHANICAL_TEST);
    tests.push(PARTIAL_DISCHARGE_TEST);

    let mut seen = Vec::new();
    for test in tests {
        if price_table.contains_key(test) && !seen.iter().any(|known| known == test) {
            seen.push(test.to_owned());
        }
    }
    seen
}

pub fn testing_cost(tests: &[String], price_table: &BTreeMap<String, Decimal>) -> Decimal {
    tests
        .iter()
        .filter_map(|test| price_table.get(test))
        .fold(Decimal::ZERO, |total, price| total + price)
}

/// Material cost for the recommended product over the assumed run length.
/// Without a recommendation there is nothing to price, so the component
/// contributes zero rather than erroring out.
pub fn material_cost(top_product: Option<&Product>, assumed_length_km: Decimal) -> Decimal {
    match top_product {
        Some(product) => round_money(product.price_per_km * assumed_length_km),
        None => Decimal::ZERO,
    }
}

/// Build the cost breakdown. Each derived figure is rounded half-away-from-zero
/// to two decimals before the next one is computed, so the grand total always
/// equals the sum of the printed components.
pub fn breakdown(
    material: Decimal,
    testing: Decimal,
    settings: &PricingSettings,
) -> PricingBreakdown {
    let subtotal = round_money(material + testing);
    let overhead_cost = round_money(subtotal * settings.overhead_pct);
    let contingency_cost = round_money(subtotal * settings.contingency_pct);
    let grand_total = round_money(subtotal + overhead_cost + contingency_cost);

    PricingBreakdown {
        material_cost: material,
        testing_cost: testing,
        subtotal,
        overhead_cost,
        contingency_cost,
        grand_total,
    }
}

pub fn price_opportunity(
    requirement_text: &str,
    top_product: Option<&Product>,
    price_table: &BTreeMap<String, Decimal>,
    settings: &PricingSettings,
) -> PricingAnalysis {
    let recommended_tests = recommend_tests(requirement_text, price_table);
    let testing = testing_cost(&recommended_tests, price_table);
    let material = material_cost(top_product, settings.assumed_length_km);

    PricingAnalysis {
        recommended_tests,
        breakdown: breakdown(material, testing, settings),
        currency: settings.currency.clone(),
    }
}
