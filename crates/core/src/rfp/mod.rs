pub mod matcher;
pub mod pricing;
pub mod qualify;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::matching::MatchResult;
use crate::domain::opportunity::{Opportunity, QualificationOutcome};
use crate::domain::pricing::PricingAnalysis;
use crate::domain::product::Product;

use self::pricing::PricingSettings;
use self::qualify::QualificationCriteria;

pub trait QualifierEngine: Send + Sync {
    fn qualify(
        &self,
        opportunity: &Opportunity,
        criteria: &QualificationCriteria,
        today: NaiveDate,
    ) -> QualificationOutcome;
}

pub trait MatchEngine: Send + Sync {
    fn match_products(&self, requirement_text: &str, catalog: &[Product]) -> Vec<MatchResult>;
}

pub trait PricingEngine: Send + Sync {
    fn price(
        &self,
        requirement_text: &str,
        top_product: Option<&Product>,
        price_table: &BTreeMap<String, Decimal>,
        settings: &PricingSettings,
    ) -> PricingAnalysis;
}

pub struct RuleBasedQualifier;

impl QualifierEngine for RuleBasedQualifier {
    fn qualify(
        &self,
        opportunity: &Opportunity,
        criteria: &QualificationCriteria,
        today: NaiveDate,
    ) -> QualificationOutcome {
        qualify::qualify_opportunity(opportunity, criteria, today)
    }
}

pub struct DeterministicMatcher;

impl MatchEngine for DeterministicMatcher {
    fn match_products(&self, requirement_text: &str, catalog: &[Product]) -> Vec<MatchResult> {
        matcher::match_products(requirement_text, catalog)
    }
}

pub struct DeterministicPricing;

impl PricingEngine for DeterministicPricing {
    fn price(
        &self,
        requirement_text: &str,
        top_product: Option<&Product>,
        price_table: &BTreeMap<String, Decimal>,
        settings: &PricingSettings,
    ) -> PricingAnalysis {
        pricing::price_opportunity(requirement_text, top_product, price_table, settings)
    }
}

/// The three stage engines bundled for the runtime. Generic so tests can swap
/// in fixed-output engines without touching the workflow code.
pub struct RfpEngines<Q, M, P> {
    pub qualifier: Q,
    pub matcher: M,
    pub pricing: P,
}

impl<Q, M, P> RfpEngines<Q, M, P> {
    pub fn new(qualifier: Q, matcher: M, pricing: P) -> Self {
        Self { qualifier, matcher, pricing }
    }
}

impl Default for RfpEngines<RuleBasedQualifier, DeterministicMatcher, DeterministicPricing> {
    fn default() -> Self {
        Self::new(RuleBasedQualifier, DeterministicMatcher, DeterministicPricing)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use crate::domain::opportunity::{Opportunity, OpportunityId, QualificationOutcome};
    use crate::domain::product::{Product, ProductAttributes, ProductId};
    use crate::rfp::pricing::PricingSettings;
    use crate::rfp::qualify::QualificationCriteria;
    use crate::rfp::{
        DeterministicMatcher, DeterministicPricing, MatchEngine, PricingEngine, QualifierEngine,
        RfpEngines, RuleBasedQualifier,
    };

    fn opportunity_fixture() -> Opportunity {
        Opportunity {
            id: OpportunityId("RFP-2026-001".to_owned()),
            alias: None,
            title: "33kV cable supply".to_owned(),
            client: "Metro Power".to_owned(),
            description: "33kV XLPE 3 core 300 sqmm aluminium underground".to_owned(),
            estimated_value: Decimal::new(5_000_000, 0),
            submission_deadline: NaiveDate::from_ymd_opt(2026, 9, 30).unwrap(),
            location: "Delhi".to_owned(),
            line_items: Vec::new(),
        }
    }

    fn catalog_fixture() -> Vec<Product> {
        vec![Product {
            id: ProductId("CAB-001".to_owned()),
            name: "33kV XLPE 3C 300sqmm Al".to_owned(),
            price_per_km: Decimal::new(95_000, 0),
            attributes: ProductAttributes {
                voltage_grade: Some("33 kV".to_owned()),
                insulation: Some("XLPE".to_owned()),
                cores: Some(3),
                conductor_size_sqmm: Some(Decimal::new(300, 0)),
                conductor_material: Some("Aluminium".to_owned()),
                armoured: None,
                cable_type: None,
                application: Some("Underground".to_owned()),
            },
        }]
    }

    #[test]
    fn default_engine_bundle_wires_the_deterministic_implementations() {
        let engines = RfpEngines::default();
        let today = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let opportunity = opportunity_fixture();

        let outcome =
            engines.qualifier.qualify(&opportunity, &QualificationCriteria::default(), today);
        assert!(outcome.qualified);

        let matches = engines.matcher.match_products(&opportunity.description, &catalog_fixture());
        assert_eq!(matches.len(), 1);

        let table = BTreeMap::from([("Mechanical Test".to_owned(), Decimal::new(2_500, 0))]);
        let analysis = engines.pricing.price(
            &opportunity.description,
            matches.first().map(|result| &result.product),
            &table,
            &PricingSettings::default(),
        );
        assert!(analysis.breakdown.grand_total > Decimal::ZERO);
    }

    #[test]
    fn engine_bundle_accepts_substitute_implementations() {
        struct AlwaysQualified;

        impl QualifierEngine for AlwaysQualified {
            fn qualify(
                &self,
                _opportunity: &Opportunity,
                _criteria: &QualificationCriteria,
                _today: NaiveDate,
            ) -> QualificationOutcome {
                QualificationOutcome { qualified: true, score: 100, reasons: Vec::new() }
            }
        }

        let engines =
            RfpEngines::new(AlwaysQualified, DeterministicMatcher, DeterministicPricing);
        let today = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let outcome = engines.qualifier.qualify(
            &opportunity_fixture(),
            &QualificationCriteria::default(),
            today,
        );

        assert_eq!(outcome.score, 100);
    }
}
