//! Stage handlers dispatched by the runtime after a routing decision. Each
//! handler mutates the session snapshot in place; persistence stays with the
//! caller so a failed stage never leaves a half-written session behind.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use tenderflow_core::domain::opportunity::{Opportunity, QualificationOutcome, RankedOpportunity};
use tenderflow_core::domain::pricing::PricingAnalysis;
use tenderflow_core::domain::session::{
    LineItemAnalysis, ReportRef, SessionState, TechnicalAnalysis, WorkflowStage,
};
use tenderflow_core::errors::{ApplicationError, DomainError};
use tenderflow_core::rfp::pricing::PricingSettings;
use tenderflow_core::rfp::qualify::{prioritize, QualificationCriteria, TOP_PRESENTED};
use tenderflow_core::rfp::{MatchEngine, PricingEngine, QualifierEngine};
use tenderflow_db::{CatalogStore, OpportunityStore};

use crate::llm::{LlmClient, LlmError};
use crate::schema::{parse_qualification_assist, validate_summary};

/// Outcome of one stage handler. `degraded` marks turns that recovered from
/// an error and should carry a non-success status in the workflow summary.
#[derive(Debug, Default)]
pub struct StageReport {
    pub reply: Option<String>,
    pub degraded: bool,
}

/// Scan, qualify, and rank the known opportunities. An unavailable source
/// degrades to an empty scan; an LLM assist failure degrades to the
/// rule-based qualifier.
pub async fn qualify_stage(
    state: &mut SessionState,
    opportunities: &dyn OpportunityStore,
    qualifier: &dyn QualifierEngine,
    llm: &dyn LlmClient,
    assist: bool,
    criteria: &QualificationCriteria,
    today: NaiveDate,
) -> Result<StageReport, ApplicationError> {
    let mut degraded = false;

    let listed = match opportunities.list().await {
        Ok(listed) => listed,
        Err(err) => {
            tracing::warn!(error = %err, "opportunity source unavailable, presenting an empty scan");
            degraded = true;
            Vec::new()
        }
    };

    let mut evaluated = Vec::with_capacity(listed.len());
    for opportunity in listed {
        let outcome = if assist {
            match assisted_qualification(llm, &opportunity, criteria).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::warn!(
                        opportunity_id = %opportunity.id.0,
                        error = %err,
                        "llm qualification failed, falling back to the rule-based qualifier"
                    );
                    degraded = true;
                    qualifier.qualify(&opportunity, criteria, today)
                }
            }
        } else {
            qualifier.qualify(&opportunity, criteria, today)
        };
        evaluated.push((opportunity, outcome));
    }

    state.opportunities = prioritize(evaluated, today);
    state.selected = None;
    state.technical = None;
    state.pricing = None;
    state.final_summary = None;
    state.report = None;
    state.stage = if state.opportunities.is_empty() {
        WorkflowStage::Scanning
    } else {
        WorkflowStage::AwaitingSelection
    };
    state.waiting_for_user = true;

    Ok(StageReport { reply: Some(scan_reply(state)), degraded })
}

/// Pin the selected opportunity by its position in the ranked list and reset
/// any analysis carried over from a previous selection.
pub fn apply_selection(state: &mut SessionState, index: usize) -> Result<(), DomainError> {
    let ranked = state.opportunities.get(index).cloned().ok_or_else(|| {
        DomainError::Selection(format!(
            "position {} is out of range for {} ranked tenders",
            index + 1,
            state.opportunities.len()
        ))
    })?;

    state.selected = Some(ranked);
    state.technical = None;
    state.pricing = None;
    state.final_summary = None;
    state.report = None;
    Ok(())
}

/// Match the selected tender against the product catalog, per line item and
/// for the tender description as a whole. A missing catalog degrades to an
/// empty match set.
pub async fn technical_stage(
    state: &mut SessionState,
    catalog: &dyn CatalogStore,
    matcher: &dyn MatchEngine,
) -> Result<StageReport, ApplicationError> {
    let selected = state.selected.clone().ok_or(DomainError::NoSelection)?;

    let mut degraded = false;
    let products = match catalog.list_products().await {
        Ok(products) => products,
        Err(err) => {
            tracing::warn!(error = %err, "product catalog unavailable, matching against nothing");
            degraded = true;
            Vec::new()
        }
    };

    let recommended_products =
        matcher.match_products(&selected.opportunity.description, &products);
    let line_analyses = selected
        .opportunity
        .line_items
        .iter()
        .map(|item| LineItemAnalysis {
            description: item.description.clone(),
            matches: matcher.match_products(&item.description, &products),
        })
        .collect();

    state.technical = Some(TechnicalAnalysis { line_analyses, recommended_products });
    Ok(StageReport { reply: None, degraded })
}

/// Price the selected tender from the technical recommendation. A missing
/// price table degrades to a testing cost of zero.
pub async fn pricing_stage(
    state: &mut SessionState,
    catalog: &dyn CatalogStore,
    pricing: &dyn PricingEngine,
    settings: &PricingSettings,
) -> Result<StageReport, ApplicationError> {
    let selected = state.selected.clone().ok_or(DomainError::NoSelection)?;
    let technical = state.technical.clone().ok_or_else(|| {
        DomainError::DataUnavailable(
            "technical analysis has not run for the selected tender".to_owned(),
        )
    })?;

    let mut degraded = false;
    let price_table = match catalog.test_price_table().await {
        Ok(table) => table,
        Err(err) => {
            tracing::warn!(error = %err, "test price table unavailable, pricing without tests");
            degraded = true;
            BTreeMap::new()
        }
    };

    let top_product = technical.recommended_products.first().map(|result| &result.product);
    let analysis =
        pricing.price(&selected.opportunity.description, top_product, &price_table, settings);

    state.pricing = Some(analysis);
    Ok(StageReport { reply: None, degraded })
}

/// Compile the response package. The executive summary comes from the model
/// under a strict plain-text contract; with the no-op client a deterministic
/// template is used instead. Any other model failure is fatal for the turn.
pub async fn compile_stage(
    state: &mut SessionState,
    llm: &dyn LlmClient,
) -> Result<StageReport, ApplicationError> {
    let selected = state.selected.clone().ok_or(DomainError::NoSelection)?;
    let technical = state.technical.clone().ok_or_else(|| {
        DomainError::DataUnavailable(
            "technical analysis has not run for the selected tender".to_owned(),
        )
    })?;
    let pricing = state.pricing.clone().ok_or_else(|| {
        DomainError::DataUnavailable(
            "pricing analysis has not run for the selected tender".to_owned(),
        )
    })?;

    let summary = match llm.complete(&summary_prompt(&selected, &technical, &pricing)).await {
        Ok(raw) => validate_summary(&raw)?,
        Err(LlmError::Disabled) => templated_summary(&selected, &technical, &pricing),
        Err(err) => return Err(DomainError::Generation(err.to_string()).into()),
    };

    let report = ReportRef::derive(&state.id, &selected.opportunity.id);
    state.final_summary = Some(summary.clone());
    state.report = Some(report.clone());
    state.stage = WorkflowStage::Complete;
    state.waiting_for_user = true;

    Ok(StageReport {
        reply: Some(compile_reply(&selected, &pricing, &summary, &report)),
        degraded: false,
    })
}

async fn assisted_qualification(
    llm: &dyn LlmClient,
    opportunity: &Opportunity,
    criteria: &QualificationCriteria,
) -> Result<QualificationOutcome, DomainError> {
    let prompt = qualification_prompt(opportunity, criteria);
    let raw =
        llm.complete(&prompt).await.map_err(|err| DomainError::Generation(err.to_string()))?;
    let assist = parse_qualification_assist(&raw)?;

    Ok(QualificationOutcome {
        qualified: assist.qualified,
        score: assist.score,
        reasons: assist.reasons,
    })
}

fn qualification_prompt(opportunity: &Opportunity, criteria: &QualificationCriteria) -> String {
    format!(
        "Evaluate this tender against the qualification criteria.\n\
         Tender {}: {} | client {} | estimated value {} | deadline {} | location {}\n\
         Criteria: minimum value {}, preferred locations [{}], minimum days remaining {}.\n\
         Respond with exactly one JSON object and nothing else: \
         {{\"qualified\": <bool>, \"score\": <integer 0-100>, \"reasons\": [<strings>]}}",
        opportunity.id.0,
        opportunity.title,
        opportunity.client,
        opportunity.estimated_value,
        opportunity.submission_deadline,
        opportunity.location,
        criteria.minimum_value,
        criteria.preferred_locations.join(", "),
        criteria.minimum_days_remaining,
    )
}

fn summary_prompt(
    selected: &RankedOpportunity,
    technical: &TechnicalAnalysis,
    pricing: &PricingAnalysis,
) -> String {
    let top_match = technical
        .recommended_products
        .first()
        .map(|result| format!("{} ({}% match)", result.product.name, result.match_pct))
        .unwrap_or_else(|| "no catalog product matched".to_owned());

    format!(
        "Tender {} from {}: {}.\n\
         Qualification score: {}/100.\n\
         Best product match: {}.\n\
         Estimated grand total: {} {}.\n\n\
         Provide a 2-3 sentence executive summary with a recommendation \
         (proceed/review/decline).",
        selected.opportunity.id.0,
        selected.opportunity.client,
        selected.opportunity.title,
        selected.qualification.score,
        top_match,
        pricing.currency,
        pricing.breakdown.grand_total,
    )
}

fn templated_summary(
    selected: &RankedOpportunity,
    technical: &TechnicalAnalysis,
    pricing: &PricingAnalysis,
) -> String {
    let top = technical.recommended_products.first();
    let recommendation = if !selected.qualification.qualified {
        "decline"
    } else if top.map(|result| result.match_pct >= Decimal::new(50, 0)).unwrap_or(false) {
        "proceed"
    } else {
        "review"
    };

    match top {
        Some(result) => format!(
            "{} tender {} scores {}/100 and is best served by {} at a {}% technical match. \
             The estimated response value is {} {}. Recommendation: {}.",
            selected.opportunity.client,
            selected.opportunity.id.0,
            selected.qualification.score,
            result.product.name,
            result.match_pct,
            pricing.currency,
            pricing.breakdown.grand_total,
            recommendation,
        ),
        None => format!(
            "{} tender {} scores {}/100 but no catalog product matches its requirements. \
             The estimated response value is {} {}. Recommendation: {}.",
            selected.opportunity.client,
            selected.opportunity.id.0,
            selected.qualification.score,
            pricing.currency,
            pricing.breakdown.grand_total,
            recommendation,
        ),
    }
}

fn scan_reply(state: &SessionState) -> String {
    if state.opportunities.is_empty() {
        return "No open tenders were found. Ask me to scan again once new tenders are ingested."
            .to_owned();
    }

    let shown = state.opportunities.len().min(TOP_PRESENTED);
    let mut reply = format!(
        "Found {} open tenders. Showing the top {} by priority:\n",
        state.opportunities.len(),
        shown
    );
    for (position, ranked) in state.opportunities.iter().take(TOP_PRESENTED).enumerate() {
        let verdict = if ranked.qualification.qualified { "qualified" } else { "not qualified" };
        reply.push_str(&format!(
            "{}. {} | {} | {} | value {} | due {} ({} days) | score {}/100, {}\n",
            position + 1,
            ranked.opportunity.id.0,
            ranked.opportunity.title,
            ranked.opportunity.client,
            ranked.opportunity.estimated_value,
            ranked.opportunity.submission_deadline,
            ranked.days_remaining,
            ranked.qualification.score,
            verdict,
        ));
    }
    reply.push_str("Reply with `select <number>` or the RFP ID to analyze one.");
    reply
}

fn compile_reply(
    selected: &RankedOpportunity,
    pricing: &PricingAnalysis,
    summary: &str,
    report: &ReportRef,
) -> String {
    let tests = if pricing.recommended_tests.is_empty() {
        "none".to_owned()
    } else {
        pricing.recommended_tests.join(", ")
    };
    let breakdown = &pricing.breakdown;

    format!(
        "Analysis complete for {} ({}).\n\n\
         Executive summary:\n{}\n\n\
         Recommended tests: {}\n\
         Cost breakdown ({}): material {}, testing {}, subtotal {}, overhead {}, \
         contingency {}, grand total {}\n\
         Report: {}",
        selected.opportunity.id.0,
        selected.opportunity.title,
        summary,
        tests,
        pricing.currency,
        breakdown.material_cost,
        breakdown.testing_cost,
        breakdown.subtotal,
        breakdown.overhead_cost,
        breakdown.contingency_cost,
        breakdown.grand_total,
        report.path,
    )
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate, Utc};
    use rust_decimal::Decimal;

    use tenderflow_core::domain::opportunity::{LineItem, RawOpportunityRecord};
    use tenderflow_core::domain::product::{Product, ProductAttributes, ProductId};
    use tenderflow_core::domain::session::{SessionId, SessionState, WorkflowStage};
    use tenderflow_core::errors::{ApplicationError, DomainError};
    use tenderflow_core::rfp::pricing::PricingSettings;
    use tenderflow_core::rfp::qualify::QualificationCriteria;
    use tenderflow_core::rfp::{DeterministicMatcher, DeterministicPricing, RuleBasedQualifier};
    use tenderflow_db::{
        CatalogStore, InMemoryCatalogStore, InMemoryOpportunityStore, OpportunityStore,
    };

    use crate::llm::{LlmClient, LlmError, NoopLlmClient};

    use super::{
        apply_selection, compile_stage, pricing_stage, qualify_stage, technical_stage,
    };

    struct CannedLlm(String);

    #[async_trait]
    impl LlmClient for CannedLlm {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            Ok(self.0.clone())
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            Err(LlmError::Transport("connection refused".to_owned()))
        }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    fn record(id: &str, value: i64, days_out: i64) -> RawOpportunityRecord {
        RawOpportunityRecord {
            id: Some(id.to_owned()),
            rfp_id: None,
            title: format!("{id} cable supply"),
            client: "Metro Rail Corp".to_owned(),
            description: "11 kV XLPE 3 core 300 sqmm aluminium underground power cable"
                .to_owned(),
            estimated_value: Decimal::new(value, 0),
            submission_deadline: today() + Duration::days(days_out),
            location: "Delhi".to_owned(),
            line_items: vec![LineItem {
                description: "11 kV XLPE 3 core 300 sqmm aluminium cable, 50 km".to_owned(),
                quantity: 50,
            }],
        }
    }

    fn product() -> Product {
        Product {
            id: ProductId("CAB-XLPE-11K-3C300".to_owned()),
            name: "11 kV XLPE 3C 300 sqmm Al".to_owned(),
            price_per_km: Decimal::new(95_000, 0),
            attributes: ProductAttributes {
                voltage_grade: Some("11 kV".to_owned()),
                insulation: Some("XLPE".to_owned()),
                cores: Some(3),
                conductor_size_sqmm: Some(Decimal::new(300, 0)),
                conductor_material: Some("Aluminium".to_owned()),
                armoured: None,
                cable_type: Some("Power".to_owned()),
                application: Some("Underground".to_owned()),
            },
        }
    }

    async fn seeded_catalog() -> InMemoryCatalogStore {
        let catalog = InMemoryCatalogStore::default();
        catalog.save_product(&product()).await.expect("product");
        for (name, price) in [
            ("High Voltage Test", 5_000),
            ("Impulse Voltage Test", 7_500),
            ("Water Penetration Test", 3_000),
            ("Mechanical Test", 2_500),
            ("Partial Discharge Test", 4_000),
        ] {
            catalog.save_test_price(name, Decimal::new(price, 0)).await.expect("price");
        }
        catalog
    }

    async fn analyzed_state() -> (SessionState, InMemoryCatalogStore) {
        let opportunities = InMemoryOpportunityStore::default();
        opportunities.ingest(record("TOT-1", 1_500_000, 60)).await.expect("ingest");

        let mut state = SessionState::new(SessionId("sess-1".to_owned()));
        qualify_stage(
            &mut state,
            &opportunities,
            &RuleBasedQualifier,
            &NoopLlmClient,
            false,
            &QualificationCriteria::default(),
            today(),
        )
        .await
        .expect("qualify");
        apply_selection(&mut state, 0).expect("select");

        let catalog = seeded_catalog().await;
        technical_stage(&mut state, &catalog, &DeterministicMatcher).await.expect("technical");
        pricing_stage(&mut state, &catalog, &DeterministicPricing, &PricingSettings::default())
            .await
            .expect("pricing");
        (state, catalog)
    }

    #[tokio::test]
    async fn qualification_ranks_and_presents_the_scan() {
        let opportunities = InMemoryOpportunityStore::default();
        opportunities.ingest(record("TOT-1", 1_500_000, 60)).await.expect("ingest");
        opportunities.ingest(record("TOT-2", 600_000, 20)).await.expect("ingest");

        let mut state = SessionState::new(SessionId("sess-1".to_owned()));
        let report = qualify_stage(
            &mut state,
            &opportunities,
            &RuleBasedQualifier,
            &NoopLlmClient,
            false,
            &QualificationCriteria::default(),
            today(),
        )
        .await
        .expect("qualify");

        assert_eq!(state.opportunities.len(), 2);
        assert_eq!(state.stage, WorkflowStage::AwaitingSelection);
        assert!(state.waiting_for_user);
        assert!(!report.degraded);
        let reply = report.reply.expect("reply");
        assert!(reply.contains("TOT-1"));
        assert!(reply.contains("TOT-2"));
    }

    #[tokio::test]
    async fn empty_scan_degrades_to_a_message_instead_of_an_error() {
        let opportunities = InMemoryOpportunityStore::default();
        let mut state = SessionState::new(SessionId("sess-1".to_owned()));

        let report = qualify_stage(
            &mut state,
            &opportunities,
            &RuleBasedQualifier,
            &NoopLlmClient,
            false,
            &QualificationCriteria::default(),
            today(),
        )
        .await
        .expect("qualify");

        assert!(state.opportunities.is_empty());
        assert_eq!(state.stage, WorkflowStage::Scanning);
        assert!(report.reply.expect("reply").contains("No open tenders"));
    }

    #[tokio::test]
    async fn assisted_qualification_uses_the_model_verdict() {
        let opportunities = InMemoryOpportunityStore::default();
        opportunities.ingest(record("TOT-1", 1_500_000, 60)).await.expect("ingest");

        let llm = CannedLlm(
            r#"{"qualified": false, "score": 10, "reasons": ["capacity conflict"]}"#.to_owned(),
        );
        let mut state = SessionState::new(SessionId("sess-1".to_owned()));
        let report = qualify_stage(
            &mut state,
            &opportunities,
            &RuleBasedQualifier,
            &llm,
            true,
            &QualificationCriteria::default(),
            today(),
        )
        .await
        .expect("qualify");

        assert!(!report.degraded);
        assert_eq!(state.opportunities[0].qualification.score, 10);
        assert!(!state.opportunities[0].qualification.qualified);
    }

    #[tokio::test]
    async fn assisted_qualification_falls_back_to_rules_on_model_failure() {
        let opportunities = InMemoryOpportunityStore::default();
        opportunities.ingest(record("TOT-1", 1_500_000, 60)).await.expect("ingest");

        let mut state = SessionState::new(SessionId("sess-1".to_owned()));
        let report = qualify_stage(
            &mut state,
            &opportunities,
            &RuleBasedQualifier,
            &FailingLlm,
            true,
            &QualificationCriteria::default(),
            today(),
        )
        .await
        .expect("qualify");

        assert!(report.degraded);
        assert_eq!(state.opportunities[0].qualification.score, 100);
        assert!(state.opportunities[0].qualification.qualified);
    }

    #[tokio::test]
    async fn selection_out_of_range_is_a_selection_error() {
        let mut state = SessionState::new(SessionId("sess-1".to_owned()));
        let err = apply_selection(&mut state, 3).expect_err("out of range");
        assert!(matches!(err, DomainError::Selection(_)));
    }

    #[tokio::test]
    async fn technical_stage_requires_a_selection() {
        let catalog = InMemoryCatalogStore::default();
        let mut state = SessionState::new(SessionId("sess-1".to_owned()));

        let err = technical_stage(&mut state, &catalog, &DeterministicMatcher)
            .await
            .expect_err("no selection");
        assert!(matches!(err, ApplicationError::Domain(DomainError::NoSelection)));
    }

    #[tokio::test]
    async fn technical_and_pricing_stages_fill_the_analysis_records() {
        let (state, _catalog) = analyzed_state().await;

        let technical = state.technical.expect("technical");
        assert!(!technical.recommended_products.is_empty());
        assert_eq!(technical.line_analyses.len(), 1);

        let pricing = state.pricing.expect("pricing");
        assert_eq!(pricing.breakdown.material_cost, Decimal::new(9_500_000, 2));
        assert!(pricing.recommended_tests.contains(&"High Voltage Test".to_owned()));
        assert!(pricing.recommended_tests.contains(&"Water Penetration Test".to_owned()));
    }

    #[tokio::test]
    async fn compile_with_the_noop_client_uses_the_template() {
        let (mut state, _catalog) = analyzed_state().await;

        let report = compile_stage(&mut state, &NoopLlmClient).await.expect("compile");

        assert_eq!(state.stage, WorkflowStage::Complete);
        let summary = state.final_summary.expect("summary");
        assert!(summary.contains("Recommendation: proceed"));
        let reference = state.report.expect("report");
        assert_eq!(reference.report_id, "sess-1_TOT-1");
        assert_eq!(reference.path, "/api/reports/sess-1/TOT-1");
        assert!(report.reply.expect("reply").contains("/api/reports/sess-1/TOT-1"));
    }

    #[tokio::test]
    async fn compile_accepts_a_model_summary_under_the_plain_text_contract() {
        let (mut state, _catalog) = analyzed_state().await;
        let llm = CannedLlm("  Strong fit, healthy margin. Recommendation: proceed.  ".to_owned());

        compile_stage(&mut state, &llm).await.expect("compile");

        assert_eq!(
            state.final_summary.as_deref(),
            Some("Strong fit, healthy margin. Recommendation: proceed.")
        );
    }

    #[tokio::test]
    async fn compile_failure_is_fatal_and_leaves_the_snapshot_unfinished() {
        let (mut state, _catalog) = analyzed_state().await;

        let err = compile_stage(&mut state, &FailingLlm).await.expect_err("generation");

        assert!(matches!(err, ApplicationError::Domain(DomainError::Generation(_))));
        assert!(state.final_summary.is_none());
        assert!(state.report.is_none());
    }
}
