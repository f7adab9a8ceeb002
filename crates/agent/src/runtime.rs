//! Per-turn orchestration: load the session, route the message, dispatch
//! stage handlers, persist the result. One public entry point,
//! [`AgentRuntime::handle_message`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tenderflow_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use tenderflow_core::config::AppConfig;
use tenderflow_core::domain::session::{ReportRef, SessionId, SessionState, WorkflowStage};
use tenderflow_core::errors::{ApplicationError, DomainError};
use tenderflow_core::rfp::pricing::PricingSettings;
use tenderflow_core::rfp::qualify::QualificationCriteria;
use tenderflow_core::rfp::{
    DeterministicMatcher, DeterministicPricing, MatchEngine, PricingEngine, QualifierEngine,
    RfpEngines, RuleBasedQualifier,
};
use tenderflow_core::workflow::{decide_with_audit, RouteDirective, StageKind};
use tenderflow_db::{CatalogStore, OpportunityStore, SessionStore};

use crate::llm::LlmClient;
use crate::stages;

const ACTOR: &str = "agent-runtime";

/// Routing is re-run after the technical and pricing stages so a selection
/// turn flows straight into compilation. The workflow has four stages, so a
/// turn that routes more often than this is stuck.
const MAX_ROUTE_HOPS: usize = 4;

pub type EngineSet =
    RfpEngines<Box<dyn QualifierEngine>, Box<dyn MatchEngine>, Box<dyn PricingEngine>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Ok,
    Recovered,
}

/// Per-turn workflow summary echoed to the caller alongside the reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub stage: String,
    pub opportunities_found: usize,
    pub selected_opportunity: Option<String>,
    pub report: Option<ReportRef>,
    pub status: TurnStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatOutcome {
    pub session_id: SessionId,
    pub reply: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: String,
    pub workflow: WorkflowSummary,
}

#[derive(Clone, Debug)]
pub struct RuntimeOptions {
    pub criteria: QualificationCriteria,
    pub pricing: PricingSettings,
    pub assist_qualification: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            criteria: QualificationCriteria::default(),
            pricing: PricingSettings::default(),
            assist_qualification: false,
        }
    }
}

impl RuntimeOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            criteria: config.engine.criteria(),
            pricing: config.engine.pricing_settings(),
            assist_qualification: config.llm.assist_qualification,
        }
    }
}

pub struct AgentRuntime {
    sessions: Arc<dyn SessionStore>,
    opportunities: Arc<dyn OpportunityStore>,
    catalog: Arc<dyn CatalogStore>,
    audit: Arc<dyn AuditSink>,
    llm: Arc<dyn LlmClient>,
    engines: EngineSet,
    options: RuntimeOptions,
}

impl AgentRuntime {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        opportunities: Arc<dyn OpportunityStore>,
        catalog: Arc<dyn CatalogStore>,
        audit: Arc<dyn AuditSink>,
        llm: Arc<dyn LlmClient>,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            sessions,
            opportunities,
            catalog,
            audit,
            llm,
            engines: default_engines(),
            options,
        }
    }

    pub fn with_engines(mut self, engines: EngineSet) -> Self {
        self.engines = engines;
        self
    }

    /// Process one chat turn. Session state is saved only when the turn
    /// succeeds; a fatal stage error leaves the stored session exactly as the
    /// previous turn left it.
    pub async fn handle_message(
        &self,
        session_id: &SessionId,
        message: &str,
    ) -> Result<ChatOutcome, ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        tracing::info!(
            event_name = "turn.received",
            correlation_id = %correlation_id,
            session_id = %session_id.0,
            "processing chat turn"
        );

        let mut state = self
            .sessions
            .load(session_id)
            .await
            .map_err(|err| ApplicationError::Persistence(err.to_string()))?
            .unwrap_or_else(|| SessionState::new(session_id.clone()));
        state.push_user(message, started_at);

        let context = AuditContext::new(Some(session_id.clone()), correlation_id.clone(), ACTOR);
        let today = started_at.date_naive();
        let mut degraded = false;

        let mut decision = decide_with_audit(&state, message, &context, self.audit.as_ref());
        let mut hops = 0;
        let reply = loop {
            hops += 1;
            if hops > MAX_ROUTE_HOPS {
                return Err(DomainError::InvariantViolation(
                    "workflow routing did not converge".to_owned(),
                )
                .into());
            }

            match decision.directive.clone() {
                RouteDirective::AwaitUser(prompt) => {
                    state.stage = decision.to;
                    state.waiting_for_user = true;
                    break prompt;
                }
                RouteDirective::Done => {
                    state.waiting_for_user = true;
                    break "This session is already complete. Ask me to scan to start over."
                        .to_owned();
                }
                RouteDirective::Continue(StageKind::Qualify) => {
                    state.stage = WorkflowStage::Scanning;
                    tracing::info!(
                        event_name = "stage.qualify",
                        correlation_id = %correlation_id,
                        session_id = %session_id.0,
                        stage = state.stage.as_str(),
                        "scanning and qualifying tenders"
                    );
                    let report = stages::qualify_stage(
                        &mut state,
                        self.opportunities.as_ref(),
                        self.engines.qualifier.as_ref(),
                        self.llm.as_ref(),
                        self.options.assist_qualification,
                        &self.options.criteria,
                        today,
                    )
                    .await?;
                    degraded |= report.degraded;
                    break report.reply.unwrap_or_default();
                }
                RouteDirective::Continue(StageKind::Technical) => {
                    if let Some(index) = decision.selected_index {
                        stages::apply_selection(&mut state, index)?;
                    }
                    state.stage = WorkflowStage::Analyzing;
                    tracing::info!(
                        event_name = "stage.technical",
                        correlation_id = %correlation_id,
                        session_id = %session_id.0,
                        stage = state.stage.as_str(),
                        "matching the selected tender against the catalog"
                    );
                    let technical = stages::technical_stage(
                        &mut state,
                        self.catalog.as_ref(),
                        self.engines.matcher.as_ref(),
                    )
                    .await?;
                    degraded |= technical.degraded;

                    state.stage = WorkflowStage::Pricing;
                    let pricing = stages::pricing_stage(
                        &mut state,
                        self.catalog.as_ref(),
                        self.engines.pricing.as_ref(),
                        &self.options.pricing,
                    )
                    .await?;
                    degraded |= pricing.degraded;

                    decision = decide_with_audit(&state, message, &context, self.audit.as_ref());
                }
                RouteDirective::Continue(StageKind::Pricing) => {
                    state.stage = WorkflowStage::Pricing;
                    let report = stages::pricing_stage(
                        &mut state,
                        self.catalog.as_ref(),
                        self.engines.pricing.as_ref(),
                        &self.options.pricing,
                    )
                    .await?;
                    degraded |= report.degraded;

                    decision = decide_with_audit(&state, message, &context, self.audit.as_ref());
                }
                RouteDirective::Continue(StageKind::Compile) => {
                    state.stage = WorkflowStage::Compiling;
                    tracing::info!(
                        event_name = "stage.compile",
                        correlation_id = %correlation_id,
                        session_id = %session_id.0,
                        stage = state.stage.as_str(),
                        "compiling the response package"
                    );
                    match stages::compile_stage(&mut state, self.llm.as_ref()).await {
                        Ok(report) => {
                            degraded |= report.degraded;
                            break report.reply.unwrap_or_default();
                        }
                        Err(err) => {
                            self.audit.emit(
                                AuditEvent::new(
                                    Some(session_id.clone()),
                                    correlation_id.clone(),
                                    "workflow.compile_failed",
                                    AuditCategory::Compilation,
                                    ACTOR,
                                    AuditOutcome::Failed,
                                )
                                .with_metadata("error", err.to_string()),
                            );
                            tracing::error!(
                                event_name = "stage.compile_failed",
                                correlation_id = %correlation_id,
                                session_id = %session_id.0,
                                error = %err,
                                "compilation failed, stored session left untouched"
                            );
                            return Err(err);
                        }
                    }
                }
            }
        };

        state.push_assistant(&reply, Utc::now());
        self.sessions
            .save(&state)
            .await
            .map_err(|err| ApplicationError::Persistence(err.to_string()))?;

        let workflow = WorkflowSummary {
            stage: state.stage.as_str().to_owned(),
            opportunities_found: state.opportunities.len(),
            selected_opportunity: state
                .selected
                .as_ref()
                .map(|ranked| ranked.opportunity.id.0.clone()),
            report: state.report.clone(),
            status: if degraded { TurnStatus::Recovered } else { TurnStatus::Ok },
        };

        tracing::info!(
            event_name = "turn.completed",
            correlation_id = %correlation_id,
            session_id = %session_id.0,
            stage = workflow.stage.as_str(),
            "chat turn completed"
        );

        Ok(ChatOutcome {
            session_id: session_id.clone(),
            reply,
            timestamp: Utc::now(),
            correlation_id,
            workflow,
        })
    }
}

fn default_engines() -> EngineSet {
    RfpEngines::new(
        Box::new(RuleBasedQualifier),
        Box::new(DeterministicMatcher),
        Box::new(DeterministicPricing),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use tenderflow_core::audit::InMemoryAuditSink;
    use tenderflow_core::domain::opportunity::RawOpportunityRecord;
    use tenderflow_core::domain::product::{Product, ProductAttributes, ProductId};
    use tenderflow_core::domain::session::SessionId;
    use tenderflow_core::errors::{ApplicationError, DomainError};
    use tenderflow_core::workflow::{GENERIC_CLARIFICATION, SELECTION_CLARIFICATION};
    use tenderflow_db::{
        CatalogStore, InMemoryCatalogStore, InMemoryOpportunityStore, InMemorySessionStore,
        OpportunityStore, SessionStore,
    };

    use crate::llm::{LlmClient, LlmError, NoopLlmClient};

    use super::{AgentRuntime, RuntimeOptions, TurnStatus};

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            Err(LlmError::Transport("connection refused".to_owned()))
        }
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
            submission_deadline: Utc::now().date_naive() + Duration::days(days_out),
            location: "Delhi".to_owned(),
            line_items: Vec::new(),
        }
    }

    async fn seeded_stores(
    ) -> (Arc<InMemorySessionStore>, Arc<InMemoryOpportunityStore>, Arc<InMemoryCatalogStore>)
    {
        let sessions = Arc::new(InMemorySessionStore::default());
        let opportunities = Arc::new(InMemoryOpportunityStore::default());
        let catalog = Arc::new(InMemoryCatalogStore::default());

        opportunities.ingest(record("TOT-1", 1_500_000, 60)).await.expect("ingest");
        opportunities.ingest(record("TOT-2", 8_500_000, 45)).await.expect("ingest");

        catalog
            .save_product(&Product {
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
            })
            .await
            .expect("product");
        for (name, price) in [
            ("High Voltage Test", 5_000),
            ("Impulse Voltage Test", 7_500),
            ("Water Penetration Test", 3_000),
            ("Mechanical Test", 2_500),
            ("Partial Discharge Test", 4_000),
        ] {
            catalog.save_test_price(name, Decimal::new(price, 0)).await.expect("price");
        }

        (sessions, opportunities, catalog)
    }

    async fn runtime_with(llm: Arc<dyn LlmClient>) -> (AgentRuntime, Arc<InMemorySessionStore>) {
        let (sessions, opportunities, catalog) = seeded_stores().await;
        let runtime = AgentRuntime::new(
            sessions.clone(),
            opportunities,
            catalog,
            Arc::new(InMemoryAuditSink::default()),
            llm,
            RuntimeOptions::default(),
        );
        (runtime, sessions)
    }

    #[tokio::test]
    async fn scan_then_select_completes_without_a_model() {
        let (runtime, sessions) = runtime_with(Arc::new(NoopLlmClient)).await;
        let session_id = SessionId("sess-1".to_owned());

        let scan = runtime.handle_message(&session_id, "scan for tenders").await.expect("scan");
        assert_eq!(scan.workflow.stage, "awaiting_selection");
        assert_eq!(scan.workflow.opportunities_found, 2);
        assert_eq!(scan.workflow.status, TurnStatus::Ok);
        assert!(scan.reply.contains("TOT-1"));

        let select = runtime.handle_message(&session_id, "select 1").await.expect("select");
        assert_eq!(select.workflow.stage, "complete");
        assert!(select.workflow.selected_opportunity.is_some());
        let report = select.workflow.report.expect("report");
        assert!(report.path.starts_with("/api/reports/sess-1/"));
        assert!(select.reply.contains("Executive summary"));
        assert!(select.reply.contains("grand total"));

        let stored = sessions.load(&session_id).await.expect("load").expect("present");
        assert_eq!(stored.conversation.len(), 4);
        assert!(stored.final_summary.is_some());
    }

    #[tokio::test]
    async fn fresh_session_scans_for_any_message() {
        let (runtime, _sessions) = runtime_with(Arc::new(NoopLlmClient)).await;
        let outcome = runtime
            .handle_message(&SessionId("sess-1".to_owned()), "hello there")
            .await
            .expect("turn");

        assert_eq!(outcome.workflow.stage, "awaiting_selection");
        assert_eq!(outcome.workflow.opportunities_found, 2);
    }

    #[tokio::test]
    async fn unresolvable_selection_clarifies_without_losing_the_scan() {
        let (runtime, _sessions) = runtime_with(Arc::new(NoopLlmClient)).await;
        let session_id = SessionId("sess-1".to_owned());

        runtime.handle_message(&session_id, "scan for tenders").await.expect("scan");
        let outcome = runtime.handle_message(&session_id, "pick 9").await.expect("clarify");

        assert_eq!(outcome.reply, SELECTION_CLARIFICATION);
        assert_eq!(outcome.workflow.stage, "awaiting_selection");
        assert_eq!(outcome.workflow.opportunities_found, 2);
    }

    #[tokio::test]
    async fn off_topic_message_with_a_scan_present_asks_what_to_do() {
        let (runtime, _sessions) = runtime_with(Arc::new(NoopLlmClient)).await;
        let session_id = SessionId("sess-1".to_owned());

        runtime.handle_message(&session_id, "scan for tenders").await.expect("scan");
        let outcome =
            runtime.handle_message(&session_id, "what is the weather").await.expect("clarify");

        assert_eq!(outcome.reply, GENERIC_CLARIFICATION);
    }

    #[tokio::test]
    async fn compile_failure_leaves_the_stored_session_untouched() {
        let (runtime, sessions) = runtime_with(Arc::new(FailingLlm)).await;
        let session_id = SessionId("sess-1".to_owned());

        runtime.handle_message(&session_id, "scan for tenders").await.expect("scan");
        let err = runtime.handle_message(&session_id, "select 1").await.expect_err("fatal");
        assert!(matches!(err, ApplicationError::Domain(DomainError::Generation(_))));

        let stored = sessions.load(&session_id).await.expect("load").expect("present");
        assert_eq!(stored.stage.as_str(), "awaiting_selection");
        assert_eq!(stored.conversation.len(), 2);
        assert!(stored.selected.is_none());
        assert!(stored.final_summary.is_none());
        assert!(stored.report.is_none());
    }

    #[tokio::test]
    async fn completed_session_can_rescan_for_a_fresh_cycle() {
        let (runtime, _sessions) = runtime_with(Arc::new(NoopLlmClient)).await;
        let session_id = SessionId("sess-1".to_owned());

        runtime.handle_message(&session_id, "scan for tenders").await.expect("scan");
        runtime.handle_message(&session_id, "select 2").await.expect("select");
        let rescan = runtime.handle_message(&session_id, "scan again").await.expect("rescan");

        assert_eq!(rescan.workflow.stage, "awaiting_selection");
        assert!(rescan.workflow.report.is_none());
        assert!(rescan.workflow.selected_opportunity.is_none());
    }
}
