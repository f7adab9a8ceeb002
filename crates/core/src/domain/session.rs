use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::matching::MatchResult;
use crate::domain::opportunity::{OpportunityId, RankedOpportunity};
use crate::domain::pricing::PricingAnalysis;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Scanning,
    AwaitingSelection,
    Analyzing,
    Pricing,
    Compiling,
    Complete,
    Error,
}

impl WorkflowStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scanning => "scanning",
            Self::AwaitingSelection => "awaiting_selection",
            Self::Analyzing => "analyzing",
            Self::Pricing => "pricing",
            Self::Compiling => "compiling",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItemAnalysis {
    pub description: String,
    pub matches: Vec<MatchResult>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TechnicalAnalysis {
    pub line_analyses: Vec<LineItemAnalysis>,
    pub recommended_products: Vec<MatchResult>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRef {
    pub report_id: String,
    pub path: String,
}

impl ReportRef {
    pub fn derive(session_id: &SessionId, opportunity_id: &OpportunityId) -> Self {
        Self {
            report_id: format!("{}_{}", session_id.0, opportunity_id.0),
            path: format!("/api/reports/{}/{}", session_id.0, opportunity_id.0),
        }
    }
}

/// Per-session workflow document. Owned by the session store between turns;
/// mutated only by the runtime while a single turn is in flight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub id: SessionId,
    pub stage: WorkflowStage,
    pub conversation: Vec<ChatMessage>,
    pub opportunities: Vec<RankedOpportunity>,
    pub selected: Option<RankedOpportunity>,
    pub technical: Option<TechnicalAnalysis>,
    pub pricing: Option<PricingAnalysis>,
    pub final_summary: Option<String>,
    pub report: Option<ReportRef>,
    pub waiting_for_user: bool,
}

impl SessionState {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            stage: WorkflowStage::Scanning,
            conversation: Vec::new(),
            opportunities: Vec::new(),
            selected: None,
            technical: None,
            pricing: None,
            final_summary: None,
            report: None,
            waiting_for_user: false,
        }
    }

    pub fn push_user(&mut self, text: impl Into<String>, at: DateTime<Utc>) {
        self.conversation.push(ChatMessage { role: ChatRole::User, text: text.into(), at });
    }

    pub fn push_assistant(&mut self, text: impl Into<String>, at: DateTime<Utc>) {
        self.conversation.push(ChatMessage { role: ChatRole::Assistant, text: text.into(), at });
    }
}

#[cfg(test)]
mod tests {
    use super::{ReportRef, SessionId, SessionState, WorkflowStage};
    use crate::domain::opportunity::OpportunityId;

    #[test]
    fn report_reference_derives_from_session_and_opportunity() {
        let report = ReportRef::derive(
            &SessionId("sess-7".to_owned()),
            &OpportunityId("RFP-2026-003".to_owned()),
        );

        assert_eq!(report.report_id, "sess-7_RFP-2026-003");
        assert_eq!(report.path, "/api/reports/sess-7/RFP-2026-003");
    }

    #[test]
    fn stage_tags_serialize_in_snake_case() {
        let json = serde_json::to_string(&WorkflowStage::AwaitingSelection).expect("serialize");
        assert_eq!(json, "\"awaiting_selection\"");
        assert_eq!(WorkflowStage::AwaitingSelection.as_str(), "awaiting_selection");
    }

    #[test]
    fn new_session_starts_empty_at_the_scanning_stage() {
        let state = SessionState::new(SessionId("sess-1".to_owned()));
        assert_eq!(state.stage, WorkflowStage::Scanning);
        assert!(state.conversation.is_empty());
        assert!(state.opportunities.is_empty());
        assert!(state.selected.is_none());
    }
}
