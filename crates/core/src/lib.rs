pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod rfp;
pub mod workflow;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions};
pub use domain::matching::{CriterionVerdict, MatchResult, VerdictKind};
pub use domain::opportunity::{
    LineItem, Opportunity, OpportunityId, QualificationOutcome, RankedOpportunity,
    RawOpportunityRecord,
};
pub use domain::pricing::{PricingAnalysis, PricingBreakdown};
pub use domain::product::{Product, ProductAttributes, ProductId};
pub use domain::session::{
    ChatMessage, ChatRole, ReportRef, SessionId, SessionState, TechnicalAnalysis, WorkflowStage,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use rfp::{
    DeterministicMatcher, DeterministicPricing, MatchEngine, PricingEngine, QualifierEngine,
    RfpEngines, RuleBasedQualifier,
};
pub use workflow::{RouteDecision, RouteDirective, StageKind};
