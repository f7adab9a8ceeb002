use serde::{Deserialize, Serialize};

use crate::domain::session::WorkflowStage;

/// Work the runtime should carry out after a routing decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Qualify,
    Technical,
    Pricing,
    Compile,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum RouteDirective {
    /// Dispatch the named stage handler in this turn.
    Continue(StageKind),
    /// Stop the turn and reply with the given prompt.
    AwaitUser(String),
    Done,
}

/// One routing decision, produced without mutating session state. `to` equals
/// `from` whenever the turn ends in a clarification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub from: WorkflowStage,
    pub to: WorkflowStage,
    pub directive: RouteDirective,
    pub selected_index: Option<usize>,
}
