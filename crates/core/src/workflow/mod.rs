pub mod classifier;
pub mod router;
pub mod states;

pub use classifier::{classify, parse_selection_token, Intent};
pub use router::{decide, decide_with_audit, GENERIC_CLARIFICATION, SELECTION_CLARIFICATION};
pub use states::{RouteDecision, RouteDirective, StageKind};
