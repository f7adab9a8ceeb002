use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::session::{SessionState, WorkflowStage};
use crate::workflow::classifier::{classify, parse_selection_token, Intent};
use crate::workflow::states::{RouteDecision, RouteDirective, StageKind};

pub const SELECTION_CLARIFICATION: &str =
    "Please specify which RFP you'd like to select. Use the RFP number (1, 2, 3) or the RFP ID.";

pub const GENERIC_CLARIFICATION: &str =
    "I can help you scan for RFPs or analyze a selected one. What would you like to do?";

/// Route one user turn. Pure over the session snapshot and the message; the
/// caller applies the resulting stage transition and dispatch.
///
/// Rules are checked in order:
/// 1. a fully analyzed selection without a final summary compiles,
/// 2. a selection utterance against a presented list resolves or clarifies,
/// 3. a scan request, or any turn with nothing presented yet, scans,
/// 4. everything else asks the user what to do.
pub fn decide(state: &SessionState, message: &str) -> RouteDecision {
    let from = state.stage;

    if state.selected.is_some()
        && state.technical.is_some()
        && state.pricing.is_some()
        && state.final_summary.is_none()
    {
        return RouteDecision {
            from,
            to: WorkflowStage::Compiling,
            directive: RouteDirective::Continue(StageKind::Compile),
            selected_index: None,
        };
    }

    let intent = classify(message, &state.opportunities);

    if !state.opportunities.is_empty() && intent == Intent::Selection {
        return match parse_selection_token(message, &state.opportunities) {
            Ok(position) => RouteDecision {
                from,
                to: WorkflowStage::Analyzing,
                directive: RouteDirective::Continue(StageKind::Technical),
                selected_index: Some(position),
            },
            Err(_) => RouteDecision {
                from,
                to: from,
                directive: RouteDirective::AwaitUser(SELECTION_CLARIFICATION.to_owned()),
                selected_index: None,
            },
        };
    }

    if intent == Intent::Scan || state.opportunities.is_empty() {
        return RouteDecision {
            from,
            to: WorkflowStage::Scanning,
            directive: RouteDirective::Continue(StageKind::Qualify),
            selected_index: None,
        };
    }

    RouteDecision {
        from,
        to: from,
        directive: RouteDirective::AwaitUser(GENERIC_CLARIFICATION.to_owned()),
        selected_index: None,
    }
}

pub fn decide_with_audit(
    state: &SessionState,
    message: &str,
    context: &AuditContext,
    sink: &dyn AuditSink,
) -> RouteDecision {
    let decision = decide(state, message);

    let outcome = match decision.directive {
        RouteDirective::Continue(_) | RouteDirective::Done => AuditOutcome::Success,
        RouteDirective::AwaitUser(_) => AuditOutcome::Rejected,
    };
    let directive_kind = match &decision.directive {
        RouteDirective::Continue(stage) => format!("continue:{stage:?}"),
        RouteDirective::AwaitUser(_) => "await_user".to_owned(),
        RouteDirective::Done => "done".to_owned(),
    };

    sink.emit(
        AuditEvent::new(
            context.session_id.clone(),
            context.correlation_id.clone(),
            "workflow.route_decided",
            AuditCategory::Routing,
            context.actor.clone(),
            outcome,
        )
        .with_metadata("from", decision.from.as_str())
        .with_metadata("to", decision.to.as_str())
        .with_metadata("directive", directive_kind),
    );

    decision
}
