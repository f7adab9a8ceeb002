//! JSON API routes.
//!
//! - `POST /api/chat`: one chat turn, `{session_id, message}` in, reply plus
//!   a workflow summary out. A fatal turn keeps the contract shape and marks
//!   the workflow stage `error`.
//! - `GET /api/reports/{session_id}/{opportunity_id}`: the compiled response
//!   package for a finished session.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tenderflow_agent::runtime::{AgentRuntime, ChatOutcome, TurnStatus};
use tenderflow_core::domain::pricing::PricingAnalysis;
use tenderflow_core::domain::session::{ReportRef, SessionId, TechnicalAnalysis};
use tenderflow_core::errors::InterfaceError;
use tenderflow_db::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<AgentRuntime>,
    pub sessions: Arc<dyn SessionStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/reports/{session_id}/{opportunity_id}", get(report))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct WorkflowBody {
    pub stage: String,
    pub opportunities_found: usize,
    pub selected_opportunity: Option<String>,
    pub report: Option<ReportRef>,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub response: String,
    pub timestamp: String,
    pub correlation_id: String,
    pub workflow: WorkflowBody,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub report: ReportRef,
    pub opportunity_id: String,
    pub title: String,
    pub client: String,
    pub executive_summary: String,
    pub technical: TechnicalAnalysis,
    pub pricing: PricingAnalysis,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> (StatusCode, Json<ChatResponse>) {
    let session_id = SessionId(request.session_id);

    match state.runtime.handle_message(&session_id, &request.message).await {
        Ok(outcome) => (StatusCode::OK, Json(success_body(outcome))),
        Err(error) => {
            let correlation_id = Uuid::new_v4().to_string();
            let interface = error.into_interface(correlation_id.clone());
            tracing::error!(
                event_name = "chat.turn_failed",
                correlation_id = %correlation_id,
                session_id = %session_id.0,
                error = %interface,
                "chat turn failed"
            );
            (status_for(&interface), Json(failure_body(session_id, &interface, correlation_id)))
        }
    }
}

pub async fn report(
    Path((session_id, opportunity_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<ReportResponse>, (StatusCode, Json<ApiError>)> {
    let session =
        state.sessions.load(&SessionId(session_id.clone())).await.map_err(|error| {
            tracing::error!(
                event_name = "report.lookup_failed",
                session_id = %session_id,
                error = %error,
                "report lookup failed"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError { error: "report lookup failed".to_owned() }),
            )
        })?;

    let Some(session) = session else {
        return Err(not_found());
    };
    let (Some(report), Some(selected), Some(summary), Some(technical), Some(pricing)) = (
        session.report,
        session.selected,
        session.final_summary,
        session.technical,
        session.pricing,
    ) else {
        return Err(not_found());
    };
    if selected.opportunity.id.0 != opportunity_id {
        return Err(not_found());
    }

    Ok(Json(ReportResponse {
        report,
        opportunity_id,
        title: selected.opportunity.title,
        client: selected.opportunity.client,
        executive_summary: summary,
        technical,
        pricing,
    }))
}

// ---------------------------------------------------------------------------
// Mapping helpers
// ---------------------------------------------------------------------------

fn success_body(outcome: ChatOutcome) -> ChatResponse {
    ChatResponse {
        session_id: outcome.session_id.0,
        response: outcome.reply,
        timestamp: outcome.timestamp.to_rfc3339(),
        correlation_id: outcome.correlation_id,
        workflow: WorkflowBody {
            stage: outcome.workflow.stage,
            opportunities_found: outcome.workflow.opportunities_found,
            selected_opportunity: outcome.workflow.selected_opportunity,
            report: outcome.workflow.report,
            status: match outcome.workflow.status {
                TurnStatus::Ok => "ok",
                TurnStatus::Recovered => "recovered",
            },
        },
    }
}

fn failure_body(
    session_id: SessionId,
    interface: &InterfaceError,
    correlation_id: String,
) -> ChatResponse {
    ChatResponse {
        session_id: session_id.0,
        response: interface.user_message().to_owned(),
        timestamp: Utc::now().to_rfc3339(),
        correlation_id,
        workflow: WorkflowBody {
            stage: "error".to_owned(),
            opportunities_found: 0,
            selected_opportunity: None,
            report: None,
            status: "error",
        },
    }
}

fn status_for(interface: &InterfaceError) -> StatusCode {
    match interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn not_found() -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError { error: "no compiled report exists for this session and tender".to_owned() }),
    )
}
