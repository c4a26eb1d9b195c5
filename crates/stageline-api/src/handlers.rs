//! REST API handlers.
//!
//! Each handler calls into `PromotionEngine` and returns JSON responses.
//! Promote and rollback also send the operator notification for the
//! request; the confirmation watcher sends a second one later.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::debug;

use stageline_gitops::SetOutcome;
use stageline_observer::ObserverError;
use stageline_promote::{
    ChangeKind, NotifyContext, PromoteError, PromoteResult, PromotionOutcome,
};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// HTTP status for a failed request.
pub fn error_status(err: &PromoteError) -> StatusCode {
    match err {
        PromoteError::Pipeline(_) => StatusCode::BAD_REQUEST,
        PromoteError::Observer(ObserverError::LabelNotFoundAnywhere(_)) => StatusCode::NOT_FOUND,
        PromoteError::Observer(_) => StatusCode::SERVICE_UNAVAILABLE,
        PromoteError::LabelNotFound { .. }
        | PromoteError::LabelNotFoundInSource { .. }
        | PromoteError::NoPriorVersion { .. } => StatusCode::NOT_FOUND,
        PromoteError::AlreadyCurrent { .. } => StatusCode::OK,
        PromoteError::ExternalMutationFailed { .. } => StatusCode::BAD_GATEWAY,
        PromoteError::HistoryNotRecorded { .. } | PromoteError::History(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        PromoteError::PromotionInProgress { .. } => StatusCode::CONFLICT,
    }
}

fn promote_error(err: &PromoteError) -> axum::response::Response {
    error_response(&err.to_string(), error_status(err)).into_response()
}

// ── Reads ──────────────────────────────────────────────────────

/// GET /api/v1/pipeline
pub async fn get_pipeline(State(state): State<ApiState>) -> impl IntoResponse {
    let pipeline = state.engine.pipeline();
    ApiResponse::ok(serde_json::json!({
        "stages": pipeline.stages(),
        "promotable": pipeline.promotable(),
    }))
}

/// GET /api/v1/namespaces/:namespace/workloads
pub async fn list_workloads(
    State(state): State<ApiState>,
    Path(namespace): Path<String>,
) -> impl IntoResponse {
    match state.engine.list(&namespace).await {
        Ok(instances) => ApiResponse::ok(instances).into_response(),
        Err(e) => promote_error(&e),
    }
}

/// GET /api/v1/namespaces/:namespace/history/:label
pub async fn get_history(
    State(state): State<ApiState>,
    Path((namespace, label)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.engine.history(&namespace, &label) {
        Ok(entries) => ApiResponse::ok(entries).into_response(),
        Err(e) => promote_error(&e),
    }
}

/// GET /api/v1/workloads/:label/drift
pub async fn get_drift(
    State(state): State<ApiState>,
    Path(label): Path<String>,
) -> impl IntoResponse {
    match state.engine.drift(&label).await {
        Ok(report) => {
            let summary = report.summary();
            ApiResponse::ok(serde_json::json!({
                "report": report,
                "summary": summary,
            }))
            .into_response()
        }
        Err(e) => promote_error(&e),
    }
}

// ── Changes ────────────────────────────────────────────────────

/// Promote/rollback request body.
#[derive(Deserialize)]
pub struct ChangeRequest {
    pub namespace: String,
    pub label: String,
    #[serde(default)]
    pub initiator: Option<String>,
}

impl ChangeRequest {
    fn context(&self, command: &str) -> NotifyContext {
        NotifyContext::new(
            format!("/{command} {} {}", self.namespace, self.label),
            self.initiator.as_deref().unwrap_or("api"),
        )
    }
}

#[derive(Serialize)]
struct ChangeResponse {
    status: &'static str,
    kind: &'static str,
    namespace: String,
    label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_namespace: Option<String>,
    previous_version: String,
    version: String,
    committed: bool,
    message: String,
}

impl From<PromotionOutcome> for ChangeResponse {
    fn from(outcome: PromotionOutcome) -> Self {
        // Dropping the handle leaves the watcher running.
        Self {
            status: "initiated",
            kind: match outcome.kind {
                ChangeKind::Promote => "promote",
                ChangeKind::Rollback => "rollback",
            },
            namespace: outcome.namespace,
            label: outcome.label,
            source_namespace: outcome.source_namespace,
            previous_version: outcome.previous_version,
            version: outcome.version,
            committed: outcome.set_outcome == SetOutcome::Committed,
            message: outcome.message,
        }
    }
}

fn change_response(result: PromoteResult<PromotionOutcome>) -> axum::response::Response {
    match result {
        Ok(outcome) => ApiResponse::ok(ChangeResponse::from(outcome)).into_response(),
        Err(e) if e.is_noop() => ApiResponse::ok(serde_json::json!({
            "status": "noop",
            "message": e.to_string(),
        }))
        .into_response(),
        Err(e) => promote_error(&e),
    }
}

/// POST /api/v1/promote
pub async fn promote(
    State(state): State<ApiState>,
    Json(req): Json<ChangeRequest>,
) -> impl IntoResponse {
    let context = req.context("promote");
    debug!(namespace = %req.namespace, label = %req.label, initiator = %context.initiator, "promote requested");
    let result = state.engine.promote(&req.namespace, &req.label, &context).await;
    state.engine.report(&context, &result).await;
    change_response(result)
}

/// POST /api/v1/rollback
pub async fn rollback(
    State(state): State<ApiState>,
    Json(req): Json<ChangeRequest>,
) -> impl IntoResponse {
    let context = req.context("rollback");
    debug!(namespace = %req.namespace, label = %req.label, initiator = %context.initiator, "rollback requested");
    let result = state.engine.rollback(&req.namespace, &req.label, &context).await;
    state.engine.report(&context, &result).await;
    change_response(result)
}
