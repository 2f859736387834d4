use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use argus_core::store::Lookup;
use argus_model::{
    AccountId, CancelAck, CollectorInfo, CreditsInfo, HealthReport,
    ScanAccepted, ScanSubmission, TaskId, TaskView,
};

use crate::AppState;
use crate::errors::{ApiError, ApiResult};

/// POST /scan
///
/// Admission is all-or-nothing: a rejected submission has queued nothing
/// and charged nothing (the rate check runs before the reservation). On
/// success the task id is returned synchronously and everything else
/// happens in the worker pool.
pub async fn submit_scan_handler(
    State(state): State<AppState>,
    Extension(account_id): Extension<AccountId>,
    Json(submission): Json<ScanSubmission>,
) -> ApiResult<Json<ScanAccepted>> {
    let target = submission.target.trim();
    if target.is_empty() {
        return Err(ApiError::unprocessable("target must not be empty"));
    }

    let admitted =
        state
            .admission
            .admit(account_id, &submission.scan_type, target)?;

    Ok(Json(ScanAccepted {
        task_id: admitted.task.task_id,
        status: admitted.task.status,
        scan_type: admitted.task.scan_type,
        target: admitted.task.target,
        cost: admitted.cost,
        credits_remaining: admitted.credits_remaining,
    }))
}

/// GET /scan/{task_id}
pub async fn scan_status_handler(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<TaskView>> {
    match state.store.lookup(&TaskId::from(task_id)) {
        Lookup::Found(view) => Ok(Json(view)),
        Lookup::Expired => Err(ApiError::not_found("task result expired")
            .with_detail(serde_json::json!({ "expired": true }))),
        Lookup::NeverExisted => Err(ApiError::not_found("unknown task")),
    }
}

/// POST /scan/{task_id}/cancel
///
/// Sets the cancellation flag and fires the in-flight wrap-up signal.
/// Credits are not refunded.
pub async fn cancel_scan_handler(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<CancelAck>> {
    let task_id = TaskId::from(task_id);
    let view = state.dispatcher.cancel(&task_id)?;
    info!(task_id = %task_id, status = %view.status, "cancellation requested");
    Ok(Json(CancelAck::new(task_id)))
}

/// GET /collectors
pub async fn list_collectors_handler(
    State(state): State<AppState>,
) -> Json<Vec<CollectorInfo>> {
    Json(state.registry.list())
}

/// GET /credits
pub async fn credits_handler(
    State(state): State<AppState>,
    Extension(account_id): Extension<AccountId>,
) -> ApiResult<Json<CreditsInfo>> {
    let account = state
        .ledger
        .account(&account_id)
        .ok_or_else(|| ApiError::unauthorized("account not found"))?;

    Ok(Json(CreditsInfo {
        account_id: account.id,
        credits: account.credits,
        active: account.active,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    limit: Option<usize>,
}

/// GET /history — most recent tasks for the calling account.
pub async fn history_handler(
    State(state): State<AppState>,
    Extension(account_id): Extension<AccountId>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<TaskView>> {
    let limit = params.limit.unwrap_or(20).min(100);
    Json(state.store.history(&account_id, limit))
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "healthy".to_string(),
        workers: state.dispatcher.workers(),
        queued: state.dispatcher.queued(),
    })
}
