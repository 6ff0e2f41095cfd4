//! # Run API Handlers
//!
//! This module contains the worker-facing endpoints that transition run
//! ledger rows. The worker runtime calls `started` when it picks a job up
//! (re-validating the execution grant, so a revocation between enqueue and
//! pickup stops execution) and `completed` with the terminal outcome.

use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::{ApiError, SchedulerError, validation_error};
use crate::models::schedule_run::{self, RunStatus};
use crate::server::AppState;

/// Run response payload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RunInfo {
    /// Run identifier; doubles as the job correlation ID
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: String,
    /// Schedule this run belongs to
    pub schedule_id: String,
    /// Trigger instant this run corresponds to (RFC3339)
    #[schema(example = "2026-02-11T14:00:00+00:00")]
    pub scheduled_for: String,
    /// Current status
    #[schema(example = "pending")]
    pub status: String,
    /// Timestamp the worker picked the run up
    pub started_at: Option<String>,
    /// Timestamp the run reached a terminal status
    pub completed_at: Option<String>,
    /// Failure or skip detail
    pub error_message: Option<String>,
    /// Timestamp the run row was created
    pub created_at: String,
}

impl From<schedule_run::Model> for RunInfo {
    fn from(model: schedule_run::Model) -> Self {
        Self {
            id: model.id.to_string(),
            schedule_id: model.schedule_id.to_string(),
            scheduled_for: model.scheduled_for.to_rfc3339(),
            status: model.status,
            started_at: model.started_at.map(|dt| dt.to_rfc3339()),
            completed_at: model.completed_at.map(|dt| dt.to_rfc3339()),
            error_message: model.error_message,
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

/// Terminal outcomes a worker may report
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcomeParam {
    Success,
    Error,
    Skipped,
}

impl From<RunOutcomeParam> for RunStatus {
    fn from(param: RunOutcomeParam) -> Self {
        match param {
            RunOutcomeParam::Success => RunStatus::Success,
            RunOutcomeParam::Error => RunStatus::Error,
            RunOutcomeParam::Skipped => RunStatus::Skipped,
        }
    }
}

/// Request body for completing a run
#[derive(Debug, Deserialize, ToSchema)]
pub struct CompleteRunBody {
    /// Terminal status of the run
    pub status: RunOutcomeParam,
    /// Failure or skip detail; rejected on success
    pub error_message: Option<String>,
}

fn parse_run_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse::<Uuid>().map_err(|_| {
        validation_error(
            "Invalid run ID",
            serde_json::json!({ "run_id": "Must be a valid UUID" }),
        )
    })
}

/// Worker reports a run as picked up
#[utoipa::path(
    post,
    path = "/api/v1/runs/{run_id}/started",
    params(("run_id" = String, Path, description = "Run identifier")),
    responses(
        (status = 200, description = "Run marked started", body = RunInfo),
        (status = 403, description = "Execution grant no longer usable", body = ApiError),
        (status = 404, description = "No such run", body = ApiError),
        (status = 409, description = "Run is not pending", body = ApiError)
    ),
    tag = "runs"
)]
pub async fn mark_run_started(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    Path(run_id): Path<String>,
) -> Result<Json<RunInfo>, ApiError> {
    let run_id = parse_run_id(&run_id)?;

    let run = state
        .runs
        .find_by_id(run_id)
        .await?
        .ok_or(SchedulerError::RunNotFound { run_id })?;

    let schedule = state
        .schedules
        .get_schedule(run.schedule_id)
        .await?
        .ok_or(SchedulerError::ScheduleNotFound {
            schedule_id: run.schedule_id,
        })?;

    // A grant revoked between enqueue and pickup must stop execution here.
    state
        .grants
        .validate_for_graph(schedule.execution_grant_id, &schedule.graph_id, Utc::now())
        .await?;

    let run = state.runs.mark_started(run_id).await?;

    tracing::info!(run_id = %run_id, schedule_id = %run.schedule_id, "Run started");

    Ok(Json(run.into()))
}

/// Worker reports a run's terminal outcome
#[utoipa::path(
    post,
    path = "/api/v1/runs/{run_id}/completed",
    request_body = CompleteRunBody,
    params(("run_id" = String, Path, description = "Run identifier")),
    responses(
        (status = 200, description = "Run completed", body = RunInfo),
        (status = 404, description = "No such run", body = ApiError),
        (status = 409, description = "Run already terminal", body = ApiError)
    ),
    tag = "runs"
)]
pub async fn mark_run_completed(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    Path(run_id): Path<String>,
    Json(body): Json<CompleteRunBody>,
) -> Result<Json<RunInfo>, ApiError> {
    let run_id = parse_run_id(&run_id)?;
    let status: RunStatus = body.status.into();

    if status == RunStatus::Success && body.error_message.is_some() {
        return Err(validation_error(
            "Validation failed",
            serde_json::json!({ "error_message": "must be absent on success" }),
        ));
    }

    let run = state
        .runs
        .mark_completed(run_id, status, body.error_message)
        .await?;

    tracing::info!(
        run_id = %run_id,
        schedule_id = %run.schedule_id,
        status = %run.status,
        "Run completed"
    );

    Ok(Json(run.into()))
}
