//! # Schedule API Handlers
//!
//! This module contains handlers for creating, listing, updating, and
//! disabling schedules, plus the per-schedule run history.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::cursor::{decode_cursor, encode_cursor};
use crate::error::{ApiError, validation_error};
use crate::handlers::runs::RunInfo;
use crate::models::schedule;
use crate::schedules::{CreateScheduleRequest, UpdateScheduleRequest};
use crate::server::AppState;

const DEFAULT_RUNS_PAGE: u64 = 50;
const MAX_RUNS_PAGE: u64 = 100;

/// Request body for creating a schedule
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateScheduleBody {
    /// Identifier of the AI graph to execute
    #[schema(example = "graph-research-digest")]
    pub graph_id: String,
    /// Opaque JSON payload handed to the graph on every run
    #[serde(default)]
    pub input: JsonValue,
    /// Standard 5-field cron expression
    #[schema(example = "0 9 * * *")]
    pub cron: String,
    /// IANA timezone the cron fields are evaluated in
    #[schema(example = "America/New_York")]
    pub timezone: String,
}

/// Request body for partially updating a schedule
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateScheduleBody {
    /// New cron expression
    pub cron: Option<String>,
    /// New IANA timezone
    pub timezone: Option<String>,
    /// Enable or disable reconciliation for this schedule
    pub enabled: Option<bool>,
    /// Replacement input payload
    pub input: Option<JsonValue>,
}

/// Schedule response payload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScheduleInfo {
    /// Unique identifier for the schedule
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: String,
    /// Opaque identity of the owning user
    pub owner_user_id: String,
    /// Billing account charged for runs
    pub billing_account_id: String,
    /// Target AI graph
    #[schema(example = "graph-research-digest")]
    pub graph_id: String,
    /// Opaque input payload
    pub input: JsonValue,
    /// Cron expression
    #[schema(example = "0 9 * * *")]
    pub cron: String,
    /// IANA timezone
    #[schema(example = "America/New_York")]
    pub timezone: String,
    /// Whether the reconciler acts on this schedule
    pub enabled: bool,
    /// Next trigger instant (RFC3339); null while disabled
    #[schema(example = "2026-02-11T14:00:00+00:00")]
    pub next_run_at: Option<String>,
    /// Trigger instant of the most recent reconciled run
    pub last_run_at: Option<String>,
    /// Execution grant backing this schedule
    pub execution_grant_id: String,
    /// Timestamp the schedule was created
    pub created_at: String,
    /// Timestamp the schedule was last updated
    pub updated_at: String,
}

impl From<schedule::Model> for ScheduleInfo {
    fn from(model: schedule::Model) -> Self {
        Self {
            id: model.id.to_string(),
            owner_user_id: model.owner_user_id,
            billing_account_id: model.billing_account_id,
            graph_id: model.graph_id,
            input: model.input,
            cron: model.cron,
            timezone: model.timezone,
            enabled: model.enabled,
            next_run_at: model.next_run_at.map(|dt| dt.to_rfc3339()),
            last_run_at: model.last_run_at.map(|dt| dt.to_rfc3339()),
            execution_grant_id: model.execution_grant_id.to_string(),
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

/// Response payload for schedule listings
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SchedulesResponse {
    /// Schedules owned by the caller
    pub schedules: Vec<ScheduleInfo>,
}

/// Acknowledgement for disable/revoke
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DisableScheduleResponse {
    /// Identifier of the disabled schedule
    pub schedule_id: String,
    /// Always false after this call
    pub enabled: bool,
}

/// Query parameters for the run-history listing
#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    /// Maximum number of runs to return (default: 50, max: 100)
    pub limit: Option<u64>,
    /// Opaque cursor for pagination
    pub cursor: Option<String>,
}

/// Response payload for the run-history listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RunsResponse {
    /// Runs for the schedule, newest first
    pub runs: Vec<RunInfo>,
    /// Opaque cursor for fetching the next page (null if no more pages)
    pub next_cursor: Option<String>,
}

fn parse_schedule_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse::<Uuid>().map_err(|_| {
        validation_error(
            "Invalid schedule ID",
            serde_json::json!({ "schedule_id": "Must be a valid UUID" }),
        )
    })
}

fn validate_create_body(body: &CreateScheduleBody) -> Result<(), ApiError> {
    let mut field_errors = serde_json::Map::new();

    if body.graph_id.trim().is_empty() {
        field_errors.insert("graph_id".into(), "must not be empty".into());
    }
    if body.cron.trim().is_empty() {
        field_errors.insert("cron".into(), "must not be empty".into());
    }
    if body.timezone.trim().is_empty() {
        field_errors.insert("timezone".into(), "must not be empty".into());
    }

    if field_errors.is_empty() {
        Ok(())
    } else {
        Err(validation_error(
            "Validation failed",
            JsonValue::Object(field_errors),
        ))
    }
}

/// Create a schedule for the calling user
#[utoipa::path(
    post,
    path = "/api/v1/schedules",
    request_body = CreateScheduleBody,
    params(crate::auth::UserHeader),
    responses(
        (status = 201, description = "Schedule created", body = ScheduleInfo),
        (status = 400, description = "Invalid cron, timezone, or body", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "schedules"
)]
pub async fn create_schedule(
    State(state): State<AppState>,
    CallerIdentity(user): CallerIdentity,
    Json(body): Json<CreateScheduleBody>,
) -> Result<(StatusCode, Json<ScheduleInfo>), ApiError> {
    validate_create_body(&body)?;

    let schedule = state
        .schedules
        .create_schedule(
            &user.0,
            // Billing accounts are keyed by owner in the upstream billing context.
            &user.0,
            CreateScheduleRequest {
                graph_id: body.graph_id,
                input: body.input,
                cron: body.cron,
                timezone: body.timezone,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(schedule.into())))
}

/// List the calling user's schedules
#[utoipa::path(
    get,
    path = "/api/v1/schedules",
    params(crate::auth::UserHeader),
    responses(
        (status = 200, description = "Schedules owned by the caller", body = SchedulesResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "schedules"
)]
pub async fn list_schedules(
    State(state): State<AppState>,
    CallerIdentity(user): CallerIdentity,
) -> Result<Json<SchedulesResponse>, ApiError> {
    let schedules = state.schedules.list_schedules(&user.0).await?;

    Ok(Json(SchedulesResponse {
        schedules: schedules.into_iter().map(ScheduleInfo::from).collect(),
    }))
}

/// Fetch one schedule owned by the caller
#[utoipa::path(
    get,
    path = "/api/v1/schedules/{schedule_id}",
    params(
        ("schedule_id" = String, Path, description = "Schedule identifier"),
        crate::auth::UserHeader
    ),
    responses(
        (status = 200, description = "The schedule", body = ScheduleInfo),
        (status = 403, description = "Not the owner", body = ApiError),
        (status = 404, description = "No such schedule", body = ApiError)
    ),
    tag = "schedules"
)]
pub async fn get_schedule(
    State(state): State<AppState>,
    CallerIdentity(user): CallerIdentity,
    Path(schedule_id): Path<String>,
) -> Result<Json<ScheduleInfo>, ApiError> {
    let schedule_id = parse_schedule_id(&schedule_id)?;
    let schedule = state
        .schedules
        .get_schedule_for_owner(schedule_id, &user.0)
        .await?;

    Ok(Json(schedule.into()))
}

/// Partially update a schedule owned by the caller
#[utoipa::path(
    patch,
    path = "/api/v1/schedules/{schedule_id}",
    request_body = UpdateScheduleBody,
    params(
        ("schedule_id" = String, Path, description = "Schedule identifier"),
        crate::auth::UserHeader
    ),
    responses(
        (status = 200, description = "Updated schedule", body = ScheduleInfo),
        (status = 400, description = "Invalid cron or timezone", body = ApiError),
        (status = 403, description = "Not the owner", body = ApiError),
        (status = 404, description = "No such schedule", body = ApiError),
        (status = 409, description = "Concurrent update", body = ApiError)
    ),
    tag = "schedules"
)]
pub async fn update_schedule(
    State(state): State<AppState>,
    CallerIdentity(user): CallerIdentity,
    Path(schedule_id): Path<String>,
    Json(body): Json<UpdateScheduleBody>,
) -> Result<Json<ScheduleInfo>, ApiError> {
    let schedule_id = parse_schedule_id(&schedule_id)?;

    let schedule = state
        .schedules
        .update_schedule(
            schedule_id,
            &user.0,
            UpdateScheduleRequest {
                cron: body.cron,
                timezone: body.timezone,
                enabled: body.enabled,
                input: body.input,
            },
        )
        .await?;

    Ok(Json(schedule.into()))
}

/// Disable a schedule and revoke its execution grant (idempotent)
#[utoipa::path(
    delete,
    path = "/api/v1/schedules/{schedule_id}",
    params(
        ("schedule_id" = String, Path, description = "Schedule identifier"),
        crate::auth::UserHeader
    ),
    responses(
        (status = 200, description = "Schedule disabled", body = DisableScheduleResponse),
        (status = 403, description = "Not the owner", body = ApiError),
        (status = 404, description = "No such schedule", body = ApiError)
    ),
    tag = "schedules"
)]
pub async fn disable_schedule(
    State(state): State<AppState>,
    CallerIdentity(user): CallerIdentity,
    Path(schedule_id): Path<String>,
) -> Result<Json<DisableScheduleResponse>, ApiError> {
    let schedule_id = parse_schedule_id(&schedule_id)?;
    let schedule = state
        .schedules
        .disable_schedule(schedule_id, &user.0)
        .await?;

    Ok(Json(DisableScheduleResponse {
        schedule_id: schedule.id.to_string(),
        enabled: schedule.enabled,
    }))
}

/// Run history for a schedule owned by the caller, newest first
#[utoipa::path(
    get,
    path = "/api/v1/schedules/{schedule_id}/runs",
    params(
        ("schedule_id" = String, Path, description = "Schedule identifier"),
        ("limit" = Option<u64>, Query, description = "Page size (default 50, max 100)"),
        ("cursor" = Option<String>, Query, description = "Opaque pagination cursor"),
        crate::auth::UserHeader
    ),
    responses(
        (status = 200, description = "Run history page", body = RunsResponse),
        (status = 403, description = "Not the owner", body = ApiError),
        (status = 404, description = "No such schedule", body = ApiError)
    ),
    tag = "schedules"
)]
pub async fn list_runs(
    State(state): State<AppState>,
    CallerIdentity(user): CallerIdentity,
    Path(schedule_id): Path<String>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<RunsResponse>, ApiError> {
    let schedule_id = parse_schedule_id(&schedule_id)?;

    // Ownership gate before touching the ledger.
    state
        .schedules
        .get_schedule_for_owner(schedule_id, &user.0)
        .await?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_RUNS_PAGE)
        .clamp(1, MAX_RUNS_PAGE);

    let cursor = match query.cursor {
        Some(raw) => Some(decode_cursor(&raw)?),
        None => None,
    };

    let runs = state
        .runs
        .list_by_schedule(schedule_id, limit, cursor)
        .await?;

    let next_cursor = if runs.len() as u64 == limit {
        runs.last()
            .map(|run| encode_cursor(&run.created_at.with_timezone(&chrono::Utc), &run.id))
    } else {
        None
    };

    Ok(Json(RunsResponse {
        runs: runs.into_iter().map(RunInfo::from).collect(),
        next_cursor,
    }))
}
