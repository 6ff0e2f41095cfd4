//! # Schedule Manager
//!
//! Owns the schedule lifecycle: creation (atomically with its execution
//! grant), owner-scoped listing, ownership-checked updates, and the narrow
//! setters the reconciler uses to advance trigger times. Cron and timezone
//! input is validated eagerly so an invalid schedule is never persisted.

use chrono::Utc;
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::cron::{compute_next_cron_time, validate_schedule_expression};
use crate::error::SchedulerError;
use crate::models::execution_grant::GrantScopes;
use crate::models::schedule::Model as ScheduleModel;
use crate::repositories::schedule::{NewSchedule, ScheduleChanges};
use crate::repositories::{GrantRepository, ScheduleRepository};

/// Caller-supplied fields for a new schedule.
#[derive(Debug, Clone)]
pub struct CreateScheduleRequest {
    pub graph_id: String,
    pub input: JsonValue,
    pub cron: String,
    pub timezone: String,
}

/// Caller-supplied partial update. Absent fields are left untouched.
#[derive(Debug, Default, Clone)]
pub struct UpdateScheduleRequest {
    pub cron: Option<String>,
    pub timezone: Option<String>,
    pub enabled: Option<bool>,
    pub input: Option<JsonValue>,
}

/// Schedule lifecycle service. Collaborators are injected explicitly; there
/// is no ambient registry.
pub struct ScheduleService {
    db: DatabaseConnection,
    schedules: ScheduleRepository,
    grants: GrantRepository,
}

impl ScheduleService {
    /// Create a new ScheduleService over the given connection and repositories.
    pub fn new(
        db: DatabaseConnection,
        schedules: ScheduleRepository,
        grants: GrantRepository,
    ) -> Self {
        Self {
            db,
            schedules,
            grants,
        }
    }

    /// Create a schedule together with an execution grant scoped to exactly
    /// its target graph. Validation happens before any write; the grant and
    /// schedule inserts share one transaction, so neither persists alone.
    pub async fn create_schedule(
        &self,
        owner_user_id: &str,
        billing_account_id: &str,
        request: CreateScheduleRequest,
    ) -> Result<ScheduleModel, SchedulerError> {
        let now = Utc::now();
        let next_run_at = compute_next_cron_time(&request.cron, &request.timezone, now)?;

        let txn = self.db.begin().await?;

        let grant = self
            .grants
            .create_grant_in(
                &txn,
                owner_user_id,
                GrantScopes::single(request.graph_id.clone()),
                None,
            )
            .await?;

        let schedule = self
            .schedules
            .insert_in(
                &txn,
                NewSchedule {
                    owner_user_id: owner_user_id.to_string(),
                    billing_account_id: billing_account_id.to_string(),
                    graph_id: request.graph_id,
                    input: request.input,
                    cron: request.cron,
                    timezone: request.timezone,
                    execution_grant_id: grant.id,
                    next_run_at,
                },
            )
            .await?;

        txn.commit().await?;

        tracing::info!(
            schedule_id = %schedule.id,
            owner_user_id = %schedule.owner_user_id,
            graph_id = %schedule.graph_id,
            next_run_at = %next_run_at,
            "Schedule created"
        );

        Ok(schedule)
    }

    /// List the caller's schedules, oldest first.
    pub async fn list_schedules(
        &self,
        owner_user_id: &str,
    ) -> Result<Vec<ScheduleModel>, SchedulerError> {
        self.schedules.list_by_owner(owner_user_id).await
    }

    /// Fetch a schedule without an ownership check (internal callers).
    pub async fn get_schedule(
        &self,
        schedule_id: Uuid,
    ) -> Result<Option<ScheduleModel>, SchedulerError> {
        self.schedules.find_by_id(schedule_id).await
    }

    /// Fetch a schedule on behalf of a caller, enforcing ownership.
    pub async fn get_schedule_for_owner(
        &self,
        schedule_id: Uuid,
        caller_user_id: &str,
    ) -> Result<ScheduleModel, SchedulerError> {
        let schedule = self
            .schedules
            .find_by_id(schedule_id)
            .await?
            .ok_or(SchedulerError::ScheduleNotFound { schedule_id })?;

        if schedule.owner_user_id != caller_user_id {
            return Err(SchedulerError::ScheduleAccessDenied { schedule_id });
        }

        Ok(schedule)
    }

    /// Apply a partial update on behalf of a caller. Recomputes the next
    /// trigger whenever cron or timezone change or the schedule is
    /// re-enabled; disabling always clears it so no stale trigger time can
    /// mislead the reconciler or the UI.
    pub async fn update_schedule(
        &self,
        schedule_id: Uuid,
        caller_user_id: &str,
        request: UpdateScheduleRequest,
    ) -> Result<ScheduleModel, SchedulerError> {
        let current = self
            .get_schedule_for_owner(schedule_id, caller_user_id)
            .await?;

        let cron = request.cron.as_deref().unwrap_or(&current.cron);
        let timezone = request.timezone.as_deref().unwrap_or(&current.timezone);
        validate_schedule_expression(cron, timezone)?;

        let will_be_enabled = request.enabled.unwrap_or(current.enabled);
        let expression_changed = request.cron.is_some() || request.timezone.is_some();
        let re_enabling = will_be_enabled && !current.enabled;

        let next_run_at = if !will_be_enabled {
            Some(None)
        } else if expression_changed || re_enabling {
            Some(Some(compute_next_cron_time(cron, timezone, Utc::now())?))
        } else {
            None
        };

        let updated = self
            .schedules
            .update_guarded(
                &self.db,
                &current,
                ScheduleChanges {
                    cron: request.cron,
                    timezone: request.timezone,
                    enabled: request.enabled,
                    input: request.input,
                    next_run_at,
                    last_run_at: None,
                },
            )
            .await?;

        tracing::info!(
            schedule_id = %updated.id,
            enabled = updated.enabled,
            "Schedule updated"
        );

        Ok(updated)
    }

    /// Disable a schedule and revoke its grant. Idempotent: repeating the
    /// call on an already-disabled schedule succeeds without another write.
    /// The row is kept (soft-disable) so its run history stays auditable.
    pub async fn disable_schedule(
        &self,
        schedule_id: Uuid,
        caller_user_id: &str,
    ) -> Result<ScheduleModel, SchedulerError> {
        let current = self
            .get_schedule_for_owner(schedule_id, caller_user_id)
            .await?;

        let schedule = if current.enabled || current.next_run_at.is_some() {
            self.schedules
                .update_guarded(
                    &self.db,
                    &current,
                    ScheduleChanges {
                        enabled: Some(false),
                        next_run_at: Some(None),
                        ..Default::default()
                    },
                )
                .await?
        } else {
            current
        };

        self.grants.revoke_grant(schedule.execution_grant_id).await?;

        tracing::info!(schedule_id = %schedule.id, "Schedule disabled and grant revoked");

        Ok(schedule)
    }
}
