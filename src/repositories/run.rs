//! # Schedule Run Repository
//!
//! Persistence for the append-only run ledger. Status transitions are
//! enforced here with guarded updates: a transition only lands if the row
//! still carries the status it was read with, so a racing second writer is
//! rejected instead of silently overwriting history.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use sea_orm::sea_query::Expr;
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::models::schedule_run::{ActiveModel, Column, Entity, Model, RunStatus};

/// Keyset cursor for run-history pagination (newest first).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

/// Repository for schedule run database operations
pub struct RunRepository {
    db: DatabaseConnection,
}

impl RunRepository {
    /// Create a new RunRepository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert a pending run row for a trigger. Callers must treat a unique
    /// violation on (schedule_id, scheduled_for) as "this trigger already
    /// has a ledger entry", not as a new failure.
    pub async fn create_pending_in<C>(
        &self,
        conn: &C,
        schedule_id: Uuid,
        scheduled_for: DateTime<Utc>,
    ) -> Result<Model, SchedulerError>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now().fixed_offset();

        let run = ActiveModel {
            id: Set(Uuid::new_v4()),
            schedule_id: Set(schedule_id),
            scheduled_for: Set(scheduled_for.fixed_offset()),
            status: Set(RunStatus::Pending.as_str().to_string()),
            started_at: Set(None),
            completed_at: Set(None),
            error_message: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Ok(run.insert(conn).await?)
    }

    /// Insert a run row already terminal as skipped, recording why the
    /// trigger produced no execution (e.g. a revoked grant).
    pub async fn create_skipped_in<C>(
        &self,
        conn: &C,
        schedule_id: Uuid,
        scheduled_for: DateTime<Utc>,
        reason: &str,
    ) -> Result<Model, SchedulerError>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now().fixed_offset();

        let run = ActiveModel {
            id: Set(Uuid::new_v4()),
            schedule_id: Set(schedule_id),
            scheduled_for: Set(scheduled_for.fixed_offset()),
            status: Set(RunStatus::Skipped.as_str().to_string()),
            started_at: Set(None),
            completed_at: Set(Some(now)),
            error_message: Set(Some(reason.to_string())),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Ok(run.insert(conn).await?)
    }

    /// Find a run by ID.
    pub async fn find_by_id(&self, run_id: Uuid) -> Result<Option<Model>, SchedulerError> {
        Ok(Entity::find_by_id(run_id).one(&self.db).await?)
    }

    /// Find the run row for a logical trigger, if one exists.
    pub async fn find_by_trigger<C>(
        &self,
        conn: &C,
        schedule_id: Uuid,
        scheduled_for: DateTime<Utc>,
    ) -> Result<Option<Model>, SchedulerError>
    where
        C: ConnectionTrait,
    {
        Ok(Entity::find()
            .filter(Column::ScheduleId.eq(schedule_id))
            .filter(Column::ScheduledFor.eq(scheduled_for.fixed_offset()))
            .one(conn)
            .await?)
    }

    /// Transition pending -> started. Any other source state is rejected.
    pub async fn mark_started(&self, run_id: Uuid) -> Result<Model, SchedulerError> {
        self.transition(run_id, RunStatus::Started, None).await
    }

    /// Transition to a terminal status. Allowed: started -> success/error/
    /// skipped and pending -> skipped. Completing an already-terminal run is
    /// rejected loudly rather than overwriting history.
    pub async fn mark_completed(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error_message: Option<String>,
    ) -> Result<Model, SchedulerError> {
        if !status.is_terminal() {
            let current = self.require(run_id).await?;
            let from = parse_status(&current)?;
            return Err(SchedulerError::InvalidRunTransition {
                run_id,
                from,
                to: status,
            });
        }

        self.transition(run_id, status, error_message).await
    }

    async fn require(&self, run_id: Uuid) -> Result<Model, SchedulerError> {
        self.find_by_id(run_id)
            .await?
            .ok_or(SchedulerError::RunNotFound { run_id })
    }

    async fn transition(
        &self,
        run_id: Uuid,
        to: RunStatus,
        error_message: Option<String>,
    ) -> Result<Model, SchedulerError> {
        let current = self.require(run_id).await?;
        let from = parse_status(&current)?;

        if from.is_terminal() {
            return Err(SchedulerError::RunAlreadyTerminal {
                run_id,
                status: from,
            });
        }

        let allowed = matches!(
            (from, to),
            (RunStatus::Pending, RunStatus::Started)
                | (RunStatus::Pending, RunStatus::Skipped)
                | (RunStatus::Started, RunStatus::Success)
                | (RunStatus::Started, RunStatus::Error)
                | (RunStatus::Started, RunStatus::Skipped)
        );
        if !allowed {
            return Err(SchedulerError::InvalidRunTransition { run_id, from, to });
        }

        let now = Utc::now().fixed_offset();

        // Guarded update: only lands if the row still carries `from`, so a
        // racing transition loses instead of clobbering.
        let mut update = Entity::update_many()
            .filter(Column::Id.eq(run_id))
            .filter(Column::Status.eq(from.as_str()))
            .col_expr(Column::Status, Expr::value(to.as_str()))
            .col_expr(Column::UpdatedAt, Expr::value(now));

        match to {
            RunStatus::Started => {
                update = update.col_expr(Column::StartedAt, Expr::value(Some(now)));
            }
            RunStatus::Success | RunStatus::Error | RunStatus::Skipped => {
                update = update.col_expr(Column::CompletedAt, Expr::value(Some(now)));
                if to == RunStatus::Error || to == RunStatus::Skipped {
                    update = update.col_expr(Column::ErrorMessage, Expr::value(error_message));
                }
            }
            RunStatus::Pending => unreachable!("pending is never a transition target"),
        }

        let result = update.exec(&self.db).await?;
        if result.rows_affected == 0 {
            // Re-read to report what actually happened underneath us.
            let latest = self.require(run_id).await?;
            let status = parse_status(&latest)?;
            return Err(if status.is_terminal() {
                SchedulerError::RunAlreadyTerminal { run_id, status }
            } else {
                SchedulerError::InvalidRunTransition {
                    run_id,
                    from: status,
                    to,
                }
            });
        }

        self.require(run_id).await
    }

    /// Newest-first run history for a schedule, keyset-paginated.
    pub async fn list_by_schedule(
        &self,
        schedule_id: Uuid,
        limit: u64,
        cursor: Option<RunCursor>,
    ) -> Result<Vec<Model>, SchedulerError> {
        let mut query = Entity::find()
            .filter(Column::ScheduleId.eq(schedule_id))
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id)
            .limit(limit);

        if let Some(cursor) = cursor {
            let created_at = cursor.created_at.fixed_offset();
            query = query.filter(
                Condition::any()
                    .add(Column::CreatedAt.lt(created_at))
                    .add(
                        Condition::all()
                            .add(Column::CreatedAt.eq(created_at))
                            .add(Column::Id.lt(cursor.id)),
                    ),
            );
        }

        Ok(query.all(&self.db).await?)
    }
}

fn parse_status(run: &Model) -> Result<RunStatus, SchedulerError> {
    RunStatus::parse(&run.status).ok_or_else(|| {
        SchedulerError::Database(sea_orm::DbErr::Custom(format!(
            "run {} carries unknown status '{}'",
            run.id, run.status
        )))
    })
}
