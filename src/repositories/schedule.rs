//! # Schedule Repository
//!
//! Persistence for schedule rows. Owner scoping is applied inside the
//! queries themselves (never filtered after the fact), and every mutation
//! is guarded by the row's version column so concurrent writers surface as
//! conflicts instead of lost updates.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, LockBehavior, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::models::schedule::{ActiveModel, Column, Entity, Model};

/// Field values for a new schedule row.
#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub owner_user_id: String,
    pub billing_account_id: String,
    pub graph_id: String,
    pub input: JsonValue,
    pub cron: String,
    pub timezone: String,
    pub execution_grant_id: Uuid,
    pub next_run_at: DateTime<Utc>,
}

/// Partial column updates applied under the version guard.
///
/// `next_run_at` is doubly optional: `None` leaves the column untouched,
/// `Some(None)` clears it.
#[derive(Debug, Default, Clone)]
pub struct ScheduleChanges {
    pub cron: Option<String>,
    pub timezone: Option<String>,
    pub enabled: Option<bool>,
    pub input: Option<JsonValue>,
    pub next_run_at: Option<Option<DateTime<Utc>>>,
    pub last_run_at: Option<DateTime<Utc>>,
}

/// Repository for schedule database operations
pub struct ScheduleRepository {
    db: DatabaseConnection,
}

impl ScheduleRepository {
    /// Create a new ScheduleRepository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert a schedule on an arbitrary executor, so the insert can share
    /// a transaction with its grant.
    pub async fn insert_in<C>(&self, conn: &C, new: NewSchedule) -> Result<Model, SchedulerError>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now().fixed_offset();

        let schedule = ActiveModel {
            id: Set(Uuid::new_v4()),
            owner_user_id: Set(new.owner_user_id),
            billing_account_id: Set(new.billing_account_id),
            graph_id: Set(new.graph_id),
            input: Set(new.input),
            cron: Set(new.cron),
            timezone: Set(new.timezone),
            enabled: Set(true),
            next_run_at: Set(Some(new.next_run_at.fixed_offset())),
            last_run_at: Set(None),
            execution_grant_id: Set(new.execution_grant_id),
            version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Ok(schedule.insert(conn).await?)
    }

    /// Find a schedule by ID.
    pub async fn find_by_id(&self, schedule_id: Uuid) -> Result<Option<Model>, SchedulerError> {
        Ok(Entity::find_by_id(schedule_id).one(&self.db).await?)
    }

    /// List all schedules owned by the given user, oldest first.
    pub async fn list_by_owner(&self, owner_user_id: &str) -> Result<Vec<Model>, SchedulerError> {
        Ok(Entity::find()
            .filter(Column::OwnerUserId.eq(owner_user_id))
            .order_by_asc(Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    /// Enabled schedules whose next trigger has passed: the reconciler's
    /// work queue. Disabled schedules can never appear here.
    pub async fn find_stale(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Model>, SchedulerError> {
        Ok(Entity::find()
            .filter(Column::Enabled.eq(true))
            .filter(Column::NextRunAt.is_not_null())
            .filter(Column::NextRunAt.lte(now.fixed_offset()))
            .order_by_asc(Column::NextRunAt)
            .limit(limit)
            .all(&self.db)
            .await?)
    }

    /// Re-load a stale schedule inside the sweep transaction with a row
    /// lock, skipping rows another sweep already claimed. Returns None when
    /// the schedule is no longer stale (disabled or advanced since the
    /// candidate query ran).
    pub async fn claim_stale<C>(
        &self,
        conn: &C,
        schedule_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Model>, SchedulerError>
    where
        C: ConnectionTrait,
    {
        Ok(Entity::find()
            .filter(Column::Id.eq(schedule_id))
            .filter(Column::Enabled.eq(true))
            .filter(Column::NextRunAt.is_not_null())
            .filter(Column::NextRunAt.lte(now.fixed_offset()))
            .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
            .one(conn)
            .await?)
    }

    /// Apply partial changes under the optimistic version guard. The update
    /// only lands if the row still carries `current.version`; otherwise the
    /// caller lost a race and gets `UpdateConflict`.
    pub async fn update_guarded<C>(
        &self,
        conn: &C,
        current: &Model,
        changes: ScheduleChanges,
    ) -> Result<Model, SchedulerError>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now().fixed_offset();

        let mut update = Entity::update_many()
            .filter(Column::Id.eq(current.id))
            .filter(Column::Version.eq(current.version))
            .col_expr(Column::Version, Expr::col(Column::Version).add(1))
            .col_expr(Column::UpdatedAt, Expr::value(now));

        if let Some(cron) = changes.cron {
            update = update.col_expr(Column::Cron, Expr::value(cron));
        }
        if let Some(timezone) = changes.timezone {
            update = update.col_expr(Column::Timezone, Expr::value(timezone));
        }
        if let Some(enabled) = changes.enabled {
            update = update.col_expr(Column::Enabled, Expr::value(enabled));
        }
        if let Some(input) = changes.input {
            update = update.col_expr(Column::Input, Expr::value(input));
        }
        if let Some(next_run_at) = changes.next_run_at {
            update = update.col_expr(
                Column::NextRunAt,
                Expr::value(next_run_at.map(|dt| dt.fixed_offset())),
            );
        }
        if let Some(last_run_at) = changes.last_run_at {
            update = update.col_expr(Column::LastRunAt, Expr::value(last_run_at.fixed_offset()));
        }

        let result = update.exec(conn).await?;
        if result.rows_affected == 0 {
            return Err(SchedulerError::UpdateConflict {
                schedule_id: current.id,
            });
        }

        Entity::find_by_id(current.id)
            .one(conn)
            .await?
            .ok_or(SchedulerError::ScheduleNotFound {
                schedule_id: current.id,
            })
    }
}
