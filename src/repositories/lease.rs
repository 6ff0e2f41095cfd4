//! # Reconciler Lease Repository
//!
//! Database-backed single-flight guard for the reconciliation sweep. A
//! sweep only proceeds while its process holds the lease; an expired lease
//! can be stolen, so a crashed holder never wedges scheduling for good.

use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

use crate::error::{SchedulerError, is_unique_violation};
use crate::models::lease::{ActiveModel, Column, Entity};

/// Lease name used by the reconciliation sweep.
pub const RECONCILER_LEASE: &str = "reconciler";

/// Repository for lease acquisition and release
pub struct LeaseRepository {
    db: DatabaseConnection,
}

impl LeaseRepository {
    /// Create a new LeaseRepository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Try to take (or renew) the named lease for `holder`. Returns whether
    /// the holder now owns the lease. The claim is a single conditional
    /// UPDATE, so two concurrent claimants cannot both win.
    pub async fn try_acquire(
        &self,
        name: &str,
        holder: Uuid,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, SchedulerError> {
        let expires_at = (now + ttl).fixed_offset();

        let claimed = Entity::update_many()
            .filter(Column::Name.eq(name))
            .filter(
                Condition::any()
                    .add(Column::ExpiresAt.lte(now.fixed_offset()))
                    .add(Column::Holder.eq(holder)),
            )
            .col_expr(Column::Holder, Expr::value(holder))
            .col_expr(Column::AcquiredAt, Expr::value(now.fixed_offset()))
            .col_expr(Column::ExpiresAt, Expr::value(expires_at))
            .exec(&self.db)
            .await?;

        if claimed.rows_affected > 0 {
            return Ok(true);
        }

        // No row matched: either the lease is held by someone else, or no
        // row exists yet. Try to create it; a unique violation means we
        // lost the race to another claimant.
        let lease = ActiveModel {
            name: Set(name.to_string()),
            holder: Set(holder),
            acquired_at: Set(now.fixed_offset()),
            expires_at: Set(expires_at),
        };

        match lease.insert(&self.db).await {
            Ok(_) => Ok(true),
            Err(err) if is_unique_violation(&err) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Release the lease if `holder` still owns it. Expiring the row (rather
    /// than deleting it) lets the next claimant take over immediately while
    /// keeping the acquisition history inspectable.
    pub async fn release(
        &self,
        name: &str,
        holder: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        Entity::update_many()
            .filter(Column::Name.eq(name))
            .filter(Column::Holder.eq(holder))
            .col_expr(Column::ExpiresAt, Expr::value(now.fixed_offset()))
            .exec(&self.db)
            .await?;

        Ok(())
    }
}
