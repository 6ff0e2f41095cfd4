//! ReconcilerLease entity model
//!
//! Single-row lease that serializes reconciliation sweeps across
//! deployments.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Lease row granting one holder the right to sweep until expiry
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "reconciler_leases")]
pub struct Model {
    /// Lease name (primary key); one row per coordinated activity
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,

    /// Identity of the process currently holding the lease
    pub holder: Uuid,

    /// Timestamp the current holder took the lease
    pub acquired_at: DateTimeWithTimeZone,

    /// Instant after which the lease may be stolen
    pub expires_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
