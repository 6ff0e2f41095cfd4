//! Schedule entity model
//!
//! This module contains the SeaORM entity model for the schedules table,
//! which represents recurring cron-driven graph executions owned by a user.

use super::execution_grant::Entity as ExecutionGrant;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Schedule entity representing a recurring graph execution definition
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "schedules")]
pub struct Model {
    /// Unique identifier for the schedule (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Opaque identity of the owning user
    pub owner_user_id: String,

    /// Billing account charged for runs of this schedule
    pub billing_account_id: String,

    /// Identifier of the AI graph to execute
    pub graph_id: String,

    /// Opaque JSON payload handed to the graph on every run
    #[sea_orm(column_type = "JsonBinary")]
    pub input: JsonValue,

    /// Cron expression (standard 5-field Unix form)
    pub cron: String,

    /// IANA timezone the cron fields are evaluated in
    pub timezone: String,

    /// Whether the reconciler acts on this schedule
    pub enabled: bool,

    /// Next trigger instant (UTC); null while disabled
    pub next_run_at: Option<DateTimeWithTimeZone>,

    /// Trigger instant of the most recent reconciled run
    pub last_run_at: Option<DateTimeWithTimeZone>,

    /// Execution grant authorizing runs of this schedule
    pub execution_grant_id: Uuid,

    /// Optimistic concurrency token; incremented on every mutation
    pub version: i32,

    /// Timestamp when the schedule was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the schedule was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "ExecutionGrant",
        from = "Column::ExecutionGrantId",
        to = "super::execution_grant::Column::Id"
    )]
    ExecutionGrant,
}

impl Related<ExecutionGrant> for Entity {
    fn to() -> RelationDef {
        Relation::ExecutionGrant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
