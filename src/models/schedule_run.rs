//! ScheduleRun entity model
//!
//! This module contains the SeaORM entity model for the schedule_runs table
//! (the append-only execution ledger) and the run status state machine.

use super::schedule::Entity as Schedule;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// ScheduleRun entity representing one execution attempt
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "schedule_runs")]
pub struct Model {
    /// Unique identifier; doubles as the job correlation ID (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Schedule this run belongs to
    pub schedule_id: Uuid,

    /// Trigger instant this run corresponds to
    pub scheduled_for: DateTimeWithTimeZone,

    /// Current status (pending, started, success, error, skipped)
    pub status: String,

    /// Timestamp the worker picked the run up
    pub started_at: Option<DateTimeWithTimeZone>,

    /// Timestamp the run reached a terminal status
    pub completed_at: Option<DateTimeWithTimeZone>,

    /// Failure detail; present only on error
    pub error_message: Option<String>,

    /// Timestamp when the run row was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the run row was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Schedule",
        from = "Column::ScheduleId",
        to = "super::schedule::Column::Id"
    )]
    Schedule,
}

impl Related<Schedule> for Entity {
    fn to() -> RelationDef {
        Relation::Schedule.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Run lifecycle states. Transitions are one-directional:
/// pending -> started -> success | error, and pending -> skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    Started,
    Success,
    Error,
    Skipped,
}

impl RunStatus {
    /// Database representation.
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Started => "started",
            RunStatus::Success => "success",
            RunStatus::Error => "error",
            RunStatus::Skipped => "skipped",
        }
    }

    /// Parse the database representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RunStatus::Pending),
            "started" => Some(RunStatus::Started),
            "success" => Some(RunStatus::Success),
            "error" => Some(RunStatus::Error),
            "skipped" => Some(RunStatus::Skipped),
            _ => None,
        }
    }

    /// Whether no further transition is permitted from this status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Error | RunStatus::Skipped
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for status in [
            RunStatus::Pending,
            RunStatus::Started,
            RunStatus::Success,
            RunStatus::Error,
            RunStatus::Skipped,
        ] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("queued"), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Started.is_terminal());
        assert!(RunStatus::Success.is_terminal());
        assert!(RunStatus::Error.is_terminal());
        assert!(RunStatus::Skipped.is_terminal());
    }
}
