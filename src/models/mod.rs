//! # Data Models
//!
//! This module contains the SeaORM entities and shared value types used
//! throughout the Cogni Scheduler service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod execution_grant;
pub mod lease;
pub mod schedule;
pub mod schedule_run;

pub use execution_grant::Entity as ExecutionGrant;
pub use lease::Entity as ReconcilerLease;
pub use schedule::Entity as Schedule;
pub use schedule_run::Entity as ScheduleRun;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "cogni-scheduler".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
