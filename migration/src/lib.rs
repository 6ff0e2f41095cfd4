//! Database migrations for the Cogni Scheduler.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_02_10_000100_create_execution_grants;
mod m2026_02_10_000200_create_schedules;
mod m2026_02_10_000300_create_schedule_runs;
mod m2026_02_10_000400_create_reconciler_leases;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_02_10_000100_create_execution_grants::Migration),
            Box::new(m2026_02_10_000200_create_schedules::Migration),
            Box::new(m2026_02_10_000300_create_schedule_runs::Migration),
            Box::new(m2026_02_10_000400_create_reconciler_leases::Migration),
        ]
    }
}
