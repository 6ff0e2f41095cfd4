//! Test utilities for database and application testing.
//!
//! This module provides helpers for setting up in-memory SQLite databases
//! with migrations applied, plus a fully wired application state for
//! driving the HTTP surface in tests.

use std::sync::Arc;

use anyhow::Result;
use cogni_scheduler::config::AppConfig;
use cogni_scheduler::repositories::{GrantRepository, ScheduleRepository};
use cogni_scheduler::schedules::ScheduleService;
use cogni_scheduler::server::AppState;
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};

/// Bearer token accepted by test app states.
#[allow(dead_code)]
pub const TEST_OPERATOR_TOKEN: &str = "test-operator-token";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Test configuration with a known operator token and jitter disabled.
#[allow(dead_code)]
pub fn test_config() -> Arc<AppConfig> {
    let mut config = AppConfig::default();
    config.profile = "test".to_string();
    config.operator_tokens = vec![TEST_OPERATOR_TOKEN.to_string()];
    config.scheduler.tick_jitter_pct_max = 0.0;
    Arc::new(config)
}

/// Schedule service wired over the given database.
#[allow(dead_code)]
pub fn schedule_service(db: &DatabaseConnection) -> ScheduleService {
    ScheduleService::new(
        db.clone(),
        ScheduleRepository::new(db.clone()),
        GrantRepository::new(db.clone()),
    )
}

/// Fully wired application state over a fresh in-memory database.
#[allow(dead_code)]
pub async fn setup_app_state() -> Result<AppState> {
    let db = setup_test_db().await?;
    Ok(AppState::new(test_config(), db))
}
