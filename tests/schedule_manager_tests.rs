//! Schedule lifecycle tests: atomic creation with grants, tenant isolation,
//! ownership checks, trigger recomputation, and optimistic concurrency.

use anyhow::Result;
use chrono::Utc;
use sea_orm::EntityTrait;
use serde_json::json;
use uuid::Uuid;

use cogni_scheduler::error::SchedulerError;
use cogni_scheduler::models::execution_grant::{Entity as GrantEntity, GrantScopes};
use cogni_scheduler::models::schedule::Entity as ScheduleEntity;
use cogni_scheduler::repositories::schedule::ScheduleChanges;
use cogni_scheduler::repositories::{GrantRepository, ScheduleRepository};
use cogni_scheduler::schedules::{CreateScheduleRequest, UpdateScheduleRequest};

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::{schedule_service, setup_test_db};

fn create_request(graph_id: &str) -> CreateScheduleRequest {
    CreateScheduleRequest {
        graph_id: graph_id.to_string(),
        input: json!({"prompt": "daily digest"}),
        cron: "0 9 * * *".to_string(),
        timezone: "America/New_York".to_string(),
    }
}

#[tokio::test]
async fn create_persists_schedule_with_scoped_grant() -> Result<()> {
    let db = setup_test_db().await?;
    let service = schedule_service(&db);

    let schedule = service
        .create_schedule("user-a", "acct-a", create_request("graph-digest"))
        .await?;

    assert!(schedule.enabled);
    assert_eq!(schedule.owner_user_id, "user-a");
    assert_eq!(schedule.billing_account_id, "acct-a");

    // Initial trigger is strictly in the future.
    let next = schedule.next_run_at.expect("computed").with_timezone(&Utc);
    assert!(next > Utc::now());
    assert!(schedule.last_run_at.is_none());

    // The grant exists, belongs to the owner, and covers exactly the graph.
    let grant = GrantEntity::find_by_id(schedule.execution_grant_id)
        .one(&db)
        .await?
        .expect("grant persisted");
    assert_eq!(grant.owner_user_id, "user-a");
    assert!(grant.revoked_at.is_none());
    let scopes = GrantScopes::from_json(&grant.scopes).expect("valid scopes");
    assert!(scopes.allows("graph-digest"));
    assert!(!scopes.allows("graph-other"));

    Ok(())
}

#[tokio::test]
async fn invalid_cron_rejects_without_any_write() -> Result<()> {
    let db = setup_test_db().await?;
    let service = schedule_service(&db);

    let err = service
        .create_schedule(
            "user-a",
            "acct-a",
            CreateScheduleRequest {
                cron: "not a cron".to_string(),
                ..create_request("graph-digest")
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidCronExpression { .. }));

    let err = service
        .create_schedule(
            "user-a",
            "acct-a",
            CreateScheduleRequest {
                timezone: "Atlantis/Capital".to_string(),
                ..create_request("graph-digest")
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidTimezone { .. }));

    // No partial writes: neither schedules nor grants were stored.
    assert!(ScheduleEntity::find().all(&db).await?.is_empty());
    assert!(GrantEntity::find().all(&db).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn listing_is_scoped_to_the_owner() -> Result<()> {
    let db = setup_test_db().await?;
    let service = schedule_service(&db);

    service
        .create_schedule("user-a", "acct-a", create_request("graph-one"))
        .await?;
    service
        .create_schedule("user-a", "acct-a", create_request("graph-two"))
        .await?;
    service
        .create_schedule("user-b", "acct-b", create_request("graph-three"))
        .await?;

    let for_a = service.list_schedules("user-a").await?;
    assert_eq!(for_a.len(), 2);
    assert!(for_a.iter().all(|s| s.owner_user_id == "user-a"));

    let for_b = service.list_schedules("user-b").await?;
    assert_eq!(for_b.len(), 1);
    assert_eq!(for_b[0].graph_id, "graph-three");

    Ok(())
}

#[tokio::test]
async fn non_owner_update_is_denied_and_leaves_row_unmodified() -> Result<()> {
    let db = setup_test_db().await?;
    let service = schedule_service(&db);

    let schedule = service
        .create_schedule("user-a", "acct-a", create_request("graph-digest"))
        .await?;

    let err = service
        .update_schedule(
            schedule.id,
            "user-b",
            UpdateScheduleRequest {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::ScheduleAccessDenied { .. }));

    let unchanged = service.get_schedule(schedule.id).await?.expect("exists");
    assert_eq!(unchanged, schedule);

    Ok(())
}

#[tokio::test]
async fn missing_schedule_reports_not_found() -> Result<()> {
    let db = setup_test_db().await?;
    let service = schedule_service(&db);

    let err = service
        .update_schedule(Uuid::new_v4(), "user-a", UpdateScheduleRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::ScheduleNotFound { .. }));

    Ok(())
}

#[tokio::test]
async fn disable_clears_trigger_and_revokes_grant() -> Result<()> {
    let db = setup_test_db().await?;
    let service = schedule_service(&db);

    let schedule = service
        .create_schedule("user-a", "acct-a", create_request("graph-digest"))
        .await?;

    let disabled = service.disable_schedule(schedule.id, "user-a").await?;
    assert!(!disabled.enabled);
    assert!(disabled.next_run_at.is_none());

    let grant = GrantEntity::find_by_id(schedule.execution_grant_id)
        .one(&db)
        .await?
        .expect("grant exists");
    let first_revocation = grant.revoked_at.expect("revoked");

    // Idempotent: a second disable succeeds and keeps the original
    // revocation timestamp.
    let again = service.disable_schedule(schedule.id, "user-a").await?;
    assert!(!again.enabled);
    let grant = GrantEntity::find_by_id(schedule.execution_grant_id)
        .one(&db)
        .await?
        .expect("grant exists");
    assert_eq!(grant.revoked_at, Some(first_revocation));

    Ok(())
}

#[tokio::test]
async fn disabling_via_update_clears_trigger_and_enabling_rearms_it() -> Result<()> {
    let db = setup_test_db().await?;
    let service = schedule_service(&db);

    let schedule = service
        .create_schedule("user-a", "acct-a", create_request("graph-digest"))
        .await?;

    let disabled = service
        .update_schedule(
            schedule.id,
            "user-a",
            UpdateScheduleRequest {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .await?;
    assert!(!disabled.enabled);
    assert!(disabled.next_run_at.is_none());

    let enabled = service
        .update_schedule(
            schedule.id,
            "user-a",
            UpdateScheduleRequest {
                enabled: Some(true),
                ..Default::default()
            },
        )
        .await?;
    assert!(enabled.enabled);
    let next = enabled.next_run_at.expect("re-armed").with_timezone(&Utc);
    assert!(next > Utc::now());

    Ok(())
}

#[tokio::test]
async fn changing_cron_recomputes_trigger() -> Result<()> {
    let db = setup_test_db().await?;
    let service = schedule_service(&db);

    let schedule = service
        .create_schedule("user-a", "acct-a", create_request("graph-digest"))
        .await?;
    assert!(schedule.next_run_at.is_some());

    let updated = service
        .update_schedule(
            schedule.id,
            "user-a",
            UpdateScheduleRequest {
                cron: Some("*/5 * * * *".to_string()),
                timezone: Some("UTC".to_string()),
                ..Default::default()
            },
        )
        .await?;

    let after = updated.next_run_at.expect("recomputed").with_timezone(&Utc);
    assert!(after > Utc::now());
    // A 5-minute cadence puts the recomputed trigger at most 5 minutes out.
    assert!(after <= Utc::now() + chrono::Duration::minutes(6));
    assert_eq!(updated.cron, "*/5 * * * *");
    assert_eq!(updated.timezone, "UTC");

    Ok(())
}

#[tokio::test]
async fn input_only_update_keeps_trigger_untouched() -> Result<()> {
    let db = setup_test_db().await?;
    let service = schedule_service(&db);

    let schedule = service
        .create_schedule("user-a", "acct-a", create_request("graph-digest"))
        .await?;

    let updated = service
        .update_schedule(
            schedule.id,
            "user-a",
            UpdateScheduleRequest {
                input: Some(json!({"prompt": "weekly digest"})),
                ..Default::default()
            },
        )
        .await?;

    assert_eq!(updated.next_run_at, schedule.next_run_at);
    assert_eq!(updated.input, json!({"prompt": "weekly digest"}));

    Ok(())
}

#[tokio::test]
async fn invalid_update_leaves_schedule_unmodified() -> Result<()> {
    let db = setup_test_db().await?;
    let service = schedule_service(&db);

    let schedule = service
        .create_schedule("user-a", "acct-a", create_request("graph-digest"))
        .await?;

    let err = service
        .update_schedule(
            schedule.id,
            "user-a",
            UpdateScheduleRequest {
                cron: Some("61 * * * *".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidCronExpression { .. }));

    let unchanged = service.get_schedule(schedule.id).await?.expect("exists");
    assert_eq!(unchanged.cron, schedule.cron);

    Ok(())
}

#[tokio::test]
async fn stale_writers_lose_the_version_race() -> Result<()> {
    let db = setup_test_db().await?;
    let service = schedule_service(&db);
    let repo = ScheduleRepository::new(db.clone());

    let schedule = service
        .create_schedule("user-a", "acct-a", create_request("graph-digest"))
        .await?;

    let snapshot = repo.find_by_id(schedule.id).await?.expect("exists");

    // First writer wins.
    repo.update_guarded(
        &db,
        &snapshot,
        ScheduleChanges {
            enabled: Some(false),
            next_run_at: Some(None),
            ..Default::default()
        },
    )
    .await?;

    // Second writer still holds the old version and must conflict.
    let err = repo
        .update_guarded(
            &db,
            &snapshot,
            ScheduleChanges {
                enabled: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::UpdateConflict { .. }));

    let current = repo.find_by_id(schedule.id).await?.expect("exists");
    assert!(!current.enabled, "losing write must not land");

    Ok(())
}

#[tokio::test]
async fn stale_query_returns_only_enabled_due_schedules() -> Result<()> {
    let db = setup_test_db().await?;
    let service = schedule_service(&db);
    let repo = ScheduleRepository::new(db.clone());
    let grants = GrantRepository::new(db.clone());

    let due = service
        .create_schedule("user-a", "acct-a", create_request("graph-due"))
        .await?;
    let not_due = service
        .create_schedule("user-a", "acct-a", create_request("graph-later"))
        .await?;
    let disabled = service
        .create_schedule("user-a", "acct-a", create_request("graph-off"))
        .await?;

    // Force one schedule overdue, disable another.
    let model = repo.find_by_id(due.id).await?.expect("exists");
    repo.update_guarded(
        &db,
        &model,
        ScheduleChanges {
            next_run_at: Some(Some(Utc::now() - chrono::Duration::minutes(10))),
            ..Default::default()
        },
    )
    .await?;
    service.disable_schedule(disabled.id, "user-a").await?;

    let stale = repo.find_stale(Utc::now(), 100).await?;
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].id, due.id);
    assert_ne!(stale[0].id, not_due.id);

    // Grants stay independently inspectable.
    assert!(grants.find_grant(due.execution_grant_id).await?.is_some());

    Ok(())
}
