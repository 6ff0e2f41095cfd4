//! # Execution Grant Repository
//!
//! Persistence and validation for execution grants. This repository is the
//! sole authority on "may this worker act as this user for this graph" —
//! grant checks never consult the user's live session.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait, Set,
};
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::models::execution_grant::{ActiveModel, Entity, GrantScopes, Model};

/// Repository for execution grant database operations
pub struct GrantRepository {
    db: DatabaseConnection,
}

impl GrantRepository {
    /// Create a new GrantRepository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Issue a new grant for the given owner and scope set.
    pub async fn create_grant(
        &self,
        owner_user_id: &str,
        scopes: GrantScopes,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Model, SchedulerError> {
        self.create_grant_in(&self.db, owner_user_id, scopes, expires_at)
            .await
    }

    /// Issue a new grant on an arbitrary executor, so grant creation can
    /// share a transaction with the schedule insert.
    pub async fn create_grant_in<C>(
        &self,
        conn: &C,
        owner_user_id: &str,
        scopes: GrantScopes,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Model, SchedulerError>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now().fixed_offset();

        let grant = ActiveModel {
            id: Set(Uuid::new_v4()),
            owner_user_id: Set(owner_user_id.to_string()),
            scopes: Set(scopes.to_json()),
            issued_at: Set(now),
            expires_at: Set(expires_at.map(|dt| dt.fixed_offset())),
            revoked_at: Set(None),
        };

        let model = grant.insert(conn).await?;

        tracing::info!(
            grant_id = %model.id,
            owner_user_id = %model.owner_user_id,
            "Execution grant issued"
        );

        Ok(model)
    }

    /// Find a grant by ID.
    pub async fn find_grant(&self, grant_id: Uuid) -> Result<Option<Model>, SchedulerError> {
        Ok(Entity::find_by_id(grant_id).one(&self.db).await?)
    }

    /// Find a grant on an arbitrary executor (e.g. inside a sweep
    /// transaction).
    pub async fn find_grant_in<C>(
        &self,
        conn: &C,
        grant_id: Uuid,
    ) -> Result<Option<Model>, SchedulerError>
    where
        C: ConnectionTrait,
    {
        Ok(Entity::find_by_id(grant_id).one(conn).await?)
    }

    /// Load a grant and verify it authorizes executing the given graph now.
    /// Success is silent; every failure mode is a distinct error variant.
    pub async fn validate_for_graph(
        &self,
        grant_id: Uuid,
        graph_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        let grant = self
            .find_grant(grant_id)
            .await?
            .ok_or(SchedulerError::GrantNotFound { grant_id })?;

        check_grant(&grant, graph_id, now)
    }

    /// Revoke a grant. Revoking an already-revoked grant is a no-op success
    /// returning the original revocation instant.
    pub async fn revoke_grant(&self, grant_id: Uuid) -> Result<DateTime<Utc>, SchedulerError> {
        let grant = self
            .find_grant(grant_id)
            .await?
            .ok_or(SchedulerError::GrantNotFound { grant_id })?;

        if let Some(revoked_at) = grant.revoked_at {
            return Ok(revoked_at.with_timezone(&Utc));
        }

        let now = Utc::now();
        let mut active: ActiveModel = grant.into();
        active.revoked_at = Set(Some(now.fixed_offset()));
        active.update(&self.db).await?;

        tracing::info!(grant_id = %grant_id, "Execution grant revoked");

        Ok(now)
    }
}

/// Check a loaded grant row against a target graph at a given instant.
///
/// Pure so the reconciler can validate grants it fetched inside its own
/// transaction without another round trip.
pub fn check_grant(grant: &Model, graph_id: &str, now: DateTime<Utc>) -> Result<(), SchedulerError> {
    if grant.revoked_at.is_some() {
        return Err(SchedulerError::GrantRevoked { grant_id: grant.id });
    }

    if let Some(expires_at) = grant.expires_at
        && now >= expires_at.with_timezone(&Utc)
    {
        return Err(SchedulerError::GrantExpired { grant_id: grant.id });
    }

    let scopes = GrantScopes::from_json(&grant.scopes)
        .ok_or(SchedulerError::CorruptGrantScopes { grant_id: grant.id })?;

    if !scopes.allows(graph_id) {
        return Err(SchedulerError::GrantScopeMismatch {
            grant_id: grant.id,
            graph_id: graph_id.to_string(),
        });
    }

    Ok(())
}
