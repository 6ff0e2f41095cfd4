//! ExecutionGrant entity model
//!
//! This module contains the SeaORM entity model for the execution_grants
//! table, plus the scope set stored in its JSON column. A grant authorizes
//! the worker runtime to execute specific graphs as a given user without a
//! live session.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Scope element granting access to every graph.
pub const WILDCARD_SCOPE: &str = "*";

/// ExecutionGrant entity representing a scoped worker authorization
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "execution_grants")]
pub struct Model {
    /// Unique identifier for the grant (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Opaque identity of the user the worker acts as
    pub owner_user_id: String,

    /// JSON array of graph IDs the grant covers; `["*"]` covers all
    #[sea_orm(column_type = "JsonBinary")]
    pub scopes: JsonValue,

    /// Timestamp the grant was issued
    pub issued_at: DateTimeWithTimeZone,

    /// Expiry instant; null means long-lived until revocation
    pub expires_at: Option<DateTimeWithTimeZone>,

    /// Revocation instant; null while the grant is live
    pub revoked_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Typed view over the `scopes` JSON column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantScopes(Vec<String>);

impl GrantScopes {
    /// Scope covering a single graph.
    pub fn single(graph_id: impl Into<String>) -> Self {
        Self(vec![graph_id.into()])
    }

    /// Scope covering every graph.
    pub fn wildcard() -> Self {
        Self(vec![WILDCARD_SCOPE.to_string()])
    }

    /// Build from an explicit list of graph IDs.
    pub fn from_graphs(graph_ids: Vec<String>) -> Self {
        Self(graph_ids)
    }

    /// Whether the scope set permits executing the given graph.
    pub fn allows(&self, graph_id: &str) -> bool {
        self.0
            .iter()
            .any(|scope| scope == WILDCARD_SCOPE || scope == graph_id)
    }

    /// Parse the stored JSON column. Non-array or non-string elements are
    /// rejected rather than silently ignored.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        let items = value.as_array()?;
        let mut scopes = Vec::with_capacity(items.len());
        for item in items {
            scopes.push(item.as_str()?.to_string());
        }
        Some(Self(scopes))
    }

    /// Serialize back into the JSON column representation.
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Array(self.0.iter().cloned().map(JsonValue::String).collect())
    }
}
