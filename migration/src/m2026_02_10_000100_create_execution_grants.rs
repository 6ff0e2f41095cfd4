//! Migration to create the execution_grants table.
//!
//! Execution grants are scoped authorizations that let the worker runtime
//! execute graphs as a given user without a live session.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ExecutionGrants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExecutionGrants::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ExecutionGrants::OwnerUserId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExecutionGrants::Scopes)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExecutionGrants::IssuedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ExecutionGrants::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ExecutionGrants::RevokedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Owner-scoped listings and revocation sweeps
        manager
            .create_index(
                Index::create()
                    .name("idx_execution_grants_owner")
                    .table(ExecutionGrants::Table)
                    .col(ExecutionGrants::OwnerUserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_execution_grants_owner").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ExecutionGrants::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ExecutionGrants {
    Table,
    Id,
    OwnerUserId,
    Scopes,
    IssuedAt,
    ExpiresAt,
    RevokedAt,
}
