//! Migration to create the schedules table.
//!
//! A schedule is a recurring cron + target-graph definition owned by a user,
//! always backed by exactly one execution grant.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Schedules::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Schedules::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Schedules::OwnerUserId).text().not_null())
                    .col(
                        ColumnDef::new(Schedules::BillingAccountId)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Schedules::GraphId).text().not_null())
                    .col(ColumnDef::new(Schedules::Input).json_binary().not_null())
                    .col(ColumnDef::new(Schedules::Cron).text().not_null())
                    .col(ColumnDef::new(Schedules::Timezone).text().not_null())
                    .col(
                        ColumnDef::new(Schedules::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Schedules::NextRunAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Schedules::LastRunAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Schedules::ExecutionGrantId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Schedules::Version)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Schedules::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Schedules::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_schedules_execution_grant_id")
                            .from(Schedules::Table, Schedules::ExecutionGrantId)
                            .to(ExecutionGrants::Table, ExecutionGrants::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // The reconciler's work queue: enabled schedules ordered by due time
        manager
            .create_index(
                Index::create()
                    .name("idx_schedules_enabled_next_run")
                    .table(Schedules::Table)
                    .col(Schedules::Enabled)
                    .col(Schedules::NextRunAt)
                    .to_owned(),
            )
            .await?;

        // Owner-scoped listings
        manager
            .create_index(
                Index::create()
                    .name("idx_schedules_owner_created")
                    .table(Schedules::Table)
                    .col(Schedules::OwnerUserId)
                    .col(Schedules::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_schedules_enabled_next_run")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_schedules_owner_created").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Schedules::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Schedules {
    Table,
    Id,
    OwnerUserId,
    BillingAccountId,
    GraphId,
    Input,
    Cron,
    Timezone,
    Enabled,
    NextRunAt,
    LastRunAt,
    ExecutionGrantId,
    Version,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ExecutionGrants {
    Table,
    Id,
}
