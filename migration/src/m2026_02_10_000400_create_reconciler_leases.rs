//! Migration to create the reconciler_leases table.
//!
//! A single-row lease serializes reconciliation sweeps across deployments:
//! only the current holder may sweep, and an expired lease can be stolen.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ReconcilerLeases::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReconcilerLeases::Name)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ReconcilerLeases::Holder).uuid().not_null())
                    .col(
                        ColumnDef::new(ReconcilerLeases::AcquiredAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ReconcilerLeases::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ReconcilerLeases::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ReconcilerLeases {
    Table,
    Name,
    Holder,
    AcquiredAt,
    ExpiresAt,
}
