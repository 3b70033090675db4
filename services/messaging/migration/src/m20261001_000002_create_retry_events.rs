use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RetryEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RetryEvents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RetryEvents::AttemptId).uuid().not_null())
                    .col(
                        ColumnDef::new(RetryEvents::AttemptNumber)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RetryEvents::ScheduledAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RetryEvents::ExecutedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(RetryEvents::Outcome)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(RetryEvents::ErrorReason).string())
                    .foreign_key(
                        ForeignKey::create()
                            .from(RetryEvents::Table, RetryEvents::AttemptId)
                            .to(DeliveryAttempts::Table, DeliveryAttempts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index for worker poll queries (pending, unexecuted, by scheduled_at).
        manager
            .create_index(
                Index::create()
                    .table(RetryEvents::Table)
                    .col(RetryEvents::Outcome)
                    .col(RetryEvents::ScheduledAt)
                    .name("idx_retry_events_outcome_scheduled_at")
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(RetryEvents::Table)
                    .col(RetryEvents::AttemptId)
                    .col(RetryEvents::AttemptNumber)
                    .name("idx_retry_events_attempt_id_attempt_number")
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RetryEvents::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum RetryEvents {
    Table,
    Id,
    AttemptId,
    AttemptNumber,
    ScheduledAt,
    ExecutedAt,
    Outcome,
    ErrorReason,
}

#[derive(Iden)]
enum DeliveryAttempts {
    Table,
    Id,
}
