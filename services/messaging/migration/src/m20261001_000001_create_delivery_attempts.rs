use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeliveryAttempts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeliveryAttempts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DeliveryAttempts::CampaignId).big_integer())
                    .col(
                        ColumnDef::new(DeliveryAttempts::Recipient)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryAttempts::Channel)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeliveryAttempts::Payload).text().not_null())
                    .col(
                        ColumnDef::new(DeliveryAttempts::ProviderMessageId)
                            .string()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(DeliveryAttempts::Status)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryAttempts::AttemptNumber)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(DeliveryAttempts::Exhausted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(DeliveryAttempts::ErrorReason).string())
                    .col(
                        ColumnDef::new(DeliveryAttempts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(DeliveryAttempts::LastUpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // History reconstruction reads a campaign's attempts in creation order.
        manager
            .create_index(
                Index::create()
                    .table(DeliveryAttempts::Table)
                    .col(DeliveryAttempts::CampaignId)
                    .col(DeliveryAttempts::CreatedAt)
                    .name("idx_delivery_attempts_campaign_id_created_at")
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(DeliveryAttempts::Table)
                    .col(DeliveryAttempts::Status)
                    .name("idx_delivery_attempts_status")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeliveryAttempts::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum DeliveryAttempts {
    Table,
    Id,
    CampaignId,
    Recipient,
    Channel,
    Payload,
    ProviderMessageId,
    Status,
    AttemptNumber,
    Exhausted,
    ErrorReason,
    CreatedAt,
    LastUpdatedAt,
}
