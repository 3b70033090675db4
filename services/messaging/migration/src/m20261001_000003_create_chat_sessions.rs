use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ChatSessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChatSessions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ChatSessions::ContactId).string().not_null())
                    .col(
                        ColumnDef::new(ChatSessions::Channel)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ChatSessions::CurrentFlowNodeId).string())
                    .col(
                        ColumnDef::new(ChatSessions::Variables)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'{}'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(ChatSessions::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ChatSessions::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ChatSessions::LastMessageAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ChatSessions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(ChatSessions::Table)
                    .col(ChatSessions::ContactId)
                    .col(ChatSessions::Channel)
                    .name("uq_chat_sessions_contact_id_channel")
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Idle sweep scans active sessions by last activity.
        manager
            .create_index(
                Index::create()
                    .table(ChatSessions::Table)
                    .col(ChatSessions::Active)
                    .col(ChatSessions::LastMessageAt)
                    .name("idx_chat_sessions_active_last_message_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChatSessions::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ChatSessions {
    Table,
    Id,
    ContactId,
    Channel,
    CurrentFlowNodeId,
    Variables,
    Active,
    Version,
    LastMessageAt,
    CreatedAt,
}
