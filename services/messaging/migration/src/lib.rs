use sea_orm_migration::prelude::*;

mod m20261001_000001_create_delivery_attempts;
mod m20261001_000002_create_retry_events;
mod m20261001_000003_create_chat_sessions;
mod m20261001_000004_create_chat_messages;
mod m20261001_000005_create_campaign_cancellations;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_delivery_attempts::Migration),
            Box::new(m20261001_000002_create_retry_events::Migration),
            Box::new(m20261001_000003_create_chat_sessions::Migration),
            Box::new(m20261001_000004_create_chat_messages::Migration),
            Box::new(m20261001_000005_create_campaign_cancellations::Migration),
        ]
    }
}
