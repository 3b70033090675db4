use sea_orm::entity::prelude::*;

use crate::enums::{Channel, DeliveryStatus};

/// One outbound message instance tracked against an external provider.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "delivery_attempts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub campaign_id: Option<i64>,
    pub recipient: String,
    pub channel: Channel,
    #[sea_orm(column_type = "Text")]
    pub payload: String,
    #[sea_orm(unique)]
    pub provider_message_id: Option<String>,
    pub status: DeliveryStatus,
    pub attempt_number: i32,
    pub exhausted: bool,
    pub error_reason: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::retry_events::Entity")]
    RetryEvents,
}

impl Related<super::retry_events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RetryEvents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
