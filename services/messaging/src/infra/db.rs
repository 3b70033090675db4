use std::collections::BTreeMap;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait as _, Select,
    TransactionTrait,
    sea_query::{Expr, OnConflict},
};

use courier_domain::channel::Channel;
use courier_domain::id::{AttemptId, CampaignId, ChatMessageId, RetryEventId, SessionId};
use courier_domain::pagination::PageRequest;
use courier_domain::status::{DeliveryStatus, RetryOutcome};
use courier_messaging_schema::{
    campaign_cancellations, chat_messages, chat_sessions, delivery_attempts, enums,
    retry_events,
};

use crate::domain::repository::{CampaignRepository, ChatSessionRepository, DeliveryLedger};
use crate::domain::types::{
    AttemptFilter, AttemptStats, AttemptTransition, Change, ChatMessage, ChatSession,
    DeliveryAttempt, MessageDirection, RetryEvent,
};
use crate::error::MessagingError;

// ── Delivery ledger ──────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbDeliveryLedger {
    pub db: DatabaseConnection,
}

impl DbDeliveryLedger {
    fn filtered(filter: &AttemptFilter) -> Select<delivery_attempts::Entity> {
        let mut query = delivery_attempts::Entity::find();
        if let Some(campaign_id) = filter.campaign_id {
            query = query.filter(delivery_attempts::Column::CampaignId.eq(campaign_id.0));
        }
        if let Some(channel) = filter.channel {
            query = query.filter(delivery_attempts::Column::Channel.eq(channel_to_db(channel)));
        }
        if let Some(status) = filter.status {
            query = query.filter(delivery_attempts::Column::Status.eq(status_to_db(status)));
        }
        query
    }
}

impl DeliveryLedger for DbDeliveryLedger {
    async fn insert(&self, attempt: &DeliveryAttempt) -> Result<(), MessagingError> {
        attempt_active_model(attempt)
            .insert(&self.db)
            .await
            .context("insert delivery attempt")?;
        Ok(())
    }

    async fn find_by_id(&self, id: AttemptId) -> Result<Option<DeliveryAttempt>, MessagingError> {
        let model = delivery_attempts::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .context("find delivery attempt by id")?;
        Ok(model.map(attempt_from_model))
    }

    async fn find_by_provider_message_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<DeliveryAttempt>, MessagingError> {
        let model = delivery_attempts::Entity::find()
            .filter(delivery_attempts::Column::ProviderMessageId.eq(provider_message_id))
            .one(&self.db)
            .await
            .context("find delivery attempt by provider message id")?;
        Ok(model.map(attempt_from_model))
    }

    async fn find_by_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<DeliveryAttempt>, MessagingError> {
        let models = delivery_attempts::Entity::find()
            .filter(delivery_attempts::Column::CampaignId.eq(campaign_id.0))
            .order_by_asc(delivery_attempts::Column::CreatedAt)
            .order_by_asc(delivery_attempts::Column::Id)
            .all(&self.db)
            .await
            .context("find delivery attempts by campaign")?;
        Ok(models.into_iter().map(attempt_from_model).collect())
    }

    async fn list(
        &self,
        filter: &AttemptFilter,
        page: PageRequest,
    ) -> Result<Vec<DeliveryAttempt>, MessagingError> {
        let models = Self::filtered(filter)
            .order_by_desc(delivery_attempts::Column::CreatedAt)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .context("list delivery attempts")?;
        Ok(models.into_iter().map(attempt_from_model).collect())
    }

    async fn stats(&self, filter: &AttemptFilter) -> Result<AttemptStats, MessagingError> {
        let mut stats = AttemptStats::default();
        for status in DeliveryStatus::ALL {
            if filter.status.is_some_and(|s| s != status) {
                continue;
            }
            let count = Self::filtered(filter)
                .filter(delivery_attempts::Column::Status.eq(status_to_db(status)))
                .count(&self.db)
                .await
                .context("count delivery attempts")?;
            stats.add(status, count);
        }
        Ok(stats)
    }

    async fn purge(&self, id: AttemptId) -> Result<bool, MessagingError> {
        let result = delivery_attempts::Entity::delete_many()
            .filter(delivery_attempts::Column::Id.eq(id.0))
            .exec(&self.db)
            .await
            .context("purge delivery attempt")?;
        Ok(result.rows_affected > 0)
    }

    async fn transition(
        &self,
        id: AttemptId,
        transition: &AttemptTransition,
        now: DateTime<Utc>,
    ) -> Result<Option<(DeliveryAttempt, Change)>, MessagingError> {
        let txn = self.db.begin().await.context("begin attempt transition")?;
        let Some(model) = delivery_attempts::Entity::find_by_id(id.0)
            .lock_exclusive()
            .one(&txn)
            .await
            .context("lock delivery attempt")?
        else {
            return Ok(None);
        };

        let mut attempt = attempt_from_model(model);
        // Dropping `txn` on a rejected transition rolls back and releases the lock.
        let change = attempt.apply(transition, now)?;
        if change == Change::Applied {
            attempt_active_model(&attempt)
                .update(&txn)
                .await
                .context("update delivery attempt")?;
        }
        txn.commit().await.context("commit attempt transition")?;
        Ok(Some((attempt, change)))
    }

    async fn insert_event(&self, event: &RetryEvent) -> Result<(), MessagingError> {
        retry_events::ActiveModel {
            id: Set(event.id.0),
            attempt_id: Set(event.attempt_id.0),
            attempt_number: Set(event.attempt_number),
            scheduled_at: Set(event.scheduled_at),
            executed_at: Set(event.executed_at),
            outcome: Set(outcome_to_db(event.outcome)),
            error_reason: Set(event.error_reason.clone()),
        }
        .insert(&self.db)
        .await
        .context("insert retry event")?;
        Ok(())
    }

    async fn find_event(&self, id: RetryEventId) -> Result<Option<RetryEvent>, MessagingError> {
        let model = retry_events::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .context("find retry event")?;
        Ok(model.map(event_from_model))
    }

    async fn claim_event(
        &self,
        id: RetryEventId,
        now: DateTime<Utc>,
        expired_before: DateTime<Utc>,
    ) -> Result<Option<RetryEvent>, MessagingError> {
        let result = retry_events::Entity::update_many()
            .col_expr(retry_events::Column::ExecutedAt, Expr::value(now))
            .filter(retry_events::Column::Id.eq(id.0))
            .filter(retry_events::Column::Outcome.eq(enums::RetryOutcome::Pending))
            .filter(
                Condition::any()
                    .add(retry_events::Column::ExecutedAt.is_null())
                    .add(retry_events::Column::ExecutedAt.lt(expired_before)),
            )
            .exec(&self.db)
            .await
            .context("claim retry event")?;
        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.find_event(id).await
    }

    async fn resolve_events(
        &self,
        attempt_id: AttemptId,
        outcome: RetryOutcome,
    ) -> Result<u64, MessagingError> {
        let result = retry_events::Entity::update_many()
            .col_expr(
                retry_events::Column::Outcome,
                Expr::value(outcome_to_db(outcome)),
            )
            .filter(retry_events::Column::AttemptId.eq(attempt_id.0))
            .exec(&self.db)
            .await
            .context("resolve retry events")?;
        Ok(result.rows_affected)
    }

    async fn list_due(
        &self,
        now: DateTime<Utc>,
        expired_before: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<RetryEvent>, MessagingError> {
        let attempt_number = (
            delivery_attempts::Entity,
            delivery_attempts::Column::AttemptNumber,
        );
        let event_number = (retry_events::Entity, retry_events::Column::AttemptNumber);
        // Mirrors RetryEvent::resume_point.
        let still_waiting = Condition::any()
            .add(
                Condition::all()
                    .add(delivery_attempts::Column::Status.eq(enums::DeliveryStatus::Retrying))
                    .add(Expr::col(attempt_number).equals(event_number)),
            )
            .add(
                Condition::all()
                    .add(delivery_attempts::Column::Status.eq(enums::DeliveryStatus::Queued))
                    .add(Expr::col(attempt_number).eq(Expr::col(event_number).add(1))),
            );
        let claimable = Condition::any()
            .add(retry_events::Column::ExecutedAt.is_null())
            .add(
                Condition::all()
                    .add(retry_events::Column::ExecutedAt.lt(expired_before))
                    .add(still_waiting),
            );

        let models = retry_events::Entity::find()
            .join(
                sea_orm::JoinType::InnerJoin,
                retry_events::Relation::DeliveryAttempt.def(),
            )
            .filter(retry_events::Column::Outcome.eq(enums::RetryOutcome::Pending))
            .filter(retry_events::Column::ScheduledAt.lte(now))
            .filter(claimable)
            .order_by_asc(retry_events::Column::ScheduledAt)
            .limit(limit)
            .all(&self.db)
            .await
            .context("list due retry events")?;
        Ok(models.into_iter().map(event_from_model).collect())
    }

    async fn events_by_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<RetryEvent>, MessagingError> {
        let models = retry_events::Entity::find()
            .join(
                sea_orm::JoinType::InnerJoin,
                retry_events::Relation::DeliveryAttempt.def(),
            )
            .filter(delivery_attempts::Column::CampaignId.eq(campaign_id.0))
            .order_by_asc(retry_events::Column::AttemptNumber)
            .order_by_asc(retry_events::Column::ScheduledAt)
            .all(&self.db)
            .await
            .context("list retry events by campaign")?;
        Ok(models.into_iter().map(event_from_model).collect())
    }
}

fn attempt_active_model(attempt: &DeliveryAttempt) -> delivery_attempts::ActiveModel {
    delivery_attempts::ActiveModel {
        id: Set(attempt.id.0),
        campaign_id: Set(attempt.campaign_id.map(|c| c.0)),
        recipient: Set(attempt.recipient.clone()),
        channel: Set(channel_to_db(attempt.channel)),
        payload: Set(attempt.payload.clone()),
        provider_message_id: Set(attempt.provider_message_id.clone()),
        status: Set(status_to_db(attempt.status)),
        attempt_number: Set(attempt.attempt_number),
        exhausted: Set(attempt.exhausted),
        error_reason: Set(attempt.error_reason.clone()),
        created_at: Set(attempt.created_at),
        last_updated_at: Set(attempt.last_updated_at),
    }
}

fn attempt_from_model(model: delivery_attempts::Model) -> DeliveryAttempt {
    DeliveryAttempt {
        id: AttemptId(model.id),
        campaign_id: model.campaign_id.map(CampaignId),
        recipient: model.recipient,
        channel: channel_from_db(model.channel),
        payload: model.payload,
        provider_message_id: model.provider_message_id,
        status: status_from_db(model.status),
        attempt_number: model.attempt_number,
        exhausted: model.exhausted,
        error_reason: model.error_reason,
        created_at: model.created_at,
        last_updated_at: model.last_updated_at,
    }
}

fn event_from_model(model: retry_events::Model) -> RetryEvent {
    RetryEvent {
        id: RetryEventId(model.id),
        attempt_id: AttemptId(model.attempt_id),
        attempt_number: model.attempt_number,
        scheduled_at: model.scheduled_at,
        executed_at: model.executed_at,
        outcome: outcome_from_db(model.outcome),
        error_reason: model.error_reason,
    }
}

// ── Campaign repository ──────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbCampaignRepository {
    pub db: DatabaseConnection,
}

impl CampaignRepository for DbCampaignRepository {
    async fn is_cancelled(&self, campaign_id: CampaignId) -> Result<bool, MessagingError> {
        let found = campaign_cancellations::Entity::find_by_id(campaign_id.0)
            .one(&self.db)
            .await
            .context("find campaign cancellation")?;
        Ok(found.is_some())
    }

    async fn cancel(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<bool, MessagingError> {
        let inserted = campaign_cancellations::Entity::insert(campaign_cancellations::ActiveModel {
            campaign_id: Set(campaign_id.0),
            cancelled_at: Set(now),
        })
        .on_conflict(
            OnConflict::column(campaign_cancellations::Column::CampaignId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&self.db)
        .await
        .context("cancel campaign")?;
        Ok(inserted > 0)
    }
}

// ── Chat session repository ──────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbChatSessionRepository {
    pub db: DatabaseConnection,
}

impl ChatSessionRepository for DbChatSessionRepository {
    async fn get_or_create(
        &self,
        contact_id: &str,
        channel: Channel,
        now: DateTime<Utc>,
    ) -> Result<ChatSession, MessagingError> {
        let fresh = ChatSession::new(contact_id, channel, now);
        chat_sessions::Entity::insert(chat_sessions::ActiveModel {
            id: Set(fresh.id.0),
            contact_id: Set(fresh.contact_id.clone()),
            channel: Set(channel_to_db(channel)),
            current_flow_node_id: Set(None),
            variables: Set(serde_json::json!({})),
            active: Set(true),
            version: Set(0),
            last_message_at: Set(now),
            created_at: Set(now),
        })
        .on_conflict(
            OnConflict::columns([
                chat_sessions::Column::ContactId,
                chat_sessions::Column::Channel,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(&self.db)
        .await
        .context("create chat session")?;

        let model = chat_sessions::Entity::find()
            .filter(chat_sessions::Column::ContactId.eq(contact_id))
            .filter(chat_sessions::Column::Channel.eq(channel_to_db(channel)))
            .one(&self.db)
            .await
            .context("find chat session by contact")?
            .context("chat session missing after upsert")?;
        Ok(session_from_model(model)?)
    }

    async fn find_by_id(&self, id: SessionId) -> Result<Option<ChatSession>, MessagingError> {
        let model = chat_sessions::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .context("find chat session by id")?;
        Ok(model.map(session_from_model).transpose()?)
    }

    async fn touch(&self, id: SessionId, now: DateTime<Utc>) -> Result<(), MessagingError> {
        chat_sessions::Entity::update_many()
            .col_expr(chat_sessions::Column::LastMessageAt, Expr::value(now))
            .filter(chat_sessions::Column::Id.eq(id.0))
            .exec(&self.db)
            .await
            .context("touch chat session")?;
        Ok(())
    }

    async fn set_flow_state(
        &self,
        id: SessionId,
        expected_version: i64,
        node_id: Option<&str>,
        variables: &BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<bool, MessagingError> {
        let variables = serde_json::to_value(variables).context("encode session variables")?;
        let result = chat_sessions::Entity::update_many()
            .col_expr(
                chat_sessions::Column::CurrentFlowNodeId,
                Expr::value(node_id.map(str::to_owned)),
            )
            .col_expr(chat_sessions::Column::Variables, Expr::value(variables))
            .col_expr(chat_sessions::Column::Active, Expr::value(true))
            .col_expr(
                chat_sessions::Column::Version,
                Expr::col(chat_sessions::Column::Version).add(1),
            )
            .col_expr(chat_sessions::Column::LastMessageAt, Expr::value(now))
            .filter(chat_sessions::Column::Id.eq(id.0))
            .filter(chat_sessions::Column::Version.eq(expected_version))
            .exec(&self.db)
            .await
            .context("set chat session flow state")?;
        Ok(result.rows_affected == 1)
    }

    async fn mark_idle_inactive(&self, cutoff: DateTime<Utc>) -> Result<u64, MessagingError> {
        let result = chat_sessions::Entity::update_many()
            .col_expr(chat_sessions::Column::Active, Expr::value(false))
            .filter(chat_sessions::Column::Active.eq(true))
            .filter(chat_sessions::Column::LastMessageAt.lt(cutoff))
            .exec(&self.db)
            .await
            .context("mark idle chat sessions inactive")?;
        Ok(result.rows_affected)
    }

    async fn append_message(&self, message: &ChatMessage) -> Result<(), MessagingError> {
        chat_messages::ActiveModel {
            id: Set(message.id.0),
            session_id: Set(message.session_id.0),
            direction: Set(match message.direction {
                MessageDirection::Inbound => enums::MessageDirection::Inbound,
                MessageDirection::Outbound => enums::MessageDirection::Outbound,
            }),
            body: Set(message.body.clone()),
            attempt_id: Set(message.attempt_id.map(|a| a.0)),
            created_at: Set(message.created_at),
        }
        .insert(&self.db)
        .await
        .context("append chat message")?;
        Ok(())
    }

    async fn list_messages(
        &self,
        session_id: SessionId,
        page: PageRequest,
    ) -> Result<Vec<ChatMessage>, MessagingError> {
        let models = chat_messages::Entity::find()
            .filter(chat_messages::Column::SessionId.eq(session_id.0))
            .order_by_desc(chat_messages::Column::CreatedAt)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .context("list chat messages")?;
        Ok(models
            .into_iter()
            .map(|m| ChatMessage {
                id: ChatMessageId(m.id),
                session_id: SessionId(m.session_id),
                direction: match m.direction {
                    enums::MessageDirection::Inbound => MessageDirection::Inbound,
                    enums::MessageDirection::Outbound => MessageDirection::Outbound,
                },
                body: m.body,
                attempt_id: m.attempt_id.map(AttemptId),
                created_at: m.created_at,
            })
            .collect())
    }
}

fn session_from_model(model: chat_sessions::Model) -> anyhow::Result<ChatSession> {
    let variables: BTreeMap<String, String> =
        serde_json::from_value(model.variables).context("decode session variables")?;
    Ok(ChatSession {
        id: SessionId(model.id),
        contact_id: model.contact_id,
        channel: channel_from_db(model.channel),
        current_node_id: model.current_flow_node_id,
        variables,
        active: model.active,
        version: model.version,
        last_message_at: model.last_message_at,
        created_at: model.created_at,
    })
}

// ── Enum mapping ─────────────────────────────────────────────────────────────

fn channel_to_db(channel: Channel) -> enums::Channel {
    match channel {
        Channel::Sms => enums::Channel::Sms,
        Channel::Whatsapp => enums::Channel::Whatsapp,
    }
}

fn channel_from_db(channel: enums::Channel) -> Channel {
    match channel {
        enums::Channel::Sms => Channel::Sms,
        enums::Channel::Whatsapp => Channel::Whatsapp,
    }
}

fn status_to_db(status: DeliveryStatus) -> enums::DeliveryStatus {
    match status {
        DeliveryStatus::Queued => enums::DeliveryStatus::Queued,
        DeliveryStatus::Sent => enums::DeliveryStatus::Sent,
        DeliveryStatus::Delivered => enums::DeliveryStatus::Delivered,
        DeliveryStatus::Failed => enums::DeliveryStatus::Failed,
        DeliveryStatus::Retrying => enums::DeliveryStatus::Retrying,
    }
}

fn status_from_db(status: enums::DeliveryStatus) -> DeliveryStatus {
    match status {
        enums::DeliveryStatus::Queued => DeliveryStatus::Queued,
        enums::DeliveryStatus::Sent => DeliveryStatus::Sent,
        enums::DeliveryStatus::Delivered => DeliveryStatus::Delivered,
        enums::DeliveryStatus::Failed => DeliveryStatus::Failed,
        enums::DeliveryStatus::Retrying => DeliveryStatus::Retrying,
    }
}

fn outcome_to_db(outcome: RetryOutcome) -> enums::RetryOutcome {
    match outcome {
        RetryOutcome::Pending => enums::RetryOutcome::Pending,
        RetryOutcome::Succeeded => enums::RetryOutcome::Succeeded,
        RetryOutcome::Exhausted => enums::RetryOutcome::Exhausted,
    }
}

fn outcome_from_db(outcome: enums::RetryOutcome) -> RetryOutcome {
    match outcome {
        enums::RetryOutcome::Pending => RetryOutcome::Pending,
        enums::RetryOutcome::Succeeded => RetryOutcome::Succeeded,
        enums::RetryOutcome::Exhausted => RetryOutcome::Exhausted,
    }
}
