#![allow(async_fn_in_trait)]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use courier_domain::channel::Channel;
use courier_domain::id::{AttemptId, CampaignId, RetryEventId, SessionId};
use courier_domain::pagination::PageRequest;
use courier_domain::status::RetryOutcome;

use crate::domain::types::{
    AttemptFilter, AttemptStats, AttemptTransition, Change, ChatMessage, ChatSession,
    DeliveryAttempt, RetryEvent,
};
use crate::error::MessagingError;

/// Durable record of sends and their retry events.
pub trait DeliveryLedger: Send + Sync {
    async fn insert(&self, attempt: &DeliveryAttempt) -> Result<(), MessagingError>;

    async fn find_by_id(&self, id: AttemptId) -> Result<Option<DeliveryAttempt>, MessagingError>;

    async fn find_by_provider_message_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<DeliveryAttempt>, MessagingError>;

    /// Sends of one campaign, oldest first.
    async fn find_by_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<DeliveryAttempt>, MessagingError>;

    /// Newest first.
    async fn list(
        &self,
        filter: &AttemptFilter,
        page: PageRequest,
    ) -> Result<Vec<DeliveryAttempt>, MessagingError>;

    async fn stats(&self, filter: &AttemptFilter) -> Result<AttemptStats, MessagingError>;

    /// Delete a send and its retry events. Returns `true` if a row was deleted.
    async fn purge(&self, id: AttemptId) -> Result<bool, MessagingError>;

    /// Apply a transition under an exclusive row lock.
    ///
    /// `Ok(None)` when the attempt does not exist. A transition rejected by
    /// [`DeliveryAttempt::apply`] yields `MessagingError::InvalidTransition`.
    async fn transition(
        &self,
        id: AttemptId,
        transition: &AttemptTransition,
        now: DateTime<Utc>,
    ) -> Result<Option<(DeliveryAttempt, Change)>, MessagingError>;

    async fn insert_event(&self, event: &RetryEvent) -> Result<(), MessagingError>;

    async fn find_event(&self, id: RetryEventId) -> Result<Option<RetryEvent>, MessagingError>;

    /// Stamp a pending event as executed at `now`. An event already claimed
    /// before `expired_before` may be claimed again. Returns the event only to
    /// the caller that won the claim.
    async fn claim_event(
        &self,
        id: RetryEventId,
        now: DateTime<Utc>,
        expired_before: DateTime<Utc>,
    ) -> Result<Option<RetryEvent>, MessagingError>;

    /// Set the outcome of every event of a send. Returns the number updated.
    async fn resolve_events(
        &self,
        attempt_id: AttemptId,
        outcome: RetryOutcome,
    ) -> Result<u64, MessagingError>;

    /// Pending events whose time has come, earliest first: unclaimed ones,
    /// plus those claimed before `expired_before` whose attempt is still
    /// waiting on them (see [`RetryEvent::resume_point`]).
    async fn list_due(
        &self,
        now: DateTime<Utc>,
        expired_before: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<RetryEvent>, MessagingError>;

    /// Retry events of a campaign's sends ordered by attempt number.
    async fn events_by_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<RetryEvent>, MessagingError>;
}

/// Campaign cancellation flags.
pub trait CampaignRepository: Send + Sync {
    async fn is_cancelled(&self, campaign_id: CampaignId) -> Result<bool, MessagingError>;

    /// Returns `true` if the campaign was not already cancelled.
    async fn cancel(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<bool, MessagingError>;
}

/// Per-contact conversation state and message log.
pub trait ChatSessionRepository: Send + Sync {
    /// Existing session for (contact, channel) or a fresh one with no flow node.
    async fn get_or_create(
        &self,
        contact_id: &str,
        channel: Channel,
        now: DateTime<Utc>,
    ) -> Result<ChatSession, MessagingError>;

    async fn find_by_id(&self, id: SessionId) -> Result<Option<ChatSession>, MessagingError>;

    async fn touch(&self, id: SessionId, now: DateTime<Utc>) -> Result<(), MessagingError>;

    /// Replace node and variables if the stored version still equals
    /// `expected_version`. Bumps the version, reactivates the session and
    /// returns `false` on a version conflict.
    async fn set_flow_state(
        &self,
        id: SessionId,
        expected_version: i64,
        node_id: Option<&str>,
        variables: &BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<bool, MessagingError>;

    /// Flag active sessions silent since before `cutoff`. Returns the count.
    async fn mark_idle_inactive(&self, cutoff: DateTime<Utc>) -> Result<u64, MessagingError>;

    async fn append_message(&self, message: &ChatMessage) -> Result<(), MessagingError>;

    /// Newest first.
    async fn list_messages(
        &self,
        session_id: SessionId,
        page: PageRequest,
    ) -> Result<Vec<ChatMessage>, MessagingError>;
}
