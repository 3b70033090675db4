use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use courier_domain::channel::Channel;
use courier_domain::id::{AttemptId, CampaignId, ChatMessageId, RetryEventId, SessionId};
use courier_domain::status::{DeliveryStatus, RetryOutcome};

// ── Delivery attempts ────────────────────────────────────────────────────────

/// One outbound message instance. Retries reuse the row and bump `attempt_number`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryAttempt {
    pub id: AttemptId,
    pub campaign_id: Option<CampaignId>,
    pub recipient: String,
    pub channel: Channel,
    pub payload: String,
    pub provider_message_id: Option<String>,
    pub status: DeliveryStatus,
    pub attempt_number: i32,
    /// Set once a FAILED status is terminal.
    pub exhausted: bool,
    pub error_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

/// Input for recording a new send.
#[derive(Debug, Clone)]
pub struct AttemptDraft {
    pub campaign_id: Option<CampaignId>,
    pub recipient: String,
    pub channel: Channel,
    pub payload: String,
}

/// Provider-reported status change for an attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: DeliveryStatus,
    pub provider_message_id: Option<String>,
    pub error_reason: Option<String>,
}

impl StatusUpdate {
    pub fn status(status: DeliveryStatus) -> Self {
        Self {
            status,
            provider_message_id: None,
            error_reason: None,
        }
    }
}

/// Every mutation an attempt row accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptTransition {
    /// Receipt or send acknowledgement, subject to rank precedence.
    Status(StatusUpdate),
    /// FAILED → RETRYING once a retry has been scheduled.
    MarkRetrying,
    /// RETRYING → QUEUED for the next try; bumps `attempt_number`.
    Restart,
    /// Make the failure terminal.
    Exhaust { reason: Option<String> },
}

/// Whether a transition changed the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Applied,
    Unchanged,
}

/// A transition that would move a terminal attempt backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: DeliveryStatus,
    pub to: DeliveryStatus,
}

impl DeliveryAttempt {
    pub fn queued(draft: AttemptDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: AttemptId::new(),
            campaign_id: draft.campaign_id,
            recipient: draft.recipient,
            channel: draft.channel,
            payload: draft.payload,
            provider_message_id: None,
            status: DeliveryStatus::Queued,
            attempt_number: 1,
            exhausted: false,
            error_reason: None,
            created_at: now,
            last_updated_at: now,
        }
    }

    /// DELIVERED, or FAILED with no retry left.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            DeliveryStatus::Delivered => true,
            DeliveryStatus::Failed => self.exhausted,
            _ => false,
        }
    }

    /// Apply `transition` in place.
    ///
    /// Same-status updates and lower-rank receipts on a live attempt are
    /// no-ops; moving a terminal attempt backwards is an error.
    pub fn apply(
        &mut self,
        transition: &AttemptTransition,
        now: DateTime<Utc>,
    ) -> Result<Change, InvalidTransition> {
        let change = match transition {
            AttemptTransition::Status(update) => self.apply_status(update)?,
            AttemptTransition::MarkRetrying => {
                if self.status != DeliveryStatus::Failed || self.exhausted {
                    return Err(self.invalid(DeliveryStatus::Retrying));
                }
                self.status = DeliveryStatus::Retrying;
                Change::Applied
            }
            AttemptTransition::Restart => {
                if self.status != DeliveryStatus::Retrying {
                    return Err(self.invalid(DeliveryStatus::Queued));
                }
                self.status = DeliveryStatus::Queued;
                self.attempt_number += 1;
                self.provider_message_id = None;
                self.error_reason = None;
                Change::Applied
            }
            AttemptTransition::Exhaust { reason } => {
                if self.status == DeliveryStatus::Delivered {
                    return Err(self.invalid(DeliveryStatus::Failed));
                }
                if self.status == DeliveryStatus::Failed && self.exhausted {
                    return Ok(Change::Unchanged);
                }
                self.status = DeliveryStatus::Failed;
                self.exhausted = true;
                if reason.is_some() {
                    self.error_reason = reason.clone();
                }
                Change::Applied
            }
        };
        if change == Change::Applied {
            self.last_updated_at = now;
        }
        Ok(change)
    }

    fn apply_status(&mut self, update: &StatusUpdate) -> Result<Change, InvalidTransition> {
        if update.status == self.status {
            return Ok(Change::Unchanged);
        }
        let rank = update.status.rank();
        let current = self.status.rank();
        if self.is_terminal() {
            if rank <= current {
                return Err(self.invalid(update.status));
            }
        } else if rank <= current || update.status == DeliveryStatus::Retrying {
            // Stale or equal-rank receipt; RETRYING is orchestrator-only.
            return Ok(Change::Unchanged);
        }

        self.status = update.status;
        if let Some(id) = &update.provider_message_id {
            self.provider_message_id = Some(id.clone());
        }
        match update.status {
            DeliveryStatus::Delivered => {
                self.exhausted = false;
                self.error_reason = None;
            }
            DeliveryStatus::Failed => self.error_reason = update.error_reason.clone(),
            _ => {}
        }
        Ok(Change::Applied)
    }

    fn invalid(&self, to: DeliveryStatus) -> InvalidTransition {
        InvalidTransition {
            from: self.status,
            to,
        }
    }
}

/// Filters for listing sends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttemptFilter {
    pub campaign_id: Option<CampaignId>,
    pub channel: Option<Channel>,
    pub status: Option<DeliveryStatus>,
}

/// Per-status counters over a filtered set of sends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttemptStats {
    pub total: u64,
    pub queued: u64,
    pub sent: u64,
    pub delivered: u64,
    pub failed: u64,
    pub retrying: u64,
}

impl AttemptStats {
    pub fn add(&mut self, status: DeliveryStatus, count: u64) {
        self.total += count;
        match status {
            DeliveryStatus::Queued => self.queued += count,
            DeliveryStatus::Sent => self.sent += count,
            DeliveryStatus::Delivered => self.delivered += count,
            DeliveryStatus::Failed => self.failed += count,
            DeliveryStatus::Retrying => self.retrying += count,
        }
    }
}

// ── Retry events ─────────────────────────────────────────────────────────────

/// One retry decision for a delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryEvent {
    pub id: RetryEventId,
    pub attempt_id: AttemptId,
    /// The failed try this decision answers.
    pub attempt_number: i32,
    pub scheduled_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub outcome: RetryOutcome,
    pub error_reason: Option<String>,
}

impl RetryEvent {
    /// A retry to run at `scheduled_at`.
    pub fn pending(
        attempt: &DeliveryAttempt,
        scheduled_at: DateTime<Utc>,
        error_reason: Option<String>,
    ) -> Self {
        Self {
            id: RetryEventId::new(),
            attempt_id: attempt.id,
            attempt_number: attempt.attempt_number,
            scheduled_at,
            executed_at: None,
            outcome: RetryOutcome::Pending,
            error_reason,
        }
    }

    /// The terminal decision; never scheduled.
    pub fn exhausted(
        attempt: &DeliveryAttempt,
        now: DateTime<Utc>,
        error_reason: Option<String>,
    ) -> Self {
        Self {
            id: RetryEventId::new(),
            attempt_id: attempt.id,
            attempt_number: attempt.attempt_number,
            scheduled_at: now,
            executed_at: Some(now),
            outcome: RetryOutcome::Exhausted,
            error_reason,
        }
    }

    /// Where firing this event has to pick up, given the attempt as stored.
    ///
    /// `None` once the attempt has moved past this event.
    pub fn resume_point(&self, attempt: &DeliveryAttempt) -> Option<RetryResume> {
        match attempt.status {
            DeliveryStatus::Retrying if attempt.attempt_number == self.attempt_number => {
                Some(RetryResume::Restart)
            }
            DeliveryStatus::Queued if attempt.attempt_number == self.attempt_number + 1 => {
                Some(RetryResume::Resend)
            }
            _ => None,
        }
    }
}

/// Next step of a retry that has been claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryResume {
    /// The attempt still waits in RETRYING.
    Restart,
    /// The attempt was restarted but its send never completed.
    Resend,
}

// ── Campaign history ─────────────────────────────────────────────────────────

/// Read-side summary of one campaign's sends.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignHistory {
    pub campaign_id: CampaignId,
    pub retry_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub attempts: Vec<DeliveryAttempt>,
}

impl CampaignHistory {
    /// Attempts must already be ordered by `created_at`.
    pub fn from_attempts(campaign_id: CampaignId, attempts: Vec<DeliveryAttempt>) -> Self {
        let retry_count = attempts
            .iter()
            .map(|a| u64::try_from(a.attempt_number - 1).unwrap_or(0))
            .sum();
        let success_count = attempts
            .iter()
            .filter(|a| a.status == DeliveryStatus::Delivered)
            .count() as u64;
        let failure_count = attempts
            .iter()
            .filter(|a| a.status == DeliveryStatus::Failed && a.exhausted)
            .count() as u64;
        Self {
            campaign_id,
            retry_count,
            success_count,
            failure_count,
            attempts,
        }
    }
}

// ── Chat ─────────────────────────────────────────────────────────────────────

/// Conversation state for one (contact, channel) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSession {
    pub id: SessionId,
    pub contact_id: String,
    pub channel: Channel,
    pub current_node_id: Option<String>,
    pub variables: BTreeMap<String, String>,
    pub active: bool,
    pub version: i64,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(contact_id: &str, channel: Channel, now: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            contact_id: contact_id.to_owned(),
            channel,
            current_node_id: None,
            variables: BTreeMap::new(),
            active: true,
            version: 0,
            last_message_at: now,
            created_at: now,
        }
    }

    /// Inactive, or silent for longer than `timeout`.
    pub fn is_idle(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        !self.active || now - self.last_message_at > timeout
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

/// One message in a chat session's log.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: ChatMessageId,
    pub session_id: SessionId,
    pub direction: MessageDirection,
    pub body: String,
    /// Outbound messages reference the send that carried them.
    pub attempt_id: Option<AttemptId>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn inbound(session_id: SessionId, body: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: ChatMessageId::new(),
            session_id,
            direction: MessageDirection::Inbound,
            body: body.to_owned(),
            attempt_id: None,
            created_at: now,
        }
    }

    pub fn outbound(
        session_id: SessionId,
        body: &str,
        attempt_id: AttemptId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ChatMessageId::new(),
            session_id,
            direction: MessageDirection::Outbound,
            body: body.to_owned(),
            attempt_id: Some(attempt_id),
            created_at: now,
        }
    }
}
