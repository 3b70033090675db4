use anyhow::Context as _;
use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use courier_domain::channel::Channel;
use courier_domain::id::{AttemptId, CampaignId, RetryEventId};
use courier_domain::status::{DeliveryStatus, RetryOutcome};

use crate::config::RetryPolicy;
use crate::domain::provider::{ErrorClass, ProviderPort};
use crate::domain::repository::{CampaignRepository, DeliveryLedger};
use crate::domain::types::{
    AttemptDraft, AttemptTransition, Change, DeliveryAttempt, RetryEvent, RetryResume,
    StatusUpdate,
};
use crate::error::MessagingError;

/// What happened when a due retry event fired.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryExecution {
    /// The send went out again; the attempt carries the new status.
    Executed(DeliveryAttempt),
    /// The campaign was cancelled; the attempt is now exhausted.
    Cancelled(DeliveryAttempt),
    /// A receipt arrived before the retry was due.
    AlreadyDelivered(DeliveryAttempt),
    /// Another worker claimed the event, or the attempt moved on.
    Skipped,
}

/// Sends messages, records their lifecycle and decides on retries.
///
/// Provider calls are made outside any ledger lock; each ledger transition
/// is its own short locked step.
#[derive(Clone)]
pub struct RetryOrchestrator<L, C, P>
where
    L: DeliveryLedger,
    C: CampaignRepository,
    P: ProviderPort,
{
    pub ledger: L,
    pub campaigns: C,
    pub provider: P,
    pub policy: RetryPolicy,
}

impl<L, C, P> RetryOrchestrator<L, C, P>
where
    L: DeliveryLedger,
    C: CampaignRepository,
    P: ProviderPort,
{
    // ── Sending ──────────────────────────────────────────────────────────────

    /// Record a QUEUED attempt and hand it to the provider.
    pub async fn dispatch(&self, draft: AttemptDraft) -> Result<DeliveryAttempt, MessagingError> {
        let attempt = DeliveryAttempt::queued(draft, Utc::now());
        self.ledger.insert(&attempt).await?;
        debug!(
            attempt_id = %attempt.id,
            channel = %attempt.channel,
            campaign_id = ?attempt.campaign_id.map(|c| c.0),
            "send queued"
        );
        self.send(attempt).await
    }

    /// Queue one send per recipient, in order.
    pub async fn dispatch_campaign(
        &self,
        campaign_id: CampaignId,
        channel: Channel,
        recipients: Vec<String>,
        body: &str,
    ) -> Result<Vec<DeliveryAttempt>, MessagingError> {
        if self.campaigns.is_cancelled(campaign_id).await? {
            return Err(MessagingError::CampaignCancelled(campaign_id));
        }
        let attempts: Vec<DeliveryAttempt> = stream::iter(recipients)
            .then(move |recipient| {
                self.dispatch(AttemptDraft {
                    campaign_id: Some(campaign_id),
                    recipient,
                    channel,
                    payload: body.to_owned(),
                })
            })
            .try_collect()
            .await?;
        info!(campaign_id = %campaign_id, sends = attempts.len(), "campaign dispatched");
        Ok(attempts)
    }

    /// Flag a campaign so its pending retries are dropped when they fire.
    pub async fn cancel_campaign(&self, campaign_id: CampaignId) -> Result<bool, MessagingError> {
        let newly = self.campaigns.cancel(campaign_id, Utc::now()).await?;
        if newly {
            info!(campaign_id = %campaign_id, "campaign cancelled");
        }
        Ok(newly)
    }

    async fn send(&self, attempt: DeliveryAttempt) -> Result<DeliveryAttempt, MessagingError> {
        match self
            .provider
            .send(attempt.channel, &attempt.recipient, &attempt.payload)
            .await
        {
            Ok(accepted) => {
                let update = StatusUpdate {
                    status: DeliveryStatus::Sent,
                    provider_message_id: Some(accepted.provider_message_id),
                    error_reason: None,
                };
                let (sent, applied) = self
                    .apply_transition(attempt.id, AttemptTransition::Status(update))
                    .await?;
                if applied && sent.attempt_number > 1 {
                    self.ledger
                        .resolve_events(sent.id, RetryOutcome::Succeeded)
                        .await?;
                }
                Ok(sent)
            }
            Err(e) => {
                warn!(
                    attempt_id = %attempt.id,
                    attempt_number = attempt.attempt_number,
                    error = %e,
                    "provider send failed"
                );
                self.handle_failure(attempt.id, e.class(), e.to_string())
                    .await
            }
        }
    }

    // ── Failure handling ─────────────────────────────────────────────────────

    /// Record a failure and either schedule the next try or make it terminal.
    ///
    /// Retries only transient failures below the attempt cap. A duplicate or
    /// stale failure report leaves the attempt untouched.
    pub async fn handle_failure(
        &self,
        attempt_id: AttemptId,
        class: ErrorClass,
        reason: String,
    ) -> Result<DeliveryAttempt, MessagingError> {
        let update = StatusUpdate {
            status: DeliveryStatus::Failed,
            provider_message_id: None,
            error_reason: Some(reason.clone()),
        };
        let (failed, applied) = self
            .apply_transition(attempt_id, AttemptTransition::Status(update))
            .await?;
        if !applied {
            return Ok(failed);
        }

        if class == ErrorClass::Transient && failed.attempt_number < self.policy.max_attempts {
            let (retrying, applied) = self
                .apply_transition(attempt_id, AttemptTransition::MarkRetrying)
                .await?;
            if !applied {
                return Ok(retrying);
            }
            let delay = chrono::Duration::from_std(self.policy.delay(retrying.attempt_number))
                .context("retry delay out of range")?;
            let scheduled_at = Utc::now() + delay;
            let event = RetryEvent::pending(&retrying, scheduled_at, Some(reason));
            self.ledger.insert_event(&event).await?;
            info!(
                attempt_id = %attempt_id,
                attempt_number = retrying.attempt_number,
                retry_event_id = %event.id,
                scheduled_at = %scheduled_at,
                "retry scheduled"
            );
            Ok(retrying)
        } else {
            self.exhaust(attempt_id, reason).await
        }
    }

    async fn exhaust(
        &self,
        attempt_id: AttemptId,
        reason: String,
    ) -> Result<DeliveryAttempt, MessagingError> {
        let (exhausted, applied) = self
            .apply_transition(
                attempt_id,
                AttemptTransition::Exhaust {
                    reason: Some(reason.clone()),
                },
            )
            .await?;
        if !applied {
            return Ok(exhausted);
        }
        let event = RetryEvent::exhausted(&exhausted, Utc::now(), Some(reason));
        self.ledger.insert_event(&event).await?;
        self.ledger
            .resolve_events(attempt_id, RetryOutcome::Exhausted)
            .await?;
        warn!(
            attempt_id = %attempt_id,
            attempt_number = exhausted.attempt_number,
            "delivery exhausted"
        );
        Ok(exhausted)
    }

    // ── Retry execution ──────────────────────────────────────────────────────

    /// Fire a due retry event. Safe to call concurrently for the same event.
    ///
    /// A claim left unresolved past the lease is taken over and resumed from
    /// wherever the attempt stopped.
    pub async fn execute_retry(
        &self,
        event_id: RetryEventId,
    ) -> Result<RetryExecution, MessagingError> {
        let now = Utc::now();
        let claimed = self
            .ledger
            .claim_event(event_id, now, self.policy.claim_expiry(now))
            .await?;
        let Some(event) = claimed else {
            debug!(retry_event_id = %event_id, "retry event already claimed");
            return Ok(RetryExecution::Skipped);
        };
        let attempt = self
            .ledger
            .find_by_id(event.attempt_id)
            .await?
            .ok_or(MessagingError::AttemptNotFound(event.attempt_id))?;

        let cancelled = match attempt.campaign_id {
            Some(campaign_id) => self.campaigns.is_cancelled(campaign_id).await?,
            None => false,
        };
        if cancelled {
            let (exhausted, _) = self
                .apply_transition(
                    attempt.id,
                    AttemptTransition::Exhaust {
                        reason: Some("campaign cancelled".to_owned()),
                    },
                )
                .await?;
            self.ledger
                .resolve_events(attempt.id, RetryOutcome::Exhausted)
                .await?;
            info!(attempt_id = %attempt.id, retry_event_id = %event_id, "retry dropped for cancelled campaign");
            return Ok(RetryExecution::Cancelled(exhausted));
        }

        if attempt.status == DeliveryStatus::Delivered {
            self.ledger
                .resolve_events(attempt.id, RetryOutcome::Succeeded)
                .await?;
            return Ok(RetryExecution::AlreadyDelivered(attempt));
        }

        let queued = match event.resume_point(&attempt) {
            Some(RetryResume::Restart) => {
                let (restarted, applied) = self
                    .apply_transition(attempt.id, AttemptTransition::Restart)
                    .await?;
                if !applied {
                    return Ok(RetryExecution::Skipped);
                }
                restarted
            }
            Some(RetryResume::Resend) => {
                warn!(
                    attempt_id = %attempt.id,
                    retry_event_id = %event_id,
                    "resuming interrupted retry"
                );
                attempt
            }
            None => {
                debug!(
                    attempt_id = %attempt.id,
                    retry_event_id = %event_id,
                    status = %attempt.status,
                    "retry event superseded"
                );
                return Ok(RetryExecution::Skipped);
            }
        };
        info!(
            attempt_id = %queued.id,
            attempt_number = queued.attempt_number,
            "retrying send"
        );
        Ok(RetryExecution::Executed(self.send(queued).await?))
    }

    // ── Ledger access ────────────────────────────────────────────────────────

    /// Run a transition; an invalid one is logged and treated as a no-op.
    ///
    /// Returns the attempt as stored afterwards and whether it changed.
    pub async fn apply_transition(
        &self,
        attempt_id: AttemptId,
        transition: AttemptTransition,
    ) -> Result<(DeliveryAttempt, bool), MessagingError> {
        match self
            .ledger
            .transition(attempt_id, &transition, Utc::now())
            .await
        {
            Ok(Some((attempt, change))) => Ok((attempt, change == Change::Applied)),
            Ok(None) => Err(MessagingError::AttemptNotFound(attempt_id)),
            Err(MessagingError::InvalidTransition(e)) => {
                warn!(
                    attempt_id = %attempt_id,
                    from = %e.from,
                    to = %e.to,
                    "ignoring invalid transition"
                );
                let attempt = self
                    .ledger
                    .find_by_id(attempt_id)
                    .await?
                    .ok_or(MessagingError::AttemptNotFound(attempt_id))?;
                Ok((attempt, false))
            }
            Err(e) => Err(e),
        }
    }
}
