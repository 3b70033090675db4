use courier_domain::id::{AttemptId, CampaignId};

use crate::config::EmptyCampaignPolicy;
use crate::domain::repository::DeliveryLedger;
use crate::domain::types::{CampaignHistory, RetryEvent};
use crate::error::MessagingError;

// ── GetCampaignHistory ───────────────────────────────────────────────────────

pub struct GetCampaignHistoryUseCase<L: DeliveryLedger> {
    pub ledger: L,
    pub policy: EmptyCampaignPolicy,
}

impl<L: DeliveryLedger> GetCampaignHistoryUseCase<L> {
    pub async fn execute(&self, campaign_id: CampaignId) -> Result<CampaignHistory, MessagingError> {
        let attempts = self.ledger.find_by_campaign(campaign_id).await?;
        if attempts.is_empty() && self.policy == EmptyCampaignPolicy::NotFound {
            return Err(MessagingError::CampaignNotFound(campaign_id));
        }
        Ok(CampaignHistory::from_attempts(campaign_id, attempts))
    }
}

// ── GetRetryHistory ──────────────────────────────────────────────────────────

/// A retry event together with the send it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryAttempt {
    pub event: RetryEvent,
    pub recipient: String,
}

pub struct GetRetryHistoryUseCase<L: DeliveryLedger> {
    pub ledger: L,
    pub policy: EmptyCampaignPolicy,
}

impl<L: DeliveryLedger> GetRetryHistoryUseCase<L> {
    /// Retry events of the campaign ordered by attempt number.
    pub async fn execute(&self, campaign_id: CampaignId) -> Result<Vec<RetryAttempt>, MessagingError> {
        let attempts = self.ledger.find_by_campaign(campaign_id).await?;
        if attempts.is_empty() {
            return match self.policy {
                EmptyCampaignPolicy::NotFound => Err(MessagingError::CampaignNotFound(campaign_id)),
                EmptyCampaignPolicy::Empty => Ok(Vec::new()),
            };
        }
        let recipient_of = |id: AttemptId| {
            attempts
                .iter()
                .find(|a| a.id == id)
                .map(|a| a.recipient.clone())
                .unwrap_or_default()
        };
        let events = self.ledger.events_by_campaign(campaign_id).await?;
        Ok(events
            .into_iter()
            .map(|event| RetryAttempt {
                recipient: recipient_of(event.attempt_id),
                event,
            })
            .collect())
    }
}
