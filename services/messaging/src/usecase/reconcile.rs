use tracing::{info, warn};

use courier_domain::id::AttemptId;
use courier_domain::status::{DeliveryStatus, RetryOutcome};

use crate::domain::provider::{ErrorClass, ProviderPort, Receipt};
use crate::domain::repository::{CampaignRepository, DeliveryLedger};
use crate::domain::types::{AttemptTransition, DeliveryAttempt, StatusUpdate};
use crate::error::MessagingError;
use crate::usecase::retry::RetryOrchestrator;

/// Result of applying one receipt.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    Applied(DeliveryAttempt),
    /// Duplicate, stale or invalid for the attempt's current state.
    Ignored(DeliveryAttempt),
    /// No send carries this provider message id.
    Unknown,
}

/// Folds provider delivery reports into the ledger.
#[derive(Clone)]
pub struct StatusReconciler<L, C, P>
where
    L: DeliveryLedger,
    C: CampaignRepository,
    P: ProviderPort,
{
    pub orchestrator: RetryOrchestrator<L, C, P>,
}

impl<L, C, P> StatusReconciler<L, C, P>
where
    L: DeliveryLedger,
    C: CampaignRepository,
    P: ProviderPort,
{
    /// Apply a canonical receipt. Unknown provider ids are dropped.
    pub async fn apply_receipt(&self, receipt: Receipt) -> Result<Reconciled, MessagingError> {
        let Some(attempt) = self
            .orchestrator
            .ledger
            .find_by_provider_message_id(&receipt.provider_message_id)
            .await?
        else {
            warn!(
                provider_message_id = %receipt.provider_message_id,
                status = %receipt.status,
                "dropping receipt for unknown provider message"
            );
            return Ok(Reconciled::Unknown);
        };

        if receipt.status == DeliveryStatus::Failed {
            let class = receipt.failure.unwrap_or(ErrorClass::Permanent);
            let reason = receipt
                .reason
                .unwrap_or_else(|| "provider reported failure".to_owned());
            let before = attempt.clone();
            let after = self
                .orchestrator
                .handle_failure(attempt.id, class, reason)
                .await?;
            return Ok(if after == before {
                Reconciled::Ignored(after)
            } else {
                Reconciled::Applied(after)
            });
        }

        let (updated, applied) = self
            .orchestrator
            .apply_transition(
                attempt.id,
                AttemptTransition::Status(StatusUpdate::status(receipt.status)),
            )
            .await?;
        if !applied {
            return Ok(Reconciled::Ignored(updated));
        }
        if updated.status == DeliveryStatus::Delivered {
            self.orchestrator
                .ledger
                .resolve_events(updated.id, RetryOutcome::Succeeded)
                .await?;
        }
        info!(
            attempt_id = %updated.id,
            status = %updated.status,
            "delivery status updated"
        );
        Ok(Reconciled::Applied(updated))
    }

    /// Ask the provider for the current status of a send and apply it.
    pub async fn query_status(
        &self,
        attempt_id: AttemptId,
    ) -> Result<DeliveryAttempt, MessagingError> {
        let ledger = &self.orchestrator.ledger;
        let attempt = ledger
            .find_by_id(attempt_id)
            .await?
            .ok_or(MessagingError::AttemptNotFound(attempt_id))?;
        let Some(provider_message_id) = attempt.provider_message_id.as_deref() else {
            // Not acknowledged by the provider yet.
            return Ok(attempt);
        };

        let receipt = self
            .orchestrator
            .provider
            .query_status(attempt.channel, provider_message_id)
            .await?;
        match self.apply_receipt(receipt).await? {
            Reconciled::Applied(updated) | Reconciled::Ignored(updated) => Ok(updated),
            Reconciled::Unknown => ledger
                .find_by_id(attempt_id)
                .await?
                .ok_or(MessagingError::AttemptNotFound(attempt_id)),
        }
    }
}
