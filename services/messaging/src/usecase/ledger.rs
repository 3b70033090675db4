use courier_domain::id::AttemptId;
use courier_domain::pagination::PageRequest;

use crate::domain::repository::DeliveryLedger;
use crate::domain::types::{AttemptFilter, AttemptStats, DeliveryAttempt};
use crate::error::MessagingError;

// ── ListAttempts ─────────────────────────────────────────────────────────────

pub struct ListAttemptsUseCase<L: DeliveryLedger> {
    pub ledger: L,
}

impl<L: DeliveryLedger> ListAttemptsUseCase<L> {
    pub async fn execute(
        &self,
        filter: AttemptFilter,
        page: PageRequest,
    ) -> Result<Vec<DeliveryAttempt>, MessagingError> {
        self.ledger.list(&filter, page).await
    }
}

// ── AttemptStats ─────────────────────────────────────────────────────────────

pub struct AttemptStatsUseCase<L: DeliveryLedger> {
    pub ledger: L,
}

impl<L: DeliveryLedger> AttemptStatsUseCase<L> {
    pub async fn execute(&self, filter: AttemptFilter) -> Result<AttemptStats, MessagingError> {
        self.ledger.stats(&filter).await
    }
}

// ── PurgeAttempt ─────────────────────────────────────────────────────────────

pub struct PurgeAttemptUseCase<L: DeliveryLedger> {
    pub ledger: L,
}

impl<L: DeliveryLedger> PurgeAttemptUseCase<L> {
    pub async fn execute(&self, id: AttemptId) -> Result<(), MessagingError> {
        if !self.ledger.purge(id).await? {
            return Err(MessagingError::AttemptNotFound(id));
        }
        tracing::info!(attempt_id = %id, "send purged");
        Ok(())
    }
}
