use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::domain::provider::ProviderPort;
use crate::domain::repository::{CampaignRepository, ChatSessionRepository, DeliveryLedger};
use crate::error::MessagingError;
use crate::usecase::retry::{RetryExecution, RetryOrchestrator};
use crate::usecase::session::SweepIdleSessionsUseCase;

/// Counters from one polling pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTick {
    pub executed: usize,
    pub cancelled: usize,
    pub skipped: usize,
    pub failed: usize,
    pub sessions_swept: u64,
}

/// Background loop that fires due retry events and retires idle sessions.
pub struct RetryWorker<S, L, C, P>
where
    S: ChatSessionRepository,
    L: DeliveryLedger,
    C: CampaignRepository,
    P: ProviderPort,
{
    pub orchestrator: RetryOrchestrator<L, C, P>,
    pub sweep: SweepIdleSessionsUseCase<S>,
    pub batch_size: u64,
}

impl<S, L, C, P> RetryWorker<S, L, C, P>
where
    S: ChatSessionRepository,
    L: DeliveryLedger,
    C: CampaignRepository,
    P: ProviderPort,
{
    /// One pass: execute up to `batch_size` due events, including ones whose
    /// claim expired unresolved, then sweep sessions.
    ///
    /// A failing event is logged and counted; it never aborts the pass.
    pub async fn tick(&self) -> Result<WorkerTick, MessagingError> {
        let now = Utc::now();
        let expired_before = self.orchestrator.policy.claim_expiry(now);
        let due = self
            .orchestrator
            .ledger
            .list_due(now, expired_before, self.batch_size)
            .await?;

        let mut tick = WorkerTick::default();
        for event in due {
            match self.orchestrator.execute_retry(event.id).await {
                Ok(RetryExecution::Executed(_)) | Ok(RetryExecution::AlreadyDelivered(_)) => {
                    tick.executed += 1
                }
                Ok(RetryExecution::Cancelled(_)) => tick.cancelled += 1,
                Ok(RetryExecution::Skipped) => tick.skipped += 1,
                Err(e) => {
                    tick.failed += 1;
                    warn!(retry_event_id = %event.id, error = %e, "retry execution failed");
                }
            }
        }

        tick.sessions_swept = self.sweep.execute(now).await?;
        Ok(tick)
    }

    /// Poll forever at `every`.
    pub async fn run(self, every: Duration) {
        info!(interval_ms = every.as_millis() as u64, "retry worker started");
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match self.tick().await {
                Ok(tick) if tick == WorkerTick::default() => {}
                Ok(tick) => debug!(?tick, "retry worker pass"),
                Err(e) => warn!(error = %e, "retry worker pass failed"),
            }
        }
    }
}
