use courier_domain::channel::Channel;
use courier_domain::id::CampaignId;
use courier_domain::status::{DeliveryStatus, RetryOutcome};
use courier_messaging::config::EmptyCampaignPolicy;
use courier_messaging::domain::types::{AttemptTransition, StatusUpdate};
use courier_messaging::error::MessagingError;
use courier_messaging::usecase::history::{GetCampaignHistoryUseCase, GetRetryHistoryUseCase};

use crate::helpers::{MemoryLedger, ScriptedProvider, drain_retries, orchestrator, transient};

/// Five sends: the 2nd and 4th fail once and recover on retry; all deliver.
async fn seeded_campaign() -> MemoryLedger {
    let provider = ScriptedProvider::with_script(vec![
        Ok(()),
        Err(transient()),
        Ok(()),
        Err(transient()),
        Ok(()),
    ]);
    let orch = orchestrator(provider);
    let recipients = (1..=5).map(|i| format!("+1555000{i}")).collect();
    let attempts = orch
        .dispatch_campaign(CampaignId(11), Channel::Sms, recipients, "promo")
        .await
        .unwrap();
    drain_retries(&orch).await;
    for attempt in attempts {
        orch.apply_transition(
            attempt.id,
            AttemptTransition::Status(StatusUpdate::status(DeliveryStatus::Delivered)),
        )
        .await
        .unwrap();
    }
    orch.ledger
}

#[tokio::test]
async fn should_count_retries_across_campaign() {
    let ledger = seeded_campaign().await;
    let usecase = GetCampaignHistoryUseCase {
        ledger,
        policy: EmptyCampaignPolicy::NotFound,
    };

    let history = usecase.execute(CampaignId(11)).await.unwrap();

    assert_eq!(history.retry_count, 2);
    assert_eq!(history.success_count, 5);
    assert_eq!(history.failure_count, 0);
    assert_eq!(history.attempts.len(), 5);
    let recipients: Vec<&str> = history.attempts.iter().map(|a| a.recipient.as_str()).collect();
    assert_eq!(
        recipients,
        vec!["+15550001", "+15550002", "+15550003", "+15550004", "+15550005"]
    );
    assert!(
        history
            .attempts
            .windows(2)
            .all(|w| w[0].created_at <= w[1].created_at)
    );
}

#[tokio::test]
async fn should_list_retry_events_with_recipient() {
    let ledger = seeded_campaign().await;
    let usecase = GetRetryHistoryUseCase {
        ledger,
        policy: EmptyCampaignPolicy::NotFound,
    };

    let retries = usecase.execute(CampaignId(11)).await.unwrap();

    assert_eq!(retries.len(), 2);
    let recipients: Vec<&str> = retries.iter().map(|r| r.recipient.as_str()).collect();
    assert!(recipients.contains(&"+15550002"));
    assert!(recipients.contains(&"+15550004"));
    assert!(retries.iter().all(|r| r.event.attempt_number == 1));
    assert!(retries.iter().all(|r| r.event.outcome == RetryOutcome::Succeeded));
}

#[tokio::test]
async fn should_report_not_found_for_empty_campaign_by_default() {
    let usecase = GetCampaignHistoryUseCase {
        ledger: MemoryLedger::new(),
        policy: EmptyCampaignPolicy::default(),
    };

    let result = usecase.execute(CampaignId(404)).await;

    assert!(
        matches!(result, Err(MessagingError::CampaignNotFound(CampaignId(404)))),
        "expected CampaignNotFound, got {result:?}"
    );
}

#[tokio::test]
async fn should_return_zeroes_for_empty_campaign_when_configured() {
    let history = GetCampaignHistoryUseCase {
        ledger: MemoryLedger::new(),
        policy: EmptyCampaignPolicy::Empty,
    }
    .execute(CampaignId(404))
    .await
    .unwrap();
    assert_eq!(history.retry_count, 0);
    assert!(history.attempts.is_empty());

    let retries = GetRetryHistoryUseCase {
        ledger: MemoryLedger::new(),
        policy: EmptyCampaignPolicy::Empty,
    }
    .execute(CampaignId(404))
    .await
    .unwrap();
    assert!(retries.is_empty());
}
