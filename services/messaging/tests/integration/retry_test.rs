use courier_domain::channel::Channel;
use courier_domain::id::CampaignId;
use courier_domain::status::{DeliveryStatus, RetryOutcome};
use courier_messaging::domain::repository::{CampaignRepository, DeliveryLedger};
use courier_messaging::domain::types::AttemptDraft;
use courier_messaging::error::MessagingError;
use courier_messaging::usecase::retry::RetryExecution;

use crate::helpers::{
    ScriptedProvider, drain_retries, orchestrator, permanent, transient,
};

fn draft(campaign: Option<i64>) -> AttemptDraft {
    AttemptDraft {
        campaign_id: campaign.map(CampaignId),
        recipient: "+15550100".to_owned(),
        channel: Channel::Sms,
        payload: "Your code is 1234".to_owned(),
    }
}

#[tokio::test]
async fn should_mark_sent_with_provider_id_on_success() {
    let orch = orchestrator(ScriptedProvider::new());

    let attempt = orch.dispatch(draft(None)).await.unwrap();

    assert_eq!(attempt.status, DeliveryStatus::Sent);
    assert_eq!(attempt.attempt_number, 1);
    assert_eq!(attempt.provider_message_id.as_deref(), Some("pm-1"));
    assert!(orch.ledger.events_of(attempt.id).is_empty());
}

#[tokio::test]
async fn should_exhaust_after_max_attempts_with_three_exhausted_events() {
    let provider = ScriptedProvider::failing(transient());
    let orch = orchestrator(provider.clone());

    let attempt = orch.dispatch(draft(Some(7))).await.unwrap();
    assert_eq!(attempt.status, DeliveryStatus::Retrying);

    let fired = drain_retries(&orch).await;
    assert_eq!(fired, 2);

    let stored = orch.ledger.attempt(attempt.id);
    assert_eq!(stored.status, DeliveryStatus::Failed);
    assert!(stored.exhausted);
    assert_eq!(stored.attempt_number, 3);
    assert_eq!(provider.call_count(), 3);

    let events = orch.ledger.events_of(attempt.id);
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.outcome == RetryOutcome::Exhausted));
    let numbers: Vec<i32> = events.iter().map(|e| e.attempt_number).collect();
    assert_eq!(numbers, vec![1, 2, 3], "each try answered once");
}

#[tokio::test]
async fn should_not_retry_permanent_failures() {
    let provider = ScriptedProvider::failing(permanent());
    let orch = orchestrator(provider.clone());

    let attempt = orch.dispatch(draft(None)).await.unwrap();

    assert_eq!(attempt.status, DeliveryStatus::Failed);
    assert!(attempt.exhausted);
    assert_eq!(drain_retries(&orch).await, 0);
    assert_eq!(provider.call_count(), 1);
    let events = orch.ledger.events_of(attempt.id);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].outcome, RetryOutcome::Exhausted);
    assert!(events[0].executed_at.is_some());
}

#[tokio::test]
async fn should_increase_attempt_number_and_mark_events_succeeded_on_recovery() {
    let provider = ScriptedProvider::with_script(vec![Err(transient()), Err(transient())]);
    let orch = orchestrator(provider.clone());

    let attempt = orch.dispatch(draft(None)).await.unwrap();
    assert_eq!(attempt.attempt_number, 1);

    drain_retries(&orch).await;

    let stored = orch.ledger.attempt(attempt.id);
    assert_eq!(stored.status, DeliveryStatus::Sent);
    assert_eq!(stored.attempt_number, 3);
    assert_eq!(stored.provider_message_id.as_deref(), Some("pm-3"));
    assert!(stored.error_reason.is_none());

    let events = orch.ledger.events_of(attempt.id);
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.outcome == RetryOutcome::Succeeded));
}

#[tokio::test]
async fn should_execute_a_claimed_event_only_once() {
    let provider = ScriptedProvider::with_script(vec![Err(transient())]);
    let orch = orchestrator(provider.clone());
    let attempt = orch.dispatch(draft(None)).await.unwrap();
    let event = orch.ledger.events_of(attempt.id).remove(0);

    let first = orch.execute_retry(event.id).await.unwrap();
    let second = orch.execute_retry(event.id).await.unwrap();

    assert!(matches!(first, RetryExecution::Executed(_)));
    assert_eq!(second, RetryExecution::Skipped);
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn should_drop_retry_for_cancelled_campaign_without_calling_provider() {
    let provider = ScriptedProvider::with_script(vec![Err(transient())]);
    let orch = orchestrator(provider.clone());
    let attempt = orch.dispatch(draft(Some(42))).await.unwrap();
    let event = orch.ledger.events_of(attempt.id).remove(0);

    assert!(orch.cancel_campaign(CampaignId(42)).await.unwrap());
    let outcome = orch.execute_retry(event.id).await.unwrap();

    let RetryExecution::Cancelled(cancelled) = outcome else {
        panic!("expected Cancelled, got {outcome:?}");
    };
    assert_eq!(cancelled.status, DeliveryStatus::Failed);
    assert!(cancelled.exhausted);
    assert_eq!(provider.call_count(), 1);
    assert!(
        orch.ledger
            .events_of(attempt.id)
            .iter()
            .all(|e| e.outcome == RetryOutcome::Exhausted)
    );
}

#[tokio::test]
async fn should_refuse_dispatch_for_cancelled_campaign() {
    let orch = orchestrator(ScriptedProvider::new());
    orch.campaigns
        .cancel(CampaignId(5), chrono::Utc::now())
        .await
        .unwrap();

    let result = orch
        .dispatch_campaign(CampaignId(5), Channel::Sms, vec!["+1".to_owned()], "hi")
        .await;

    assert!(
        matches!(result, Err(MessagingError::CampaignCancelled(CampaignId(5)))),
        "expected CampaignCancelled, got {result:?}"
    );
    assert!(orch.ledger.attempts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_dispatch_campaign_in_recipient_order() {
    let orch = orchestrator(ScriptedProvider::new());
    let recipients = vec!["+1".to_owned(), "+2".to_owned(), "+3".to_owned()];

    let attempts = orch
        .dispatch_campaign(CampaignId(9), Channel::Whatsapp, recipients, "sale")
        .await
        .unwrap();

    let sent_to: Vec<&str> = attempts.iter().map(|a| a.recipient.as_str()).collect();
    assert_eq!(sent_to, vec!["+1", "+2", "+3"]);
    assert!(attempts.iter().all(|a| a.status == DeliveryStatus::Sent));
    let stored = orch.ledger.find_by_campaign(CampaignId(9)).await.unwrap();
    assert_eq!(stored.len(), 3);
}

#[tokio::test]
async fn should_treat_cancelling_twice_as_already_cancelled() {
    let orch = orchestrator(ScriptedProvider::new());
    assert!(orch.cancel_campaign(CampaignId(3)).await.unwrap());
    assert!(!orch.cancel_campaign(CampaignId(3)).await.unwrap());
}
