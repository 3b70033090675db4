use courier_domain::channel::Channel;
use courier_domain::status::{DeliveryStatus, RetryOutcome};
use courier_messaging::domain::provider::{ErrorClass, Receipt};
use courier_messaging::domain::types::{AttemptDraft, DeliveryAttempt};
use courier_messaging::usecase::reconcile::{Reconciled, StatusReconciler};

use crate::helpers::{MemoryCampaigns, MemoryLedger, ScriptedProvider, orchestrator, transient};

type Reconciler = StatusReconciler<MemoryLedger, MemoryCampaigns, ScriptedProvider>;

fn receipt(pmid: &str, status: DeliveryStatus) -> Receipt {
    Receipt {
        provider_message_id: pmid.to_owned(),
        status,
        failure: (status == DeliveryStatus::Failed).then_some(ErrorClass::Transient),
        reason: None,
    }
}

async fn sent_attempt(reconciler: &Reconciler, recipient: &str) -> DeliveryAttempt {
    reconciler
        .orchestrator
        .dispatch(AttemptDraft {
            campaign_id: None,
            recipient: recipient.to_owned(),
            channel: Channel::Whatsapp,
            payload: "hello".to_owned(),
        })
        .await
        .unwrap()
}

fn reconciler(provider: ScriptedProvider) -> Reconciler {
    StatusReconciler {
        orchestrator: orchestrator(provider),
    }
}

#[tokio::test]
async fn should_apply_delivered_twice_as_once() {
    let reconciler = reconciler(ScriptedProvider::new());
    let attempt = sent_attempt(&reconciler, "+1").await;
    let pmid = attempt.provider_message_id.clone().unwrap();

    let first = reconciler
        .apply_receipt(receipt(&pmid, DeliveryStatus::Delivered))
        .await
        .unwrap();
    let after_first = reconciler.orchestrator.ledger.attempt(attempt.id);
    let second = reconciler
        .apply_receipt(receipt(&pmid, DeliveryStatus::Delivered))
        .await
        .unwrap();

    assert!(matches!(first, Reconciled::Applied(_)));
    assert!(matches!(second, Reconciled::Ignored(_)));
    assert_eq!(reconciler.orchestrator.ledger.attempt(attempt.id), after_first);
}

#[tokio::test]
async fn should_converge_on_delivered_regardless_of_receipt_order() {
    let reconciler = reconciler(ScriptedProvider::new());
    let a = sent_attempt(&reconciler, "+1").await;
    let b = sent_attempt(&reconciler, "+2").await;
    let pa = a.provider_message_id.clone().unwrap();
    let pb = b.provider_message_id.clone().unwrap();

    for status in [DeliveryStatus::Sent, DeliveryStatus::Delivered, DeliveryStatus::Failed] {
        reconciler.apply_receipt(receipt(&pa, status)).await.unwrap();
    }
    for status in [DeliveryStatus::Sent, DeliveryStatus::Failed, DeliveryStatus::Delivered] {
        reconciler.apply_receipt(receipt(&pb, status)).await.unwrap();
    }

    let ledger = &reconciler.orchestrator.ledger;
    assert_eq!(ledger.attempt(a.id).status, DeliveryStatus::Delivered);
    assert_eq!(ledger.attempt(b.id).status, DeliveryStatus::Delivered);
    // The FAILED receipt scheduled a retry for b; delivery resolved it.
    assert!(
        ledger
            .events_of(b.id)
            .iter()
            .all(|e| e.outcome == RetryOutcome::Succeeded)
    );
}

#[tokio::test]
async fn should_never_revert_delivered() {
    let reconciler = reconciler(ScriptedProvider::new());
    let attempt = sent_attempt(&reconciler, "+1").await;
    let pmid = attempt.provider_message_id.clone().unwrap();
    reconciler
        .apply_receipt(receipt(&pmid, DeliveryStatus::Delivered))
        .await
        .unwrap();

    let outcome = reconciler
        .apply_receipt(receipt(&pmid, DeliveryStatus::Sent))
        .await
        .unwrap();

    assert!(matches!(outcome, Reconciled::Ignored(ref a) if a.status == DeliveryStatus::Delivered));
}

#[tokio::test]
async fn should_drop_receipt_for_unknown_provider_id() {
    let reconciler = reconciler(ScriptedProvider::new());

    let outcome = reconciler
        .apply_receipt(receipt("wamid.unknown", DeliveryStatus::Delivered))
        .await
        .unwrap();

    assert_eq!(outcome, Reconciled::Unknown);
    assert!(reconciler.orchestrator.ledger.attempts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_hand_failed_receipt_to_retry_orchestrator() {
    let reconciler = reconciler(ScriptedProvider::new());
    let attempt = sent_attempt(&reconciler, "+1").await;
    let pmid = attempt.provider_message_id.clone().unwrap();

    reconciler
        .apply_receipt(Receipt {
            provider_message_id: pmid,
            status: DeliveryStatus::Failed,
            failure: Some(ErrorClass::Transient),
            reason: Some("handset unreachable".to_owned()),
        })
        .await
        .unwrap();

    let ledger = &reconciler.orchestrator.ledger;
    let stored = ledger.attempt(attempt.id);
    assert_eq!(stored.status, DeliveryStatus::Retrying);
    let events = ledger.events_of(attempt.id);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].outcome, RetryOutcome::Pending);
    assert_eq!(events[0].error_reason.as_deref(), Some("handset unreachable"));
}

#[tokio::test]
async fn should_apply_polled_status() {
    let provider = ScriptedProvider::new();
    let reconciler = reconciler(provider.clone());
    let attempt = sent_attempt(&reconciler, "+1").await;
    let pmid = attempt.provider_message_id.clone().unwrap();
    provider
        .receipts
        .lock()
        .unwrap()
        .insert(pmid.clone(), receipt(&pmid, DeliveryStatus::Delivered));

    let updated = reconciler.query_status(attempt.id).await.unwrap();

    assert_eq!(updated.status, DeliveryStatus::Delivered);
}

#[tokio::test]
async fn should_return_unacknowledged_attempt_unchanged_on_query() {
    let provider = ScriptedProvider::with_script(vec![Err(transient())]);
    let reconciler = reconciler(provider.clone());
    let attempt = sent_attempt(&reconciler, "+1").await;
    assert!(attempt.provider_message_id.is_none());

    let queried = reconciler.query_status(attempt.id).await.unwrap();

    assert_eq!(queried, attempt);
    assert_eq!(provider.call_count(), 1);
}
