use courier_domain::channel::Channel;
use courier_domain::status::{DeliveryStatus, RetryOutcome};
use chrono::Utc;
use courier_messaging::domain::repository::{ChatSessionRepository, DeliveryLedger};
use courier_messaging::domain::types::{AttemptDraft, AttemptTransition};
use courier_messaging::infra::worker::{RetryWorker, WorkerTick};
use courier_messaging::usecase::session::SweepIdleSessionsUseCase;

use crate::helpers::{
    MemoryCampaigns, MemoryLedger, MemorySessions, ScriptedProvider, TestOrchestrator,
    orchestrator, transient,
};

type TestWorker = RetryWorker<MemorySessions, MemoryLedger, MemoryCampaigns, ScriptedProvider>;

fn worker(orchestrator: TestOrchestrator, sessions: MemorySessions) -> TestWorker {
    RetryWorker {
        orchestrator,
        sweep: SweepIdleSessionsUseCase {
            sessions,
            idle_timeout: chrono::Duration::minutes(30),
        },
        batch_size: 10,
    }
}

fn draft() -> AttemptDraft {
    AttemptDraft {
        campaign_id: None,
        recipient: "+15550001".to_owned(),
        channel: Channel::Sms,
        payload: "hello".to_owned(),
    }
}

#[tokio::test]
async fn should_do_nothing_when_idle() {
    let worker = worker(orchestrator(ScriptedProvider::new()), MemorySessions::default());

    let tick = worker.tick().await.unwrap();

    assert_eq!(tick, WorkerTick::default());
}

#[tokio::test]
async fn should_execute_due_retry_events() {
    let orch = orchestrator(ScriptedProvider::with_script(vec![Err(transient())]));
    let attempt = orch.dispatch(draft()).await.unwrap();
    assert_eq!(attempt.status, DeliveryStatus::Retrying);
    let worker = worker(orch, MemorySessions::default());
    worker.orchestrator.ledger.make_all_due();

    let tick = worker.tick().await.unwrap();

    assert_eq!(tick.executed, 1);
    assert_eq!(tick.failed, 0);
    let ledger = &worker.orchestrator.ledger;
    assert_eq!(ledger.attempt(attempt.id).status, DeliveryStatus::Sent);
    let events = ledger.events_of(attempt.id);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].outcome, RetryOutcome::Succeeded);

    let again = worker.tick().await.unwrap();
    assert_eq!(again.executed, 0, "executed event is not due again");
}

#[tokio::test]
async fn should_take_over_a_claim_left_unresolved() {
    let orch = orchestrator(ScriptedProvider::with_script(vec![Err(transient())]));
    let attempt = orch.dispatch(draft()).await.unwrap();
    let worker = worker(orch, MemorySessions::default());
    let ledger = &worker.orchestrator.ledger;
    ledger.make_all_due();
    let event = ledger.events_of(attempt.id).remove(0);
    let now = Utc::now();
    let claimed = ledger
        .claim_event(event.id, now, now - chrono::Duration::hours(1))
        .await
        .unwrap();
    assert!(claimed.is_some());

    let within_lease = worker.tick().await.unwrap();
    assert_eq!(within_lease.executed, 0, "a live claim is left alone");
    assert_eq!(ledger.attempt(attempt.id).status, DeliveryStatus::Retrying);

    ledger.expire_claims();
    let tick = worker.tick().await.unwrap();

    assert_eq!(tick.executed, 1);
    let resumed = ledger.attempt(attempt.id);
    assert_eq!(resumed.status, DeliveryStatus::Sent);
    assert_eq!(resumed.attempt_number, 2);
    assert_eq!(ledger.events_of(attempt.id)[0].outcome, RetryOutcome::Succeeded);
}

#[tokio::test]
async fn should_resend_when_interrupted_after_restart() {
    let orch = orchestrator(ScriptedProvider::with_script(vec![Err(transient())]));
    let attempt = orch.dispatch(draft()).await.unwrap();
    let worker = worker(orch, MemorySessions::default());
    let ledger = &worker.orchestrator.ledger;
    ledger.make_all_due();
    let event = ledger.events_of(attempt.id).remove(0);
    let now = Utc::now();
    ledger
        .claim_event(event.id, now, now - chrono::Duration::hours(1))
        .await
        .unwrap();
    ledger
        .transition(attempt.id, &AttemptTransition::Restart, now)
        .await
        .unwrap();
    assert_eq!(ledger.attempt(attempt.id).status, DeliveryStatus::Queued);

    ledger.expire_claims();
    let tick = worker.tick().await.unwrap();

    assert_eq!(tick.executed, 1);
    let resumed = ledger.attempt(attempt.id);
    assert_eq!(resumed.status, DeliveryStatus::Sent);
    assert_eq!(resumed.attempt_number, 2, "no second restart");
    assert_eq!(worker.orchestrator.provider.call_count(), 2);
}

#[tokio::test]
async fn should_not_reoffer_a_superseded_claim() {
    let mut orch = orchestrator(ScriptedProvider::with_script(vec![
        Err(transient()),
        Err(transient()),
    ]));
    orch.policy.base_delay = std::time::Duration::from_secs(3600);
    orch.policy.max_delay = std::time::Duration::from_secs(7200);
    let attempt = orch.dispatch(draft()).await.unwrap();
    let worker = worker(orch, MemorySessions::default());
    let ledger = &worker.orchestrator.ledger;
    ledger.make_all_due();
    worker.tick().await.unwrap();
    let retried = ledger.attempt(attempt.id);
    assert_eq!(retried.status, DeliveryStatus::Retrying);
    assert_eq!(retried.attempt_number, 2);
    let first = ledger.events_of(attempt.id).remove(0);
    assert_eq!(first.outcome, RetryOutcome::Pending);
    assert!(first.executed_at.is_some());

    ledger.expire_claims();
    let tick = worker.tick().await.unwrap();

    assert_eq!(tick.executed, 0, "the attempt already moved past this event");
    assert_eq!(worker.orchestrator.provider.call_count(), 2);
}

#[tokio::test]
async fn should_not_fire_events_before_their_time() {
    let mut orch = orchestrator(ScriptedProvider::with_script(vec![Err(transient())]));
    orch.policy.base_delay = std::time::Duration::from_secs(3600);
    orch.dispatch(draft()).await.unwrap();
    let worker = worker(orch, MemorySessions::default());

    let tick = worker.tick().await.unwrap();

    assert_eq!(tick.executed, 0);
    assert_eq!(worker.orchestrator.provider.call_count(), 1);
}

#[tokio::test]
async fn should_sweep_idle_sessions() {
    let sessions = MemorySessions::default();
    let now = chrono::Utc::now();
    sessions.get_or_create("+15550001", Channel::Sms, now).await.unwrap();
    sessions.get_or_create("+15550002", Channel::Sms, now).await.unwrap();
    let id = sessions.session("+15550001").id;
    sessions
        .set_flow_state(id, 0, Some("menu"), &Default::default(), now)
        .await
        .unwrap();
    let id = sessions.session("+15550002").id;
    sessions
        .set_flow_state(id, 0, Some("menu"), &Default::default(), now)
        .await
        .unwrap();
    sessions.backdate("+15550001", chrono::Duration::hours(2));
    let worker = worker(orchestrator(ScriptedProvider::new()), sessions.clone());

    let tick = worker.tick().await.unwrap();

    assert_eq!(tick.sessions_swept, 1);
    assert!(!sessions.session("+15550001").active);
    assert!(sessions.session("+15550002").active);
}
