use std::sync::Arc;

use serde_json::json;

use courier_domain::status::DeliveryStatus;
use courier_messaging::usecase::chatbot::{ChatSettings, ChatbotEngine};
use courier_messaging::usecase::reconcile::StatusReconciler;
use courier_messaging::usecase::webhook::{ProcessWebhookUseCase, WebhookPayload};

use crate::helpers::{
    MemoryCampaigns, MemoryLedger, MemorySessions, ScriptedProvider, greeting_flow, orchestrator,
};

type Processor = ProcessWebhookUseCase<MemorySessions, MemoryLedger, MemoryCampaigns, ScriptedProvider>;

fn processor() -> Processor {
    let orch = orchestrator(ScriptedProvider::new());
    ProcessWebhookUseCase {
        reconciler: StatusReconciler {
            orchestrator: orch.clone(),
        },
        chatbot: ChatbotEngine {
            sessions: MemorySessions::default(),
            orchestrator: orch,
            flow: Arc::new(greeting_flow()),
            settings: ChatSettings {
                hop_cap: 10,
                idle_timeout: chrono::Duration::minutes(30),
            },
        },
    }
}

fn payload(value: serde_json::Value) -> WebhookPayload {
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn should_route_messages_to_chatbot() {
    let processor = processor();

    let summary = processor
        .execute(payload(json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "WABA",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "messages": [{
                            "from": "15550001",
                            "id": "wamid.in1",
                            "type": "text",
                            "text": { "body": "hello" }
                        }]
                    }
                }]
            }]
        })))
        .await;

    assert_eq!(summary.messages_handled, 1);
    assert_eq!(summary.failures, 0);
    let session = processor.chatbot.sessions.session("15550001");
    assert_eq!(session.current_node_id.as_deref(), Some("ask_name"));
}

#[tokio::test]
async fn should_apply_known_statuses_and_drop_unknown_ones() {
    let processor = processor();
    let attempt = processor
        .reconciler
        .orchestrator
        .dispatch(courier_messaging::domain::types::AttemptDraft {
            campaign_id: None,
            recipient: "15550001".to_owned(),
            channel: courier_domain::channel::Channel::Whatsapp,
            payload: "hi".to_owned(),
        })
        .await
        .unwrap();
    let pmid = attempt.provider_message_id.clone().unwrap();

    let summary = processor
        .execute(payload(json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "statuses": [
                            { "id": pmid, "status": "read", "recipient_id": "15550001" },
                            { "id": "wamid.ghost", "status": "delivered" },
                            { "id": pmid, "status": "deleted" }
                        ]
                    }
                }]
            }]
        })))
        .await;

    assert_eq!(summary.receipts_applied, 1);
    assert_eq!(summary.receipts_unknown, 1);
    assert_eq!(summary.receipts_ignored, 1);
    let ledger = &processor.reconciler.orchestrator.ledger;
    assert_eq!(ledger.attempt(attempt.id).status, DeliveryStatus::Delivered);
    assert_eq!(ledger.attempts.lock().unwrap().len(), 1, "no row created for unknown id");
}

#[tokio::test]
async fn should_route_button_replies_by_id() {
    let processor = processor();
    for body in [
        json!({ "from": "1", "type": "text", "text": { "body": "hello" } }),
        json!({ "from": "1", "type": "text", "text": { "body": "Ada" } }),
        json!({
            "from": "1",
            "type": "interactive",
            "interactive": { "type": "button_reply", "button_reply": { "id": "1", "title": "News" } }
        }),
    ] {
        processor
            .execute(payload(json!({
                "entry": [{ "changes": [{ "value": { "messages": [body] } }] }]
            })))
            .await;
    }

    let outbound: Vec<String> = processor
        .reconciler
        .orchestrator
        .provider
        .calls
        .lock()
        .unwrap()
        .iter()
        .map(|(_, _, body)| body.clone())
        .collect();
    assert_eq!(outbound.last().map(String::as_str), Some("No news today, Ada."));
}

#[tokio::test]
async fn should_ignore_unsupported_message_kinds() {
    let processor = processor();

    let summary = processor
        .execute(payload(json!({
            "entry": [{ "changes": [{ "value": { "messages": [
                { "from": "1", "type": "image", "image": { "id": "media-1" } }
            ] } }] }]
        })))
        .await;

    assert_eq!(summary.messages_handled, 0);
    assert_eq!(summary.failures, 0);
    assert!(processor.chatbot.sessions.sessions.lock().unwrap().is_empty());
}
