use std::sync::Arc;

use courier_domain::channel::Channel;
use courier_domain::pagination::PageRequest;
use courier_domain::status::DeliveryStatus;
use courier_messaging::domain::flow::{FlowGraph, InboundInput};
use courier_messaging::domain::repository::ChatSessionRepository;
use courier_messaging::domain::types::MessageDirection;
use courier_messaging::error::MessagingError;
use courier_messaging::usecase::chatbot::{ChatSettings, ChatbotEngine, InboundMessage};

use crate::helpers::{
    MemoryCampaigns, MemoryLedger, MemorySessions, ScriptedProvider, greeting_flow,
    looping_flow, orchestrator,
};

type Engine = ChatbotEngine<MemorySessions, MemoryLedger, MemoryCampaigns, ScriptedProvider>;

fn engine(flow: FlowGraph) -> Engine {
    ChatbotEngine {
        sessions: MemorySessions::default(),
        orchestrator: orchestrator(ScriptedProvider::new()),
        flow: Arc::new(flow),
        settings: ChatSettings {
            hop_cap: 10,
            idle_timeout: chrono::Duration::minutes(30),
        },
    }
}

fn text(contact: &str, body: &str) -> InboundMessage {
    InboundMessage {
        contact_id: contact.to_owned(),
        channel: Channel::Whatsapp,
        input: InboundInput::text(body),
    }
}

fn payloads(reply: &courier_messaging::usecase::chatbot::ChatReply) -> Vec<&str> {
    reply.responses.iter().map(|a| a.payload.as_str()).collect()
}

#[tokio::test]
async fn should_walk_flow_and_render_captured_variables() {
    let engine = engine(greeting_flow());

    let first = engine.handle_inbound(text("+1", "hello there")).await.unwrap();
    assert_eq!(first.node_id.as_deref(), Some("ask_name"));
    assert_eq!(payloads(&first), vec!["What's your name?"]);

    let second = engine.handle_inbound(text("+1", "Ada")).await.unwrap();
    assert_eq!(second.node_id.as_deref(), Some("greet"));
    assert_eq!(payloads(&second), vec!["Hi Ada!", "Reply 1 for news."]);

    let third = engine.handle_inbound(text("+1", "1")).await.unwrap();
    assert_eq!(third.node_id, None, "flow ends after the last node");
    assert_eq!(payloads(&third), vec!["No news today, Ada."]);

    let session = engine.sessions.session("+1");
    assert!(session.current_node_id.is_none());
    assert!(session.variables.is_empty());
}

#[tokio::test]
async fn should_send_responses_as_chatbot_attempts_and_log_them() {
    let engine = engine(greeting_flow());

    let reply = engine.handle_inbound(text("+1", "hello")).await.unwrap();

    let attempt = &reply.responses[0];
    assert_eq!(attempt.campaign_id, None);
    assert_eq!(attempt.recipient, "+1");
    assert_eq!(attempt.channel, Channel::Whatsapp);
    assert_eq!(attempt.status, DeliveryStatus::Sent);

    let log = engine
        .sessions
        .list_messages(reply.session_id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].direction, MessageDirection::Outbound);
    assert_eq!(log[0].attempt_id, Some(attempt.id));
    assert_eq!(log[1].direction, MessageDirection::Inbound);
    assert_eq!(log[1].body, "hello");
}

#[tokio::test]
async fn should_only_log_message_when_no_entry_rule_matches() {
    let engine = engine(greeting_flow());

    let reply = engine.handle_inbound(text("+1", "what is this")).await.unwrap();

    assert!(reply.responses.is_empty());
    assert!(reply.node_id.is_none());
    assert_eq!(engine.sessions.messages.lock().unwrap().len(), 1);
    assert_eq!(engine.orchestrator.provider.call_count(), 0);
}

#[tokio::test]
async fn should_send_fallback_when_current_node_has_no_way_forward() {
    let engine = engine(greeting_flow());
    engine.handle_inbound(text("+1", "hello")).await.unwrap();
    engine.handle_inbound(text("+1", "Ada")).await.unwrap();

    let reply = engine.handle_inbound(text("+1", "7")).await.unwrap();

    assert_eq!(payloads(&reply), vec!["Sorry, I did not get that."]);
    assert!(engine.sessions.session("+1").current_node_id.is_none());
}

#[tokio::test]
async fn should_reset_on_flow_loop_and_send_fallback() {
    let engine = engine(looping_flow());

    let reply = engine.handle_inbound(text("+1", "anything")).await.unwrap();

    assert!(reply.loop_detected);
    assert_eq!(payloads(&reply), vec!["Let's start over."]);
    let session = engine.sessions.session("+1");
    assert!(session.current_node_id.is_none());
    assert!(session.variables.is_empty());
}

#[tokio::test]
async fn should_restart_idle_session_from_entry_rules() {
    let engine = engine(greeting_flow());
    engine.handle_inbound(text("+1", "hello")).await.unwrap();
    engine.sessions.backdate("+1", chrono::Duration::hours(2));

    // Would have been captured as a name if the session were still live.
    let reply = engine.handle_inbound(text("+1", "hello again")).await.unwrap();

    assert_eq!(reply.node_id.as_deref(), Some("ask_name"));
    assert_eq!(payloads(&reply), vec!["What's your name?"]);
    assert!(engine.sessions.session("+1").variables.is_empty());
}

#[tokio::test]
async fn should_retry_version_conflicts() {
    let engine = engine(greeting_flow());
    *engine.sessions.forced_conflicts.lock().unwrap() = 2;

    let reply = engine.handle_inbound(text("+1", "hello")).await.unwrap();

    assert_eq!(reply.node_id.as_deref(), Some("ask_name"));
    assert_eq!(engine.sessions.session("+1").version, 1);
}

#[tokio::test]
async fn should_give_up_after_repeated_version_conflicts() {
    let engine = engine(greeting_flow());
    *engine.sessions.forced_conflicts.lock().unwrap() = 3;

    let result = engine.handle_inbound(text("+1", "hello")).await;

    assert!(
        matches!(result, Err(MessagingError::Internal(_))),
        "expected Internal, got {result:?}"
    );
    assert_eq!(engine.orchestrator.provider.call_count(), 0);
}

#[tokio::test]
async fn should_keep_separate_sessions_per_channel() {
    let engine = engine(greeting_flow());
    engine.handle_inbound(text("+1", "hello")).await.unwrap();

    let sms = engine
        .handle_inbound(InboundMessage {
            contact_id: "+1".to_owned(),
            channel: Channel::Sms,
            input: InboundInput::text("Ada"),
        })
        .await
        .unwrap();

    assert!(sms.responses.is_empty(), "SMS session has no active flow");
    assert_eq!(engine.sessions.sessions.lock().unwrap().len(), 2);
}
