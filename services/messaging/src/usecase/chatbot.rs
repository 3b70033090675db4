use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use courier_domain::channel::Channel;
use courier_domain::id::SessionId;

use crate::domain::flow::{FlowGraph, FlowStep, InboundInput};
use crate::domain::provider::ProviderPort;
use crate::domain::repository::{CampaignRepository, ChatSessionRepository, DeliveryLedger};
use crate::domain::types::{AttemptDraft, ChatMessage, DeliveryAttempt};
use crate::error::MessagingError;
use crate::usecase::retry::RetryOrchestrator;

/// Optimistic-concurrency retries before giving up on a busy session.
const MAX_VERSION_CONFLICTS: usize = 3;

/// A message received from a contact.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub contact_id: String,
    pub channel: Channel,
    pub input: InboundInput,
}

/// What the engine did with one inbound message.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub session_id: SessionId,
    pub node_id: Option<String>,
    /// One send per emitted response, in order.
    pub responses: Vec<DeliveryAttempt>,
    pub loop_detected: bool,
}

/// Flow evaluation without side effects.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowPreview {
    pub matched: bool,
    pub node_id: Option<String>,
    pub variables: BTreeMap<String, String>,
    pub responses: Vec<String>,
    pub loop_detected: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct ChatSettings {
    pub hop_cap: usize,
    pub idle_timeout: chrono::Duration,
}

/// Drives one conversation per (contact, channel) through the flow graph.
#[derive(Clone)]
pub struct ChatbotEngine<S, L, C, P>
where
    S: ChatSessionRepository,
    L: DeliveryLedger,
    C: CampaignRepository,
    P: ProviderPort,
{
    pub sessions: S,
    pub orchestrator: RetryOrchestrator<L, C, P>,
    pub flow: Arc<FlowGraph>,
    pub settings: ChatSettings,
}

impl<S, L, C, P> ChatbotEngine<S, L, C, P>
where
    S: ChatSessionRepository,
    L: DeliveryLedger,
    C: CampaignRepository,
    P: ProviderPort,
{
    pub async fn handle_inbound(
        &self,
        message: InboundMessage,
    ) -> Result<ChatReply, MessagingError> {
        let now = Utc::now();
        let mut session = self
            .sessions
            .get_or_create(&message.contact_id, message.channel, now)
            .await?;
        self.sessions
            .append_message(&ChatMessage::inbound(session.id, &message.input.text, now))
            .await?;

        let mut conflicts = 0;
        let (node_id, responses, loop_detected) = loop {
            let reset = session.is_idle(now, self.settings.idle_timeout);
            let (current, variables) = if reset {
                (None, BTreeMap::new())
            } else {
                (session.current_node_id.clone(), session.variables.clone())
            };

            let evaluated = self.flow.evaluate(
                current.as_deref(),
                &variables,
                &message.input,
                self.settings.hop_cap,
            );
            let (node_id, variables, responses, loop_detected) = match evaluated {
                Ok(FlowStep::Unmatched) if !reset => {
                    debug!(session_id = %session.id, "no entry rule matched; message logged only");
                    self.sessions.touch(session.id, now).await?;
                    return Ok(ChatReply {
                        session_id: session.id,
                        node_id: None,
                        responses: Vec::new(),
                        loop_detected: false,
                    });
                }
                Ok(FlowStep::Unmatched) => (None, BTreeMap::new(), Vec::new(), false),
                Ok(FlowStep::Advanced {
                    node_id,
                    variables,
                    responses,
                    ..
                }) => (node_id, variables, responses, false),
                Err(e) => {
                    warn!(
                        session_id = %session.id,
                        hops = e.hops,
                        error = %e,
                        "flow loop; resetting session"
                    );
                    (
                        None,
                        BTreeMap::new(),
                        vec![self.flow.fallback().to_owned()],
                        true,
                    )
                }
            };

            if self
                .sessions
                .set_flow_state(session.id, session.version, node_id.as_deref(), &variables, now)
                .await?
            {
                if reset {
                    info!(session_id = %session.id, "idle session reset");
                }
                break (node_id, responses, loop_detected);
            }

            conflicts += 1;
            if conflicts >= MAX_VERSION_CONFLICTS {
                return Err(anyhow::anyhow!(
                    "chat session {} changed concurrently {conflicts} times",
                    session.id
                )
                .into());
            }
            session = self
                .sessions
                .find_by_id(session.id)
                .await?
                .ok_or(MessagingError::SessionNotFound(session.id))?;
        };

        // Session state is committed; provider I/O happens without it held.
        let mut sent = Vec::with_capacity(responses.len());
        for body in responses {
            let attempt = self
                .orchestrator
                .dispatch(AttemptDraft {
                    campaign_id: None,
                    recipient: session.contact_id.clone(),
                    channel: session.channel,
                    payload: body.clone(),
                })
                .await?;
            self.sessions
                .append_message(&ChatMessage::outbound(
                    session.id,
                    &body,
                    attempt.id,
                    Utc::now(),
                ))
                .await?;
            sent.push(attempt);
        }

        Ok(ChatReply {
            session_id: session.id,
            node_id,
            responses: sent,
            loop_detected,
        })
    }
}

/// Evaluate `input` from `current` without touching sessions or providers.
pub fn preview_flow(
    flow: &FlowGraph,
    hop_cap: usize,
    current: Option<&str>,
    variables: &BTreeMap<String, String>,
    input: &InboundInput,
) -> FlowPreview {
    match flow.evaluate(current, variables, input, hop_cap) {
        Ok(FlowStep::Unmatched) => FlowPreview {
            matched: false,
            node_id: None,
            variables: BTreeMap::new(),
            responses: Vec::new(),
            loop_detected: false,
        },
        Ok(FlowStep::Advanced {
            node_id,
            variables,
            responses,
            ..
        }) => FlowPreview {
            matched: true,
            node_id,
            variables,
            responses,
            loop_detected: false,
        },
        Err(_) => FlowPreview {
            matched: true,
            node_id: None,
            variables: BTreeMap::new(),
            responses: vec![flow.fallback().to_owned()],
            loop_detected: true,
        },
    }
}
