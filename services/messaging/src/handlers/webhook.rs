use std::collections::BTreeMap;

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use courier_domain::channel::Channel;

use crate::domain::flow::InboundInput;
use crate::error::MessagingError;
use crate::state::AppState;
use crate::usecase::chatbot::{InboundMessage, preview_flow};
use crate::usecase::webhook::{
    SIGNATURE_HEADER, WebhookPayload, WebhookSummary, verify_signature, verify_subscription,
};

// ── GET /webhook ─────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

pub async fn verify_webhook(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    match verify_subscription(
        query.mode.as_deref(),
        query.verify_token.as_deref(),
        query.challenge.as_deref(),
        &state.webhook_verify_token,
    ) {
        Some(challenge) => {
            info!("webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        }
        None => {
            warn!(mode = ?query.mode, "webhook verification rejected");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

// ── POST /webhook ────────────────────────────────────────────────────────────

/// Acknowledge every well-signed delivery with 200, even if it cannot be used.
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookSummary>, MessagingError> {
    if let Some(secret) = state.whatsapp_app_secret.as_deref() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        if !verify_signature(secret, &body, signature) {
            warn!("webhook signature mismatch");
            return Err(MessagingError::InvalidSignature);
        }
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "undecodable webhook body dropped");
            return Ok(Json(WebhookSummary::default()));
        }
    };
    let summary = state.webhook().execute(payload).await;
    info!(?summary, "webhook processed");
    Ok(Json(summary))
}

// ── POST /webhook/test-message ───────────────────────────────────────────────

#[derive(Deserialize)]
pub struct TestMessageRequest {
    pub text: String,
    /// Treat `text` as a button reply id.
    #[serde(default)]
    pub button: bool,
    /// Preview from this node instead of the entry rules.
    #[serde(default)]
    pub current_node_id: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// Run through a real session and send the responses.
    #[serde(default)]
    pub dispatch: bool,
    #[serde(default)]
    pub contact_id: Option<String>,
    #[serde(default)]
    pub channel: Option<Channel>,
}

#[derive(Serialize)]
pub struct TestMessageResponse {
    pub matched: bool,
    pub node_id: Option<String>,
    pub responses: Vec<String>,
    pub variables: BTreeMap<String, String>,
    pub loop_detected: bool,
    pub session_id: Option<String>,
    pub attempt_ids: Vec<String>,
}

pub async fn test_message(
    State(state): State<AppState>,
    Json(request): Json<TestMessageRequest>,
) -> Result<Json<TestMessageResponse>, MessagingError> {
    let input = if request.button {
        InboundInput::button(&request.text)
    } else {
        InboundInput::text(&request.text)
    };

    if !request.dispatch {
        let preview = preview_flow(
            &state.flow,
            state.chat.hop_cap,
            request.current_node_id.as_deref(),
            &request.variables,
            &input,
        );
        return Ok(Json(TestMessageResponse {
            matched: preview.matched,
            node_id: preview.node_id,
            responses: preview.responses,
            variables: preview.variables,
            loop_detected: preview.loop_detected,
            session_id: None,
            attempt_ids: Vec::new(),
        }));
    }

    let contact_id = request
        .contact_id
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| {
            MessagingError::InvalidInput("contact_id is required to dispatch".to_owned())
        })?;
    let reply = state
        .chatbot()
        .handle_inbound(InboundMessage {
            contact_id,
            channel: request.channel.unwrap_or(Channel::Whatsapp),
            input,
        })
        .await?;
    Ok(Json(TestMessageResponse {
        matched: reply.node_id.is_some() || !reply.responses.is_empty(),
        node_id: reply.node_id,
        attempt_ids: reply.responses.iter().map(|a| a.id.to_string()).collect(),
        responses: reply.responses.into_iter().map(|a| a.payload).collect(),
        variables: BTreeMap::new(),
        loop_detected: reply.loop_detected,
        session_id: Some(reply.session_id.to_string()),
    }))
}
