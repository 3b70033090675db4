//! WhatsApp Cloud webhook: subscription handshake, signature check and
//! event routing.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{error, warn};

use courier_domain::channel::Channel;
use courier_domain::status::DeliveryStatus;

use crate::domain::flow::InboundInput;
use crate::domain::provider::{
    ProviderPort, Receipt, canonical_whatsapp, classify_whatsapp_error,
};
use crate::domain::repository::{CampaignRepository, ChatSessionRepository, DeliveryLedger};
use crate::usecase::chatbot::{ChatbotEngine, InboundMessage};
use crate::usecase::reconcile::{Reconciled, StatusReconciler};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Echo the challenge iff this is a subscribe request carrying our token.
pub fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected_token: &str,
) -> Option<String> {
    if expected_token.is_empty() || mode != Some("subscribe") || token != Some(expected_token) {
        return None;
    }
    challenge.map(str::to_owned)
}

/// Check an `X-Hub-Signature-256: sha256=<hex>` header against the raw body.
pub fn verify_signature(app_secret: &str, body: &[u8], header: Option<&str>) -> bool {
    let Some(digest) = header.map(str::trim).and_then(|h| h.strip_prefix("sha256=")) else {
        return false;
    };
    let Ok(expected) = hex::decode(digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// `sha256=<hex>` signature for `body`.
pub fn sign(app_secret: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(app_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

// ── Payload ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messages: Vec<WhatsappMessage>,
    #[serde(default)]
    pub statuses: Vec<WhatsappStatus>,
}

#[derive(Debug, Deserialize)]
pub struct WhatsappMessage {
    pub from: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub text: Option<WhatsappText>,
    pub interactive: Option<WhatsappInteractive>,
    pub button: Option<WhatsappButton>,
}

#[derive(Debug, Deserialize)]
pub struct WhatsappText {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct WhatsappInteractive {
    pub button_reply: Option<WhatsappReply>,
    pub list_reply: Option<WhatsappReply>,
}

#[derive(Debug, Deserialize)]
pub struct WhatsappReply {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct WhatsappButton {
    pub payload: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WhatsappStatus {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub errors: Vec<WhatsappError>,
}

#[derive(Debug, Deserialize)]
pub struct WhatsappError {
    pub code: Option<i64>,
    pub title: Option<String>,
    pub message: Option<String>,
}

impl WhatsappMessage {
    /// Text and reply messages; media and other kinds yield `None`.
    /// Replies match on the button id, falling back to its title.
    pub fn input(&self) -> Option<InboundInput> {
        match self.kind.as_str() {
            "text" => self.text.as_ref().map(|t| InboundInput::text(&t.body)),
            "interactive" => {
                let interactive = self.interactive.as_ref()?;
                let reply = interactive
                    .button_reply
                    .as_ref()
                    .or(interactive.list_reply.as_ref())?;
                let value = if reply.id.is_empty() { &reply.title } else { &reply.id };
                Some(InboundInput::button(value))
            }
            "button" => {
                let button = self.button.as_ref()?;
                button
                    .payload
                    .as_deref()
                    .or(button.text.as_deref())
                    .map(InboundInput::button)
            }
            _ => None,
        }
    }
}

impl WhatsappStatus {
    pub fn receipt(&self) -> Option<Receipt> {
        let status = canonical_whatsapp(&self.status)?;
        let first_error = self.errors.first();
        let (failure, reason) = if status == DeliveryStatus::Failed {
            let reason = first_error.and_then(|e| e.message.clone().or_else(|| e.title.clone()));
            (
                Some(classify_whatsapp_error(first_error.and_then(|e| e.code))),
                reason,
            )
        } else {
            (None, None)
        };
        Some(Receipt {
            provider_message_id: self.id.clone(),
            status,
            failure,
            reason,
        })
    }
}

// ── ProcessWebhook ───────────────────────────────────────────────────────────

/// Counters for one webhook delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct WebhookSummary {
    pub receipts_applied: usize,
    pub receipts_ignored: usize,
    pub receipts_unknown: usize,
    pub messages_handled: usize,
    pub failures: usize,
}

/// Routes status callbacks to the reconciler and user messages to the chatbot.
///
/// Per-event failures are logged and counted, never propagated: the
/// provider must always get its acknowledgement.
pub struct ProcessWebhookUseCase<S, L, C, P>
where
    S: ChatSessionRepository,
    L: DeliveryLedger,
    C: CampaignRepository,
    P: ProviderPort,
{
    pub reconciler: StatusReconciler<L, C, P>,
    pub chatbot: ChatbotEngine<S, L, C, P>,
}

impl<S, L, C, P> ProcessWebhookUseCase<S, L, C, P>
where
    S: ChatSessionRepository,
    L: DeliveryLedger,
    C: CampaignRepository,
    P: ProviderPort,
{
    pub async fn execute(&self, payload: WebhookPayload) -> WebhookSummary {
        let mut summary = WebhookSummary::default();
        let values = payload
            .entry
            .into_iter()
            .flat_map(|entry| entry.changes)
            .map(|change| change.value);

        for value in values {
            for status in &value.statuses {
                let Some(receipt) = status.receipt() else {
                    warn!(provider_message_id = %status.id, status = %status.status, "unrecognised status");
                    summary.receipts_ignored += 1;
                    continue;
                };
                match self.reconciler.apply_receipt(receipt).await {
                    Ok(Reconciled::Applied(_)) => summary.receipts_applied += 1,
                    Ok(Reconciled::Ignored(_)) => summary.receipts_ignored += 1,
                    Ok(Reconciled::Unknown) => summary.receipts_unknown += 1,
                    Err(e) => {
                        error!(provider_message_id = %status.id, error = %e, "failed to apply receipt");
                        summary.failures += 1;
                    }
                }
            }

            for message in &value.messages {
                let Some(input) = message.input() else {
                    warn!(from = %message.from, kind = %message.kind, "unsupported inbound message");
                    continue;
                };
                let inbound = InboundMessage {
                    contact_id: message.from.clone(),
                    channel: Channel::Whatsapp,
                    input,
                };
                match self.chatbot.handle_inbound(inbound).await {
                    Ok(_) => summary.messages_handled += 1,
                    Err(e) => {
                        error!(from = %message.from, error = %e, "failed to handle inbound message");
                        summary.failures += 1;
                    }
                }
            }
        }
        summary
    }
}
