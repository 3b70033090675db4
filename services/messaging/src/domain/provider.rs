#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};

use courier_domain::channel::Channel;
use courier_domain::status::DeliveryStatus;

/// Whether a failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
}

/// Provider accepted a message.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSendResult {
    pub provider_message_id: String,
    pub accepted_at: DateTime<Utc>,
}

/// Canonical status reported for one provider message.
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub provider_message_id: String,
    pub status: DeliveryStatus,
    /// Present when `status` is FAILED.
    pub failure: Option<ErrorClass>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("transient provider error: {0}")]
    Transient(String),
    #[error("permanent provider error: {0}")]
    Permanent(String),
    /// Missing or rejected channel credentials.
    #[error("{0}")]
    Config(String),
}

impl ProviderError {
    /// Configuration problems are never retried.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Transient(_) => ErrorClass::Transient,
            Self::Permanent(_) | Self::Config(_) => ErrorClass::Permanent,
        }
    }
}

/// Uniform access to the SMS and WhatsApp providers. Implementations never retry.
pub trait ProviderPort: Send + Sync {
    async fn send(
        &self,
        channel: Channel,
        recipient: &str,
        payload: &str,
    ) -> Result<ProviderSendResult, ProviderError>;

    async fn query_status(
        &self,
        channel: Channel,
        provider_message_id: &str,
    ) -> Result<Receipt, ProviderError>;

    async fn test_connectivity(&self, channel: Channel) -> Result<(), ProviderError>;
}

// ── Status vocabularies ──────────────────────────────────────────────────────

/// WhatsApp Cloud error codes that clear up on their own (rate limits, outages).
const WHATSAPP_TRANSIENT_CODES: [i64; 4] = [130429, 131000, 131016, 133004];

/// Map a WhatsApp status callback value. `read` counts as delivered.
pub fn canonical_whatsapp(status: &str) -> Option<DeliveryStatus> {
    match status.to_ascii_lowercase().as_str() {
        "sent" => Some(DeliveryStatus::Sent),
        "delivered" | "read" => Some(DeliveryStatus::Delivered),
        "failed" => Some(DeliveryStatus::Failed),
        _ => None,
    }
}

pub fn classify_whatsapp_error(code: Option<i64>) -> ErrorClass {
    match code {
        Some(code) if WHATSAPP_TRANSIENT_CODES.contains(&code) => ErrorClass::Transient,
        _ => ErrorClass::Permanent,
    }
}

/// Map an SMS gateway status. Returns the failure class for failed states.
pub fn canonical_sms(status: &str) -> Option<(DeliveryStatus, Option<ErrorClass>)> {
    let mapped = match status.to_ascii_lowercase().as_str() {
        "queued" | "accepted" | "scheduled" => (DeliveryStatus::Queued, None),
        "sending" | "sent" => (DeliveryStatus::Sent, None),
        "delivered" => (DeliveryStatus::Delivered, None),
        "undelivered" | "expired" => (DeliveryStatus::Failed, Some(ErrorClass::Transient)),
        "failed" | "rejected" => (DeliveryStatus::Failed, Some(ErrorClass::Permanent)),
        _ => return None,
    };
    Some(mapped)
}
