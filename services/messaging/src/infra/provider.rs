use std::time::Duration;

use anyhow::Context as _;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use courier_domain::channel::Channel;
use courier_domain::status::DeliveryStatus;

use crate::config::{SmsGatewayConfig, WhatsappCloudConfig};
use crate::domain::provider::{
    ErrorClass, ProviderError, ProviderPort, ProviderSendResult, Receipt, canonical_sms,
    classify_whatsapp_error,
};

/// HTTP adapters for the SMS gateway and the WhatsApp Cloud API.
///
/// A channel without credentials answers every call with `ProviderError::Config`.
#[derive(Clone)]
pub struct HttpProviders {
    client: Client,
    sms: Option<SmsGatewayConfig>,
    whatsapp: Option<WhatsappCloudConfig>,
}

impl HttpProviders {
    pub fn new(
        sms: Option<SmsGatewayConfig>,
        whatsapp: Option<WhatsappCloudConfig>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("build provider HTTP client")?;
        Ok(Self {
            client,
            sms,
            whatsapp,
        })
    }

    fn sms(&self) -> Result<&SmsGatewayConfig, ProviderError> {
        self.sms
            .as_ref()
            .ok_or_else(|| ProviderError::Config("SMS gateway is not configured".to_owned()))
    }

    fn whatsapp(&self) -> Result<&WhatsappCloudConfig, ProviderError> {
        self.whatsapp
            .as_ref()
            .ok_or_else(|| ProviderError::Config("WhatsApp Cloud API is not configured".to_owned()))
    }
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SmsSendResponse {
    message_id: String,
}

#[derive(Deserialize)]
struct SmsStatusResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct WhatsappSendResponse {
    messages: Vec<WhatsappMessageRef>,
}

#[derive(Deserialize)]
struct WhatsappMessageRef {
    id: String,
}

#[derive(Deserialize)]
struct WhatsappErrorBody {
    error: WhatsappErrorDetail,
}

#[derive(Deserialize)]
struct WhatsappErrorDetail {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

// ── Error classification ─────────────────────────────────────────────────────

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Transport failures are transient; an unparseable success body is not.
fn request_error(err: reqwest::Error) -> ProviderError {
    if err.is_decode() {
        ProviderError::Permanent(format!("unexpected provider response: {err}"))
    } else {
        ProviderError::Transient(format!("provider request failed: {err}"))
    }
}

async fn send_request(request: RequestBuilder) -> Result<Response, ProviderError> {
    request.send().await.map_err(request_error)
}

async fn check_sms(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = format!("SMS gateway returned {status}: {body}");
    if is_transient_status(status) {
        Err(ProviderError::Transient(message))
    } else {
        Err(ProviderError::Permanent(message))
    }
}

async fn check_whatsapp(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<WhatsappErrorBody>(&body)
        .ok()
        .map(|b| b.error);
    let code = detail.as_ref().and_then(|d| d.code);
    let message = match detail.and_then(|d| d.message) {
        Some(text) => format!("WhatsApp returned {status} (code {code:?}): {text}"),
        None => format!("WhatsApp returned {status}: {body}"),
    };
    if is_transient_status(status) || classify_whatsapp_error(code) == ErrorClass::Transient {
        Err(ProviderError::Transient(message))
    } else {
        Err(ProviderError::Permanent(message))
    }
}

fn connectivity_error(channel: Channel, err: ProviderError) -> ProviderError {
    match err {
        ProviderError::Config(_) => err,
        other => ProviderError::Config(format!("{channel} connectivity check failed: {other}")),
    }
}

// ── Port ─────────────────────────────────────────────────────────────────────

impl ProviderPort for HttpProviders {
    async fn send(
        &self,
        channel: Channel,
        recipient: &str,
        payload: &str,
    ) -> Result<ProviderSendResult, ProviderError> {
        let provider_message_id = match channel {
            Channel::Sms => {
                let cfg = self.sms()?;
                let response = send_request(
                    self.client
                        .post(format!("{}/messages", cfg.base_url.trim_end_matches('/')))
                        .bearer_auth(&cfg.api_key)
                        .json(&json!({ "from": cfg.sender_id, "to": recipient, "text": payload })),
                )
                .await?;
                let body: SmsSendResponse = check_sms(response)
                    .await?
                    .json()
                    .await
                    .map_err(request_error)?;
                body.message_id
            }
            Channel::Whatsapp => {
                let cfg = self.whatsapp()?;
                let response = send_request(
                    self.client
                        .post(format!(
                            "{}/{}/messages",
                            cfg.base_url.trim_end_matches('/'),
                            cfg.phone_number_id
                        ))
                        .bearer_auth(&cfg.access_token)
                        .json(&json!({
                            "messaging_product": "whatsapp",
                            "to": recipient,
                            "type": "text",
                            "text": { "body": payload },
                        })),
                )
                .await?;
                let body: WhatsappSendResponse = check_whatsapp(response)
                    .await?
                    .json()
                    .await
                    .map_err(request_error)?;
                body.messages
                    .into_iter()
                    .next()
                    .map(|m| m.id)
                    .ok_or_else(|| {
                        ProviderError::Permanent("WhatsApp response carried no message id".into())
                    })?
            }
        };
        debug!(%channel, %provider_message_id, "provider accepted message");
        Ok(ProviderSendResult {
            provider_message_id,
            accepted_at: Utc::now(),
        })
    }

    async fn query_status(
        &self,
        channel: Channel,
        provider_message_id: &str,
    ) -> Result<Receipt, ProviderError> {
        match channel {
            Channel::Sms => {
                let cfg = self.sms()?;
                let response = send_request(
                    self.client
                        .get(format!(
                            "{}/messages/{provider_message_id}",
                            cfg.base_url.trim_end_matches('/')
                        ))
                        .bearer_auth(&cfg.api_key),
                )
                .await?;
                let body: SmsStatusResponse = check_sms(response)
                    .await?
                    .json()
                    .await
                    .map_err(request_error)?;
                let (status, failure) = canonical_sms(&body.status).ok_or_else(|| {
                    ProviderError::Permanent(format!("unknown SMS status {:?}", body.status))
                })?;
                Ok(Receipt {
                    provider_message_id: provider_message_id.to_owned(),
                    status,
                    failure,
                    reason: body.error.filter(|_| status == DeliveryStatus::Failed),
                })
            }
            // Status reaches us through webhook callbacks only.
            Channel::Whatsapp => Err(ProviderError::Permanent(
                "WhatsApp does not support status queries".to_owned(),
            )),
        }
    }

    async fn test_connectivity(&self, channel: Channel) -> Result<(), ProviderError> {
        self.ping(channel)
            .await
            .map_err(|e| connectivity_error(channel, e))
    }
}

impl HttpProviders {
    /// Cheap authenticated GET against the channel's account resource.
    async fn ping(&self, channel: Channel) -> Result<(), ProviderError> {
        match channel {
            Channel::Sms => {
                let cfg = self.sms()?;
                let response = send_request(
                    self.client
                        .get(format!("{}/account", cfg.base_url.trim_end_matches('/')))
                        .bearer_auth(&cfg.api_key),
                )
                .await?;
                check_sms(response).await?;
            }
            Channel::Whatsapp => {
                let cfg = self.whatsapp()?;
                let response = send_request(
                    self.client
                        .get(format!(
                            "{}/{}",
                            cfg.base_url.trim_end_matches('/'),
                            cfg.phone_number_id
                        ))
                        .bearer_auth(&cfg.access_token),
                )
                .await?;
                check_whatsapp(response).await?;
            }
        }
        Ok(())
    }
}
