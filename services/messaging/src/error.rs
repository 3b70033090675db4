use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use courier_domain::id::{AttemptId, CampaignId, SessionId};

use crate::domain::provider::ProviderError;
use crate::domain::types::InvalidTransition;

/// Messaging service error variants.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("campaign {0} not found")]
    CampaignNotFound(CampaignId),
    #[error("campaign {0} is cancelled")]
    CampaignCancelled(CampaignId),
    #[error("delivery attempt {0} not found")]
    AttemptNotFound(AttemptId),
    #[error("chat session {0} not found")]
    SessionNotFound(SessionId),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    /// Raw provider details stay in the logs.
    #[error("message provider unavailable")]
    Provider(ProviderError),
    #[error("{0}")]
    Config(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("invalid webhook signature")]
    InvalidSignature,
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl From<ProviderError> for MessagingError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Config(message) => Self::Config(message),
            other => Self::Provider(other),
        }
    }
}

impl MessagingError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CampaignNotFound(_) => "CAMPAIGN_NOT_FOUND",
            Self::CampaignCancelled(_) => "CAMPAIGN_CANCELLED",
            Self::AttemptNotFound(_) => "ATTEMPT_NOT_FOUND",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for MessagingError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::CampaignNotFound(_) | Self::AttemptNotFound(_) | Self::SessionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::CampaignCancelled(_) | Self::InvalidTransition(_) => StatusCode::CONFLICT,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_) | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        match &self {
            Self::Internal(e) => tracing::error!(error = %e, kind = "INTERNAL", "internal error"),
            Self::Provider(e) => tracing::warn!(error = %e, kind = "PROVIDER_ERROR", "provider error"),
            _ => {}
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
