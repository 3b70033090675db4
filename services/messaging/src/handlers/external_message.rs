use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};

use courier_domain::channel::Channel;
use courier_domain::id::CampaignId;
use courier_domain::pagination::PageRequest;
use courier_domain::status::DeliveryStatus;

use crate::domain::types::{AttemptFilter, AttemptStats, DeliveryAttempt};
use crate::error::MessagingError;
use crate::state::AppState;
use crate::usecase::ledger::{AttemptStatsUseCase, ListAttemptsUseCase};

// ── Response types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct AttemptResponse {
    pub id: String,
    pub campaign_id: Option<i64>,
    pub recipient: String,
    pub channel: Channel,
    pub payload: String,
    pub provider_message_id: Option<String>,
    pub status: DeliveryStatus,
    pub attempt_number: i32,
    pub exhausted: bool,
    pub error_reason: Option<String>,
    #[serde(serialize_with = "courier_core::serde::to_rfc3339_ms")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(serialize_with = "courier_core::serde::to_rfc3339_ms")]
    pub last_updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<DeliveryAttempt> for AttemptResponse {
    fn from(a: DeliveryAttempt) -> Self {
        Self {
            id: a.id.to_string(),
            campaign_id: a.campaign_id.map(|c| c.0),
            recipient: a.recipient,
            channel: a.channel,
            payload: a.payload,
            provider_message_id: a.provider_message_id,
            status: a.status,
            attempt_number: a.attempt_number,
            exhausted: a.exhausted,
            error_reason: a.error_reason,
            created_at: a.created_at,
            last_updated_at: a.last_updated_at,
        }
    }
}

// ── Query params ─────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct AttemptListQuery {
    pub campaign_id: Option<i64>,
    pub channel: Option<String>,
    pub status: Option<String>,
    pub per_page: Option<u32>,
    pub page: Option<u32>,
}

impl AttemptListQuery {
    fn filter(&self) -> Result<AttemptFilter, MessagingError> {
        let channel = self
            .channel
            .as_deref()
            .map(str::parse::<Channel>)
            .transpose()
            .map_err(|e| MessagingError::InvalidInput(e.to_string()))?;
        let status = self
            .status
            .as_deref()
            .map(str::parse::<DeliveryStatus>)
            .transpose()
            .map_err(|e| MessagingError::InvalidInput(e.to_string()))?;
        Ok(AttemptFilter {
            campaign_id: self.campaign_id.map(CampaignId),
            channel,
            status,
        })
    }
}

// ── GET /external-api-messages ───────────────────────────────────────────────

pub async fn list_attempts(
    State(state): State<AppState>,
    Query(query): Query<AttemptListQuery>,
) -> Result<Json<Vec<AttemptResponse>>, MessagingError> {
    let filter = query.filter()?;
    let page = PageRequest::from_query(query.per_page, query.page);
    let usecase = ListAttemptsUseCase {
        ledger: state.ledger(),
    };
    let attempts = usecase.execute(filter, page).await?;
    Ok(Json(attempts.into_iter().map(AttemptResponse::from).collect()))
}

// ── GET /external-api-messages/stats ─────────────────────────────────────────

pub async fn attempt_stats(
    State(state): State<AppState>,
    Query(query): Query<AttemptListQuery>,
) -> Result<Json<AttemptStats>, MessagingError> {
    let usecase = AttemptStatsUseCase {
        ledger: state.ledger(),
    };
    Ok(Json(usecase.execute(query.filter()?).await?))
}
