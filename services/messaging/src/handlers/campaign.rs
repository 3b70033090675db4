use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use courier_domain::channel::Channel;
use courier_domain::id::CampaignId;
use courier_domain::status::RetryOutcome;

use crate::error::MessagingError;
use crate::handlers::external_message::AttemptResponse;
use crate::state::AppState;
use crate::usecase::history::{GetCampaignHistoryUseCase, GetRetryHistoryUseCase};

// ── GET /campaigns/{id}/history ──────────────────────────────────────────────

#[derive(Serialize)]
pub struct CampaignHistoryResponse {
    pub campaign_id: i64,
    pub retry_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub attempts: Vec<AttemptResponse>,
}

pub async fn get_campaign_history(
    State(state): State<AppState>,
    Path(campaign_id): Path<i64>,
) -> Result<Json<CampaignHistoryResponse>, MessagingError> {
    let usecase = GetCampaignHistoryUseCase {
        ledger: state.ledger(),
        policy: state.empty_campaign_policy,
    };
    let history = usecase.execute(CampaignId(campaign_id)).await?;
    Ok(Json(CampaignHistoryResponse {
        campaign_id: history.campaign_id.0,
        retry_count: history.retry_count,
        success_count: history.success_count,
        failure_count: history.failure_count,
        attempts: history.attempts.into_iter().map(AttemptResponse::from).collect(),
    }))
}

// ── GET /campaigns/{id}/retry-history ────────────────────────────────────────

#[derive(Serialize)]
pub struct RetryEventResponse {
    pub id: String,
    pub attempt_id: String,
    pub recipient: String,
    pub attempt_number: i32,
    #[serde(serialize_with = "courier_core::serde::to_rfc3339_ms")]
    pub scheduled_at: chrono::DateTime<chrono::Utc>,
    #[serde(serialize_with = "courier_core::serde::to_rfc3339_ms_opt")]
    pub executed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub outcome: RetryOutcome,
    pub error_reason: Option<String>,
}

pub async fn get_retry_history(
    State(state): State<AppState>,
    Path(campaign_id): Path<i64>,
) -> Result<Json<Vec<RetryEventResponse>>, MessagingError> {
    let usecase = GetRetryHistoryUseCase {
        ledger: state.ledger(),
        policy: state.empty_campaign_policy,
    };
    let retries = usecase.execute(CampaignId(campaign_id)).await?;
    Ok(Json(
        retries
            .into_iter()
            .map(|r| RetryEventResponse {
                id: r.event.id.to_string(),
                attempt_id: r.event.attempt_id.to_string(),
                recipient: r.recipient,
                attempt_number: r.event.attempt_number,
                scheduled_at: r.event.scheduled_at,
                executed_at: r.event.executed_at,
                outcome: r.event.outcome,
                error_reason: r.event.error_reason,
            })
            .collect(),
    ))
}

// ── POST /campaigns/{id}/dispatch ────────────────────────────────────────────

#[derive(Deserialize)]
pub struct DispatchCampaignRequest {
    pub channel: Channel,
    pub recipients: Vec<String>,
    pub body: String,
}

pub async fn dispatch_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<i64>,
    Json(request): Json<DispatchCampaignRequest>,
) -> Result<(StatusCode, Json<Vec<AttemptResponse>>), MessagingError> {
    if request.body.trim().is_empty() {
        return Err(MessagingError::InvalidInput("body must not be empty".to_owned()));
    }
    let recipients: Vec<String> = request
        .recipients
        .into_iter()
        .map(|r| r.trim().to_owned())
        .filter(|r| !r.is_empty())
        .collect();
    if recipients.is_empty() {
        return Err(MessagingError::InvalidInput(
            "recipients must not be empty".to_owned(),
        ));
    }
    let attempts = state
        .orchestrator()
        .dispatch_campaign(CampaignId(campaign_id), request.channel, recipients, &request.body)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(attempts.into_iter().map(AttemptResponse::from).collect()),
    ))
}

// ── POST /campaigns/{id}/cancel ──────────────────────────────────────────────

#[derive(Serialize)]
pub struct CancelCampaignResponse {
    pub campaign_id: i64,
    pub already_cancelled: bool,
}

pub async fn cancel_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<i64>,
) -> Result<Json<CancelCampaignResponse>, MessagingError> {
    let newly = state
        .orchestrator()
        .cancel_campaign(CampaignId(campaign_id))
        .await?;
    Ok(Json(CancelCampaignResponse {
        campaign_id,
        already_cancelled: !newly,
    }))
}
