use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;

use courier_domain::channel::Channel;

use crate::error::MessagingError;
use crate::state::AppState;
use crate::usecase::provider::TestProviderUseCase;

// ── POST /providers/{channel}/test ───────────────────────────────────────────

#[derive(Serialize)]
pub struct ConnectivityResponse {
    pub channel: Channel,
    pub reachable: bool,
}

pub async fn test_provider(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Result<Json<ConnectivityResponse>, MessagingError> {
    let channel: Channel = channel
        .parse()
        .map_err(|e: courier_domain::channel::UnknownChannel| MessagingError::InvalidInput(e.to_string()))?;
    let usecase = TestProviderUseCase {
        provider: state.providers.clone(),
    };
    usecase.execute(channel).await?;
    Ok(Json(ConnectivityResponse {
        channel,
        reachable: true,
    }))
}
