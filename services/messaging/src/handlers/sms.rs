use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

use courier_domain::id::AttemptId;

use crate::error::MessagingError;
use crate::handlers::external_message::AttemptResponse;
use crate::state::AppState;

// ── GET /sms/{id}/query-status ───────────────────────────────────────────────

/// Poll the provider for a send's status and fold the answer into the ledger.
pub async fn query_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AttemptResponse>, MessagingError> {
    let attempt = state.reconciler().query_status(AttemptId(id)).await?;
    Ok(Json(attempt.into()))
}
