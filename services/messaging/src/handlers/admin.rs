use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use courier_domain::id::AttemptId;

use crate::error::MessagingError;
use crate::state::AppState;
use crate::usecase::ledger::PurgeAttemptUseCase;

// ── DELETE /admin/send-sms/{id} ──────────────────────────────────────────────

pub async fn purge_attempt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, MessagingError> {
    let usecase = PurgeAttemptUseCase {
        ledger: state.ledger(),
    };
    usecase.execute(AttemptId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
