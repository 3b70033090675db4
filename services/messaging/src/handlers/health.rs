use axum::{Json, extract::State, http::StatusCode};
use serde_json::Value;

use courier_core::health::readiness;

use crate::state::AppState;

// ── GET /readyz ──────────────────────────────────────────────────────────────

pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = state.db.ping().await.is_ok();
    readiness(&[("database", database), ("flows", !state.flow.is_empty())])
}
