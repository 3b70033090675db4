use axum::Json;
use axum::http::StatusCode;
use serde_json::{Value, json};

/// Liveness check for `GET /healthz`.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Build a readiness response from named dependency checks.
///
/// Returns 200 when every check passed, otherwise 503 listing the failing ones.
pub fn readiness(checks: &[(&'static str, bool)]) -> (StatusCode, Json<Value>) {
    let failing: Vec<&str> = checks
        .iter()
        .filter(|(_, ok)| !ok)
        .map(|(name, _)| *name)
        .collect();
    if failing.is_empty() {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "failing": failing })),
        )
    }
}
