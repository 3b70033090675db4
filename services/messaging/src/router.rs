use axum::{
    Router,
    routing::{delete, get, post},
};
use tower::ServiceBuilder;

use courier_core::health::healthz;
use courier_core::middleware::{propagate_request_id_layer, request_id_layer, trace_layer};

use crate::handlers::{
    admin::purge_attempt,
    campaign::{cancel_campaign, dispatch_campaign, get_campaign_history, get_retry_history},
    chat::list_chat_messages,
    external_message::{attempt_stats, list_attempts},
    health::readyz,
    provider::test_provider,
    sms::query_status,
    webhook::{receive_webhook, test_message, verify_webhook},
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Campaigns
        .route("/campaigns/{id}/history", get(get_campaign_history))
        .route("/campaigns/{id}/retry-history", get(get_retry_history))
        .route("/campaigns/{id}/dispatch", post(dispatch_campaign))
        .route("/campaigns/{id}/cancel", post(cancel_campaign))
        // Delivery ledger
        .route("/external-api-messages", get(list_attempts))
        .route("/external-api-messages/stats", get(attempt_stats))
        .route("/admin/send-sms/{id}", delete(purge_attempt))
        .route("/sms/{id}/query-status", get(query_status))
        // WhatsApp webhook
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .route("/webhook/test-message", post(test_message))
        // Providers
        .route("/providers/{channel}/test", post(test_provider))
        // Chats
        .route("/chats/{session_id}/messages", get(list_chat_messages))
        .layer(
            ServiceBuilder::new()
                .layer(request_id_layer())
                .layer(trace_layer())
                .layer(propagate_request_id_layer()),
        )
        .with_state(state)
}
