use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courier_domain::id::SessionId;
use courier_domain::pagination::PageRequest;

use crate::domain::types::MessageDirection;
use crate::error::MessagingError;
use crate::state::AppState;
use crate::usecase::session::ListChatMessagesUseCase;

#[derive(Serialize)]
pub struct ChatMessageResponse {
    pub id: String,
    pub direction: MessageDirection,
    pub body: String,
    pub attempt_id: Option<String>,
    #[serde(serialize_with = "courier_core::serde::to_rfc3339_ms")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct ChatMessagesQuery {
    pub per_page: Option<u32>,
    pub page: Option<u32>,
}

// ── GET /chats/{session_id}/messages ─────────────────────────────────────────

pub async fn list_chat_messages(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<ChatMessagesQuery>,
) -> Result<Json<Vec<ChatMessageResponse>>, MessagingError> {
    let page = PageRequest::from_query(query.per_page, query.page);
    let usecase = ListChatMessagesUseCase {
        sessions: state.sessions(),
    };
    let messages = usecase.execute(SessionId(session_id), page).await?;
    Ok(Json(
        messages
            .into_iter()
            .map(|m| ChatMessageResponse {
                id: m.id.to_string(),
                direction: m.direction,
                body: m.body,
                attempt_id: m.attempt_id.map(|a| a.to_string()),
                created_at: m.created_at,
            })
            .collect(),
    ))
}
