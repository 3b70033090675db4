use chrono::{DateTime, Utc};

use courier_domain::id::SessionId;
use courier_domain::pagination::PageRequest;

use crate::domain::repository::ChatSessionRepository;
use crate::domain::types::ChatMessage;
use crate::error::MessagingError;

// ── ListChatMessages ─────────────────────────────────────────────────────────

pub struct ListChatMessagesUseCase<S: ChatSessionRepository> {
    pub sessions: S,
}

impl<S: ChatSessionRepository> ListChatMessagesUseCase<S> {
    pub async fn execute(
        &self,
        session_id: SessionId,
        page: PageRequest,
    ) -> Result<Vec<ChatMessage>, MessagingError> {
        self.sessions
            .find_by_id(session_id)
            .await?
            .ok_or(MessagingError::SessionNotFound(session_id))?;
        self.sessions.list_messages(session_id, page).await
    }
}

// ── SweepIdleSessions ────────────────────────────────────────────────────────

pub struct SweepIdleSessionsUseCase<S: ChatSessionRepository> {
    pub sessions: S,
    pub idle_timeout: chrono::Duration,
}

impl<S: ChatSessionRepository> SweepIdleSessionsUseCase<S> {
    /// Deactivate sessions silent for longer than the idle timeout.
    pub async fn execute(&self, now: DateTime<Utc>) -> Result<u64, MessagingError> {
        let swept = self
            .sessions
            .mark_idle_inactive(now - self.idle_timeout)
            .await?;
        if swept > 0 {
            tracing::debug!(swept, "idle chat sessions deactivated");
        }
        Ok(swept)
    }
}
