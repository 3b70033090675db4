//! sea-orm entities for the messaging service.

pub mod campaign_cancellations;
pub mod chat_messages;
pub mod chat_sessions;
pub mod delivery_attempts;
pub mod enums;
pub mod retry_events;
