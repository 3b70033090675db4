pub mod admin;
pub mod campaign;
pub mod chat;
pub mod external_message;
pub mod health;
pub mod provider;
pub mod sms;
pub mod webhook;
