pub mod chatbot;
pub mod history;
pub mod ledger;
pub mod provider;
pub mod reconcile;
pub mod retry;
pub mod session;
pub mod webhook;
