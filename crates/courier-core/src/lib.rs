//! HTTP and observability plumbing shared by Courier services.

pub mod health;
pub mod middleware;
pub mod serde;
pub mod tracing;
