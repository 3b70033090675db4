//! Domain types shared across all Courier services.
//!
//! Pure types with no framework dependencies. Database and HTTP mappings
//! live in the services that use them.

pub mod channel;
pub mod id;
pub mod pagination;
pub mod status;
