pub mod flow;
pub mod provider;
pub mod repository;
pub mod types;
