pub mod db;
pub mod flow;
pub mod provider;
pub mod worker;
