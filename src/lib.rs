pub mod api;
pub mod audit;
pub mod config;
pub mod mobile;
pub mod record;
pub mod report;
pub mod store;
