pub mod config;
pub mod database;
pub mod error;
pub mod stats;
pub mod types;
