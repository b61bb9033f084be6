pub mod auth_handlers;
pub mod config;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod reconciliation;
pub mod reconciliation_handlers;
pub mod security_middleware;
pub mod services;
pub mod users;

pub use config::Config;
pub use errors::{Result, WalletEngineError};
