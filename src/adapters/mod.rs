//! Concrete adapter implementations for ports.

pub mod cache_adapter;
pub mod csv_adapter;
pub mod file_config_adapter;
pub mod ini_state_adapter;
pub mod rate_limiter;
pub mod sqlite_cache_adapter;
pub mod telegram_adapter;
pub mod wikipedia_adapter;
pub mod yahoo_adapter;
