//! Core domain types and logic.

pub mod ohlcv;
pub mod market_clock;
pub mod resample;
pub mod indicator;
pub mod signal;
pub mod rule;
pub mod rule_eval;
pub mod recent_window;
pub mod scan_state;
pub mod alert;
pub mod config;
pub mod scan;
pub mod universe;
pub mod error;
