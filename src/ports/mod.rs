//! Port traits for the scanner's external collaborators.

pub mod artifact_port;
pub mod bar_store_port;
pub mod config_port;
pub mod data_port;
pub mod notify_port;
pub mod state_port;
pub mod universe_port;
