//! Outbound notification port trait.

use crate::domain::error::ScanError;

pub trait NotifyPort {
    fn send(&self, text: &str) -> Result<(), ScanError>;
}
