//! Symbol universe port trait.

use crate::domain::error::ScanError;

pub trait UniversePort {
    /// Ordered list of symbols to scan. Failure aborts the run.
    fn fetch_symbols(&self) -> Result<Vec<String>, ScanError>;
}
