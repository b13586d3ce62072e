//! Scan state persistence port trait.

use crate::domain::error::ScanError;
use crate::domain::scan_state::ScanState;

pub trait StatePort {
    /// Loads the persisted state; a store that has never been written yields
    /// the default state.
    fn load(&self) -> Result<ScanState, ScanError>;
    fn save(&self, state: &ScanState) -> Result<(), ScanError>;
}
