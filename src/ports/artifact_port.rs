//! Port for persisting scan artifacts (symbol list, derived frames, results).

use crate::domain::error::ScanError;
use crate::domain::indicator::IndicatorFrame;
use crate::domain::ohlcv::{Bar, Interval};
use crate::domain::signal::{ResultRow, SignalKind};

pub trait ArtifactPort: Send + Sync {
    fn write_symbols(&self, symbols: &[String]) -> Result<(), ScanError>;

    /// Writes one symbol's bars with every computed column alongside.
    fn write_frame(
        &self,
        symbol: &str,
        interval: Interval,
        bars: &[Bar],
        frame: &IndicatorFrame,
    ) -> Result<(), ScanError>;

    /// Writes the aggregate result table with one flag column per kind.
    fn write_results(&self, rows: &[ResultRow], kinds: &[SignalKind]) -> Result<(), ScanError>;
}
