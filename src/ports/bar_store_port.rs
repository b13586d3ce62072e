//! Persistent bar cache port trait.

use crate::domain::error::ScanError;
use crate::domain::ohlcv::Bar;
use std::time::Duration;

/// Storage for fetched series that outlives one process. Keys come from
/// [`FetchRequest::symbol_key`](crate::ports::data_port::FetchRequest::symbol_key).
pub trait BarStore: Send + Sync {
    /// The series stored under `key`, or `None` if absent or older than
    /// `max_age`.
    fn load(&self, key: &str, max_age: Duration) -> Result<Option<Vec<Bar>>, ScanError>;

    /// Replaces whatever is stored under `key` and stamps it with the current
    /// time.
    fn save(&self, key: &str, bars: &[Bar]) -> Result<(), ScanError>;
}
