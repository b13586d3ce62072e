//! Keeps only signals young enough to alert on.

use crate::domain::ohlcv::Interval;
use crate::domain::signal::Signal;
use chrono::{DateTime, Duration, Utc};

/// Keeps signals with `timestamp >= now - lookback`. A window reaching past
/// the earliest representable instant keeps everything.
pub fn filter(signals: Vec<Signal>, now: DateTime<Utc>, lookback: Duration) -> Vec<Signal> {
    let Some(cutoff) = now.checked_sub_signed(lookback) else {
        return signals;
    };
    signals
        .into_iter()
        .filter(|s| s.timestamp >= cutoff)
        .collect()
}

/// `count` lookback units for bars of `interval`: days for daily and coarser
/// bars, hours for intraday bars. `None` when the product overflows.
pub fn lookback_for(interval: Interval, count: u32) -> Option<Duration> {
    let count = i32::try_from(count).ok()?;
    interval.lookback_unit().checked_mul(count)
}
