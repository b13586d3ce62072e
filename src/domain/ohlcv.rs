//! OHLCV bar representation and bar intervals.

use crate::domain::error::ScanError;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// (high + low) / 2
    pub fn hl2(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// A bar is complete when every price and volume field is finite.
    pub fn is_complete(&self) -> bool {
        self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite()
    }
}

/// Checks that timestamps are strictly increasing (no duplicates, no reordering).
pub fn validate_series(symbol: &str, bars: &[Bar]) -> Result<(), ScanError> {
    for pair in bars.windows(2) {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(ScanError::symbol_data(
                symbol,
                format!(
                    "timestamps not strictly increasing at {} -> {}",
                    pair[0].timestamp, pair[1].timestamp
                ),
            ));
        }
    }
    Ok(())
}

/// Rounds open/high/low/close to `precision` decimals. Volume is untouched.
pub fn round_ohlc(bars: &mut [Bar], precision: u32) {
    let scale = 10f64.powi(precision as i32);
    let round = |v: f64| (v * scale).round() / scale;
    for bar in bars.iter_mut() {
        bar.open = round(bar.open);
        bar.high = round(bar.high);
        bar.low = round(bar.low);
        bar.close = round(bar.close);
    }
}

/// A fixed bar duration, stored in whole minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Interval {
    minutes: i64,
}

const MINUTES_PER_HOUR: i64 = 60;
const MINUTES_PER_DAY: i64 = 24 * MINUTES_PER_HOUR;
const MINUTES_PER_WEEK: i64 = 7 * MINUTES_PER_DAY;
/// Longest bar accepted.
const MAX_MINUTES: i64 = 4 * MINUTES_PER_WEEK;

impl Interval {
    pub fn from_minutes(minutes: i64) -> Option<Self> {
        (minutes > 0).then_some(Self { minutes })
    }

    pub fn minutes(&self) -> i64 {
        self.minutes
    }

    pub fn is_weekly(&self) -> bool {
        self.minutes % MINUTES_PER_WEEK == 0
    }

    pub fn is_intraday(&self) -> bool {
        self.minutes < MINUTES_PER_DAY
    }

    /// The unit the recent-signal window is counted in: days for daily or
    /// coarser bars, hours for intraday bars.
    pub fn lookback_unit(&self) -> Duration {
        if self.is_intraday() {
            Duration::hours(1)
        } else {
            Duration::days(1)
        }
    }

    /// True when `self` tiles `target` exactly.
    pub fn divides(&self, target: Interval) -> bool {
        target.minutes % self.minutes == 0
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.minutes;
        if m % MINUTES_PER_WEEK == 0 {
            write!(f, "{}wk", m / MINUTES_PER_WEEK)
        } else if m % MINUTES_PER_DAY == 0 {
            write!(f, "{}d", m / MINUTES_PER_DAY)
        } else if m % MINUTES_PER_HOUR == 0 && m > MINUTES_PER_HOUR {
            write!(f, "{}h", m / MINUTES_PER_HOUR)
        } else {
            write!(f, "{}m", m)
        }
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("interval '{}' has no unit", s))?;
        let (count, unit) = s.split_at(split);
        let count: i64 = count
            .parse()
            .map_err(|_| format!("interval '{}' has no count", s))?;
        let per_unit = match unit {
            "m" => 1,
            "h" => MINUTES_PER_HOUR,
            "d" => MINUTES_PER_DAY,
            "wk" => MINUTES_PER_WEEK,
            _ => return Err(format!("unknown interval unit '{}'", unit)),
        };
        let minutes = count
            .checked_mul(per_unit)
            .filter(|m| *m <= MAX_MINUTES)
            .ok_or_else(|| format!("interval '{}' is longer than 4wk", s))?;
        Interval::from_minutes(minutes).ok_or_else(|| format!("interval '{}' is zero", s))
    }
}
