//! Trading-session gate.
//!
//! Weekends are closed; on weekdays the session is open between `open` and
//! `close` local time, both inclusive. There is no holiday calendar.

use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketClock {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl MarketClock {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Self {
        Self { open, close }
    }

    pub fn is_open(&self, now: DateTime<Utc>, timezone: Tz) -> bool {
        let local = now.with_timezone(&timezone);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let time = local.time();
        self.open <= time && time <= self.close
    }
}

impl Default for MarketClock {
    /// Regular US equity session, 09:30 to 16:00.
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}
