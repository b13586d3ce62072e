//! Persisted scan bookkeeping.
//!
//! The orchestrator reads this once at the start of a run and hands back the
//! updated value at the end; nothing else writes it.

use crate::domain::alert::MAIN_CHANNEL;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanState {
    pub last_run_at: Option<DateTime<FixedOffset>>,
    /// Last alert on the main channel.
    pub last_alert_at: Option<DateTime<FixedOffset>>,
    /// Last alert per routed channel, excluding main.
    pub channel_alerts: BTreeMap<String, DateTime<FixedOffset>>,
}

impl ScanState {
    pub fn record_run(&mut self, now: DateTime<Utc>, timezone: Tz) {
        self.last_run_at = Some(now.with_timezone(&timezone).fixed_offset());
    }

    pub fn record_alert(&mut self, now: DateTime<Utc>, timezone: Tz) {
        self.last_alert_at = Some(now.with_timezone(&timezone).fixed_offset());
    }

    pub fn last_alert_for(&self, channel: &str) -> Option<DateTime<FixedOffset>> {
        if channel == MAIN_CHANNEL {
            self.last_alert_at
        } else {
            self.channel_alerts.get(channel).copied()
        }
    }

    pub fn record_alert_for(&mut self, channel: &str, now: DateTime<Utc>, timezone: Tz) {
        if channel == MAIN_CHANNEL {
            self.record_alert(now, timezone);
        } else {
            let at = now.with_timezone(&timezone).fixed_offset();
            self.channel_alerts.insert(channel.to_string(), at);
        }
    }

    /// True when a previous run finished less than `min_interval` before `now`.
    pub fn ran_within(&self, now: DateTime<Utc>, min_interval: Duration) -> bool {
        match self.last_run_at {
            Some(last) => now.signed_duration_since(last) < min_interval,
            None => false,
        }
    }
}
