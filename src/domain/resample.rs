//! Bar aggregation into coarser fixed-width buckets.
//!
//! Buckets are aligned to wall-clock multiples of the bucket width in the
//! resampler's timezone, so 2h buckets in New York start at 08:00, 10:00,
//! 12:00 local regardless of the UTC offset. Weekly buckets start on Monday
//! 00:00 local. Per bucket: first open, max high,
//! min low, last close, summed volume. Empty buckets and buckets where a field
//! has no finite value are dropped.

use crate::domain::error::ScanError;
use crate::domain::ohlcv::{Bar, Interval};
use chrono::{DateTime, LocalResult, TimeZone, Utc};
use chrono_tz::Tz;

/// 1970-01-05, the first Monday after the epoch, in seconds.
const MONDAY_OFFSET: i64 = 4 * 86_400;

#[derive(Debug, Clone, Copy)]
pub struct Resampler {
    bucket: Interval,
    timezone: Tz,
}

impl Resampler {
    /// Builds a resampler after checking that `source` tiles `bucket` exactly.
    pub fn new(source: Interval, bucket: Interval, timezone: Tz) -> Result<Self, ScanError> {
        if !source.divides(bucket) {
            return Err(ScanError::invalid(
                "scan",
                "target_interval",
                format!("{} does not evenly divide {}", source, bucket),
            ));
        }
        Ok(Self { bucket, timezone })
    }

    pub fn bucket(&self) -> Interval {
        self.bucket
    }

    pub fn resample(&self, bars: &[Bar]) -> Vec<Bar> {
        let width = self.bucket.minutes() * 60;
        let anchor = if self.bucket.is_weekly() {
            MONDAY_OFFSET
        } else {
            0
        };
        let mut out: Vec<Bar> = Vec::new();
        let mut current: Option<Bucket> = None;

        for bar in bars {
            let key = self.bucket_key(bar.timestamp, width, anchor);
            match current.as_mut() {
                Some(bucket) if bucket.key == key => bucket.add(bar),
                _ => {
                    if let Some(done) = current.take() {
                        self.push_bucket(&mut out, done);
                    }
                    let mut bucket = Bucket::new(key);
                    bucket.add(bar);
                    current = Some(bucket);
                }
            }
        }
        if let Some(done) = current {
            self.push_bucket(&mut out, done);
        }
        out
    }

    fn bucket_key(&self, ts: DateTime<Utc>, width: i64, anchor: i64) -> i64 {
        let local = ts.with_timezone(&self.timezone).naive_local();
        (local.and_utc().timestamp() - anchor).div_euclid(width) * width + anchor
    }

    fn push_bucket(&self, out: &mut Vec<Bar>, bucket: Bucket) {
        let Some(start) = DateTime::from_timestamp(bucket.key, 0) else {
            return;
        };
        let timestamp = match self.timezone.from_local_datetime(&start.naive_utc()) {
            LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => t.with_timezone(&Utc),
            LocalResult::None => return,
        };
        if out.last().is_some_and(|prev| prev.timestamp >= timestamp) {
            return;
        }
        if let Some(bar) = bucket.finish(timestamp) {
            out.push(bar);
        }
    }
}

/// Running aggregate of one bucket. Non-finite inputs are skipped; a field
/// that never saw a finite value leaves the bucket incomplete.
struct Bucket {
    key: i64,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
}

impl Bucket {
    fn new(key: i64) -> Self {
        Self {
            key,
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
        }
    }

    fn add(&mut self, bar: &Bar) {
        if bar.open.is_finite() && self.open.is_none() {
            self.open = Some(bar.open);
        }
        if bar.high.is_finite() {
            self.high = Some(self.high.map_or(bar.high, |h| h.max(bar.high)));
        }
        if bar.low.is_finite() {
            self.low = Some(self.low.map_or(bar.low, |l| l.min(bar.low)));
        }
        if bar.close.is_finite() {
            self.close = Some(bar.close);
        }
        if bar.volume.is_finite() {
            self.volume = Some(self.volume.unwrap_or(0.0) + bar.volume);
        }
    }

    fn finish(self, timestamp: DateTime<Utc>) -> Option<Bar> {
        Some(Bar {
            timestamp,
            open: self.open?,
            high: self.high?,
            low: self.low?,
            close: self.close?,
            volume: self.volume?,
        })
    }
}

/// Resamples with buckets aligned to UTC.
pub fn resample(bars: &[Bar], bucket: Interval) -> Vec<Bar> {
    Resampler {
        bucket,
        timezone: Tz::UTC,
    }
    .resample(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::US::Eastern;
    use proptest::prelude::*;

    fn hour_bar(hour: u32, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, hour, 0, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume: 10.0,
        }
    }

    fn interval(s: &str) -> Interval {
        s.parse().unwrap()
    }

    #[test]
    fn four_hourly_bars_into_one_bucket() {
        let bars = vec![
            hour_bar(8, 9.5, 10.5, 9.0, 10.0),
            hour_bar(9, 10.0, 11.5, 9.8, 11.0),
            hour_bar(10, 11.0, 11.2, 8.5, 9.0),
            hour_bar(11, 9.0, 12.4, 8.9, 12.0),
        ];
        let out = resample(&bars, interval("4h"));
        assert_eq!(out.len(), 1);
        let b = &out[0];
        assert_eq!(b.timestamp, Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap());
        assert_eq!(b.open, 9.5);
        assert_eq!(b.high, 12.4);
        assert_eq!(b.low, 8.5);
        assert_eq!(b.close, 12.0);
        assert_eq!(b.volume, 40.0);
    }

    #[test]
    fn gaps_produce_no_empty_buckets() {
        let bars = vec![
            hour_bar(8, 1.0, 1.0, 1.0, 1.0),
            hour_bar(9, 1.0, 1.0, 1.0, 1.0),
            hour_bar(14, 2.0, 2.0, 2.0, 2.0),
        ];
        let out = resample(&bars, interval("2h"));
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].timestamp, Utc.with_ymd_and_hms(2024, 3, 4, 14, 0, 0).unwrap());
    }

    #[test]
    fn bucket_missing_a_field_is_dropped() {
        let nan_close = |hour| {
            let mut b = hour_bar(hour, 1.0, 1.0, 1.0, 1.0);
            b.close = f64::NAN;
            b
        };
        let bars = vec![
            hour_bar(8, 1.0, 1.0, 1.0, 1.0),
            hour_bar(9, 1.0, 1.0, 1.0, 1.0),
            nan_close(10),
            nan_close(11),
        ];
        let out = resample(&bars, interval("2h"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].timestamp, Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap());
    }

    #[test]
    fn partial_gap_uses_remaining_values() {
        let mut gap = hour_bar(9, 2.0, 3.0, 1.5, 2.5);
        gap.close = f64::NAN;
        let bars = vec![hour_bar(8, 1.0, 2.0, 0.5, 1.8), gap];
        let out = resample(&bars, interval("2h"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].close, 1.8);
        assert_eq!(out[0].high, 3.0);
    }

    #[test]
    fn buckets_align_to_local_wall_clock() {
        // 09:30..12:30 EST hourly bars (UTC-5 in early March).
        let bars: Vec<Bar> = (0..4)
            .map(|i| Bar {
                timestamp: Eastern
                    .with_ymd_and_hms(2024, 3, 4, 9 + i, 30, 0)
                    .unwrap()
                    .with_timezone(&Utc),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1.0,
            })
            .collect();
        let resampler = Resampler::new(interval("60m"), interval("2h"), Eastern).unwrap();
        let out = resampler.resample(&bars);
        let starts: Vec<String> = out
            .iter()
            .map(|b| b.timestamp.with_timezone(&Eastern).format("%H:%M").to_string())
            .collect();
        assert_eq!(starts, vec!["08:00", "10:00", "12:00"]);
        assert_eq!(out[0].volume, 1.0);
        assert_eq!(out[1].volume, 2.0);
    }

    #[test]
    fn weekly_buckets_start_on_monday() {
        // Two trading weeks of daily bars at the 09:30 open, across the
        // 2024-03-10 switch to daylight time.
        let days = [4, 5, 6, 7, 8, 11, 12, 13, 14, 15];
        let bars: Vec<Bar> = days
            .iter()
            .map(|&day| Bar {
                timestamp: Eastern
                    .with_ymd_and_hms(2024, 3, day, 9, 30, 0)
                    .unwrap()
                    .with_timezone(&Utc),
                open: day as f64,
                high: day as f64 + 1.0,
                low: day as f64 - 1.0,
                close: day as f64 + 0.5,
                volume: 1.0,
            })
            .collect();
        let resampler = Resampler::new(interval("1d"), interval("1wk"), Eastern).unwrap();
        let out = resampler.resample(&bars);

        assert_eq!(out.len(), 2);
        let starts: Vec<String> = out
            .iter()
            .map(|b| b.timestamp.with_timezone(&Eastern).format("%a %Y-%m-%d %H:%M").to_string())
            .collect();
        assert_eq!(starts, vec!["Mon 2024-03-04 00:00", "Mon 2024-03-11 00:00"]);
        assert_eq!(out[0].open, 4.0);
        assert_eq!(out[0].close, 8.5);
        assert_eq!(out[1].open, 11.0);
        assert_eq!(out[1].high, 16.0);
        assert!(out.iter().all(|b| b.volume == 5.0));
    }

    #[test]
    fn uneven_source_interval_is_rejected() {
        let err = Resampler::new(interval("90m"), interval("2h"), Eastern).unwrap_err();
        assert!(matches!(err, ScanError::ConfigInvalid { .. }));
    }

    proptest! {
        #[test]
        fn full_buckets_follow_aggregation_rule(
            closes in prop::collection::vec(1.0f64..500.0, 4..40)
        ) {
            let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
            let bars: Vec<Bar> = closes
                .iter()
                .enumerate()
                .map(|(i, &c)| Bar {
                    timestamp: start + chrono::Duration::hours(i as i64),
                    open: c - 0.25,
                    high: c + 1.0,
                    low: c - 1.0,
                    close: c,
                    volume: 1.0,
                })
                .collect();
            let out = resample(&bars, interval("4h"));
            prop_assert_eq!(out.len(), bars.len().div_ceil(4));
            for (bucket, chunk) in out.iter().zip(bars.chunks(4)) {
                prop_assert_eq!(bucket.timestamp, chunk[0].timestamp);
                prop_assert_eq!(bucket.open, chunk[0].open);
                prop_assert_eq!(bucket.close, chunk[chunk.len() - 1].close);
                let high = chunk.iter().map(|b| b.high).fold(f64::MIN, f64::max);
                let low = chunk.iter().map(|b| b.low).fold(f64::MAX, f64::min);
                prop_assert_eq!(bucket.high, high);
                prop_assert_eq!(bucket.low, low);
                prop_assert_eq!(bucket.volume, chunk.len() as f64);
            }
        }
    }
}
