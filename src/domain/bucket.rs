//! N-minute bucket aggregation over the 1-minute bar stream.
//!
//! Buckets are keyed by the floor of the bar's local minute-of-day in the
//! session timezone, not UTC — timezone offsets are not always whole hours,
//! so flooring in UTC would misalign bucket boundaries.

use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::domain::bar::MinuteBar;

/// An aggregated OHLC window at the breakout-evaluation timeframe.
#[derive(Debug, Clone)]
pub struct Bucket {
    pub open_utc: DateTime<Utc>,
    pub close_utc: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub sample_count: u32,
}

impl Bucket {
    /// True when fewer 1-minute bars contributed than the timeframe spans.
    pub fn is_partial(&self, timeframe_minutes: u32) -> bool {
        self.sample_count < timeframe_minutes
    }
}

#[derive(Debug)]
pub struct TimeframeAggregator {
    timeframe_minutes: u32,
    timezone: Tz,
    open_buckets: BTreeMap<DateTime<Utc>, Bucket>,
    drained: BTreeSet<DateTime<Utc>>,
}

impl TimeframeAggregator {
    pub fn new(timeframe_minutes: u32, timezone: Tz) -> Self {
        Self {
            timeframe_minutes: timeframe_minutes.max(1),
            timezone,
            open_buckets: BTreeMap::new(),
            drained: BTreeSet::new(),
        }
    }

    /// Bucket open time for a bar: the bar's open time pushed back to the
    /// nearest timeframe boundary of the local minute-of-day.
    fn bucket_open_for(&self, bar_open_utc: DateTime<Utc>) -> DateTime<Utc> {
        let local = bar_open_utc.with_timezone(&self.timezone);
        let minute_of_day = local.hour() * 60 + local.minute();
        let offset = minute_of_day % self.timeframe_minutes;
        bar_open_utc - Duration::minutes(offset as i64)
    }

    /// Create or extend the bucket covering `bar`.
    pub fn ingest(&mut self, bar: &MinuteBar) {
        let open_utc = self.bucket_open_for(bar.open_time);
        if self.drained.contains(&open_utc) {
            warn!(bucket_open = %open_utc, bar_open = %bar.open_time, "bar for already-drained bucket dropped");
            return;
        }

        let close_utc = open_utc + Duration::minutes(self.timeframe_minutes as i64);
        let bucket = self.open_buckets.entry(open_utc).or_insert_with(|| Bucket {
            open_utc,
            close_utc,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            sample_count: 0,
        });

        if bucket.sample_count > 0 {
            bucket.high = bucket.high.max(bar.high);
            bucket.low = bucket.low.min(bar.low);
            bucket.close = bar.close;
        }
        bucket.sample_count += 1;

        if bucket.sample_count > self.timeframe_minutes {
            warn!(
                bucket_open = %open_utc,
                samples = bucket.sample_count,
                timeframe = self.timeframe_minutes,
                "bucket oversampled (duplicate minute bars?)"
            );
        }
    }

    /// Buckets whose close time has been reached by `current_bar_open_utc`,
    /// in close-time order. Each bucket is returned exactly once regardless
    /// of how often this is called.
    pub fn drain_ready(&mut self, current_bar_open_utc: DateTime<Utc>) -> Vec<Bucket> {
        let ready_keys: Vec<DateTime<Utc>> = self
            .open_buckets
            .iter()
            .take_while(|(_, b)| b.close_utc <= current_bar_open_utc)
            .map(|(open, _)| *open)
            .collect();

        let mut ready = Vec::with_capacity(ready_keys.len());
        for key in ready_keys {
            if let Some(bucket) = self.open_buckets.remove(&key) {
                if bucket.is_partial(self.timeframe_minutes) {
                    debug!(
                        bucket_open = %bucket.open_utc,
                        samples = bucket.sample_count,
                        expected = self.timeframe_minutes,
                        "draining partial bucket"
                    );
                }
                self.drained.insert(key);
                ready.push(bucket);
            }
        }
        ready
    }
}

/// Re-aggregate one bucket interval from authoritative 1-minute bars with
/// `open_time` in `[open_utc, close_utc)`. Returns `None` when no bar falls
/// inside the interval.
pub fn aggregate_interval(
    bars: &[MinuteBar],
    open_utc: DateTime<Utc>,
    close_utc: DateTime<Utc>,
) -> Option<Bucket> {
    let mut bucket: Option<Bucket> = None;
    for bar in bars {
        if bar.open_time < open_utc || bar.open_time >= close_utc {
            continue;
        }
        match &mut bucket {
            None => {
                bucket = Some(Bucket {
                    open_utc,
                    close_utc,
                    open: bar.open,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                    sample_count: 1,
                });
            }
            Some(b) => {
                b.high = b.high.max(bar.high);
                b.low = b.low.min(bar.low);
                b.close = bar.close;
                b.sample_count += 1;
            }
        }
    }
    bucket
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar_at(hour: u32, minute: u32, close: f64) -> MinuteBar {
        let open_time = Utc.with_ymd_and_hms(2024, 3, 15, hour, minute, 0).unwrap();
        MinuteBar {
            open_time,
            close_time: open_time + Duration::minutes(1),
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100,
        }
    }

    fn utc_aggregator(tf: u32) -> TimeframeAggregator {
        TimeframeAggregator::new(tf, chrono_tz::UTC)
    }

    #[test]
    fn five_bars_form_one_bucket() {
        let mut agg = utc_aggregator(5);
        for minute in 30..35 {
            agg.ingest(&bar_at(14, minute, 100.0 + minute as f64));
        }
        let ready = agg.drain_ready(Utc.with_ymd_and_hms(2024, 3, 15, 14, 35, 0).unwrap());
        assert_eq!(ready.len(), 1);
        let bucket = &ready[0];
        assert_eq!(
            bucket.open_utc,
            Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap()
        );
        assert_eq!(
            bucket.close_utc,
            Utc.with_ymd_and_hms(2024, 3, 15, 14, 35, 0).unwrap()
        );
        assert!((bucket.open - 129.5).abs() < f64::EPSILON);
        assert!((bucket.high - 135.0).abs() < f64::EPSILON);
        assert!((bucket.low - 129.0).abs() < f64::EPSILON);
        assert!((bucket.close - 134.0).abs() < f64::EPSILON);
        assert_eq!(bucket.sample_count, 5);
        assert!(!bucket.is_partial(5));
    }

    #[test]
    fn bucket_not_ready_before_close() {
        let mut agg = utc_aggregator(5);
        agg.ingest(&bar_at(14, 30, 100.0));
        agg.ingest(&bar_at(14, 31, 100.0));
        let ready = agg.drain_ready(Utc.with_ymd_and_hms(2024, 3, 15, 14, 34, 0).unwrap());
        assert!(ready.is_empty());
    }

    #[test]
    fn drain_is_idempotent() {
        let mut agg = utc_aggregator(5);
        for minute in 30..35 {
            agg.ingest(&bar_at(14, minute, 100.0));
        }
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 14, 40, 0).unwrap();
        assert_eq!(agg.drain_ready(now).len(), 1);
        assert!(agg.drain_ready(now).is_empty());
        assert!(agg.drain_ready(now + Duration::hours(1)).is_empty());
    }

    #[test]
    fn gap_yields_partial_bucket() {
        let mut agg = utc_aggregator(5);
        agg.ingest(&bar_at(14, 30, 100.0));
        agg.ingest(&bar_at(14, 33, 101.0));
        let ready = agg.drain_ready(Utc.with_ymd_and_hms(2024, 3, 15, 14, 35, 0).unwrap());
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].sample_count, 2);
        assert!(ready[0].is_partial(5));
    }

    #[test]
    fn buckets_drain_in_close_time_order() {
        let mut agg = utc_aggregator(5);
        for minute in 30..45 {
            agg.ingest(&bar_at(14, minute, 100.0));
        }
        let ready = agg.drain_ready(Utc.with_ymd_and_hms(2024, 3, 15, 14, 45, 0).unwrap());
        assert_eq!(ready.len(), 3);
        assert!(ready[0].close_utc < ready[1].close_utc);
        assert!(ready[1].close_utc < ready[2].close_utc);
    }

    #[test]
    fn late_bar_for_drained_bucket_is_dropped() {
        let mut agg = utc_aggregator(5);
        agg.ingest(&bar_at(14, 30, 100.0));
        agg.drain_ready(Utc.with_ymd_and_hms(2024, 3, 15, 14, 35, 0).unwrap());
        agg.ingest(&bar_at(14, 32, 200.0));
        assert!(agg
            .drain_ready(Utc.with_ymd_and_hms(2024, 3, 15, 15, 0, 0).unwrap())
            .is_empty());
    }

    #[test]
    fn half_hour_offset_timezone_aligns_buckets_locally() {
        // Kolkata is UTC+5:30. 14:40 UTC = 20:10 local: with a 60-minute
        // timeframe the bucket opens at 20:00 local = 14:30 UTC, whereas a
        // UTC floor would misalign it to 14:00.
        let mut agg = TimeframeAggregator::new(60, chrono_tz::Asia::Kolkata);
        let bar = bar_at(14, 40, 100.0);
        agg.ingest(&bar);
        let ready = agg.drain_ready(Utc.with_ymd_and_hms(2024, 3, 15, 15, 30, 0).unwrap());
        assert_eq!(ready.len(), 1);
        assert_eq!(
            ready[0].open_utc,
            Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap()
        );
    }

    #[test]
    fn aggregate_interval_respects_bounds() {
        let bars: Vec<MinuteBar> = (28..38).map(|m| bar_at(14, m, 100.0 + m as f64)).collect();
        let open = Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap();
        let close = Utc.with_ymd_and_hms(2024, 3, 15, 14, 35, 0).unwrap();
        let bucket = aggregate_interval(&bars, open, close).unwrap();
        assert_eq!(bucket.sample_count, 5);
        assert!((bucket.open - 129.5).abs() < f64::EPSILON);
        assert!((bucket.close - 134.0).abs() < f64::EPSILON);
    }

    #[test]
    fn aggregate_interval_empty_returns_none() {
        let open = Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap();
        let close = Utc.with_ymd_and_hms(2024, 3, 15, 14, 35, 0).unwrap();
        assert!(aggregate_interval(&[], open, close).is_none());
    }
}
