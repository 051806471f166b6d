//! Tick → 1-minute bar aggregation.
//!
//! Maintains a live shadow of the most recent open minute plus a map of
//! sealed bars keyed by close time, used as a higher-resolution fallback when
//! the authoritative feed has gaps.

use chrono::{DateTime, Duration, Timelike, Utc};
use std::collections::BTreeMap;
use tracing::warn;

use crate::domain::bar::MinuteBar;

fn minute_floor(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

#[derive(Debug)]
struct WorkingBar {
    start: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
}

#[derive(Debug, Default)]
pub struct MinuteCache {
    current: Option<WorkingBar>,
    sealed: BTreeMap<DateTime<Utc>, MinuteBar>,
}

impl MinuteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a tick into the in-progress bar. A tick in a strictly later
    /// minute seals the previous bar first. A tick whose minute precedes the
    /// current bar start is folded into the current bar anyway (matching the
    /// upstream feed handlers), with a warning so misbehaving feeds surface.
    pub fn on_tick(&mut self, price: f64, timestamp: DateTime<Utc>, size: u32) {
        let minute = minute_floor(timestamp);

        match &mut self.current {
            None => {
                self.current = Some(WorkingBar {
                    start: minute,
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                    volume: size as i64,
                });
            }
            Some(bar) if minute > bar.start => {
                self.seal();
                self.current = Some(WorkingBar {
                    start: minute,
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                    volume: size as i64,
                });
            }
            Some(bar) => {
                if minute < bar.start {
                    warn!(
                        tick_time = %timestamp,
                        bar_start = %bar.start,
                        "out-of-order tick folded into current minute bar"
                    );
                }
                if price > bar.high {
                    bar.high = price;
                }
                if price < bar.low {
                    bar.low = price;
                }
                bar.close = price;
                bar.volume += size as i64;
            }
        }
    }

    /// Seal any still-open bar. Called on strategy stop.
    pub fn close_on_shutdown(&mut self) {
        self.seal();
    }

    /// Sealed bar whose close time equals `close_time`.
    pub fn bar_closing_at(&self, close_time: DateTime<Utc>) -> Option<&MinuteBar> {
        self.sealed.get(&close_time)
    }

    /// Sealed bars with close time in `(from, to]`, in order.
    pub fn bars_closing_in(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Iterator<Item = &MinuteBar> {
        use std::ops::Bound::{Excluded, Included};
        self.sealed
            .range((Excluded(from), Included(to)))
            .map(|(_, bar)| bar)
    }

    pub fn len(&self) -> usize {
        self.sealed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sealed.is_empty()
    }

    fn seal(&mut self) {
        if let Some(bar) = self.current.take() {
            let close_time = bar.start + Duration::minutes(1);
            self.sealed.insert(
                close_time,
                MinuteBar {
                    open_time: bar.start,
                    close_time,
                    open: bar.open,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                    volume: bar.volume,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(min: u32, sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 14, min, sec).unwrap()
    }

    #[test]
    fn single_minute_aggregates_ohlcv() {
        let mut cache = MinuteCache::new();
        cache.on_tick(100.0, ts(30, 1), 2);
        cache.on_tick(102.0, ts(30, 20), 1);
        cache.on_tick(99.0, ts(30, 45), 3);
        cache.on_tick(101.0, ts(30, 59), 1);
        cache.close_on_shutdown();

        let bar = cache.bar_closing_at(ts(31, 0)).unwrap();
        assert!((bar.open - 100.0).abs() < f64::EPSILON);
        assert!((bar.high - 102.0).abs() < f64::EPSILON);
        assert!((bar.low - 99.0).abs() < f64::EPSILON);
        assert!((bar.close - 101.0).abs() < f64::EPSILON);
        assert_eq!(bar.volume, 7);
    }

    #[test]
    fn later_minute_seals_previous_bar() {
        let mut cache = MinuteCache::new();
        cache.on_tick(100.0, ts(30, 10), 1);
        cache.on_tick(105.0, ts(31, 5), 1);

        let sealed = cache.bar_closing_at(ts(31, 0)).unwrap();
        assert!((sealed.close - 100.0).abs() < f64::EPSILON);
        assert_eq!(cache.len(), 1);

        cache.close_on_shutdown();
        assert_eq!(cache.len(), 2);
        let second = cache.bar_closing_at(ts(32, 0)).unwrap();
        assert!((second.open - 105.0).abs() < f64::EPSILON);
    }

    #[test]
    fn earlier_tick_folds_into_current_bar() {
        let mut cache = MinuteCache::new();
        cache.on_tick(100.0, ts(31, 10), 1);
        // Late tick from the previous minute lands in the 14:31 bar.
        cache.on_tick(90.0, ts(30, 59), 1);
        cache.close_on_shutdown();

        assert_eq!(cache.len(), 1);
        let bar = cache.bar_closing_at(ts(32, 0)).unwrap();
        assert!((bar.low - 90.0).abs() < f64::EPSILON);
        assert!((bar.close - 90.0).abs() < f64::EPSILON);
    }

    #[test]
    fn shutdown_on_empty_cache_is_noop() {
        let mut cache = MinuteCache::new();
        cache.close_on_shutdown();
        assert!(cache.is_empty());
    }

    #[test]
    fn bars_closing_in_range() {
        let mut cache = MinuteCache::new();
        for minute in 30..35 {
            cache.on_tick(100.0 + minute as f64, ts(minute, 30), 1);
        }
        cache.close_on_shutdown();

        let collected: Vec<_> = cache.bars_closing_in(ts(31, 0), ts(34, 0)).collect();
        assert_eq!(collected.len(), 3);
        assert_eq!(collected[0].close_time, ts(32, 0));
        assert_eq!(collected[2].close_time, ts(34, 0));
    }
}
