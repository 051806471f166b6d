//! Trade tick and 1-minute bar representations.

use chrono::{DateTime, Utc};

/// A single trade print. Consumed immediately by the minute cache.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub size: u32,
}

/// A closed 1-minute OHLCV bar. Immutable once sealed.
#[derive(Debug, Clone)]
pub struct MinuteBar {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl MinuteBar {
    /// max(open, close)
    pub fn body_high(&self) -> f64 {
        self.open.max(self.close)
    }

    /// min(open, close)
    pub fn body_low(&self) -> f64 {
        self.open.min(self.close)
    }

    /// high - low
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_bar() -> MinuteBar {
        let open_time = Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap();
        MinuteBar {
            open_time,
            close_time: open_time + chrono::Duration::minutes(1),
            open: 100.0,
            high: 110.0,
            low: 90.0,
            close: 95.0,
            volume: 1_200,
        }
    }

    #[test]
    fn body_high_is_max_of_open_close() {
        let bar = sample_bar();
        assert!((bar.body_high() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn body_low_is_min_of_open_close() {
        let bar = sample_bar();
        assert!((bar.body_low() - 95.0).abs() < f64::EPSILON);
    }

    #[test]
    fn range_is_high_minus_low() {
        let bar = sample_bar();
        assert!((bar.range() - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn body_on_bullish_bar() {
        let mut bar = sample_bar();
        bar.open = 92.0;
        bar.close = 108.0;
        assert!((bar.body_high() - 108.0).abs() < f64::EPSILON);
        assert!((bar.body_low() - 92.0).abs() < f64::EPSILON);
    }
}
