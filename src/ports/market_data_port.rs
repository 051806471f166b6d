//! Authoritative minute-bar history port trait.
//!
//! Live bars and ticks are pushed by the host straight into
//! [`crate::domain::session::SessionController`]; this port covers the pull
//! side — backfill, box reconciliation, and re-aggregation of buckets the
//! live feed delivered incompletely.

use chrono::{DateTime, Utc};

use crate::domain::bar::MinuteBar;
use crate::domain::error::EngineError;

pub trait MarketDataPort {
    /// Closed 1-minute bars with `open_time` in `[from_utc, to_utc)`,
    /// ordered by open time.
    fn fetch_minute_bars(
        &self,
        symbol: &str,
        from_utc: DateTime<Utc>,
        to_utc: DateTime<Utc>,
    ) -> Result<Vec<MinuteBar>, EngineError>;
}
