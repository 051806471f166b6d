//! Breakout classification and quality filtering.
//!
//! One detector per trading day. The first bucket closing outside the frozen
//! box is the day's only candidate: it either passes every filter and becomes
//! the day's signal, or it halts the day. Buckets that close inside the box,
//! outside the scan window, or on a disallowed weekday/month are skipped
//! without consuming the day.

use chrono::{DateTime, Datelike, Utc};
use tracing::{debug, info, warn};

use crate::domain::bucket::Bucket;
use crate::domain::ema::EmaGate;
use crate::domain::session_box::SessionBox;
use crate::domain::settings::StrategySettings;

const EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Long,
    Short,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// The day's accepted breakout, handed to the retest arbiter.
#[derive(Debug, Clone)]
pub struct BreakoutSignal {
    pub side: Side,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub risk_distance: f64,
    pub break_close_utc: DateTime<Utc>,
    pub break_close_price: f64,
    /// The breakout bucket was evaluated from incomplete minute coverage.
    pub partial_data: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    SideDisallowed,
    BodyOutsideFrac,
    RangeVsBoxFrac,
    WickOutsideFrac,
    StopTickBand,
    EmaTrend,
    DegenerateRisk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Idle,
    Signalled,
    Halted(HaltReason),
}

#[derive(Debug)]
pub struct BreakoutDetector {
    state: DetectorState,
    ema: EmaGate,
}

impl BreakoutDetector {
    pub fn new(ema_period: usize) -> Self {
        Self {
            state: DetectorState::Idle,
            ema: EmaGate::new(ema_period),
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// Evaluate one drained bucket. Returns the day's signal when the bucket
    /// is a qualifying breakout; `None` when the bucket is skipped or the
    /// day halts (inspect [`state`](Self::state) to distinguish).
    pub fn evaluate(
        &mut self,
        bucket: &Bucket,
        session_box: Option<&SessionBox>,
        settings: &StrategySettings,
        partial_data: bool,
    ) -> Option<BreakoutSignal> {
        if self.state != DetectorState::Idle {
            return None;
        }

        // Trend context accumulates over every bucket, eligible or not.
        let ema_value = self.ema.update(bucket.close);

        let bx = session_box?;
        if bucket.close_utc <= bx.frozen_close_utc {
            return None;
        }

        let local_close = bucket.close_utc.with_timezone(&settings.session.timezone);
        let close_time = local_close.time();
        if close_time < settings.session.scan_start || close_time > settings.session.scan_end {
            return None;
        }
        if !settings.session.weekday_allowed(local_close.weekday())
            || !settings.session.month_allowed(local_close.month())
        {
            debug!(date = %local_close.date_naive(), "calendar gate skipped bucket");
            return None;
        }

        let side = if bucket.close > bx.high {
            Side::Long
        } else if bucket.close < bx.low {
            Side::Short
        } else {
            return None;
        };

        let allowed = match side {
            Side::Long => settings.trade.side_mode.allows_long(),
            Side::Short => settings.trade.side_mode.allows_short(),
        };
        if !allowed {
            return self.halt(HaltReason::SideDisallowed, bucket);
        }

        if let Some(reason) = shape_filter_failure(side, bucket, bx, settings) {
            return self.halt(reason, bucket);
        }

        if self.ema.is_enabled() {
            let aligned = match (ema_value, side) {
                (Some(ema), Side::Long) => bucket.close > ema,
                (Some(ema), Side::Short) => bucket.close < ema,
                // Not warm yet: the candidate cannot be confirmed.
                (None, _) => false,
            };
            if !aligned {
                return self.halt(HaltReason::EmaTrend, bucket);
            }
        }

        let trade = &settings.trade;
        let entry_price = match side {
            Side::Long => bx.high,
            Side::Short => bx.low,
        };

        let stop_distance = trade.stop_frac * bx.height();
        let raw_stop = match side {
            Side::Long => entry_price - stop_distance,
            Side::Short => entry_price + stop_distance,
        };
        let mut stop_price = round_to_tick(raw_stop, trade.tick_size);
        // The stop must never sit at or beyond entry on the wrong side.
        match side {
            Side::Long if stop_price >= entry_price => stop_price = entry_price - trade.tick_size,
            Side::Short if stop_price <= entry_price => stop_price = entry_price + trade.tick_size,
            _ => {}
        }

        let risk_distance = (entry_price - stop_price).abs();
        if risk_distance <= 0.0 {
            return self.halt(HaltReason::DegenerateRisk, bucket);
        }

        let stop_ticks = risk_distance / trade.tick_size;
        let filters = &settings.filters;
        if (filters.min_stop_ticks > 0.0 && stop_ticks < filters.min_stop_ticks)
            || (filters.max_stop_ticks > 0.0 && stop_ticks > filters.max_stop_ticks)
        {
            return self.halt(HaltReason::StopTickBand, bucket);
        }

        let raw_target = match side {
            Side::Long => entry_price + trade.r_multiple * risk_distance,
            Side::Short => entry_price - trade.r_multiple * risk_distance,
        };
        let mut target_price = round_to_tick(raw_target, trade.tick_size);
        if (target_price - entry_price).abs() < trade.tick_size / 2.0 {
            target_price = match side {
                Side::Long => entry_price + trade.tick_size,
                Side::Short => entry_price - trade.tick_size,
            };
        }

        self.state = DetectorState::Signalled;
        info!(
            %side,
            entry = entry_price,
            stop = stop_price,
            target = target_price,
            break_close = %bucket.close_utc,
            partial_data,
            "breakout signal"
        );

        Some(BreakoutSignal {
            side,
            entry_price,
            stop_price,
            target_price,
            risk_distance,
            break_close_utc: bucket.close_utc,
            break_close_price: bucket.close,
            partial_data,
        })
    }

    fn halt(&mut self, reason: HaltReason, bucket: &Bucket) -> Option<BreakoutSignal> {
        self.state = DetectorState::Halted(reason);
        warn!(?reason, bucket_close = %bucket.close_utc, "breakout rejected, day halted");
        None
    }
}

fn shape_filter_failure(
    side: Side,
    bucket: &Bucket,
    bx: &SessionBox,
    settings: &StrategySettings,
) -> Option<HaltReason> {
    let filters = &settings.filters;
    let body_high = bucket.open.max(bucket.close);
    let body_low = bucket.open.min(bucket.close);
    let range = (bucket.high - bucket.low).max(EPS);
    let height = bx.height().max(EPS);

    let body_outside = match side {
        Side::Long if body_high > bx.high => (body_high - bx.high.max(body_low)).max(0.0),
        Side::Short if body_low < bx.low => bx.low.min(body_high) - body_low,
        _ => 0.0,
    };
    let body_frac = body_outside / (body_high - body_low).max(EPS);
    if body_frac < filters.min_body_outside_frac {
        return Some(HaltReason::BodyOutsideFrac);
    }

    if range / height < filters.min_range_vs_box_frac {
        return Some(HaltReason::RangeVsBoxFrac);
    }

    let wick_outside = match side {
        Side::Long => (bucket.high - body_high).max(0.0),
        Side::Short => (body_low - bucket.low).max(0.0),
    };
    if wick_outside / range > filters.max_wick_outside_frac {
        return Some(HaltReason::WickOutsideFrac);
    }

    None
}

fn round_to_tick(price: f64, tick_size: f64) -> f64 {
    (price / tick_size).round() * tick_size
}
