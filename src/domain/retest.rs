//! Armed-retest state machine.
//!
//! Holds an accepted breakout until price returns to the broken edge, the
//! window expires, or price overextends away from the box before ever
//! retesting. Ticks feed the excursion trackers continuously; bars drive the
//! expiry/touch decision. Only events strictly after the breakout bucket
//! close participate.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::domain::bar::MinuteBar;
use crate::domain::breakout::{BreakoutSignal, Side};
use crate::domain::session_box::SessionBox;
use crate::domain::settings::{FilterSettings, TradeSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Overextension,
    RetestCandle,
}

/// Outcome of feeding one event to an armed arbiter.
#[derive(Debug, Clone, PartialEq)]
pub enum RetestOutcome {
    Armed,
    Filled {
        entry_price: f64,
        at: DateTime<Utc>,
    },
    Expired,
    Cancelled(CancelReason),
}

#[derive(Debug)]
pub struct RetestArbiter {
    signal: BreakoutSignal,
    filters: FilterSettings,
    level: f64,
    expiry_utc: DateTime<Utc>,
    box_mid: f64,
    box_height: f64,
    max_excursion_high: f64,
    min_excursion_low: f64,
    terminal: Option<RetestOutcome>,
}

impl RetestArbiter {
    /// Arm a retest for an accepted signal. The expiry is the sooner of the
    /// enabled window rules (after-break and after-box-close); with neither
    /// enabled the setup only dies at the session cutoff.
    pub fn arm(
        signal: BreakoutSignal,
        session_box: &SessionBox,
        trade: &TradeSettings,
        filters: &FilterSettings,
    ) -> Self {
        let mut expiry = DateTime::<Utc>::MAX_UTC;
        if trade.retest_minutes > 0 {
            expiry = expiry.min(signal.break_close_utc + Duration::minutes(trade.retest_minutes));
        }
        if trade.max_entry_minutes > 0 {
            expiry = expiry
                .min(session_box.frozen_close_utc + Duration::minutes(trade.max_entry_minutes));
        }

        info!(
            side = %signal.side,
            level = signal.entry_price,
            expiry = %expiry,
            "retest armed"
        );

        Self {
            level: signal.entry_price,
            filters: filters.clone(),
            expiry_utc: expiry,
            box_mid: session_box.mid(),
            box_height: session_box.height(),
            max_excursion_high: signal.break_close_price,
            min_excursion_low: signal.break_close_price,
            signal,
            terminal: None,
        }
    }

    pub fn signal(&self) -> &BreakoutSignal {
        &self.signal
    }

    pub fn expiry_utc(&self) -> DateTime<Utc> {
        self.expiry_utc
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    /// Fold a tick observed after the breakout bucket close. Overextension
    /// can trigger here, before any retest bar closes.
    pub fn on_tick(&mut self, price: f64, timestamp: DateTime<Utc>) -> RetestOutcome {
        if let Some(terminal) = &self.terminal {
            return terminal.clone();
        }
        if timestamp <= self.signal.break_close_utc {
            return RetestOutcome::Armed;
        }

        self.max_excursion_high = self.max_excursion_high.max(price);
        self.min_excursion_low = self.min_excursion_low.min(price);

        if self.is_overextended() {
            return self.finish(RetestOutcome::Cancelled(CancelReason::Overextension));
        }
        RetestOutcome::Armed
    }

    /// Drive the decision with a closed bar.
    pub fn on_bar(&mut self, bar: &MinuteBar) -> RetestOutcome {
        if let Some(terminal) = &self.terminal {
            return terminal.clone();
        }
        if bar.open_time <= self.signal.break_close_utc {
            return RetestOutcome::Armed;
        }

        self.max_excursion_high = self.max_excursion_high.max(bar.high);
        self.min_excursion_low = self.min_excursion_low.min(bar.low);

        if bar.open_time >= self.expiry_utc {
            return self.finish(RetestOutcome::Expired);
        }

        let touched = match self.signal.side {
            Side::Long => bar.low <= self.level,
            Side::Short => bar.high >= self.level,
        };
        if !touched {
            return RetestOutcome::Armed;
        }

        if self.is_overextended() {
            return self.finish(RetestOutcome::Cancelled(CancelReason::Overextension));
        }

        if !self.retest_candle_ok(bar) {
            return self.finish(RetestOutcome::Cancelled(CancelReason::RetestCandle));
        }

        self.finish(RetestOutcome::Filled {
            entry_price: self.level,
            at: bar.open_time,
        })
    }

    fn is_overextended(&self) -> bool {
        let multiple = self.filters.overextension_multiple;
        if multiple <= 0.0 {
            return false;
        }
        let dist_mid = (self.signal.break_close_price - self.box_mid).abs();
        if dist_mid <= 0.0 {
            return false;
        }
        let excursion = match self.signal.side {
            Side::Long => self.max_excursion_high - self.signal.break_close_price,
            Side::Short => self.signal.break_close_price - self.min_excursion_low,
        };
        excursion > multiple * dist_mid
    }

    /// Shape checks on the touching bar: its range relative to the box and
    /// how much of its body still sits inside the box. A zero-length body
    /// fails the body-inside minimum when one is configured.
    fn retest_candle_ok(&self, bar: &MinuteBar) -> bool {
        let filters = &self.filters;
        if self.box_height > 0.0 {
            let size_frac = bar.range() / self.box_height;
            if filters.min_retest_range_frac > 0.0 && size_frac < filters.min_retest_range_frac {
                return false;
            }
            if filters.max_retest_range_frac > 0.0 && size_frac > filters.max_retest_range_frac {
                return false;
            }
        }

        if filters.min_retest_body_inside_frac > 0.0 {
            let body_size = bar.body_high() - bar.body_low();
            if body_size <= 0.0 {
                return false;
            }
            let box_high = self.box_mid + self.box_height / 2.0;
            let box_low = self.box_mid - self.box_height / 2.0;
            let inside_high = bar.body_high().min(box_high);
            let inside_low = bar.body_low().max(box_low);
            let inside = (inside_high - inside_low).max(0.0);
            if inside / body_size < filters.min_retest_body_inside_frac {
                return false;
            }
        }
        true
    }

    fn finish(&mut self, outcome: RetestOutcome) -> RetestOutcome {
        match &outcome {
            RetestOutcome::Filled { entry_price, .. } => {
                info!(price = entry_price, "retest touched, entry accepted")
            }
            RetestOutcome::Expired => info!(expiry = %self.expiry_utc, "retest window expired"),
            RetestOutcome::Cancelled(reason) => warn!(?reason, "retest cancelled"),
            RetestOutcome::Armed => {}
        }
        self.terminal = Some(outcome.clone());
        outcome
    }
}
