//! Session range ("box") accumulation and finalization.
//!
//! The box collects high/low over the configured daily window, freezes when
//! the window closes, and is the reference level for breakout and retest
//! decisions for the rest of the day.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::domain::bar::MinuteBar;

/// A finalized session range. Immutable for the rest of the day.
#[derive(Debug, Clone)]
pub struct SessionBox {
    pub high: f64,
    pub low: f64,
    /// UTC instant the accumulation window closed. Buckets closing at or
    /// before this instant are never eligible for breakout evaluation.
    pub frozen_close_utc: DateTime<Utc>,
}

impl SessionBox {
    pub fn mid(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    pub fn height(&self) -> f64 {
        self.high - self.low
    }

    /// Replace the live-aggregated bounds with bounds re-derived from
    /// authoritative bars when either edge drifted by more than
    /// `tick_tolerance * tick_size`. Guards against live-feed gaps during
    /// the accumulation window. Returns true when the bounds were replaced.
    pub fn reconcile(
        &mut self,
        authoritative: &[MinuteBar],
        tick_size: f64,
        tick_tolerance: f64,
    ) -> bool {
        let mut high = f64::NEG_INFINITY;
        let mut low = f64::INFINITY;
        for bar in authoritative {
            high = high.max(bar.high);
            low = low.min(bar.low);
        }
        if authoritative.is_empty() || !high.is_finite() || !low.is_finite() {
            return false;
        }

        let tolerance = tick_tolerance * tick_size;
        if (high - self.high).abs() > tolerance || (low - self.low).abs() > tolerance {
            warn!(
                live_high = self.high,
                live_low = self.low,
                authoritative_high = high,
                authoritative_low = low,
                "box bounds replaced after reconciliation"
            );
            self.high = high;
            self.low = low;
            return true;
        }
        false
    }
}

/// Finalization outcome. An empty window is a valid terminal state that
/// disables trading for the day.
#[derive(Debug, Clone)]
pub enum FinalizedBox {
    Range(SessionBox),
    Empty,
}

/// Accumulates the session range while the window is open. `finalize` is
/// idempotent: the second and later calls return `None`.
#[derive(Debug, Default)]
pub struct SessionBoxBuilder {
    high: Option<f64>,
    low: Option<f64>,
    samples: u32,
    ready: bool,
}

impl SessionBoxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the running bounds with one bar's high/low. The first call
    /// seeds both bounds.
    pub fn update_with(&mut self, high: f64, low: f64) {
        if self.ready {
            return;
        }
        self.high = Some(self.high.map_or(high, |h| h.max(high)));
        self.low = Some(self.low.map_or(low, |l| l.min(low)));
        self.samples += 1;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn sample_count(&self) -> u32 {
        self.samples
    }

    pub fn finalize(&mut self, frozen_close_utc: DateTime<Utc>) -> Option<FinalizedBox> {
        if self.ready {
            return None;
        }
        self.ready = true;

        match (self.high, self.low) {
            (Some(high), Some(low)) => {
                info!(high, low, samples = self.samples, "session box frozen");
                Some(FinalizedBox::Range(SessionBox {
                    high,
                    low,
                    frozen_close_utc,
                }))
            }
            _ => {
                warn!("session box empty, trading disabled for the day");
                Some(FinalizedBox::Empty)
            }
        }
    }
}
