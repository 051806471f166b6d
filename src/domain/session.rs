//! Session orchestration: daily reset, box lifecycle, bucket evaluation,
//! retest progression, order choke points, and the end-of-day flatten.
//!
//! One controller per traded instrument, driven from a single sequential
//! event path. Historical backfill and live bars flow through the same
//! [`SessionController::process_bar`] so a mid-session restart reconstructs
//! the day's state before trading resumes.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, error, info, warn};

use crate::domain::bar::MinuteBar;
use crate::domain::breakout::{BreakoutDetector, DetectorState, Side};
use crate::domain::bucket::{aggregate_interval, Bucket, TimeframeAggregator};
use crate::domain::minute_cache::MinuteCache;
use crate::domain::retest::{RetestArbiter, RetestOutcome};
use crate::domain::session_box::{FinalizedBox, SessionBox, SessionBoxBuilder};
use crate::domain::settings::{local_instant, StrategySettings};
use crate::domain::sizing;
use crate::ports::broker_port::{AccountPort, BrokerPort, OrderId, OrderKind, OrderRequest};
use crate::ports::market_data_port::MarketDataPort;

/// Bounded synchronous retries when re-fetching authoritative bars for a
/// partially covered bucket.
const REFETCH_ATTEMPTS: usize = 10;

/// All day-scoped state, rebuilt as a fresh value at day rollover.
#[derive(Debug)]
struct SessionState {
    date: NaiveDate,
    box_builder: SessionBoxBuilder,
    session_box: Option<SessionBox>,
    aggregator: TimeframeAggregator,
    detector: BreakoutDetector,
    arbiter: Option<RetestArbiter>,
    resting_order: Option<OrderId>,
    pending_cancel: Option<OrderId>,
    halted: bool,
    filled: bool,
    flattened: bool,
}

impl SessionState {
    fn new(date: NaiveDate, settings: &StrategySettings) -> Self {
        Self {
            date,
            box_builder: SessionBoxBuilder::new(),
            session_box: None,
            aggregator: TimeframeAggregator::new(
                settings.session.timeframe_minutes,
                settings.session.timezone,
            ),
            detector: BreakoutDetector::new(settings.filters.ema_period),
            arbiter: None,
            resting_order: None,
            pending_cancel: None,
            halted: false,
            filled: false,
            flattened: false,
        }
    }
}

/// Read-only snapshot of the current day for diagnostics and the replay CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct DayStatus {
    pub date: NaiveDate,
    pub box_ready: bool,
    pub signal_side: Option<Side>,
    pub filled: bool,
    pub halted: bool,
    pub flattened: bool,
}

pub struct SessionController<'a> {
    settings: StrategySettings,
    data: &'a dyn MarketDataPort,
    broker: &'a dyn BrokerPort,
    account: Option<&'a dyn AccountPort>,
    minute_cache: MinuteCache,
    state: Option<SessionState>,
}

impl<'a> SessionController<'a> {
    pub fn new(
        settings: StrategySettings,
        data: &'a dyn MarketDataPort,
        broker: &'a dyn BrokerPort,
        account: Option<&'a dyn AccountPort>,
    ) -> Self {
        Self {
            settings,
            data,
            broker,
            account,
            minute_cache: MinuteCache::new(),
            state: None,
        }
    }

    pub fn settings(&self) -> &StrategySettings {
        &self.settings
    }

    pub fn day_status(&self) -> Option<DayStatus> {
        self.state.as_ref().map(|s| DayStatus {
            date: s.date,
            box_ready: s.session_box.is_some(),
            signal_side: s.arbiter.as_ref().map(|a| a.signal().side),
            filled: s.filled,
            halted: s.halted,
            flattened: s.flattened,
        })
    }

    /// Single entry point for both historical backfill (`allow_trading`
    /// false: orders suppressed, state still advances) and live bars.
    pub fn process_bar(&mut self, bar: &MinuteBar, allow_trading: bool, from_history: bool) {
        let tz = self.settings.session.timezone;
        let local = bar.open_time.with_timezone(&tz);
        let local_date = local.date_naive();

        let rollover = self.state.as_ref().is_none_or(|s| s.date != local_date);
        if rollover {
            if let Some(old) = &self.state {
                if old.resting_order.is_some() {
                    warn!(date = %old.date, "day rolled over with a resting order outstanding");
                }
            }
            info!(date = %local_date, from_history, "trading day reset");
            self.state = Some(SessionState::new(local_date, &self.settings));
        }

        let broker = self.broker;
        let Some(state) = self.state.as_mut() else {
            return;
        };

        // A cancel that failed earlier is retried before anything else.
        if let Some(id) = state.pending_cancel.take() {
            if let Err(err) = broker.cancel_order(&id) {
                warn!(%err, "cancel retry failed, will retry on next bar");
                state.pending_cancel = Some(id);
            }
        }

        let local_time = local.time();
        let session = &self.settings.session;

        if local_time >= session.cutoff {
            if !state.flattened {
                state.flattened = true;
                state.halted = true;
                info!(cutoff = %session.cutoff, "session cutoff reached");
                if let Some(id) = state.resting_order.take() {
                    if let Err(err) = broker.cancel_order(&id) {
                        warn!(%err, "cutoff cancel failed, queued for retry");
                        state.pending_cancel = Some(id);
                    }
                }
                if allow_trading {
                    if let Err(err) = broker.flatten_all(&session.symbol) {
                        error!(%err, "end-of-day flatten failed");
                    }
                }
            }
            return;
        }

        if local_time >= session.box_start && local_time < session.box_end {
            state.box_builder.update_with(bar.high, bar.low);
        } else if local_time >= session.box_end && !state.box_builder.is_ready() {
            let frozen_close = local_instant(local_date, session.box_end, tz)
                .unwrap_or(bar.open_time);
            match state.box_builder.finalize(frozen_close) {
                Some(FinalizedBox::Empty) => {
                    state.halted = true;
                }
                Some(FinalizedBox::Range(mut bx)) => {
                    if self.settings.filters.reconcile_box {
                        let window_start = local_instant(local_date, session.box_start, tz)
                            .unwrap_or(frozen_close);
                        match self.data.fetch_minute_bars(
                            &session.symbol,
                            window_start,
                            frozen_close,
                        ) {
                            Ok(bars) => {
                                bx.reconcile(
                                    &bars,
                                    self.settings.trade.tick_size,
                                    self.settings.filters.reconcile_tick_tolerance,
                                );
                            }
                            Err(err) => {
                                warn!(%err, "box reconciliation fetch failed, keeping live bounds")
                            }
                        }
                    }
                    if self.settings.filters.box_width.passes(bx.height()) {
                        state.session_box = Some(bx);
                    } else {
                        warn!(width = bx.height(), "box width filter failed, day halted");
                        state.halted = true;
                    }
                }
                None => {}
            }
        }

        state.aggregator.ingest(bar);
        let ready = state.aggregator.drain_ready(bar.open_time);

        for bucket in ready {
            if state.halted || state.filled || state.arbiter.is_some() {
                break;
            }
            let Some((bucket, partial)) = resolve_partial(
                self.data,
                &self.minute_cache,
                &self.settings,
                bucket,
            ) else {
                continue;
            };

            let session_box = state.session_box.clone();
            if let Some(signal) =
                state
                    .detector
                    .evaluate(&bucket, session_box.as_ref(), &self.settings, partial)
            {
                let Some(bx) = session_box else { continue };
                let arbiter = RetestArbiter::arm(
                    signal.clone(),
                    &bx,
                    &self.settings.trade,
                    &self.settings.filters,
                );
                state.arbiter = Some(arbiter);

                if allow_trading {
                    let quantity = sizing::size_entry(
                        signal.risk_distance,
                        self.settings.trade.tick_size,
                        self.settings.trade.tick_value,
                        &self.settings.risk,
                        self.account,
                    );
                    let request = OrderRequest {
                        symbol: session.symbol.clone(),
                        side: signal.side,
                        quantity,
                        kind: OrderKind::Limit {
                            price: signal.entry_price,
                        },
                        stop_offset: signal.risk_distance,
                        take_profit_offset: (signal.target_price - signal.entry_price).abs(),
                        tag: format!("opr-{local_date}"),
                    };
                    match broker.place_order(&request) {
                        Ok(id) => {
                            info!(order = %id.0, quantity, "retest entry resting");
                            state.resting_order = Some(id);
                        }
                        Err(err) => {
                            error!(%err, "entry placement failed, day halted");
                            state.halted = true;
                            state.arbiter = None;
                        }
                    }
                }
            } else if matches!(state.detector.state(), DetectorState::Halted(_)) {
                state.halted = true;
            }
        }

        if let Some(arbiter) = state.arbiter.as_mut() {
            if !arbiter.is_terminal() {
                match arbiter.on_bar(bar) {
                    RetestOutcome::Armed => {}
                    RetestOutcome::Filled { entry_price, .. } => {
                        // The resting limit at the level is the entry itself.
                        state.filled = true;
                        state.resting_order = None;
                        info!(entry_price, "retest filled");
                    }
                    RetestOutcome::Expired | RetestOutcome::Cancelled(_) => {
                        state.halted = true;
                        if let Some(id) = state.resting_order.take() {
                            if let Err(err) = broker.cancel_order(&id) {
                                warn!(%err, "order cancel failed, queued for retry");
                                state.pending_cancel = Some(id);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Live tick path: feeds the minute cache and, while a retest is armed,
    /// the excursion/overextension trackers.
    pub fn process_tick(&mut self, price: f64, timestamp: DateTime<Utc>, size: u32) {
        self.minute_cache.on_tick(price, timestamp, size);

        let broker = self.broker;
        let Some(state) = self.state.as_mut() else {
            return;
        };
        if state.halted || state.filled {
            return;
        }
        if let Some(arbiter) = state.arbiter.as_mut() {
            if !arbiter.is_terminal() {
                if let RetestOutcome::Cancelled(reason) = arbiter.on_tick(price, timestamp) {
                    debug!(?reason, "tick-level cancellation");
                    state.halted = true;
                    if let Some(id) = state.resting_order.take() {
                        if let Err(err) = broker.cancel_order(&id) {
                            warn!(%err, "order cancel failed, queued for retry");
                            state.pending_cancel = Some(id);
                        }
                    }
                }
            }
        }
    }

    /// Strategy stop: seal the open live-derived bar and release day state.
    /// Any resting external order remains the order gateway's to track.
    pub fn shutdown(&mut self) {
        self.minute_cache.close_on_shutdown();
        info!(cached_bars = self.minute_cache.len(), "session controller shut down");
    }

    pub fn minute_cache(&self) -> &MinuteCache {
        &self.minute_cache
    }
}

/// Prefer authoritative coverage for a bucket the live feed delivered
/// incompletely: bounded re-fetch of the exact `[open, close)` interval,
/// falling back to the tick-derived minute cache, finally skipping the
/// bucket when no source has any bar for it.
fn resolve_partial(
    data: &dyn MarketDataPort,
    cache: &MinuteCache,
    settings: &StrategySettings,
    bucket: Bucket,
) -> Option<(Bucket, bool)> {
    let timeframe = settings.session.timeframe_minutes;
    if !bucket.is_partial(timeframe) {
        return Some((bucket, false));
    }

    warn!(
        bucket_open = %bucket.open_utc,
        samples = bucket.sample_count,
        expected = timeframe,
        "partial bucket, re-fetching authoritative bars"
    );

    for attempt in 1..=REFETCH_ATTEMPTS {
        match data.fetch_minute_bars(&settings.session.symbol, bucket.open_utc, bucket.close_utc) {
            Ok(bars) if !bars.is_empty() => {
                if let Some(rebuilt) =
                    aggregate_interval(&bars, bucket.open_utc, bucket.close_utc)
                {
                    debug!(attempt, samples = rebuilt.sample_count, "bucket rebuilt");
                    return Some((rebuilt, true));
                }
            }
            Ok(_) => {}
            Err(err) => debug!(attempt, %err, "authoritative re-fetch failed"),
        }
    }

    let cached: Vec<MinuteBar> = cache
        .bars_closing_in(bucket.open_utc, bucket.close_utc)
        .cloned()
        .collect();
    if let Some(rebuilt) = aggregate_interval(&cached, bucket.open_utc, bucket.close_utc) {
        debug!(samples = rebuilt.sample_count, "bucket rebuilt from tick cache");
        return Some((rebuilt, true));
    }

    warn!(bucket_open = %bucket.open_utc, "bucket unrecoverable, skipped");
    None
}
