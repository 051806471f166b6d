#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use std::cell::RefCell;

use oprtrader::domain::bar::MinuteBar;
use oprtrader::domain::error::EngineError;
use oprtrader::domain::settings::{
    BoxWidthFilter, FilterSettings, RiskSettings, SessionSettings, SideMode, StrategySettings,
    TradeSettings,
};
use oprtrader::ports::broker_port::{BrokerPort, Exposure, OrderId, OrderRequest};
use oprtrader::ports::market_data_port::MarketDataPort;

pub fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
}

pub fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

pub fn ts(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date().and_hms_opt(hour, minute, 0).unwrap())
}

/// UTC-session settings: box 09:30-10:30, scan until 11:30, cutoff 15:59,
/// 5-minute buckets, permissive filters.
pub fn settings() -> StrategySettings {
    StrategySettings {
        session: SessionSettings {
            symbol: "MNQ".into(),
            timezone: chrono_tz::UTC,
            box_start: time(9, 30),
            box_end: time(10, 30),
            scan_start: time(10, 30),
            scan_end: time(11, 30),
            cutoff: time(15, 59),
            timeframe_minutes: 5,
            allowed_weekdays: Vec::new(),
            blocked_months: Vec::new(),
        },
        filters: FilterSettings {
            box_width: BoxWidthFilter::Off,
            min_body_outside_frac: 0.0,
            min_range_vs_box_frac: 0.0,
            max_wick_outside_frac: 1.0,
            overextension_multiple: 0.0,
            min_retest_range_frac: 0.0,
            max_retest_range_frac: 0.0,
            min_retest_body_inside_frac: 0.0,
            min_stop_ticks: 0.0,
            max_stop_ticks: 0.0,
            ema_period: 0,
            reconcile_box: false,
            reconcile_tick_tolerance: 1.0,
        },
        trade: TradeSettings {
            side_mode: SideMode::Both,
            stop_frac: 0.5,
            r_multiple: 2.0,
            retest_minutes: 35,
            max_entry_minutes: 0,
            tick_size: 0.25,
            tick_value: 0.5,
        },
        risk: RiskSettings {
            budget: 100.0,
            account_sizing: false,
            risk_pct: 0.01,
            max_risk: 100.0,
            max_contracts: 1,
        },
    }
}

pub fn bar_on(
    day: NaiveDate,
    hour: u32,
    minute: u32,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
) -> MinuteBar {
    let open_time = Utc
        .from_utc_datetime(&day.and_hms_opt(hour, minute, 0).unwrap());
    MinuteBar {
        open_time,
        close_time: open_time + Duration::minutes(1),
        open,
        high,
        low,
        close,
        volume: 100,
    }
}

pub fn bar(hour: u32, minute: u32, open: f64, high: f64, low: f64, close: f64) -> MinuteBar {
    bar_on(date(), hour, minute, open, high, low, close)
}

/// A flat bar entirely inside [low, high] of the reference box.
pub fn quiet_bar(hour: u32, minute: u32) -> MinuteBar {
    bar(hour, minute, 100.4, 100.6, 100.3, 100.5)
}

/// Minute bars 09:30-10:29 spanning exactly [100.0, 101.0].
pub fn box_window_bars() -> Vec<MinuteBar> {
    let mut bars = Vec::new();
    for minute in 30..60 {
        bars.push(bar(9, minute, 100.4, 101.0, 100.0, 100.6));
    }
    for minute in 0..30 {
        bars.push(bar(10, minute, 100.5, 100.9, 100.2, 100.5));
    }
    bars
}

#[derive(Default)]
pub struct MockDataPort {
    pub bars: Vec<MinuteBar>,
    pub fail: bool,
    pub calls: RefCell<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(mut self, bars: Vec<MinuteBar>) -> Self {
        self.bars = bars;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl MarketDataPort for MockDataPort {
    fn fetch_minute_bars(
        &self,
        symbol: &str,
        from_utc: DateTime<Utc>,
        to_utc: DateTime<Utc>,
    ) -> Result<Vec<MinuteBar>, EngineError> {
        self.calls.borrow_mut().push((from_utc, to_utc));
        if self.fail {
            return Err(EngineError::MissingData {
                symbol: symbol.to_string(),
                from_utc: from_utc.to_string(),
                to_utc: to_utc.to_string(),
            });
        }
        Ok(self
            .bars
            .iter()
            .filter(|b| b.open_time >= from_utc && b.open_time < to_utc)
            .cloned()
            .collect())
    }
}

/// Broker whose entry placement always fails; cancels and flattens succeed.
#[derive(Default)]
pub struct RejectingBroker {
    pub attempts: RefCell<usize>,
}

impl BrokerPort for RejectingBroker {
    fn place_order(&self, _request: &OrderRequest) -> Result<OrderId, EngineError> {
        *self.attempts.borrow_mut() += 1;
        Err(EngineError::Broker {
            reason: "gateway rejected order".into(),
        })
    }

    fn cancel_order(&self, _id: &OrderId) -> Result<(), EngineError> {
        Ok(())
    }

    fn flatten_all(&self, _symbol: &str) -> Result<(), EngineError> {
        Ok(())
    }

    fn open_exposure(&self, _symbol: &str) -> Result<Exposure, EngineError> {
        Ok(Exposure::default())
    }
}
