//! Strategy settings: session windows, signal filters, trade and risk
//! parameters. Built from a [`ConfigPort`] and validated up front by
//! [`crate::domain::config_validation`].

use chrono::{DateTime, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use std::str::FromStr;

use crate::domain::error::EngineError;
use crate::ports::config_port::ConfigPort;

/// Which breakout directions may trade. A candidate on a disallowed side
/// halts the day rather than being skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideMode {
    Both,
    Long,
    Short,
}

impl SideMode {
    pub fn allows_long(&self) -> bool {
        matches!(self, SideMode::Both | SideMode::Long)
    }

    pub fn allows_short(&self) -> bool {
        matches!(self, SideMode::Both | SideMode::Short)
    }
}

impl FromStr for SideMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "both" => Ok(SideMode::Both),
            "long" => Ok(SideMode::Long),
            "short" => Ok(SideMode::Short),
            other => Err(format!("unknown side mode: {other}")),
        }
    }
}

/// Box width acceptance rule, applied at finalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoxWidthFilter {
    Off,
    Max(f64),
    Min(f64),
    Band { min: f64, max: f64 },
}

impl BoxWidthFilter {
    pub fn passes(&self, width: f64) -> bool {
        match *self {
            BoxWidthFilter::Off => true,
            BoxWidthFilter::Max(max) => width <= max,
            BoxWidthFilter::Min(min) => width >= min,
            BoxWidthFilter::Band { min, max } => width >= min && width <= max,
        }
    }
}

/// Daily wall-clock windows and calendar gates, all in `timezone`.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub symbol: String,
    pub timezone: Tz,
    /// Box accumulation window `[box_start, box_end)`.
    pub box_start: NaiveTime,
    pub box_end: NaiveTime,
    /// Breakout scan window: bucket close must fall in `[scan_start, scan_end]`.
    pub scan_start: NaiveTime,
    pub scan_end: NaiveTime,
    /// Forced flatten past this local time, once per day.
    pub cutoff: NaiveTime,
    pub timeframe_minutes: u32,
    /// Empty means every weekday is allowed.
    pub allowed_weekdays: Vec<Weekday>,
    /// Months (1-12) on which evaluation is suspended.
    pub blocked_months: Vec<u32>,
}

impl SessionSettings {
    pub fn weekday_allowed(&self, weekday: Weekday) -> bool {
        self.allowed_weekdays.is_empty() || self.allowed_weekdays.contains(&weekday)
    }

    pub fn month_allowed(&self, month: u32) -> bool {
        !self.blocked_months.contains(&month)
    }
}

/// Signal quality filters. Fractions of 0 (or a wick maximum of 1) are
/// vacuous and effectively disable the corresponding gate.
#[derive(Debug, Clone)]
pub struct FilterSettings {
    pub box_width: BoxWidthFilter,
    pub min_body_outside_frac: f64,
    pub min_range_vs_box_frac: f64,
    pub max_wick_outside_frac: f64,
    pub overextension_multiple: f64,
    pub min_retest_range_frac: f64,
    pub max_retest_range_frac: f64,
    pub min_retest_body_inside_frac: f64,
    pub min_stop_ticks: f64,
    pub max_stop_ticks: f64,
    /// EMA trend gate over bucket closes; 0 disables.
    pub ema_period: usize,
    /// Re-derive box bounds from authoritative bars after the window closes.
    pub reconcile_box: bool,
    /// Replace live bounds when they drift by more than this many ticks.
    pub reconcile_tick_tolerance: f64,
}

#[derive(Debug, Clone)]
pub struct TradeSettings {
    pub side_mode: SideMode,
    /// Stop distance as a fraction of box height, measured inward from entry.
    pub stop_frac: f64,
    /// Take-profit distance in multiples of the stop distance.
    pub r_multiple: f64,
    /// Retest window in minutes after the breakout bucket close; 0 disables.
    pub retest_minutes: i64,
    /// Retest window in minutes after the box close; 0 disables.
    pub max_entry_minutes: i64,
    pub tick_size: f64,
    pub tick_value: f64,
}

#[derive(Debug, Clone)]
pub struct RiskSettings {
    /// Fixed risk budget per trade, in account currency.
    pub budget: f64,
    /// Derive the budget from account balance instead of `budget`.
    pub account_sizing: bool,
    pub risk_pct: f64,
    pub max_risk: f64,
    pub max_contracts: i64,
}

#[derive(Debug, Clone)]
pub struct StrategySettings {
    pub session: SessionSettings,
    pub filters: FilterSettings,
    pub trade: TradeSettings,
    pub risk: RiskSettings,
}

/// Resolve a local wall-clock instant on `date` to UTC. Ambiguous local
/// times (DST fall-back) resolve to the earlier instant; nonexistent local
/// times (spring-forward gap) yield `None`.
pub fn local_instant(date: NaiveDate, time: NaiveTime, tz: Tz) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&date.and_time(time)) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

impl StrategySettings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, EngineError> {
        Ok(StrategySettings {
            session: build_session(config)?,
            filters: build_filters(config)?,
            trade: build_trade(config)?,
            risk: build_risk(config),
        })
    }
}

fn require_string(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<String, EngineError> {
    config
        .get_string(section, key)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| EngineError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        })
}

fn parse_time(value: &str, section: &str, key: &str) -> Result<NaiveTime, EngineError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| EngineError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: format!("invalid time {value:?}, expected HH:MM"),
    })
}

fn require_time(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<NaiveTime, EngineError> {
    let raw = require_string(config, section, key)?;
    parse_time(&raw, section, key)
}

fn build_session(config: &dyn ConfigPort) -> Result<SessionSettings, EngineError> {
    let tz_name = require_string(config, "session", "timezone")?;
    let timezone = Tz::from_str(tz_name.trim()).map_err(|_| EngineError::ConfigInvalid {
        section: "session".into(),
        key: "timezone".into(),
        reason: format!("unknown timezone {tz_name:?}"),
    })?;

    let allowed_weekdays = match config.get_string("session", "weekdays") {
        None => Vec::new(),
        Some(raw) => {
            let mut days = Vec::new();
            for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let day = Weekday::from_str(part).map_err(|_| EngineError::ConfigInvalid {
                    section: "session".into(),
                    key: "weekdays".into(),
                    reason: format!("unknown weekday {part:?}"),
                })?;
                days.push(day);
            }
            days
        }
    };

    let blocked_months = match config.get_string("session", "blocked_months") {
        None => Vec::new(),
        Some(raw) => {
            let mut months = Vec::new();
            for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let month: u32 = part.parse().map_err(|_| EngineError::ConfigInvalid {
                    section: "session".into(),
                    key: "blocked_months".into(),
                    reason: format!("invalid month {part:?}"),
                })?;
                months.push(month);
            }
            months
        }
    };

    Ok(SessionSettings {
        symbol: require_string(config, "session", "symbol")?,
        timezone,
        box_start: require_time(config, "session", "box_start")?,
        box_end: require_time(config, "session", "box_end")?,
        scan_start: require_time(config, "session", "scan_start")?,
        scan_end: require_time(config, "session", "scan_end")?,
        cutoff: require_time(config, "session", "cutoff")?,
        timeframe_minutes: config.get_int("session", "timeframe_minutes", 5) as u32,
        allowed_weekdays,
        blocked_months,
    })
}

fn build_filters(config: &dyn ConfigPort) -> Result<FilterSettings, EngineError> {
    let box_width = match config
        .get_string("filters", "box_width_mode")
        .unwrap_or_else(|| "off".to_string())
        .to_lowercase()
        .as_str()
    {
        "off" => BoxWidthFilter::Off,
        "max" => BoxWidthFilter::Max(config.get_double("filters", "box_width_max", f64::MAX)),
        "min" => BoxWidthFilter::Min(config.get_double("filters", "box_width_min", 0.0)),
        "band" => BoxWidthFilter::Band {
            min: config.get_double("filters", "box_width_min", 0.0),
            max: config.get_double("filters", "box_width_max", f64::MAX),
        },
        other => {
            return Err(EngineError::ConfigInvalid {
                section: "filters".into(),
                key: "box_width_mode".into(),
                reason: format!("unknown mode {other:?} (expected off|max|min|band)"),
            })
        }
    };

    Ok(FilterSettings {
        box_width,
        min_body_outside_frac: config.get_double("filters", "min_body_outside_frac", 0.0),
        min_range_vs_box_frac: config.get_double("filters", "min_range_vs_box_frac", 0.0),
        max_wick_outside_frac: config.get_double("filters", "max_wick_outside_frac", 1.0),
        overextension_multiple: config.get_double("filters", "overextension_multiple", 0.0),
        min_retest_range_frac: config.get_double("filters", "min_retest_range_frac", 0.0),
        max_retest_range_frac: config.get_double("filters", "max_retest_range_frac", 0.0),
        min_retest_body_inside_frac: config
            .get_double("filters", "min_retest_body_inside_frac", 0.0),
        min_stop_ticks: config.get_double("filters", "min_stop_ticks", 0.0),
        max_stop_ticks: config.get_double("filters", "max_stop_ticks", 0.0),
        ema_period: config.get_int("filters", "ema_period", 0).max(0) as usize,
        reconcile_box: config.get_bool("filters", "reconcile_box", false),
        reconcile_tick_tolerance: config.get_double("filters", "reconcile_tick_tolerance", 1.0),
    })
}

fn build_trade(config: &dyn ConfigPort) -> Result<TradeSettings, EngineError> {
    let side_raw = config
        .get_string("trade", "side_mode")
        .unwrap_or_else(|| "both".to_string());
    let side_mode =
        SideMode::from_str(&side_raw).map_err(|reason| EngineError::ConfigInvalid {
            section: "trade".into(),
            key: "side_mode".into(),
            reason,
        })?;

    Ok(TradeSettings {
        side_mode,
        stop_frac: config.get_double("trade", "stop_frac", 0.5),
        r_multiple: config.get_double("trade", "r_multiple", 2.0),
        retest_minutes: config.get_int("trade", "retest_minutes", 35),
        max_entry_minutes: config.get_int("trade", "max_entry_minutes", 0),
        tick_size: config.get_double("trade", "tick_size", 0.0),
        tick_value: config.get_double("trade", "tick_value", 0.0),
    })
}

fn build_risk(config: &dyn ConfigPort) -> RiskSettings {
    let budget = config.get_double("risk", "budget", 100.0);
    RiskSettings {
        budget,
        account_sizing: config.get_bool("risk", "account_sizing", false),
        risk_pct: config.get_double("risk", "risk_pct", 0.01),
        max_risk: config.get_double("risk", "max_risk", budget),
        max_contracts: config.get_int("risk", "max_contracts", 1),
    }
}
