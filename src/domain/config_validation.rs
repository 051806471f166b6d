//! Configuration validation.
//!
//! Runs before the strategy starts; a failure here means the engine never
//! processes a bar.

use crate::domain::error::EngineError;
use crate::domain::settings::StrategySettings;

pub fn validate_settings(settings: &StrategySettings) -> Result<(), EngineError> {
    validate_windows(settings)?;
    validate_timeframe(settings)?;
    validate_fractions(settings)?;
    validate_trade(settings)?;
    validate_risk(settings)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> EngineError {
    EngineError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_windows(settings: &StrategySettings) -> Result<(), EngineError> {
    let s = &settings.session;
    if s.box_start >= s.box_end {
        return Err(invalid(
            "session",
            "box_start",
            "box_start must be before box_end",
        ));
    }
    if s.scan_start >= s.scan_end {
        return Err(invalid(
            "session",
            "scan_start",
            "scan_start must be before scan_end",
        ));
    }
    if s.scan_start < s.box_end {
        return Err(invalid(
            "session",
            "scan_start",
            "scan window must not begin before the box closes",
        ));
    }
    if s.cutoff <= s.scan_start {
        return Err(invalid(
            "session",
            "cutoff",
            "cutoff must fall after the scan window opens",
        ));
    }
    for month in &s.blocked_months {
        if !(1..=12).contains(month) {
            return Err(invalid(
                "session",
                "blocked_months",
                "months must be between 1 and 12",
            ));
        }
    }
    Ok(())
}

fn validate_timeframe(settings: &StrategySettings) -> Result<(), EngineError> {
    let tf = settings.session.timeframe_minutes;
    if tf == 0 {
        return Err(invalid(
            "session",
            "timeframe_minutes",
            "timeframe_minutes must be at least 1",
        ));
    }
    if tf > 24 * 60 {
        return Err(invalid(
            "session",
            "timeframe_minutes",
            "timeframe_minutes must not exceed one day",
        ));
    }
    Ok(())
}

fn validate_fractions(settings: &StrategySettings) -> Result<(), EngineError> {
    let f = &settings.filters;
    let unit_bounded = [
        ("min_body_outside_frac", f.min_body_outside_frac),
        ("min_range_vs_box_frac", f.min_range_vs_box_frac),
        ("max_wick_outside_frac", f.max_wick_outside_frac),
        ("min_retest_body_inside_frac", f.min_retest_body_inside_frac),
    ];
    for (key, value) in unit_bounded {
        if !(0.0..=1.0).contains(&value) {
            return Err(invalid("filters", key, "must be between 0 and 1"));
        }
    }

    let non_negative = [
        ("overextension_multiple", f.overextension_multiple),
        ("min_retest_range_frac", f.min_retest_range_frac),
        ("max_retest_range_frac", f.max_retest_range_frac),
        ("min_stop_ticks", f.min_stop_ticks),
        ("max_stop_ticks", f.max_stop_ticks),
        ("reconcile_tick_tolerance", f.reconcile_tick_tolerance),
    ];
    for (key, value) in non_negative {
        if value < 0.0 {
            return Err(invalid("filters", key, "must be non-negative"));
        }
    }

    if f.min_stop_ticks > 0.0 && f.max_stop_ticks > 0.0 && f.min_stop_ticks > f.max_stop_ticks {
        return Err(invalid(
            "filters",
            "min_stop_ticks",
            "min_stop_ticks must not exceed max_stop_ticks",
        ));
    }
    Ok(())
}

fn validate_trade(settings: &StrategySettings) -> Result<(), EngineError> {
    let t = &settings.trade;
    if t.tick_size <= 0.0 {
        return Err(invalid("trade", "tick_size", "tick_size must be positive"));
    }
    if t.tick_value <= 0.0 {
        return Err(invalid("trade", "tick_value", "tick_value must be positive"));
    }
    if t.stop_frac <= 0.0 || t.stop_frac > 1.0 {
        return Err(invalid(
            "trade",
            "stop_frac",
            "stop_frac must be in (0, 1]",
        ));
    }
    if t.r_multiple <= 0.0 {
        return Err(invalid("trade", "r_multiple", "r_multiple must be positive"));
    }
    if t.retest_minutes < 0 {
        return Err(invalid(
            "trade",
            "retest_minutes",
            "retest_minutes must be non-negative",
        ));
    }
    if t.max_entry_minutes < 0 {
        return Err(invalid(
            "trade",
            "max_entry_minutes",
            "max_entry_minutes must be non-negative",
        ));
    }
    Ok(())
}

fn validate_risk(settings: &StrategySettings) -> Result<(), EngineError> {
    let r = &settings.risk;
    if r.budget <= 0.0 {
        return Err(invalid("risk", "budget", "budget must be positive"));
    }
    if r.max_contracts < 1 {
        return Err(invalid(
            "risk",
            "max_contracts",
            "max_contracts must be at least 1",
        ));
    }
    if r.account_sizing {
        if r.risk_pct <= 0.0 || r.risk_pct > 1.0 {
            return Err(invalid("risk", "risk_pct", "risk_pct must be in (0, 1]"));
        }
        if r.max_risk <= 0.0 {
            return Err(invalid("risk", "max_risk", "max_risk must be positive"));
        }
    }
    Ok(())
}
