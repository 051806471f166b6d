//! Risk-based position sizing.
//!
//! Pure conversions from a stop distance and a risk budget to an integer
//! contract quantity. The budget is either the configured fixed amount or,
//! when account-derived sizing is enabled, a percentage of the balance above
//! the account minimum, capped and falling back to the fixed amount when the
//! balance cannot be read.

use tracing::warn;

use crate::domain::settings::RiskSettings;
use crate::ports::broker_port::AccountPort;

/// Stop distance expressed in whole ticks, never less than one.
pub fn stop_ticks(risk_distance: f64, tick_size: f64) -> i64 {
    ((risk_distance / tick_size).round() as i64).max(1)
}

/// Contracts affordable under `budget`, clamped to `[1, max_contracts]`.
pub fn contracts_for_budget(budget: f64, stop_ticks: i64, tick_value: f64, max_contracts: i64) -> i64 {
    let per_contract = stop_ticks as f64 * tick_value;
    let raw = if per_contract > 0.0 {
        (budget / per_contract).floor() as i64
    } else {
        0
    };
    raw.clamp(1, max_contracts.max(1))
}

/// Resolve the per-trade risk budget. Account-derived sizing reads the
/// balance ports; any failure falls back to the fixed budget.
pub fn resolve_risk_budget(risk: &RiskSettings, account: Option<&dyn AccountPort>) -> f64 {
    if !risk.account_sizing {
        return risk.budget;
    }

    let Some(account) = account else {
        warn!("account sizing enabled but no account port wired, using fixed budget");
        return risk.budget;
    };

    match (account.balance(), account.minimum_balance()) {
        (Ok(balance), Ok(minimum)) => {
            let headroom = (balance - minimum).max(0.0);
            risk.max_risk.min(risk.risk_pct * headroom)
        }
        (balance, minimum) => {
            let reason = balance.err().or(minimum.err());
            warn!(?reason, "balance lookup failed, using fixed budget");
            risk.budget
        }
    }
}

/// Full sizing pipeline for one signal.
pub fn size_entry(
    risk_distance: f64,
    tick_size: f64,
    tick_value: f64,
    risk: &RiskSettings,
    account: Option<&dyn AccountPort>,
) -> i64 {
    let budget = resolve_risk_budget(risk, account);
    let ticks = stop_ticks(risk_distance, tick_size);
    contracts_for_budget(budget, ticks, tick_value, risk.max_contracts)
}
