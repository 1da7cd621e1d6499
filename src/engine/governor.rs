//! Investment-period governor.
//!
//! Converts the free-text investment period ("2 Weeks", "6 Months")
//! into a day budget and halts trading once the elapsed time reaches
//! it. An unparseable period falls back to one month rather than
//! trading without a clock.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::types::{FundError, Settings};

/// Day budget used when the period text cannot be parsed.
const FALLBACK_DAYS: i64 = 30;

/// Parse "N Unit(s)" into a number of days.
pub fn period_days(investment_period: &str) -> i64 {
    let mut parts = investment_period.split_whitespace();

    let count = parts.next().and_then(|n| n.parse::<i64>().ok());
    let unit_days = parts.next().map(|unit| {
        match unit
            .to_lowercase()
            .trim_end_matches('s')
            .to_string()
            .as_str()
        {
            "day" => Some(1),
            "week" => Some(7),
            "month" => Some(30),
            "year" => Some(365),
            _ => None,
        }
    });

    match (count, unit_days.flatten()) {
        (Some(n), Some(days)) if n > 0 => n * days,
        _ => {
            warn!(
                period = investment_period,
                fallback_days = FALLBACK_DAYS,
                "Unparseable investment period, using fallback"
            );
            FALLBACK_DAYS
        }
    }
}

/// Check whether trading may proceed at `now`.
///
/// Returns `FundError::PeriodExpired` once the elapsed days reach the
/// period's day budget.
pub fn check(settings: &Settings, now: DateTime<Utc>) -> Result<(), FundError> {
    let days_limit = period_days(&settings.investment_period);
    let elapsed_days = (now - settings.start_date).num_days();

    if elapsed_days >= days_limit {
        return Err(FundError::PeriodExpired {
            elapsed_days,
            days_limit,
        });
    }

    debug!(elapsed_days, days_limit, "Investment period check passed");
    Ok(())
}
