//! Derived metrics over fetched consumption values.
//!
//! Rounding works on the exact binary value: a decimal tie such as 107.45 is
//! rounded in whichever direction its stored value actually lies, and exact
//! ties go to even.

use serde::{Deserialize, Serialize};

/// Days in the weekly window.
const DAYS_PER_WEEK: f64 = 7.0;

/// What a number measures; decides its display precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// kWh
    Energy,
    /// Heat-cost-allocation units
    Heat,
    /// m³
    Water,
    /// Percent change
    Percentage,
}

impl Kind {
    pub fn decimals(self) -> i32 {
        match self {
            Kind::Energy | Kind::Heat => 1,
            Kind::Water => 3,
            Kind::Percentage => 0,
        }
    }
}

/// Round `value` to `decimals` places, ties to even.
///
/// Rounds the exact binary value, so 107.45 (stored just above the tie)
/// becomes 107.5. Scaling by `10^decimals` first would lose that.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let places = usize::try_from(decimals).unwrap_or(0);
    format!("{:.*}", places, value).parse().unwrap_or(value)
}

/// Round `value` to the precision of `kind`.
pub fn round_for_kind(value: f64, kind: Kind) -> f64 {
    round_to(value, kind.decimals())
}

/// Whole-percent change from `reference` to `current`.
///
/// `None` when there is no positive reference to compare against.
pub fn percent_change(current: f64, reference: Option<f64>) -> Option<f64> {
    let reference = reference.filter(|r| *r > 0.0)?;
    Some(round_for_kind(
        (current - reference) / reference * 100.0,
        Kind::Percentage,
    ))
}

/// Average per day of a seven-day total, rounded for `kind`.
pub fn daily_average(weekly_value: f64, kind: Kind) -> f64 {
    round_for_kind(weekly_value / DAYS_PER_WEEK, kind)
}
