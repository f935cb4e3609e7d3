//! Cost behaviour, contribution, costing methods, CVP and leverage math.
//!
//! Everything here is pure: no state, no randomness. Phases call these to
//! judge player decisions and to produce the figures shown alongside them.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::constants::SURVIVAL_THRESHOLD;
use crate::numbers::ceil_f64_to_u32;

/// Precondition violations in cost calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CostModelError {
    #[error("absorption costing requires at least one unit produced")]
    ZeroProduction,
}

/// Behavioural classification of a cost line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CostType {
    Fixed,
    Variable,
    StepFixed,
    SemiVariable,
}

impl CostType {
    pub const ALL: [Self; 4] = [
        Self::Fixed,
        Self::Variable,
        Self::StepFixed,
        Self::SemiVariable,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Variable => "variable",
            Self::StepFixed => "step-fixed",
            Self::SemiVariable => "semi-variable",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Fixed => "Fixed Costs",
            Self::Variable => "Variable Costs",
            Self::StepFixed => "Step-Fixed Costs",
            Self::SemiVariable => "Semi-Variable Costs",
        }
    }

    #[must_use]
    pub const fn definition(self) -> &'static str {
        match self {
            Self::Fixed => "Stays the same no matter how many units you produce.",
            Self::Variable => "Changes directly with each unit you make.",
            Self::StepFixed => {
                "Stays fixed within a range, then jumps up at a new capacity level."
            }
            Self::SemiVariable => {
                "Has a fixed base amount plus a variable part that changes with production."
            }
        }
    }

    /// Corrective hint shown when an item is wrongly dropped into this bucket.
    #[must_use]
    pub const fn rule_hint(self) -> &'static str {
        match self {
            Self::Fixed => {
                "Fixed costs don't change with production. Does this cost change when you make more units?"
            }
            Self::Variable => {
                "Variable costs change per unit. Check if this cost has a fixed component or only changes with each unit."
            }
            Self::StepFixed => {
                "Step-fixed costs are fixed within a capacity range, then jump. Does this cost have a threshold?"
            }
            Self::SemiVariable => {
                "Semi-variable costs have BOTH a fixed base AND a variable component. Does this cost have two parts?"
            }
        }
    }
}

impl fmt::Display for CostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CostType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(Self::Fixed),
            "variable" => Ok(Self::Variable),
            "step-fixed" => Ok(Self::StepFixed),
            "semi-variable" => Ok(Self::SemiVariable),
            _ => Err(()),
        }
    }
}

/// Declared behaviour of a cost line.
///
/// `amount` is the period amount (the base for semi-variable lines, the
/// per-step charge for step-fixed lines, zero for purely variable lines).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostDescriptor {
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub per_unit_rate: Option<f64>,
    #[serde(default)]
    pub step_threshold: Option<u32>,
}

impl CostDescriptor {
    #[must_use]
    pub const fn fixed(amount: f64) -> Self {
        Self {
            amount,
            per_unit_rate: None,
            step_threshold: None,
        }
    }

    #[must_use]
    pub const fn variable(rate: f64) -> Self {
        Self {
            amount: 0.0,
            per_unit_rate: Some(rate),
            step_threshold: None,
        }
    }

    #[must_use]
    pub const fn step_fixed(amount: f64, threshold: u32) -> Self {
        Self {
            amount,
            per_unit_rate: None,
            step_threshold: Some(threshold),
        }
    }

    #[must_use]
    pub const fn semi_variable(base: f64, rate: f64) -> Self {
        Self {
            amount: base,
            per_unit_rate: Some(rate),
            step_threshold: None,
        }
    }

    /// Total cost of this line at a production volume.
    #[must_use]
    pub fn total_at(&self, units: u32) -> f64 {
        let volume = f64::from(units);
        match self.step_threshold {
            Some(threshold) if threshold > 0 => {
                let steps = units.div_ceil(threshold);
                f64::from(steps) * self.amount
            }
            _ => self.amount + self.per_unit_rate.unwrap_or(0.0) * volume,
        }
    }
}

/// Classify a cost line by its declared behaviour.
///
/// A threshold wins over everything else; a base plus a rate is
/// semi-variable; a rate alone is variable; anything else is fixed.
#[must_use]
pub fn classify(descriptor: &CostDescriptor) -> CostType {
    if descriptor.step_threshold.is_some() {
        return CostType::StepFixed;
    }
    match descriptor.per_unit_rate {
        Some(_) if descriptor.amount > 0.0 => CostType::SemiVariable,
        Some(_) => CostType::Variable,
        None => CostType::Fixed,
    }
}

/// Selling price minus variable cost per unit.
#[must_use]
pub fn contribution_per_unit(price: f64, variable_cost: f64) -> f64 {
    price - variable_cost
}

/// Whether a unit contribution justifies accepting work. Zero is a reject.
#[must_use]
pub fn is_contributing(contribution: f64) -> bool {
    contribution > 0.0
}

/// Marginal unit cost: fixed overhead is a period expense.
#[must_use]
pub const fn unit_cost_marginal(variable_cost: f64) -> f64 {
    variable_cost
}

/// Absorption unit cost: variable cost plus the fixed overhead rate.
///
/// # Errors
///
/// Returns [`CostModelError::ZeroProduction`] when `units_produced` is 0.
pub fn unit_cost_absorption(
    variable_cost: f64,
    fixed_overhead: f64,
    units_produced: u32,
) -> Result<f64, CostModelError> {
    Ok(variable_cost + fixed_overhead_rate(fixed_overhead, units_produced)?)
}

fn fixed_overhead_rate(fixed_overhead: f64, units_produced: u32) -> Result<f64, CostModelError> {
    if units_produced == 0 {
        return Err(CostModelError::ZeroProduction);
    }
    Ok(fixed_overhead / f64::from(units_produced))
}

/// Side-by-side profit under both costing methods.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfitReconciliation {
    pub fixed_rate: f64,
    pub marginal_profit: f64,
    pub inventory_valuation_gap: f64,
    pub absorption_profit: f64,
}

impl ProfitReconciliation {
    /// Closing inventory carries fixed overhead into the next period.
    #[must_use]
    pub fn absorption_reports_higher(&self) -> bool {
        self.inventory_valuation_gap > 0.0
    }
}

/// Reconcile marginal and absorption profit for one period.
///
/// # Errors
///
/// Returns [`CostModelError::ZeroProduction`] when `units_produced` is 0.
pub fn reconcile_profit(
    units_produced: u32,
    units_sold: u32,
    fixed_overhead: f64,
    price: f64,
    variable_cost: f64,
) -> Result<ProfitReconciliation, CostModelError> {
    let fixed_rate = fixed_overhead_rate(fixed_overhead, units_produced)?;
    let marginal_profit =
        f64::from(units_sold) * contribution_per_unit(price, variable_cost) - fixed_overhead;
    let inventory_change = f64::from(units_produced) - f64::from(units_sold);
    let inventory_valuation_gap = inventory_change * fixed_rate;
    Ok(ProfitReconciliation {
        fixed_rate,
        marginal_profit,
        inventory_valuation_gap,
        absorption_profit: marginal_profit + inventory_valuation_gap,
    })
}

/// Break-even volume, or the fact that none exists at this price/cost mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "units")]
pub enum BreakEven {
    Units(u32),
    Unreachable,
}

impl BreakEven {
    #[must_use]
    pub const fn units(self) -> Option<u32> {
        match self {
            Self::Units(units) => Some(units),
            Self::Unreachable => None,
        }
    }

    #[must_use]
    pub const fn is_reachable(self) -> bool {
        matches!(self, Self::Units(_))
    }
}

impl fmt::Display for BreakEven {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Units(units) => write!(f, "{units} units"),
            Self::Unreachable => f.write_str("unreachable"),
        }
    }
}

/// Units needed to cover fixed costs.
#[must_use]
pub fn break_even_units(fixed_costs: f64, contribution: f64) -> BreakEven {
    if !is_contributing(contribution) {
        return BreakEven::Unreachable;
    }
    BreakEven::Units(ceil_f64_to_u32(fixed_costs / contribution))
}

/// Share of actual sales above break-even, as a percentage.
#[must_use]
pub fn margin_of_safety(actual_units: u32, break_even: BreakEven) -> f64 {
    match break_even {
        BreakEven::Units(bep) if actual_units > bep => {
            f64::from(actual_units - bep) / f64::from(actual_units) * 100.0
        }
        _ => 0.0,
    }
}

/// Fixed/variable mix of an operating model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostStructure {
    pub fixed_cost: f64,
    pub variable_cost: f64,
}

impl CostStructure {
    #[must_use]
    pub fn profit_at(&self, units: f64, price: f64) -> f64 {
        units * contribution_per_unit(price, self.variable_cost) - self.fixed_cost
    }
}

/// Result of running a cost structure through a demand shock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShockOutcome {
    pub resulting_units: f64,
    pub profit: f64,
    pub survived: bool,
}

/// Apply a sales drop (negative values model growth) using the default threshold.
#[must_use]
pub fn simulate_shock(
    model: &CostStructure,
    sales_drop_fraction: f64,
    price: f64,
    baseline_units: f64,
) -> ShockOutcome {
    simulate_shock_with_threshold(
        model,
        sales_drop_fraction,
        price,
        baseline_units,
        SURVIVAL_THRESHOLD,
    )
}

#[must_use]
pub fn simulate_shock_with_threshold(
    model: &CostStructure,
    sales_drop_fraction: f64,
    price: f64,
    baseline_units: f64,
    survival_threshold: f64,
) -> ShockOutcome {
    let resulting_units = baseline_units * (1.0 - sales_drop_fraction);
    let profit = model.profit_at(resulting_units, price);
    ShockOutcome {
        resulting_units,
        profit,
        survived: profit > survival_threshold,
    }
}

/// Degree of operating leverage: total contribution over profit.
/// `None` when profit is zero (leverage is unbounded at break-even).
#[must_use]
pub fn degree_of_operating_leverage(model: &CostStructure, price: f64, units: f64) -> Option<f64> {
    let profit = model.profit_at(units, price);
    if profit == 0.0 || !profit.is_finite() {
        return None;
    }
    Some(units * contribution_per_unit(price, model.variable_cost) / profit)
}
