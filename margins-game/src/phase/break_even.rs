//! Phase 4: cost-volume-profit lab with a real-time sales simulation.
//!
//! Adjusting sliders only recomputes the readout; it is never a mistake.
//! Starting the simulation arms two repeating timers owned by the lab:
//! a fast sales tick and a slow market tick that moves stability and may
//! fire a market event. The run ends at the sales target (solved) or when
//! stability is exhausted (mistake, retry).
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

use super::{Feedback, PhaseCtx, PhaseDetail, PhaseError, PhaseId, PhaseRules, Verdict};
use crate::constants::{
    DEFAULT_MISTAKE_SEVERITY, EVENT_LOG_WINDOW, HISTORY_WINDOW, MARKET_EVENT_CHANCE,
    MARKET_TICK_MS, SALES_INCREMENT_MAX, SALES_INCREMENT_MIN, SALES_TICK_MS,
    STABILITY_BEP_CEILING, STABILITY_DECAY, STABILITY_MAX, STABILITY_RECOVERY,
    STABILITY_RETRY_RESET,
};
use crate::cost_model::{BreakEven, break_even_units, contribution_per_unit, margin_of_safety};
use crate::data::CatalogError;
use crate::rng::{RandomSource, RandomStream};
use crate::state::Topic;
use crate::timer::RepeatingTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CvpParameter {
    Price,
    VariableCost,
    FixedCost,
}

/// Inclusive range with a snapping step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SliderBounds {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl SliderBounds {
    #[must_use]
    pub const fn new(min: f64, max: f64, step: f64) -> Self {
        Self { min, max, step }
    }

    /// Clamp into range and snap to the nearest step from `min`.
    #[must_use]
    pub fn apply(&self, value: f64) -> f64 {
        let clamped = value.clamp(self.min, self.max);
        if self.step <= 0.0 {
            return clamped;
        }
        let steps = ((clamped - self.min) / self.step).round();
        (self.min + steps * self.step).clamp(self.min, self.max)
    }

    fn validate(&self, field: &'static str) -> Result<(), CatalogError> {
        let sane = self.min.is_finite()
            && self.max.is_finite()
            && self.step.is_finite()
            && self.min <= self.max
            && self.step >= 0.0;
        if sane {
            Ok(())
        } else {
            Err(CatalogError::InvalidBounds {
                field,
                min: self.min,
                max: self.max,
            })
        }
    }
}

/// Plain inclusive range used to clamp event effects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CvpBounds {
    pub price: SliderBounds,
    pub variable_cost: SliderBounds,
    pub fixed_cost: SliderBounds,
}

impl Default for CvpBounds {
    fn default() -> Self {
        Self {
            price: SliderBounds::new(20.0, 100.0, 1.0),
            variable_cost: SliderBounds::new(5.0, 40.0, 1.0),
            fixed_cost: SliderBounds::new(1_000.0, 8_000.0, 100.0),
        }
    }
}

impl CvpBounds {
    #[must_use]
    pub const fn for_parameter(&self, parameter: CvpParameter) -> &SliderBounds {
        match parameter {
            CvpParameter::Price => &self.price,
            CvpParameter::VariableCost => &self.variable_cost,
            CvpParameter::FixedCost => &self.fixed_cost,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CvpConfig {
    pub price: f64,
    pub variable_cost: f64,
    pub fixed_cost: f64,
}

impl CvpConfig {
    #[must_use]
    pub fn contribution(&self) -> f64 {
        contribution_per_unit(self.price, self.variable_cost)
    }

    #[must_use]
    pub fn break_even(&self) -> BreakEven {
        break_even_units(self.fixed_cost, self.contribution())
    }

    #[must_use]
    pub fn profit_at(&self, units: u32) -> f64 {
        f64::from(units) * self.contribution() - self.fixed_cost
    }

    fn set(&mut self, parameter: CvpParameter, value: f64) {
        match parameter {
            CvpParameter::Price => self.price = value,
            CvpParameter::VariableCost => self.variable_cost = value,
            CvpParameter::FixedCost => self.fixed_cost = value,
        }
    }
}

/// Entry in the fixed market event table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    pub name: String,
    #[serde(default)]
    pub variable_effect: f64,
    #[serde(default)]
    pub fixed_effect: f64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakEvenScenario {
    pub title: String,
    pub start: CvpConfig,
    #[serde(default)]
    pub bounds: CvpBounds,
    #[serde(default = "BreakEvenScenario::default_target_units")]
    pub target_units: u32,
    #[serde(default = "BreakEvenScenario::default_variable_clamp")]
    pub event_variable_clamp: ValueRange,
    #[serde(default = "BreakEvenScenario::default_fixed_clamp")]
    pub event_fixed_clamp: ValueRange,
    pub events: Vec<MarketEvent>,
}

impl BreakEvenScenario {
    const fn default_target_units() -> u32 {
        crate::constants::TARGET_UNITS
    }

    const fn default_variable_clamp() -> ValueRange {
        ValueRange::new(10.0, 40.0)
    }

    const fn default_fixed_clamp() -> ValueRange {
        ValueRange::new(2_000.0, 8_000.0)
    }

    /// # Errors
    ///
    /// Returns [`CatalogError`] for inverted bounds or a zero sales target.
    pub fn validate(&self) -> Result<(), CatalogError> {
        self.bounds.price.validate("break_even.bounds.price")?;
        self.bounds.variable_cost.validate("break_even.bounds.variable_cost")?;
        self.bounds.fixed_cost.validate("break_even.bounds.fixed_cost")?;
        for (field, range) in [
            ("break_even.event_variable_clamp", self.event_variable_clamp),
            ("break_even.event_fixed_clamp", self.event_fixed_clamp),
        ] {
            if !(range.min.is_finite() && range.max.is_finite() && range.min <= range.max) {
                return Err(CatalogError::InvalidBounds {
                    field,
                    min: range.min,
                    max: range.max,
                });
            }
        }
        if self.target_units == 0 {
            return Err(CatalogError::ZeroTarget {
                scenario: self.title.clone(),
            });
        }
        Ok(())
    }
}

/// Timing and stability tunables for the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilityTuning {
    #[serde(default = "StabilityTuning::default_max")]
    pub max: u32,
    #[serde(default = "StabilityTuning::default_decay")]
    pub decay: u32,
    #[serde(default = "StabilityTuning::default_recovery")]
    pub recovery: u32,
    /// Stability shown after a collapse.
    #[serde(default = "StabilityTuning::default_retry_reset")]
    pub retry_reset: u32,
    /// Break-even volumes above this drain stability.
    #[serde(default = "StabilityTuning::default_bep_ceiling")]
    pub bep_ceiling: u32,
    #[serde(default = "StabilityTuning::default_event_chance")]
    pub event_chance: f64,
    #[serde(default = "StabilityTuning::default_sales_tick_ms")]
    pub sales_tick_ms: u64,
    #[serde(default = "StabilityTuning::default_market_tick_ms")]
    pub market_tick_ms: u64,
    #[serde(default = "StabilityTuning::default_sales_increment_min")]
    pub sales_increment_min: u32,
    #[serde(default = "StabilityTuning::default_sales_increment_max")]
    pub sales_increment_max: u32,
}

impl Default for StabilityTuning {
    fn default() -> Self {
        Self {
            max: Self::default_max(),
            decay: Self::default_decay(),
            recovery: Self::default_recovery(),
            retry_reset: Self::default_retry_reset(),
            bep_ceiling: Self::default_bep_ceiling(),
            event_chance: Self::default_event_chance(),
            sales_tick_ms: Self::default_sales_tick_ms(),
            market_tick_ms: Self::default_market_tick_ms(),
            sales_increment_min: Self::default_sales_increment_min(),
            sales_increment_max: Self::default_sales_increment_max(),
        }
    }
}

impl StabilityTuning {
    const fn default_max() -> u32 {
        STABILITY_MAX
    }

    const fn default_decay() -> u32 {
        STABILITY_DECAY
    }

    const fn default_recovery() -> u32 {
        STABILITY_RECOVERY
    }

    const fn default_retry_reset() -> u32 {
        STABILITY_RETRY_RESET
    }

    const fn default_bep_ceiling() -> u32 {
        STABILITY_BEP_CEILING
    }

    const fn default_event_chance() -> f64 {
        MARKET_EVENT_CHANCE
    }

    const fn default_sales_tick_ms() -> u64 {
        SALES_TICK_MS
    }

    const fn default_market_tick_ms() -> u64 {
        MARKET_TICK_MS
    }

    const fn default_sales_increment_min() -> u32 {
        SALES_INCREMENT_MIN
    }

    const fn default_sales_increment_max() -> u32 {
        SALES_INCREMENT_MAX
    }

    /// # Errors
    ///
    /// Returns [`CatalogError`] when a tunable is out of range.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.max == 0 || self.retry_reset > self.max {
            return Err(CatalogError::RangeViolation {
                field: "stability.retry_reset",
                min: 0.0,
                max: f64::from(self.max),
                value: f64::from(self.retry_reset),
            });
        }
        if !(self.event_chance.is_finite() && (0.0..=1.0).contains(&self.event_chance)) {
            return Err(CatalogError::RangeViolation {
                field: "stability.event_chance",
                min: 0.0,
                max: 1.0,
                value: self.event_chance,
            });
        }
        if self.sales_increment_min > self.sales_increment_max {
            return Err(CatalogError::InvalidBounds {
                field: "stability.sales_increment",
                min: f64::from(self.sales_increment_min),
                max: f64::from(self.sales_increment_max),
            });
        }
        Ok(())
    }
}

/// Derived figures shown next to the sliders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CvpReadout {
    pub contribution: f64,
    pub break_even: BreakEven,
    /// Margin of safety of the sales target over break-even, in percent.
    pub margin_of_safety: f64,
    /// Profit if the sales target is hit with the current costs.
    pub projected_profit: f64,
}

impl CvpReadout {
    #[must_use]
    pub fn compute(config: &CvpConfig, target_units: u32) -> Self {
        let break_even = config.break_even();
        Self {
            contribution: config.contribution(),
            break_even,
            margin_of_safety: margin_of_safety(target_units, break_even),
            projected_profit: config.profit_at(target_units),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SalesFrame {
    pub units: u32,
    pub profit: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimulationState {
    Idle,
    Running {
        sales: RepeatingTimer,
        market: RepeatingTimer,
    },
    Finished {
        profit: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationPhase {
    Idle,
    Running,
    Finished,
}

/// Per-scenario lab state.
#[derive(Debug, Clone, PartialEq)]
pub struct CvpLab {
    pub config: CvpConfig,
    pub stability: u32,
    pub units_sold: u32,
    history: VecDeque<SalesFrame>,
    event_log: VecDeque<String>,
    current_event: Option<String>,
    simulation: SimulationState,
}

impl CvpLab {
    #[must_use]
    pub const fn simulation(&self) -> &SimulationState {
        &self.simulation
    }

    #[must_use]
    pub fn history(&self) -> impl Iterator<Item = &SalesFrame> {
        self.history.iter()
    }

    #[must_use]
    pub fn event_log(&self) -> impl Iterator<Item = &str> {
        self.event_log.iter().map(String::as_str)
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.simulation, SimulationState::Running { .. })
    }

    fn halt(&mut self) {
        if let SimulationState::Running { sales, market } = &mut self.simulation {
            sales.cancel();
            market.cancel();
        }
    }

    fn push_frame(&mut self, frame: SalesFrame) {
        self.history.push_back(frame);
        while self.history.len() > HISTORY_WINDOW {
            self.history.pop_front();
        }
    }

    fn push_event(&mut self, message: String) {
        self.event_log.push_back(message);
        while self.event_log.len() > EVENT_LOG_WINDOW {
            self.event_log.pop_front();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BreakEvenAction {
    AdjustParameter { parameter: CvpParameter, value: f64 },
    StartSimulation,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BreakEvenRules {
    tuning: StabilityTuning,
}

/// Which timers fired at one instant.
#[derive(Debug, Clone, Copy, Default)]
struct Firing {
    sales: bool,
    market: bool,
}

impl BreakEvenRules {
    #[must_use]
    pub const fn new(tuning: StabilityTuning) -> Self {
        Self { tuning }
    }

    #[must_use]
    pub const fn tuning(&self) -> &StabilityTuning {
        &self.tuning
    }

    fn adjust(
        scenario: &BreakEvenScenario,
        lab: &mut CvpLab,
        parameter: CvpParameter,
        value: f64,
    ) -> Verdict {
        let snapped = scenario.bounds.for_parameter(parameter).apply(value);
        lab.config.set(parameter, snapped);
        let readout = CvpReadout::compute(&lab.config, scenario.target_units);
        let message = match readout.break_even {
            BreakEven::Units(units) => format!(
                "Break-even at {units} units. Margin of safety {:.1}%.",
                readout.margin_of_safety
            ),
            BreakEven::Unreachable => {
                "Break-even unreachable: price does not cover variable cost.".to_string()
            }
        };
        Verdict::Progress {
            feedback: Feedback::info(message),
        }
    }

    fn start(&self, lab: &mut CvpLab) -> Verdict {
        lab.stability = self.tuning.max;
        lab.units_sold = 0;
        lab.history.clear();
        lab.current_event = None;
        lab.simulation = SimulationState::Running {
            sales: RepeatingTimer::every_ms(self.tuning.sales_tick_ms),
            market: RepeatingTimer::every_ms(self.tuning.market_tick_ms),
        };
        Verdict::Progress {
            feedback: Feedback::info("Simulation live. Keep break-even low and ride out the market."),
        }
    }

    /// Step both timers to the next firing within `budget`.
    fn next_firing(lab: &mut CvpLab, budget: Duration) -> Option<(Duration, Firing)> {
        let SimulationState::Running { sales, market } = &mut lab.simulation else {
            return None;
        };
        let until_sales = sales.time_to_next()?;
        let until_market = market.time_to_next()?;
        let step = until_sales.min(until_market);
        if step > budget {
            sales.advance(budget);
            market.advance(budget);
            return None;
        }
        let firing = Firing {
            sales: sales.advance(step),
            market: market.advance(step),
        };
        Some((step, firing))
    }

    fn sales_tick(
        &self,
        scenario: &BreakEvenScenario,
        lab: &mut CvpLab,
        rng: &mut dyn RandomSource,
    ) -> Option<Verdict> {
        let increment = rng.next_between(
            RandomStream::SalesTick,
            self.tuning.sales_increment_min,
            self.tuning.sales_increment_max,
        );
        let units = lab.units_sold.saturating_add(increment).min(scenario.target_units);
        lab.units_sold = units;
        lab.push_frame(SalesFrame {
            units,
            profit: lab.config.profit_at(units),
        });
        if units < scenario.target_units {
            return None;
        }
        lab.halt();
        let profit = lab.config.profit_at(units);
        lab.simulation = SimulationState::Finished { profit };
        Some(Verdict::Solved {
            feedback: Feedback::success(format!(
                "Target of {units} units reached. Final profit ${profit:.2}."
            )),
        })
    }

    fn market_tick(
        &self,
        scenario: &BreakEvenScenario,
        lab: &mut CvpLab,
        rng: &mut dyn RandomSource,
    ) -> Option<Verdict> {
        let exposed = match lab.config.break_even() {
            BreakEven::Unreachable => true,
            BreakEven::Units(units) => units > self.tuning.bep_ceiling,
        };
        lab.stability = if exposed {
            lab.stability.saturating_sub(self.tuning.decay)
        } else {
            lab.stability.saturating_add(self.tuning.recovery).min(self.tuning.max)
        };

        lab.current_event = None;
        if !scenario.events.is_empty()
            && rng.next_unit(RandomStream::MarketEvent) < self.tuning.event_chance
        {
            let len = u32::try_from(scenario.events.len()).unwrap_or(u32::MAX);
            let pick = usize::try_from(rng.next_below(RandomStream::MarketEvent, len)).unwrap_or(0);
            if let Some(event) = scenario.events.get(pick) {
                lab.config.variable_cost = scenario
                    .event_variable_clamp
                    .clamp(lab.config.variable_cost + event.variable_effect);
                lab.config.fixed_cost = scenario
                    .event_fixed_clamp
                    .clamp(lab.config.fixed_cost + event.fixed_effect);
                lab.push_event(format!("{}: {}", event.name, event.message));
                lab.current_event = Some(event.name.clone());
            }
        }

        if lab.stability > 0 {
            return None;
        }
        lab.halt();
        lab.stability = self.tuning.retry_reset;
        lab.simulation = SimulationState::Idle;
        Some(Verdict::Mistake {
            topic: Topic::BreakEven,
            severity: DEFAULT_MISTAKE_SEVERITY,
            feedback: Feedback::warning("Stability collapsed. The business could not hold.")
                .with_hint(format!(
                    "Keep break-even under {} units before you launch.",
                    self.tuning.bep_ceiling
                )),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakEvenView {
    pub title: String,
    pub config: CvpConfig,
    pub bounds: CvpBounds,
    pub readout: CvpReadout,
    pub stability: u32,
    pub units_sold: u32,
    pub target_units: u32,
    pub simulation: SimulationPhase,
    pub final_profit: Option<f64>,
    pub history: Vec<SalesFrame>,
    pub event_log: Vec<String>,
    pub current_event: Option<String>,
}

impl PhaseRules for BreakEvenRules {
    type Scenario = BreakEvenScenario;
    type Action = BreakEvenAction;
    type Local = CvpLab;

    const PHASE: PhaseId = PhaseId::BreakEven;

    fn prepare(&self, scenario: &BreakEvenScenario) -> CvpLab {
        CvpLab {
            config: scenario.start,
            stability: self.tuning.max,
            units_sold: 0,
            history: VecDeque::with_capacity(HISTORY_WINDOW),
            event_log: VecDeque::with_capacity(EVENT_LOG_WINDOW),
            current_event: None,
            simulation: SimulationState::Idle,
        }
    }

    fn evaluate(
        &self,
        scenario: &BreakEvenScenario,
        lab: &mut CvpLab,
        action: BreakEvenAction,
        _ctx: &mut PhaseCtx<'_>,
    ) -> Result<Verdict, PhaseError> {
        if lab.is_running() {
            return Err(PhaseError::InvalidAction {
                phase: Self::PHASE,
                reason: "the simulation is running",
            });
        }
        match action {
            BreakEvenAction::AdjustParameter { value, .. } if !value.is_finite() => {
                Err(PhaseError::InvalidAction {
                    phase: Self::PHASE,
                    reason: "slider value must be finite",
                })
            }
            BreakEvenAction::AdjustParameter { parameter, value } => {
                Ok(Self::adjust(scenario, lab, parameter, value))
            }
            BreakEvenAction::StartSimulation => Ok(self.start(lab)),
        }
    }

    fn on_tick(
        &self,
        scenario: &BreakEvenScenario,
        lab: &mut CvpLab,
        elapsed: Duration,
        ctx: &mut PhaseCtx<'_>,
    ) -> Option<Verdict> {
        let mut remaining = elapsed;
        while let Some((step, firing)) = Self::next_firing(lab, remaining) {
            remaining = remaining.saturating_sub(step);
            if firing.sales
                && let Some(verdict) = self.sales_tick(scenario, lab, ctx.rng)
            {
                return Some(verdict);
            }
            if firing.market
                && let Some(verdict) = self.market_tick(scenario, lab, ctx.rng)
            {
                return Some(verdict);
            }
        }
        None
    }

    fn is_busy(&self, lab: &CvpLab) -> bool {
        lab.is_running()
    }

    fn teardown(&self, lab: &mut CvpLab) {
        if lab.is_running() {
            lab.halt();
            lab.simulation = SimulationState::Idle;
        }
    }

    fn detail(&self, scenario: &BreakEvenScenario, lab: &CvpLab) -> PhaseDetail {
        let (simulation, final_profit) = match lab.simulation {
            SimulationState::Idle => (SimulationPhase::Idle, None),
            SimulationState::Running { .. } => (SimulationPhase::Running, None),
            SimulationState::Finished { profit } => (SimulationPhase::Finished, Some(profit)),
        };
        PhaseDetail::BreakEven(BreakEvenView {
            title: scenario.title.clone(),
            config: lab.config,
            bounds: scenario.bounds,
            readout: CvpReadout::compute(&lab.config, scenario.target_units),
            stability: lab.stability,
            units_sold: lab.units_sold,
            target_units: scenario.target_units,
            simulation,
            final_profit,
            history: lab.history.iter().copied().collect(),
            event_log: lab.event_log.iter().cloned().collect(),
            current_event: lab.current_event.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::{PhaseEngine, PhaseStatus};
    use crate::rng::ScriptedRandom;
    use crate::store::ProgressStore;

    fn lab_scenario() -> BreakEvenScenario {
        BreakEvenScenario {
            title: "Lab".to_string(),
            start: CvpConfig {
                price: 50.0,
                variable_cost: 20.0,
                fixed_cost: 4_000.0,
            },
            bounds: CvpBounds::default(),
            target_units: 1_000,
            event_variable_clamp: ValueRange::new(10.0, 40.0),
            event_fixed_clamp: ValueRange::new(2_000.0, 8_000.0),
            events: vec![MarketEvent {
                name: "Rent Hike".to_string(),
                variable_effect: 0.0,
                fixed_effect: 2_000.0,
                message: "Fixed costs jumped!".to_string(),
            }],
        }
    }

    fn started(tuning: StabilityTuning) -> PhaseEngine<BreakEvenRules> {
        let mut engine = PhaseEngine::new(BreakEvenRules::new(tuning), vec![lab_scenario()]).unwrap();
        engine.start().unwrap();
        engine
    }

    #[test]
    fn sliders_clamp_and_snap() {
        let bounds = CvpBounds::default();
        assert!((bounds.price.apply(150.0) - 100.0).abs() < f64::EPSILON);
        assert!((bounds.price.apply(49.6) - 50.0).abs() < f64::EPSILON);
        assert!((bounds.fixed_cost.apply(4_049.0) - 4_000.0).abs() < f64::EPSILON);
        assert!((bounds.variable_cost.apply(-3.0) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn adjusting_recomputes_without_mistakes() {
        let mut store = ProgressStore::new();
        let mut rng = ScriptedRandom::new();
        let mut engine = started(StabilityTuning::default());
        let mut ctx = PhaseCtx {
            store: &mut store,
            rng: &mut rng,
        };
        let step = engine
            .act(
                BreakEvenAction::AdjustParameter {
                    parameter: CvpParameter::Price,
                    value: 20.0,
                },
                &mut ctx,
            )
            .unwrap();
        assert!(matches!(step.verdict, Verdict::Progress { .. }));
        let PhaseDetail::BreakEven(view) = engine.view().detail else {
            panic!("wrong detail variant");
        };
        assert_eq!(view.readout.break_even, BreakEven::Unreachable);
        assert_eq!(ctx.store.state().mistakes, 0);
    }

    #[test]
    fn readout_for_start_config() {
        let readout = CvpReadout::compute(&lab_scenario().start, 1_000);
        assert_eq!(readout.break_even, BreakEven::Units(134));
        assert!((readout.margin_of_safety - 86.6).abs() < 1e-9);
        assert!((readout.projected_profit - 26_000.0).abs() < 1e-9);
    }

    #[test]
    fn simulation_reaches_target_and_solves() {
        let mut store = ProgressStore::new();
        store.set_phase(4);
        let mut rng = ScriptedRandom::new()
            .with_fallback_integer(49)
            .with_fallback_unit(0.99);
        let mut engine = started(StabilityTuning::default());
        let mut ctx = PhaseCtx {
            store: &mut store,
            rng: &mut rng,
        };
        engine.act(BreakEvenAction::StartSimulation, &mut ctx).unwrap();
        assert_eq!(engine.status(), PhaseStatus::Evaluating);
        // 59 units per 100 ms tick: 17 ticks to reach 1000.
        assert!(engine.tick(Duration::from_millis(1_600), &mut ctx).is_none());
        assert_eq!(engine.local().units_sold, 944);
        let outcome = engine.tick(Duration::from_millis(100), &mut ctx).unwrap();
        assert!(outcome.completed);
        assert_eq!(ctx.store.state().score, 2_500);
        assert_eq!(engine.status(), PhaseStatus::Completed);
    }

    #[test]
    fn stability_collapse_is_a_retry_mistake() {
        let tuning = StabilityTuning {
            decay: 100,
            bep_ceiling: 100,
            ..StabilityTuning::default()
        };
        let mut store = ProgressStore::new();
        let mut rng = ScriptedRandom::new()
            .with_fallback_integer(0)
            .with_fallback_unit(0.99);
        let mut engine = started(tuning);
        let mut ctx = PhaseCtx {
            store: &mut store,
            rng: &mut rng,
        };
        engine.act(BreakEvenAction::StartSimulation, &mut ctx).unwrap();
        // 10 units per tick never reaches 1000 before the 3 s market tick.
        let outcome = engine.tick(Duration::from_secs(5), &mut ctx).unwrap();
        match outcome.verdict {
            Verdict::Mistake { topic, .. } => assert_eq!(topic, Topic::BreakEven),
            other => panic!("expected mistake, got {other:?}"),
        }
        assert_eq!(engine.local().units_sold, 300);
        assert_eq!(engine.local().stability, STABILITY_RETRY_RESET);
        assert_eq!(engine.status(), PhaseStatus::Active);
        assert!(!outcome.completed);
    }

    #[test]
    fn market_event_applies_clamped_effect() {
        let rules = BreakEvenRules::default();
        let scenario = lab_scenario();
        let mut lab = rules.prepare(&scenario);
        lab.config.fixed_cost = 7_000.0;
        let mut rng = ScriptedRandom::new()
            .with_units(RandomStream::MarketEvent, [0.1])
            .with_integers(RandomStream::MarketEvent, [0]);
        assert!(rules.market_tick(&scenario, &mut lab, &mut rng).is_none());
        assert!((lab.config.fixed_cost - 8_000.0).abs() < f64::EPSILON);
        assert_eq!(lab.current_event.as_deref(), Some("Rent Hike"));
        assert_eq!(lab.event_log().count(), 1);
    }

    #[test]
    fn history_window_is_capped() {
        let rules = BreakEvenRules::default();
        let scenario = lab_scenario();
        let mut lab = rules.prepare(&scenario);
        let mut rng = ScriptedRandom::new().with_fallback_integer(0);
        for _ in 0..30 {
            rules.sales_tick(&scenario, &mut lab, &mut rng);
        }
        assert_eq!(lab.history().count(), HISTORY_WINDOW);
        assert_eq!(lab.history().last().map(|frame| frame.units), Some(300));
    }

    #[test]
    fn adjusting_while_running_is_rejected() {
        let mut store = ProgressStore::new();
        let mut rng = ScriptedRandom::new();
        let mut engine = started(StabilityTuning::default());
        let mut ctx = PhaseCtx {
            store: &mut store,
            rng: &mut rng,
        };
        engine.act(BreakEvenAction::StartSimulation, &mut ctx).unwrap();
        let err = engine
            .act(
                BreakEvenAction::AdjustParameter {
                    parameter: CvpParameter::FixedCost,
                    value: 1_000.0,
                },
                &mut ctx,
            )
            .unwrap_err();
        assert!(matches!(err, PhaseError::InvalidAction { .. }));
    }

    #[test]
    fn teardown_cancels_timers() {
        let mut store = ProgressStore::new();
        let mut rng = ScriptedRandom::new().with_fallback_integer(49);
        let mut engine = started(StabilityTuning::default());
        let mut ctx = PhaseCtx {
            store: &mut store,
            rng: &mut rng,
        };
        engine.act(BreakEvenAction::StartSimulation, &mut ctx).unwrap();
        engine.tick(Duration::from_millis(300), &mut ctx);
        let sold = engine.local().units_sold;
        engine.teardown();
        assert!(!engine.local().is_running());
        assert!(engine.tick(Duration::from_secs(60), &mut ctx).is_none());
        assert_eq!(engine.local().units_sold, sold);
        assert_eq!(ctx.store.state().score, 0);
    }
}
