//! Phase 2: accept or reject special orders, optionally haggling first.
use serde::{Deserialize, Serialize};

use super::{Feedback, PhaseCtx, PhaseDetail, PhaseError, PhaseId, PhaseRules, Verdict};
use crate::constants::{
    DEFAULT_MISTAKE_SEVERITY, PATIENCE_MIN_DECAY, PATIENCE_SENSITIVITY, PATIENCE_START,
    WALK_AWAY_GATE,
};
use crate::cost_model::{contribution_per_unit, is_contributing};
use crate::data::CatalogError;
use crate::rng::RandomStream;
use crate::state::Topic;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialOrderScenario {
    pub title: String,
    pub description: String,
    pub units: u32,
    pub offer_price: f64,
    /// Regular list price, shown for comparison only.
    pub normal_price: f64,
    pub variable_cost: f64,
    pub hint: String,
    /// Whether the player may counter-offer before committing.
    #[serde(default)]
    pub negotiable: bool,
    #[serde(default = "SpecialOrderScenario::default_severity")]
    pub severity: u32,
}

impl SpecialOrderScenario {
    const fn default_severity() -> u32 {
        DEFAULT_MISTAKE_SEVERITY
    }

    #[must_use]
    pub fn contribution(&self) -> f64 {
        contribution_per_unit(self.offer_price, self.variable_cost)
    }
}

/// Patience model for negotiable orders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NegotiationTuning {
    #[serde(default = "NegotiationTuning::default_patience_start")]
    pub patience_start: f64,
    /// Below this patience a commit may end with the buyer walking away.
    #[serde(default = "NegotiationTuning::default_walk_away_gate")]
    pub walk_away_gate: f64,
    /// Patience lost per percent of price raised.
    #[serde(default = "NegotiationTuning::default_sensitivity")]
    pub sensitivity: f64,
    /// Floor on patience lost per raise.
    #[serde(default = "NegotiationTuning::default_min_decay")]
    pub min_decay: f64,
}

impl Default for NegotiationTuning {
    fn default() -> Self {
        Self {
            patience_start: Self::default_patience_start(),
            walk_away_gate: Self::default_walk_away_gate(),
            sensitivity: Self::default_sensitivity(),
            min_decay: Self::default_min_decay(),
        }
    }
}

impl NegotiationTuning {
    const fn default_patience_start() -> f64 {
        PATIENCE_START
    }

    const fn default_walk_away_gate() -> f64 {
        WALK_AWAY_GATE
    }

    const fn default_sensitivity() -> f64 {
        PATIENCE_SENSITIVITY
    }

    const fn default_min_decay() -> f64 {
        PATIENCE_MIN_DECAY
    }

    /// # Errors
    ///
    /// Returns [`CatalogError::RangeViolation`] when a tunable is outside its range.
    pub fn validate(&self) -> Result<(), CatalogError> {
        check_range("negotiation.patience_start", self.patience_start, 1.0, 100.0)?;
        check_range("negotiation.walk_away_gate", self.walk_away_gate, 0.0, 100.0)?;
        check_range("negotiation.sensitivity", self.sensitivity, 0.0, 100.0)?;
        check_range("negotiation.min_decay", self.min_decay, 0.0, 100.0)?;
        Ok(())
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), CatalogError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(CatalogError::RangeViolation {
            field,
            min,
            max,
            value,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpecialOrderAction {
    /// Take or pass on the order at the offered price.
    Decide { accept: bool },
    /// Move the counter-price by `delta` dollars per unit.
    Negotiate { delta: f64 },
    /// Lock in the counter-price.
    Commit,
}

/// Counter-offer state for the current order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderDesk {
    pub counter_price: f64,
    pub patience: f64,
    pub raises: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpecialOrderRules {
    tuning: NegotiationTuning,
}

impl SpecialOrderRules {
    #[must_use]
    pub const fn new(tuning: NegotiationTuning) -> Self {
        Self { tuning }
    }

    #[must_use]
    pub const fn tuning(&self) -> &NegotiationTuning {
        &self.tuning
    }

    /// Chance the buyer walks on commit at this patience.
    #[must_use]
    pub fn walk_away_chance(&self, patience: f64) -> f64 {
        if patience >= self.tuning.walk_away_gate {
            0.0
        } else {
            ((100.0 - patience) / 100.0).clamp(0.0, 1.0)
        }
    }

    fn decide(
        scenario: &SpecialOrderScenario,
        accept: bool,
        ctx: &mut PhaseCtx<'_>,
    ) -> Verdict {
        let contribution = scenario.contribution();
        if is_contributing(contribution) != accept {
            return Verdict::Mistake {
                topic: Topic::Marginal,
                severity: scenario.severity,
                feedback: Feedback::warning("You missed the contribution check.")
                    .with_hint(scenario.hint.clone()),
            };
        }
        if accept {
            let gain = f64::from(scenario.units) * contribution;
            ctx.store.add_cash(gain);
            Verdict::Solved {
                feedback: Feedback::success(format!(
                    "Deal closed. ${contribution:.2} per unit adds ${gain:.2}."
                )),
            }
        } else {
            Verdict::Solved {
                feedback: Feedback::success(format!(
                    "Good pass. Every unit would have lost ${:.2}.",
                    -contribution
                )),
            }
        }
    }

    fn negotiate(&self, scenario: &SpecialOrderScenario, desk: &mut OrderDesk, delta: f64) -> Verdict {
        let previous = desk.counter_price;
        desk.counter_price = (previous + delta).max(scenario.offer_price);
        if desk.counter_price > previous {
            let raise_pct = if previous > 0.0 {
                (desk.counter_price - previous) / previous * 100.0
            } else {
                100.0
            };
            let decay = (raise_pct * self.tuning.sensitivity).max(self.tuning.min_decay);
            desk.patience = (desk.patience - decay).max(0.0);
            desk.raises = desk.raises.saturating_add(1);
        }
        Verdict::Progress {
            feedback: Feedback::info(format!(
                "Counter at ${:.2}. Buyer patience {:.0}%.",
                desk.counter_price, desk.patience
            )),
        }
    }

    fn commit(
        &self,
        scenario: &SpecialOrderScenario,
        desk: &mut OrderDesk,
        ctx: &mut PhaseCtx<'_>,
    ) -> Verdict {
        let chance = self.walk_away_chance(desk.patience);
        if chance > 0.0 && ctx.rng.next_unit(RandomStream::Negotiation) < chance {
            *desk = self.fresh_desk(scenario);
            return Verdict::Mistake {
                topic: Topic::Marginal,
                severity: scenario.severity,
                feedback: Feedback::warning("The buyer walked away. You pushed too hard.")
                    .with_hint("Every raise burns patience. Bank the contribution before it's gone."),
            };
        }
        let contribution = contribution_per_unit(desk.counter_price, scenario.variable_cost);
        if !is_contributing(contribution) {
            return Verdict::Mistake {
                topic: Topic::Marginal,
                severity: scenario.severity,
                feedback: Feedback::warning(format!(
                    "At ${:.2} you lose money on every unit.",
                    desk.counter_price
                ))
                .with_hint(scenario.hint.clone()),
            };
        }
        let gain = f64::from(scenario.units) * contribution;
        ctx.store.add_cash(gain);
        Verdict::Solved {
            feedback: Feedback::success(format!(
                "Closed at ${:.2} after {} raise(s). Contribution ${gain:.2}.",
                desk.counter_price, desk.raises
            )),
        }
    }

    fn fresh_desk(&self, scenario: &SpecialOrderScenario) -> OrderDesk {
        OrderDesk {
            counter_price: scenario.offer_price,
            patience: self.tuning.patience_start,
            raises: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialOrderView {
    pub title: String,
    pub description: String,
    pub units: u32,
    pub offer_price: f64,
    pub normal_price: f64,
    pub variable_cost: f64,
    pub negotiable: bool,
    pub counter_price: f64,
    pub patience: f64,
    pub walk_away_chance: f64,
}

impl PhaseRules for SpecialOrderRules {
    type Scenario = SpecialOrderScenario;
    type Action = SpecialOrderAction;
    type Local = OrderDesk;

    const PHASE: PhaseId = PhaseId::SpecialOrder;

    fn prepare(&self, scenario: &SpecialOrderScenario) -> OrderDesk {
        self.fresh_desk(scenario)
    }

    fn evaluate(
        &self,
        scenario: &SpecialOrderScenario,
        desk: &mut OrderDesk,
        action: SpecialOrderAction,
        ctx: &mut PhaseCtx<'_>,
    ) -> Result<Verdict, PhaseError> {
        match action {
            SpecialOrderAction::Decide { accept } => Ok(Self::decide(scenario, accept, ctx)),
            SpecialOrderAction::Negotiate { .. } | SpecialOrderAction::Commit
                if !scenario.negotiable =>
            {
                Err(PhaseError::InvalidAction {
                    phase: Self::PHASE,
                    reason: "this order is not negotiable",
                })
            }
            SpecialOrderAction::Negotiate { delta } if !delta.is_finite() => {
                Err(PhaseError::InvalidAction {
                    phase: Self::PHASE,
                    reason: "counter-offer delta must be finite",
                })
            }
            SpecialOrderAction::Negotiate { delta } => Ok(self.negotiate(scenario, desk, delta)),
            SpecialOrderAction::Commit => Ok(self.commit(scenario, desk, ctx)),
        }
    }

    fn detail(&self, scenario: &SpecialOrderScenario, desk: &OrderDesk) -> PhaseDetail {
        PhaseDetail::SpecialOrder(SpecialOrderView {
            title: scenario.title.clone(),
            description: scenario.description.clone(),
            units: scenario.units,
            offer_price: scenario.offer_price,
            normal_price: scenario.normal_price,
            variable_cost: scenario.variable_cost,
            negotiable: scenario.negotiable,
            counter_price: desk.counter_price,
            patience: desk.patience,
            walk_away_chance: self.walk_away_chance(desk.patience),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::PhaseEngine;
    use crate::rng::ScriptedRandom;
    use crate::store::ProgressStore;

    fn order(offer_price: f64, negotiable: bool) -> SpecialOrderScenario {
        SpecialOrderScenario {
            title: "Trip".to_string(),
            description: "A school trip.".to_string(),
            units: 100,
            offer_price,
            normal_price: 1.50,
            variable_cost: 0.20,
            hint: "Price above variable cost contributes.".to_string(),
            negotiable,
            severity: DEFAULT_MISTAKE_SEVERITY,
        }
    }

    fn started(scenarios: Vec<SpecialOrderScenario>) -> PhaseEngine<SpecialOrderRules> {
        let mut engine = PhaseEngine::new(SpecialOrderRules::default(), scenarios).unwrap();
        engine.start().unwrap();
        engine
    }

    #[test]
    fn accepting_contributing_order_adds_contribution() {
        let mut store = ProgressStore::new();
        let mut rng = ScriptedRandom::new();
        let mut engine = started(vec![order(0.60, false)]);
        let mut ctx = PhaseCtx {
            store: &mut store,
            rng: &mut rng,
        };
        let step = engine
            .act(SpecialOrderAction::Decide { accept: true }, &mut ctx)
            .unwrap();
        assert!(step.completed);
        assert_eq!(ctx.store.state().cash_cents, 100_000 + 4_000);
    }

    #[test]
    fn zero_contribution_must_be_rejected() {
        let mut store = ProgressStore::new();
        let mut rng = ScriptedRandom::new();
        let mut engine = started(vec![order(0.20, false)]);
        let mut ctx = PhaseCtx {
            store: &mut store,
            rng: &mut rng,
        };
        let step = engine
            .act(SpecialOrderAction::Decide { accept: true }, &mut ctx)
            .unwrap();
        assert!(step.verdict.is_mistake());
        assert_eq!(ctx.store.state().mistakes_on(Topic::Marginal), 1);
        let step = engine
            .act(SpecialOrderAction::Decide { accept: false }, &mut ctx)
            .unwrap();
        assert!(step.completed);
        assert_eq!(ctx.store.state().cash_cents, 100_000);
    }

    #[test]
    fn negotiation_requires_negotiable_order() {
        let mut store = ProgressStore::new();
        let mut rng = ScriptedRandom::new();
        let mut engine = started(vec![order(0.60, false)]);
        let mut ctx = PhaseCtx {
            store: &mut store,
            rng: &mut rng,
        };
        let err = engine
            .act(SpecialOrderAction::Negotiate { delta: 0.1 }, &mut ctx)
            .unwrap_err();
        assert!(matches!(err, PhaseError::InvalidAction { .. }));
    }

    #[test]
    fn raises_burn_patience_with_floor() {
        let rules = SpecialOrderRules::default();
        let scenario = order(0.40, true);
        let mut desk = rules.prepare(&scenario);
        // 0.40 -> 0.42 is a 5% raise: 2.5 points, floored at 5.
        rules.negotiate(&scenario, &mut desk, 0.02);
        assert!((desk.patience - 95.0).abs() < 1e-9);
        // 0.42 -> 0.63 is a 50% raise: 25 points.
        rules.negotiate(&scenario, &mut desk, 0.21);
        assert!((desk.patience - 70.0).abs() < 1e-9);
        assert_eq!(desk.raises, 2);
        // Lowering never drops below the offer and costs nothing.
        rules.negotiate(&scenario, &mut desk, -5.0);
        assert!((desk.counter_price - 0.40).abs() < f64::EPSILON);
        assert!((desk.patience - 70.0).abs() < 1e-9);
    }

    #[test]
    fn walk_away_only_below_gate() {
        let rules = SpecialOrderRules::default();
        assert!(rules.walk_away_chance(80.0).abs() < f64::EPSILON);
        assert!((rules.walk_away_chance(70.0) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn commit_walks_away_on_low_draw_and_resets_desk() {
        let mut store = ProgressStore::new();
        let mut rng = ScriptedRandom::new().with_units(RandomStream::Negotiation, [0.1, 0.9]);
        let mut engine = started(vec![order(0.40, true)]);
        let mut ctx = PhaseCtx {
            store: &mut store,
            rng: &mut rng,
        };
        engine
            .act(SpecialOrderAction::Negotiate { delta: 0.40 }, &mut ctx)
            .unwrap();
        assert!(engine.local().patience < 80.0);
        let walked = engine.act(SpecialOrderAction::Commit, &mut ctx).unwrap();
        assert!(walked.verdict.is_mistake());
        assert!((engine.local().patience - 100.0).abs() < f64::EPSILON);

        engine
            .act(SpecialOrderAction::Negotiate { delta: 0.40 }, &mut ctx)
            .unwrap();
        let closed = engine.act(SpecialOrderAction::Commit, &mut ctx).unwrap();
        assert!(closed.completed);
        // 100 units at 0.80 - 0.20
        assert_eq!(ctx.store.state().cash_cents, 100_000 + 6_000);
    }

    #[test]
    fn patient_buyer_never_draws() {
        let mut store = ProgressStore::new();
        let mut rng = ScriptedRandom::new();
        let mut engine = started(vec![order(0.45, true)]);
        let mut ctx = PhaseCtx {
            store: &mut store,
            rng: &mut rng,
        };
        let step = engine.act(SpecialOrderAction::Commit, &mut ctx).unwrap();
        assert!(step.completed);
        assert_eq!(ctx.store.state().cash_cents, 100_000 + 2_500);
    }

    #[test]
    fn tuning_validation_rejects_out_of_range() {
        let tuning = NegotiationTuning {
            walk_away_gate: 120.0,
            ..NegotiationTuning::default()
        };
        assert!(matches!(
            tuning.validate(),
            Err(CatalogError::RangeViolation {
                field: "negotiation.walk_away_gate",
                ..
            })
        ));
        assert!(NegotiationTuning::default().validate().is_ok());
    }
}
