//! Phase 3: marginal versus absorption costing.
//!
//! Two stages per scenario. The player first enters both unit costs; once
//! they match, the profit reconciliation is revealed and the player has to
//! pick the explanation for the gap between the two profit figures.
use serde::{Deserialize, Serialize};

use super::{Feedback, PhaseCtx, PhaseDetail, PhaseError, PhaseId, PhaseRules, Verdict};
use crate::constants::{COST_TOLERANCE, DEFAULT_MISTAKE_SEVERITY};
use crate::cost_model::{
    ProfitReconciliation, reconcile_profit, unit_cost_absorption, unit_cost_marginal,
};
use crate::numbers::approx_eq;
use crate::state::Topic;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplanationOption {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostingDuelScenario {
    pub title: String,
    pub units_produced: u32,
    pub units_sold: u32,
    pub variable_cost: f64,
    pub fixed_overhead: f64,
    pub price: f64,
    pub options: Vec<ExplanationOption>,
    /// Shown once the right explanation is chosen.
    pub debrief: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CostingDuelAction {
    SubmitCosts { marginal: f64, absorption: f64 },
    ChooseExplanation { option_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum DuelStage {
    Calculate,
    Explain { reconciliation: ProfitReconciliation },
}

#[derive(Debug, Clone, Copy)]
pub struct CostingDuelRules {
    tolerance: f64,
}

impl Default for CostingDuelRules {
    fn default() -> Self {
        Self::new(COST_TOLERANCE)
    }
}

impl CostingDuelRules {
    #[must_use]
    pub const fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    fn check_costs(
        &self,
        scenario: &CostingDuelScenario,
        marginal: f64,
        absorption: f64,
    ) -> Result<(DuelStage, Verdict), PhaseError> {
        let expected_marginal = unit_cost_marginal(scenario.variable_cost);
        let expected_absorption = unit_cost_absorption(
            scenario.variable_cost,
            scenario.fixed_overhead,
            scenario.units_produced,
        )?;
        if !(approx_eq(marginal, expected_marginal, self.tolerance)
            && approx_eq(absorption, expected_absorption, self.tolerance))
        {
            return Ok((
                DuelStage::Calculate,
                Verdict::Mistake {
                    topic: Topic::Calculating,
                    severity: DEFAULT_MISTAKE_SEVERITY,
                    feedback: Feedback::warning("Your unit costs don't add up.").with_hint(
                        "Marginal cost is the variable cost only. Absorption adds fixed overhead divided by units produced.",
                    ),
                },
            ));
        }
        let reconciliation = reconcile_profit(
            scenario.units_produced,
            scenario.units_sold,
            scenario.fixed_overhead,
            scenario.price,
            scenario.variable_cost,
        )?;
        let verdict = Verdict::Progress {
            feedback: Feedback::success(format!(
                "Both costs check out. Marginal profit ${:.2}, absorption profit ${:.2}. Why the ${:.2} gap?",
                reconciliation.marginal_profit,
                reconciliation.absorption_profit,
                reconciliation.inventory_valuation_gap.abs()
            )),
        };
        Ok((DuelStage::Explain { reconciliation }, verdict))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionCard {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostingDuelView {
    pub title: String,
    pub units_produced: u32,
    pub units_sold: u32,
    pub variable_cost: f64,
    pub fixed_overhead: f64,
    pub price: f64,
    pub stage: DuelStage,
    /// Empty until the calculation stage is cleared.
    pub options: Vec<OptionCard>,
}

impl PhaseRules for CostingDuelRules {
    type Scenario = CostingDuelScenario;
    type Action = CostingDuelAction;
    type Local = DuelStage;

    const PHASE: PhaseId = PhaseId::CostingDuel;

    fn prepare(&self, _scenario: &CostingDuelScenario) -> DuelStage {
        DuelStage::Calculate
    }

    fn evaluate(
        &self,
        scenario: &CostingDuelScenario,
        stage: &mut DuelStage,
        action: CostingDuelAction,
        _ctx: &mut PhaseCtx<'_>,
    ) -> Result<Verdict, PhaseError> {
        match (*stage, action) {
            (
                DuelStage::Calculate,
                CostingDuelAction::SubmitCosts {
                    marginal,
                    absorption,
                },
            ) => {
                let (next, verdict) = self.check_costs(scenario, marginal, absorption)?;
                *stage = next;
                Ok(verdict)
            }
            (DuelStage::Explain { .. }, CostingDuelAction::ChooseExplanation { option_id }) => {
                let option = scenario
                    .options
                    .iter()
                    .find(|option| option.id == option_id)
                    .ok_or(PhaseError::UnknownOption(option_id))?;
                if option.correct {
                    Ok(Verdict::Solved {
                        feedback: Feedback::success(scenario.debrief.clone()),
                    })
                } else {
                    Ok(Verdict::Mistake {
                        topic: Topic::AbsorptionLogic,
                        severity: DEFAULT_MISTAKE_SEVERITY,
                        feedback: Feedback::warning("That's not where the gap comes from.").with_hint(
                            "Compare units produced with units sold. Where does the unsold stock's share of fixed overhead go?",
                        ),
                    })
                }
            }
            (DuelStage::Calculate, CostingDuelAction::ChooseExplanation { .. }) => {
                Err(PhaseError::InvalidAction {
                    phase: Self::PHASE,
                    reason: "unit costs must be calculated first",
                })
            }
            (DuelStage::Explain { .. }, CostingDuelAction::SubmitCosts { .. }) => {
                Err(PhaseError::InvalidAction {
                    phase: Self::PHASE,
                    reason: "unit costs are already settled",
                })
            }
        }
    }

    fn detail(&self, scenario: &CostingDuelScenario, stage: &DuelStage) -> PhaseDetail {
        let options = match stage {
            DuelStage::Calculate => Vec::new(),
            DuelStage::Explain { .. } => scenario
                .options
                .iter()
                .map(|option| OptionCard {
                    id: option.id.clone(),
                    text: option.text.clone(),
                })
                .collect(),
        };
        PhaseDetail::CostingDuel(CostingDuelView {
            title: scenario.title.clone(),
            units_produced: scenario.units_produced,
            units_sold: scenario.units_sold,
            variable_cost: scenario.variable_cost,
            fixed_overhead: scenario.fixed_overhead,
            price: scenario.price,
            stage: *stage,
            options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::PhaseEngine;
    use crate::rng::ScriptedRandom;
    use crate::store::ProgressStore;

    fn duel(units_produced: u32) -> CostingDuelScenario {
        CostingDuelScenario {
            title: "Inventory build-up".to_string(),
            units_produced,
            units_sold: 800,
            variable_cost: 10.50,
            fixed_overhead: 5_000.0,
            price: 50.0,
            options: vec![
                ExplanationOption {
                    id: "a".to_string(),
                    text: "Unsold units carry fixed overhead into inventory.".to_string(),
                    correct: true,
                },
                ExplanationOption {
                    id: "b".to_string(),
                    text: "Absorption costing creates money.".to_string(),
                    correct: false,
                },
            ],
            debrief: "Timing effect.".to_string(),
        }
    }

    fn submit(marginal: f64, absorption: f64) -> CostingDuelAction {
        CostingDuelAction::SubmitCosts {
            marginal,
            absorption,
        }
    }

    fn choose(option_id: &str) -> CostingDuelAction {
        CostingDuelAction::ChooseExplanation {
            option_id: option_id.to_string(),
        }
    }

    #[test]
    fn wrong_costs_are_calculation_mistakes() {
        let mut store = ProgressStore::new();
        let mut rng = ScriptedRandom::new();
        let mut engine = PhaseEngine::new(CostingDuelRules::default(), vec![duel(1_000)]).unwrap();
        engine.start().unwrap();
        let mut ctx = PhaseCtx {
            store: &mut store,
            rng: &mut rng,
        };
        let step = engine.act(submit(10.50, 10.50), &mut ctx).unwrap();
        assert!(step.verdict.is_mistake());
        assert_eq!(*engine.local(), DuelStage::Calculate);
        assert_eq!(ctx.store.state().mistakes_on(Topic::Calculating), 1);
    }

    #[test]
    fn correct_costs_reveal_reconciliation_then_explanation_solves() {
        let mut store = ProgressStore::new();
        store.set_phase(3);
        let mut rng = ScriptedRandom::new();
        let mut engine = PhaseEngine::new(CostingDuelRules::default(), vec![duel(1_000)]).unwrap();
        engine.start().unwrap();
        let mut ctx = PhaseCtx {
            store: &mut store,
            rng: &mut rng,
        };
        let step = engine.act(submit(10.50, 15.505), &mut ctx).unwrap();
        assert!(matches!(step.verdict, Verdict::Progress { .. }));
        let DuelStage::Explain { reconciliation } = *engine.local() else {
            panic!("expected explain stage");
        };
        assert!((reconciliation.inventory_valuation_gap - 1_000.0).abs() < 0.01);

        let wrong = engine.act(choose("b"), &mut ctx).unwrap();
        assert!(wrong.verdict.is_mistake());
        assert_eq!(ctx.store.state().mistakes_on(Topic::AbsorptionLogic), 1);

        let right = engine.act(choose("a"), &mut ctx).unwrap();
        assert!(right.completed);
        assert_eq!(ctx.store.state().score, 2_000);
    }

    #[test]
    fn stage_mismatch_is_input_error() {
        let mut store = ProgressStore::new();
        let mut rng = ScriptedRandom::new();
        let mut engine = PhaseEngine::new(CostingDuelRules::default(), vec![duel(1_000)]).unwrap();
        engine.start().unwrap();
        let mut ctx = PhaseCtx {
            store: &mut store,
            rng: &mut rng,
        };
        assert!(matches!(
            engine.act(choose("a"), &mut ctx),
            Err(PhaseError::InvalidAction { .. })
        ));
        engine.act(submit(10.50, 15.50), &mut ctx).unwrap();
        assert!(matches!(
            engine.act(submit(10.50, 15.50), &mut ctx),
            Err(PhaseError::InvalidAction { .. })
        ));
        assert_eq!(
            engine.act(choose("z"), &mut ctx).unwrap_err(),
            PhaseError::UnknownOption("z".to_string())
        );
        assert_eq!(ctx.store.state().mistakes, 0);
    }

    #[test]
    fn zero_production_surfaces_cost_model_error() {
        let mut store = ProgressStore::new();
        let mut rng = ScriptedRandom::new();
        let mut engine = PhaseEngine::new(CostingDuelRules::default(), vec![duel(0)]).unwrap();
        engine.start().unwrap();
        let mut ctx = PhaseCtx {
            store: &mut store,
            rng: &mut rng,
        };
        assert_eq!(
            engine.act(submit(10.50, 15.50), &mut ctx).unwrap_err(),
            PhaseError::CostModel(crate::cost_model::CostModelError::ZeroProduction)
        );
    }

    #[test]
    fn options_hidden_until_explain_stage() {
        let rules = CostingDuelRules::default();
        let scenario = duel(1_000);
        let PhaseDetail::CostingDuel(view) = rules.detail(&scenario, &DuelStage::Calculate) else {
            panic!("wrong detail variant");
        };
        assert!(view.options.is_empty());
    }
}
