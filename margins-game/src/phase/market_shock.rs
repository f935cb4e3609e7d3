//! Phase 5: pick a cost structure and see whether it survives a demand shock.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Feedback, PhaseCtx, PhaseDetail, PhaseError, PhaseId, PhaseRules, Verdict};
use crate::constants::{DEFAULT_MISTAKE_SEVERITY, SHOCK_BASELINE_UNITS, SHOCK_PRICE, SURVIVAL_THRESHOLD};
use crate::cost_model::{
    CostStructure, ShockOutcome, degree_of_operating_leverage, simulate_shock_with_threshold,
};
use crate::numbers::floor_f64_to_u32;
use crate::state::Topic;

/// A selectable operating model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverageModel {
    pub key: String,
    pub name: String,
    pub structure: CostStructure,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShockScenario {
    pub title: String,
    pub description: String,
    /// Fraction of baseline sales lost; negative values are growth.
    pub sales_drop: f64,
    /// Debrief per model key.
    #[serde(default)]
    pub lessons: BTreeMap<String, String>,
}

/// Market conditions shared by every shock scenario.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShockSettings {
    #[serde(default = "ShockSettings::default_baseline_units")]
    pub baseline_units: f64,
    #[serde(default = "ShockSettings::default_price")]
    pub price: f64,
    #[serde(default = "ShockSettings::default_survival_threshold")]
    pub survival_threshold: f64,
}

impl Default for ShockSettings {
    fn default() -> Self {
        Self {
            baseline_units: Self::default_baseline_units(),
            price: Self::default_price(),
            survival_threshold: Self::default_survival_threshold(),
        }
    }
}

impl ShockSettings {
    const fn default_baseline_units() -> f64 {
        SHOCK_BASELINE_UNITS
    }

    const fn default_price() -> f64 {
        SHOCK_PRICE
    }

    const fn default_survival_threshold() -> f64 {
        SURVIVAL_THRESHOLD
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectModel {
    pub model_key: String,
}

/// Result of one model selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShockReport {
    pub model_key: String,
    pub outcome: ShockOutcome,
    /// Model with the highest profit under this shock.
    pub best_model: String,
    pub best_profit: f64,
    /// Operating leverage of the chosen model at baseline volume.
    pub operating_leverage: Option<f64>,
}

/// Last report for the current scenario, kept for rendering retries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShockDesk {
    pub last_report: Option<ShockReport>,
}

#[derive(Debug, Clone)]
pub struct MarketShockRules {
    models: Vec<LeverageModel>,
    settings: ShockSettings,
}

impl MarketShockRules {
    #[must_use]
    pub const fn new(models: Vec<LeverageModel>, settings: ShockSettings) -> Self {
        Self { models, settings }
    }

    #[must_use]
    pub fn models(&self) -> &[LeverageModel] {
        &self.models
    }

    /// Run every model through the shock; pure, used for reports and policies.
    #[must_use]
    pub fn outcomes(&self, scenario: &ShockScenario) -> Vec<(&LeverageModel, ShockOutcome)> {
        self.models
            .iter()
            .map(|model| (model, self.run(model, scenario)))
            .collect()
    }

    fn run(&self, model: &LeverageModel, scenario: &ShockScenario) -> ShockOutcome {
        simulate_shock_with_threshold(
            &model.structure,
            scenario.sales_drop,
            self.settings.price,
            self.settings.baseline_units,
            self.settings.survival_threshold,
        )
    }

    fn report(&self, chosen: &LeverageModel, scenario: &ShockScenario) -> ShockReport {
        let outcome = self.run(chosen, scenario);
        let (best_model, best_profit) = self
            .outcomes(scenario)
            .into_iter()
            .max_by(|(_, left), (_, right)| left.profit.total_cmp(&right.profit))
            .map_or_else(
                || (chosen.key.clone(), outcome.profit),
                |(model, best)| (model.key.clone(), best.profit),
            );
        ShockReport {
            model_key: chosen.key.clone(),
            outcome,
            best_model,
            best_profit,
            operating_leverage: degree_of_operating_leverage(
                &chosen.structure,
                self.settings.price,
                self.settings.baseline_units,
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelCard {
    pub key: String,
    pub name: String,
    pub fixed_cost: f64,
    pub variable_cost: f64,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketShockView {
    pub title: String,
    pub description: String,
    pub sales_drop: f64,
    pub baseline_units: f64,
    pub projected_units: u32,
    pub models: Vec<ModelCard>,
    pub last_report: Option<ShockReport>,
}

impl PhaseRules for MarketShockRules {
    type Scenario = ShockScenario;
    type Action = SelectModel;
    type Local = ShockDesk;

    const PHASE: PhaseId = PhaseId::MarketShock;

    fn prepare(&self, _scenario: &ShockScenario) -> ShockDesk {
        ShockDesk::default()
    }

    fn evaluate(
        &self,
        scenario: &ShockScenario,
        desk: &mut ShockDesk,
        action: SelectModel,
        _ctx: &mut PhaseCtx<'_>,
    ) -> Result<Verdict, PhaseError> {
        let model = self
            .models
            .iter()
            .find(|model| model.key == action.model_key)
            .ok_or(PhaseError::UnknownModel(action.model_key))?;
        let report = self.report(model, scenario);
        let outcome = report.outcome;
        let lesson = scenario
            .lessons
            .get(&model.key)
            .cloned()
            .unwrap_or_else(|| format!("{} finished the shock.", model.name));
        let summary = format!(
            "{} units sold, profit ${:.2}. {lesson}",
            floor_f64_to_u32(outcome.resulting_units),
            outcome.profit
        );
        desk.last_report = Some(report);
        if outcome.survived {
            Ok(Verdict::Solved {
                feedback: Feedback::success(summary),
            })
        } else {
            Ok(Verdict::Mistake {
                topic: Topic::Leverage,
                severity: DEFAULT_MISTAKE_SEVERITY,
                feedback: Feedback::warning(summary).with_hint(
                    "High fixed costs magnify losses when volume falls. Match the cost mix to the market.",
                ),
            })
        }
    }

    fn detail(&self, scenario: &ShockScenario, desk: &ShockDesk) -> PhaseDetail {
        let projected = self.settings.baseline_units * (1.0 - scenario.sales_drop);
        PhaseDetail::MarketShock(MarketShockView {
            title: scenario.title.clone(),
            description: scenario.description.clone(),
            sales_drop: scenario.sales_drop,
            baseline_units: self.settings.baseline_units,
            projected_units: floor_f64_to_u32(projected),
            models: self
                .models
                .iter()
                .map(|model| ModelCard {
                    key: model.key.clone(),
                    name: model.name.clone(),
                    fixed_cost: model.structure.fixed_cost,
                    variable_cost: model.structure.variable_cost,
                    description: model.description.clone(),
                })
                .collect(),
            last_report: desk.last_report.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::PhaseEngine;
    use crate::rng::ScriptedRandom;
    use crate::store::ProgressStore;

    fn models() -> Vec<LeverageModel> {
        vec![
            LeverageModel {
                key: "manual".to_string(),
                name: "HUSTLE CORE".to_string(),
                structure: CostStructure {
                    fixed_cost: 2_000.0,
                    variable_cost: 25.0,
                },
                description: "Low fixed overhead.".to_string(),
            },
            LeverageModel {
                key: "automated".to_string(),
                name: "AUTO-STACKER".to_string(),
                structure: CostStructure {
                    fixed_cost: 6_000.0,
                    variable_cost: 5.0,
                },
                description: "High fixed automation.".to_string(),
            },
        ]
    }

    fn shock(title: &str, sales_drop: f64) -> ShockScenario {
        ShockScenario {
            title: title.to_string(),
            description: String::new(),
            sales_drop,
            lessons: BTreeMap::new(),
        }
    }

    fn select(key: &str) -> SelectModel {
        SelectModel {
            model_key: key.to_string(),
        }
    }

    #[test]
    fn boom_report_names_best_model() {
        let rules = MarketShockRules::new(models(), ShockSettings::default());
        let report = rules.report(&rules.models()[0], &shock("Boom", -1.0));
        assert!((report.outcome.profit - 18_000.0).abs() < 1e-9);
        assert_eq!(report.best_model, "automated");
        assert!((report.best_profit - 30_000.0).abs() < 1e-9);
        assert!((report.operating_leverage.unwrap() - 1.25).abs() < 1e-9);
    }

    #[test]
    fn surviving_both_shocks_completes_phase() {
        let mut store = ProgressStore::new();
        let mut rng = ScriptedRandom::new();
        let rules = MarketShockRules::new(models(), ShockSettings::default());
        let mut engine =
            PhaseEngine::new(rules, vec![shock("Storm", 0.5), shock("Boom", -1.0)]).unwrap();
        engine.start().unwrap();
        let mut ctx = PhaseCtx {
            store: &mut store,
            rng: &mut rng,
        };
        let first = engine.act(select("manual"), &mut ctx).unwrap();
        assert!(first.verdict.is_solved());
        assert!(!first.completed);
        let second = engine.act(select("automated"), &mut ctx).unwrap();
        assert!(second.completed);
        assert_eq!(ctx.store.state().score, 3_000);
    }

    #[test]
    fn collapse_is_leverage_mistake() {
        let mut store = ProgressStore::new();
        let mut rng = ScriptedRandom::new();
        let rules = MarketShockRules::new(models(), ShockSettings::default());
        let mut engine = PhaseEngine::new(rules, vec![shock("Collapse", 0.8)]).unwrap();
        engine.start().unwrap();
        let mut ctx = PhaseCtx {
            store: &mut store,
            rng: &mut rng,
        };
        let step = engine.act(select("automated"), &mut ctx).unwrap();
        assert!(step.verdict.is_mistake());
        assert_eq!(ctx.store.state().mistakes_on(Topic::Leverage), 1);
        let report = engine.local().last_report.clone().unwrap();
        assert_eq!(report.best_model, "manual");
        // Manual breaks exactly even at 80 units, which still beats the threshold.
        let retry = engine.act(select("manual"), &mut ctx).unwrap();
        assert!(retry.completed);
    }

    #[test]
    fn unknown_model_is_input_error() {
        let mut store = ProgressStore::new();
        let mut rng = ScriptedRandom::new();
        let rules = MarketShockRules::new(models(), ShockSettings::default());
        let mut engine = PhaseEngine::new(rules, vec![shock("Storm", 0.5)]).unwrap();
        engine.start().unwrap();
        let mut ctx = PhaseCtx {
            store: &mut store,
            rng: &mut rng,
        };
        assert_eq!(
            engine.act(select("robots"), &mut ctx).unwrap_err(),
            PhaseError::UnknownModel("robots".to_string())
        );
    }

    #[test]
    fn view_projects_units() {
        let rules = MarketShockRules::new(models(), ShockSettings::default());
        let PhaseDetail::MarketShock(view) = rules.detail(&shock("Storm", 0.5), &ShockDesk::default())
        else {
            panic!("wrong detail variant");
        };
        assert_eq!(view.projected_units, 200);
        assert_eq!(view.models.len(), 2);
    }
}
