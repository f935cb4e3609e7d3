use margins_game::phase::costing_duel::CostingDuelView;
use margins_game::phase::market_shock::MarketShockView;
use margins_game::phase::special_order::SpecialOrderView;
use margins_game::{
    BreakEven, BreakEvenView, CostType, CvpParameter, DuelStage, PhaseDetail, PhaseId, PhaseView,
    PlayerAction, SessionController, SimulationPhase, classify, contribution_per_unit,
    is_contributing, simulate_shock_with_threshold, unit_cost_absorption, unit_cost_marginal,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Scripted player used to drive a session.
pub trait PlayerPolicy {
    /// Next move on a playing screen; `None` lets the simulation clock run.
    fn next_action(&mut self, session: &SessionController) -> Option<PlayerAction>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlayStyle {
    /// Always answers correctly.
    Perfect,
    /// Slips at most once per phase, then plays it straight.
    Novice,
    /// Always picks a wrong answer when one exists.
    Reckless,
    /// Random actions, including malformed ones.
    Chaotic,
}

impl PlayStyle {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Perfect => "perfect",
            Self::Novice => "novice",
            Self::Reckless => "reckless",
            Self::Chaotic => "chaotic",
        }
    }

    #[must_use]
    pub fn create_policy(self, seed: u64) -> Box<dyn PlayerPolicy> {
        match self {
            Self::Perfect => Box::new(PerfectPolicy),
            Self::Novice => Box::new(NovicePolicy::new(seed)),
            Self::Reckless => Box::new(RecklessPolicy),
            Self::Chaotic => Box::new(ChaoticPolicy::new(seed)),
        }
    }
}

impl fmt::Display for PlayStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn current_view(session: &SessionController) -> Option<PhaseView> {
    session.active().map(margins_game::ActivePhase::view)
}

/// The move a player who knows the material would make.
pub fn correct_action(session: &SessionController) -> Option<PlayerAction> {
    let view = current_view(session)?;
    let catalog = session.catalog();
    match &view.detail {
        PhaseDetail::Classification(detail) => {
            let card = detail.pending.first()?;
            let item = catalog
                .classification
                .get(view.scenario_index)?
                .items
                .iter()
                .find(|item| item.id == card.id)?;
            Some(PlayerAction::AssignItem {
                item_id: item.id.clone(),
                bucket: classify(&item.descriptor),
            })
        }
        PhaseDetail::SpecialOrder(order) => Some(decide_order(order)),
        PhaseDetail::CostingDuel(duel) => match duel.stage {
            DuelStage::Calculate => submit_costs(duel, 0.0),
            DuelStage::Explain { .. } => catalog
                .costing_duels
                .get(view.scenario_index)?
                .options
                .iter()
                .find(|option| option.correct)
                .map(|option| PlayerAction::ChooseExplanation {
                    option_id: option.id.clone(),
                }),
        },
        PhaseDetail::BreakEven(lab) => {
            let ceiling = catalog.stability.bep_ceiling;
            prepare_lab(lab, ceiling)
        }
        PhaseDetail::MarketShock(desk) => pick_model(session, desk, |a, b| a > b),
    }
}

/// A move that is wrong for the current question, when one exists.
pub fn wrong_action(session: &SessionController) -> Option<PlayerAction> {
    let view = current_view(session)?;
    let catalog = session.catalog();
    match &view.detail {
        PhaseDetail::Classification(detail) => {
            let card = detail.pending.first()?;
            let item = catalog
                .classification
                .get(view.scenario_index)?
                .items
                .iter()
                .find(|item| item.id == card.id)?;
            let right = classify(&item.descriptor);
            let bucket = CostType::ALL.into_iter().find(|bucket| *bucket != right)?;
            Some(PlayerAction::AssignItem {
                item_id: item.id.clone(),
                bucket,
            })
        }
        PhaseDetail::SpecialOrder(order) => Some(PlayerAction::Decide {
            accept: !is_contributing(contribution_per_unit(
                order.offer_price,
                order.variable_cost,
            )),
        }),
        PhaseDetail::CostingDuel(duel) => match duel.stage {
            DuelStage::Calculate => submit_costs(duel, 5.0),
            DuelStage::Explain { .. } => catalog
                .costing_duels
                .get(view.scenario_index)?
                .options
                .iter()
                .find(|option| !option.correct)
                .map(|option| PlayerAction::ChooseExplanation {
                    option_id: option.id.clone(),
                }),
        },
        PhaseDetail::BreakEven(_) => None,
        PhaseDetail::MarketShock(desk) => pick_model(session, desk, |a, b| a < b),
    }
}

fn decide_order(order: &SpecialOrderView) -> PlayerAction {
    let contributing = is_contributing(contribution_per_unit(
        order.counter_price,
        order.variable_cost,
    ));
    if order.negotiable && contributing {
        PlayerAction::Commit
    } else {
        PlayerAction::Decide {
            accept: contributing,
        }
    }
}

fn submit_costs(duel: &CostingDuelView, skew: f64) -> Option<PlayerAction> {
    let absorption =
        unit_cost_absorption(duel.variable_cost, duel.fixed_overhead, duel.units_produced).ok()?;
    Some(PlayerAction::SubmitCosts {
        marginal: unit_cost_marginal(duel.variable_cost) + skew,
        absorption: absorption + skew,
    })
}

fn prepare_lab(lab: &BreakEvenView, ceiling: u32) -> Option<PlayerAction> {
    if lab.simulation != SimulationPhase::Idle {
        return None;
    }
    let exposed = match lab.readout.break_even {
        BreakEven::Unreachable => true,
        BreakEven::Units(units) => units > ceiling,
    };
    if exposed && lab.config.price < lab.bounds.price.max {
        return Some(PlayerAction::AdjustParameter {
            parameter: CvpParameter::Price,
            value: lab.bounds.price.max,
        });
    }
    Some(PlayerAction::StartSimulation)
}

fn pick_model(
    session: &SessionController,
    desk: &MarketShockView,
    prefer: fn(f64, f64) -> bool,
) -> Option<PlayerAction> {
    let settings = session.catalog().shock_settings;
    let mut best: Option<(&str, f64)> = None;
    for model in &session.catalog().leverage_models {
        let outcome = simulate_shock_with_threshold(
            &model.structure,
            desk.sales_drop,
            settings.price,
            settings.baseline_units,
            settings.survival_threshold,
        );
        let score = if outcome.survived {
            outcome.profit
        } else {
            outcome.profit - 1.0e9
        };
        if best.is_none_or(|(_, current)| prefer(score, current)) {
            best = Some((model.key.as_str(), score));
        }
    }
    best.map(|(key, _)| PlayerAction::SelectModel {
        model_key: key.to_string(),
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PerfectPolicy;

impl PlayerPolicy for PerfectPolicy {
    fn next_action(&mut self, session: &SessionController) -> Option<PlayerAction> {
        correct_action(session)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecklessPolicy;

impl PlayerPolicy for RecklessPolicy {
    fn next_action(&mut self, session: &SessionController) -> Option<PlayerAction> {
        wrong_action(session).or_else(|| correct_action(session))
    }
}

#[derive(Debug, Clone)]
pub struct NovicePolicy {
    rng: ChaCha20Rng,
    slipped: BTreeSet<PhaseId>,
    haggled: bool,
}

impl NovicePolicy {
    const SLIP_CHANCE: f64 = 0.5;
    const HAGGLE_STEP: f64 = 0.05;

    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            slipped: BTreeSet::new(),
            haggled: false,
        }
    }
}

impl PlayerPolicy for NovicePolicy {
    fn next_action(&mut self, session: &SessionController) -> Option<PlayerAction> {
        let view = current_view(session)?;
        if !self.slipped.contains(&view.phase) && self.rng.gen_bool(Self::SLIP_CHANCE) {
            self.slipped.insert(view.phase);
            if let Some(action) = wrong_action(session) {
                return Some(action);
            }
        }
        if let PhaseDetail::SpecialOrder(order) = &view.detail
            && order.negotiable
            && !self.haggled
        {
            self.haggled = true;
            return Some(PlayerAction::Negotiate {
                delta: Self::HAGGLE_STEP,
            });
        }
        correct_action(session)
    }
}

/// Mashes buttons: any action kind, plausible or garbage parameters.
#[derive(Debug, Clone)]
pub struct ChaoticPolicy {
    rng: ChaCha20Rng,
}

impl ChaoticPolicy {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    fn item_id(&mut self, session: &SessionController) -> String {
        let items = session
            .catalog()
            .classification
            .first()
            .map(|scenario| scenario.items.as_slice())
            .unwrap_or_default();
        if items.is_empty() || self.rng.gen_bool(0.2) {
            return "missing".to_string();
        }
        items[self.rng.gen_range(0..items.len())].id.clone()
    }

    fn model_key(&mut self, session: &SessionController) -> String {
        let models = &session.catalog().leverage_models;
        if models.is_empty() || self.rng.gen_bool(0.2) {
            return "missing".to_string();
        }
        models[self.rng.gen_range(0..models.len())].key.clone()
    }
}

impl PlayerPolicy for ChaoticPolicy {
    fn next_action(&mut self, session: &SessionController) -> Option<PlayerAction> {
        let action = match self.rng.gen_range(0..20) {
            0 => PlayerAction::AssignItem {
                item_id: self.item_id(session),
                bucket: CostType::ALL[self.rng.gen_range(0..CostType::ALL.len())],
            },
            1 => PlayerAction::Decide {
                accept: self.rng.gen_bool(0.5),
            },
            2 => PlayerAction::Negotiate {
                delta: self.rng.gen_range(-0.5..1.0),
            },
            3 => PlayerAction::Commit,
            4 => PlayerAction::SubmitCosts {
                marginal: self.rng.gen_range(0.0..30.0),
                absorption: self.rng.gen_range(0.0..30.0),
            },
            5 => PlayerAction::ChooseExplanation {
                option_id: ["a", "b", "c", "z"][self.rng.gen_range(0..4)].to_string(),
            },
            6 => PlayerAction::SelectModel {
                model_key: self.model_key(session),
            },
            7 => PlayerAction::AdjustParameter {
                parameter: [
                    CvpParameter::Price,
                    CvpParameter::VariableCost,
                    CvpParameter::FixedCost,
                ][self.rng.gen_range(0..3)],
                value: self.rng.gen_range(-100.0..10_000.0),
            },
            8 => PlayerAction::StartSimulation,
            9 => return None,
            // Roughly half the draws play the right move so runs make progress.
            _ => return correct_action(session),
        };
        Some(action)
    }
}
