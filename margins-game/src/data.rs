//! Scenario catalog: every phase's ordered scenarios plus their tunables.
//!
//! The built-in catalog ships with the crate. Alternative catalogs can be
//! loaded from JSON; both paths go through [`ScenarioCatalog::validate`] so a
//! scenario that breaks a cost-model precondition never reaches gameplay.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::constants::COST_TOLERANCE;
use crate::cost_model::{CostDescriptor, CostStructure, CostType, classify};
use crate::phase::PhaseId;
use crate::phase::break_even::{
    BreakEvenScenario, CvpBounds, CvpConfig, MarketEvent, StabilityTuning, ValueRange,
};
use crate::phase::classification::{ClassificationScenario, CostItem};
use crate::phase::costing_duel::{CostingDuelScenario, ExplanationOption};
use crate::phase::market_shock::{LeverageModel, ShockScenario, ShockSettings};
use crate::phase::special_order::{NegotiationTuning, SpecialOrderScenario};

/// Authoring errors caught before a catalog is used.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog JSON is malformed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0} has no scenarios")]
    EmptyPhase(PhaseId),
    #[error("duplicate id `{id}` in {phase}")]
    DuplicateId { phase: PhaseId, id: String },
    #[error("cost item `{item}` is labelled {label} but behaves as {derived}")]
    LabelMismatch {
        item: String,
        label: CostType,
        derived: CostType,
    },
    #[error("scenario `{scenario}` has no items")]
    EmptyScenario { scenario: String },
    #[error("scenario `{scenario}` produces zero units")]
    ZeroProduction { scenario: String },
    #[error("scenario `{scenario}` has a zero sales target")]
    ZeroTarget { scenario: String },
    #[error("scenario `{scenario}` needs exactly one correct option (found {found})")]
    CorrectOptionCount { scenario: String, found: usize },
    #[error("scenario `{scenario}` has a lesson for unknown model `{model}`")]
    UnknownLessonModel { scenario: String, model: String },
    #[error("market shock needs at least two cost models (found {found})")]
    TooFewModels { found: usize },
    #[error("{field} must be between {min:.2} and {max:.2} (got {value:.2})")]
    RangeViolation {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("{field} bounds invalid (min {min:.2} > max {max:.2} or non-finite)")]
    InvalidBounds {
        field: &'static str,
        min: f64,
        max: f64,
    },
    #[error("{field} must be finite and non-negative (got {value:.2})")]
    InvalidAmount { field: &'static str, value: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioCatalog {
    pub classification: Vec<ClassificationScenario>,
    pub special_orders: Vec<SpecialOrderScenario>,
    #[serde(default)]
    pub negotiation: NegotiationTuning,
    pub costing_duels: Vec<CostingDuelScenario>,
    #[serde(default = "ScenarioCatalog::default_cost_tolerance")]
    pub cost_tolerance: f64,
    pub break_even: Vec<BreakEvenScenario>,
    #[serde(default)]
    pub stability: StabilityTuning,
    pub market_shocks: Vec<ShockScenario>,
    pub leverage_models: Vec<LeverageModel>,
    #[serde(default)]
    pub shock_settings: ShockSettings,
}

impl Default for ScenarioCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ScenarioCatalog {
    const fn default_cost_tolerance() -> f64 {
        COST_TOLERANCE
    }

    /// Parse and validate a catalog.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Parse`] for malformed JSON and any validation
    /// error for well-formed but inconsistent data.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// # Errors
    ///
    /// Returns [`CatalogError::Parse`] if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, CatalogError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[must_use]
    pub fn scenario_count(&self, phase: PhaseId) -> usize {
        match phase {
            PhaseId::Classification => self.classification.len(),
            PhaseId::SpecialOrder => self.special_orders.len(),
            PhaseId::CostingDuel => self.costing_duels.len(),
            PhaseId::BreakEven => self.break_even.len(),
            PhaseId::MarketShock => self.market_shocks.len(),
        }
    }

    /// Check every scenario against the cost-model preconditions.
    ///
    /// # Errors
    ///
    /// Returns the first [`CatalogError`] found.
    pub fn validate(&self) -> Result<(), CatalogError> {
        for phase in PhaseId::ALL {
            if self.scenario_count(phase) == 0 {
                return Err(CatalogError::EmptyPhase(phase));
            }
        }
        self.validate_classification()?;
        self.validate_special_orders()?;
        self.validate_costing_duels()?;
        self.stability.validate()?;
        for scenario in &self.break_even {
            scenario.validate()?;
        }
        self.validate_market_shocks()?;
        Ok(())
    }

    fn validate_classification(&self) -> Result<(), CatalogError> {
        let mut ids = BTreeSet::new();
        for scenario in &self.classification {
            if scenario.items.is_empty() {
                return Err(CatalogError::EmptyScenario {
                    scenario: scenario.title.clone(),
                });
            }
            for item in &scenario.items {
                if !ids.insert(item.id.as_str()) {
                    return Err(CatalogError::DuplicateId {
                        phase: PhaseId::Classification,
                        id: item.id.clone(),
                    });
                }
                let derived = classify(&item.descriptor);
                if derived != item.label {
                    return Err(CatalogError::LabelMismatch {
                        item: item.id.clone(),
                        label: item.label,
                        derived,
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_special_orders(&self) -> Result<(), CatalogError> {
        self.negotiation.validate()?;
        for scenario in &self.special_orders {
            check_amount("special_order.offer_price", scenario.offer_price)?;
            check_amount("special_order.variable_cost", scenario.variable_cost)?;
        }
        Ok(())
    }

    fn validate_costing_duels(&self) -> Result<(), CatalogError> {
        check_amount("cost_tolerance", self.cost_tolerance)?;
        for scenario in &self.costing_duels {
            if scenario.units_produced == 0 {
                return Err(CatalogError::ZeroProduction {
                    scenario: scenario.title.clone(),
                });
            }
            let found = scenario.options.iter().filter(|option| option.correct).count();
            if found != 1 {
                return Err(CatalogError::CorrectOptionCount {
                    scenario: scenario.title.clone(),
                    found,
                });
            }
            let mut ids = BTreeSet::new();
            for option in &scenario.options {
                if !ids.insert(option.id.as_str()) {
                    return Err(CatalogError::DuplicateId {
                        phase: PhaseId::CostingDuel,
                        id: option.id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_market_shocks(&self) -> Result<(), CatalogError> {
        if self.leverage_models.len() < 2 {
            return Err(CatalogError::TooFewModels {
                found: self.leverage_models.len(),
            });
        }
        let mut keys = BTreeSet::new();
        for model in &self.leverage_models {
            if !keys.insert(model.key.as_str()) {
                return Err(CatalogError::DuplicateId {
                    phase: PhaseId::MarketShock,
                    id: model.key.clone(),
                });
            }
        }
        for scenario in &self.market_shocks {
            if let Some(model) = scenario.lessons.keys().find(|key| !keys.contains(key.as_str())) {
                return Err(CatalogError::UnknownLessonModel {
                    scenario: scenario.title.clone(),
                    model: model.clone(),
                });
            }
        }
        Ok(())
    }

    /// The shipped lemonade-stand campaign.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            classification: vec![lemonade_stand()],
            special_orders: special_orders(),
            negotiation: NegotiationTuning::default(),
            costing_duels: costing_duels(),
            cost_tolerance: COST_TOLERANCE,
            break_even: vec![break_even_lab()],
            stability: StabilityTuning::default(),
            market_shocks: market_shocks(),
            leverage_models: leverage_models(),
            shock_settings: ShockSettings::default(),
        }
    }
}

fn check_amount(field: &'static str, value: f64) -> Result<(), CatalogError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(CatalogError::InvalidAmount { field, value })
    }
}

fn item(
    id: &str,
    name: &str,
    amount_label: &str,
    description: &str,
    descriptor: CostDescriptor,
) -> CostItem {
    let label = classify(&descriptor);
    CostItem {
        id: id.to_string(),
        name: name.to_string(),
        amount_label: amount_label.to_string(),
        description: description.to_string(),
        descriptor,
        label,
    }
}

fn lemonade_stand() -> ClassificationScenario {
    ClassificationScenario {
        title: "The Lemonade Stand".to_string(),
        items: vec![
            item(
                "1",
                "Stand Rent",
                "$100.50/month",
                "Paid monthly to the market owner regardless of how many cups you sell.",
                CostDescriptor::fixed(100.50),
            ),
            item(
                "2",
                "Fresh Lemons",
                "$0.12/cup",
                "Bought for each cup you make. Zero cups means zero lemon cost.",
                CostDescriptor::variable(0.12),
            ),
            item(
                "3",
                "Cups",
                "$0.05/cup",
                "One disposable cup per serving. Cost scales directly with output.",
                CostDescriptor::variable(0.05),
            ),
            item(
                "4",
                "Assistant",
                "$50/shift",
                "One extra assistant for every 50 cups. 1-50 cups costs $50, 51-100 jumps to $100.",
                CostDescriptor::step_fixed(50.0, 50),
            ),
            item(
                "5",
                "Electricity",
                "$20 base + $0.05/cup",
                "A $20 monthly connection fee plus a $0.05 usage charge per cup blended.",
                CostDescriptor::semi_variable(20.0, 0.05),
            ),
            item(
                "6",
                "Sugar",
                "$0.03/cup",
                "A scoop of sugar goes into every cup.",
                CostDescriptor::variable(0.03),
            ),
        ],
    }
}

fn special_order(
    title: &str,
    description: &str,
    (units, offer_price): (u32, f64),
    hint: &str,
    negotiable: bool,
) -> SpecialOrderScenario {
    SpecialOrderScenario {
        title: title.to_string(),
        description: description.to_string(),
        units,
        offer_price,
        normal_price: 1.50,
        variable_cost: 0.20,
        hint: hint.to_string(),
        negotiable,
        severity: crate::constants::DEFAULT_MISTAKE_SEVERITY,
    }
}

fn special_orders() -> Vec<SpecialOrderScenario> {
    vec![
        special_order(
            "The Hustle: Trip 101",
            "A local school wants 100 cups for a trip. They offer $0.60/cup. Variable cost is $0.20.",
            (100, 0.60),
            "As long as price > variable cost, take the deal.",
            false,
        ),
        special_order(
            "The Lowball: Sus Offer",
            "A shady vendor wants 50 cups for $0.15/cup. Your cost is $0.20/cup.",
            (50, 0.15),
            "Accepting this means losing $0.05 on every cup. Reject it!",
            false,
        ),
        special_order(
            "The Constraint: Big Decision",
            "You only have time for one order: 50 cups at $1.10. Variable cost is $0.20.",
            (50, 1.10),
            "Choose the order with the highest contribution to your bottom line.",
            false,
        ),
        special_order(
            "The Haggle: Festival Booth",
            "A festival wants 200 cups at $0.45/cup and will hear a counter-offer. Variable cost is $0.20.",
            (200, 0.45),
            "Any price above variable cost contributes. Push too hard and the buyer walks.",
            true,
        ),
    ]
}

fn duel_options() -> Vec<ExplanationOption> {
    vec![
        ExplanationOption {
            id: "a".to_string(),
            text: "Unsold units carry their share of fixed overhead into closing inventory."
                .to_string(),
            correct: true,
        },
        ExplanationOption {
            id: "b".to_string(),
            text: "Absorption costing uses a formula that creates money from thin air."
                .to_string(),
            correct: false,
        },
        ExplanationOption {
            id: "c".to_string(),
            text: "Marginal costing forgets to charge variable costs on unsold units.".to_string(),
            correct: false,
        },
    ]
}

fn costing_duels() -> Vec<CostingDuelScenario> {
    vec![
        CostingDuelScenario {
            title: "Inventory Build-Up".to_string(),
            units_produced: 1_000,
            units_sold: 800,
            variable_cost: 10.50,
            fixed_overhead: 5_000.0,
            price: 50.0,
            options: duel_options(),
            debrief: "You produced 1,000 units but sold 800. Under absorption costing the 200 \
                      units in inventory carry $5.00 each of fixed overhead into next month, so \
                      reported profit is higher now. It is a timing effect, not extra money."
                .to_string(),
        },
        CostingDuelScenario {
            title: "Sell What You Make".to_string(),
            units_produced: 500,
            units_sold: 500,
            variable_cost: 8.0,
            fixed_overhead: 4_000.0,
            price: 30.0,
            options: vec![
                ExplanationOption {
                    id: "a".to_string(),
                    text: "There is no gap: nothing went into inventory, so both methods expense \
                           the same fixed overhead."
                        .to_string(),
                    correct: true,
                },
                ExplanationOption {
                    id: "b".to_string(),
                    text: "Absorption profit is always higher than marginal profit.".to_string(),
                    correct: false,
                },
            ],
            debrief: "Production equals sales, so no fixed overhead is deferred in inventory. \
                      Both methods report the same profit."
                .to_string(),
        },
    ]
}

fn market_events() -> Vec<MarketEvent> {
    let event = |name: &str, variable_effect: f64, fixed_effect: f64, message: &str| MarketEvent {
        name: name.to_string(),
        variable_effect,
        fixed_effect,
        message: message.to_string(),
    };
    vec![
        event("Supply Chain Crunch", 10.0, 0.0, "Variable costs spike by $10!"),
        event("Rent Hike", 0.0, 2_000.0, "Fixed costs jumped! Pay up!"),
        event("Viral Trend", 5.0, 0.0, "Demand is high, but so is shipping!"),
        event("Automation Glitch", 0.0, 1_000.0, "Maintenance costs increased."),
        event("Market Calm", -5.0, -500.0, "Operations stabilized. Costs down."),
    ]
}

fn break_even_lab() -> BreakEvenScenario {
    BreakEvenScenario {
        title: "The Break-Even Lab".to_string(),
        start: CvpConfig {
            price: 50.0,
            variable_cost: 20.0,
            fixed_cost: 4_000.0,
        },
        bounds: CvpBounds::default(),
        target_units: crate::constants::TARGET_UNITS,
        event_variable_clamp: ValueRange::new(10.0, 40.0),
        event_fixed_clamp: ValueRange::new(2_000.0, 8_000.0),
        events: market_events(),
    }
}

fn lessons(manual: &str, automated: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("manual".to_string(), manual.to_string()),
        ("automated".to_string(), automated.to_string()),
    ])
}

fn market_shocks() -> Vec<ShockScenario> {
    vec![
        ShockScenario {
            title: "THE MARKET STORM".to_string(),
            description: "A recession is hitting. Sales will drop 50%. Pick your survival model."
                .to_string(),
            sales_drop: 0.5,
            lessons: lessons(
                "Hustle Core was the move. Flexible costs meant you could downscale instantly.",
                "The Auto-Stacker carried heavy fixed costs. You couldn't cut the burn fast enough.",
            ),
        },
        ShockScenario {
            title: "THE BOOM TIMES".to_string(),
            description: "The market is peaking! Volume will double. Which model scales better?"
                .to_string(),
            sales_drop: -1.0,
            lessons: lessons(
                "Scaling labor was expensive. High variable costs ate the upside.",
                "Fixed costs stayed put while volume exploded. High leverage win!",
            ),
        },
    ]
}

fn leverage_models() -> Vec<LeverageModel> {
    vec![
        LeverageModel {
            key: "manual".to_string(),
            name: "HUSTLE CORE".to_string(),
            structure: CostStructure {
                fixed_cost: 2_000.0,
                variable_cost: 25.0,
            },
            description: "Low fixed overhead. High variable labor. Maximum flexibility."
                .to_string(),
        },
        LeverageModel {
            key: "automated".to_string(),
            name: "AUTO-STACKER".to_string(),
            structure: CostStructure {
                fixed_cost: 6_000.0,
                variable_cost: 5.0,
            },
            description: "High fixed automation costs. Tiny variable burn. High leverage, high risk."
                .to_string(),
        },
    ]
}
