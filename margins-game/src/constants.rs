//! Centralized balance and tuning constants for the margins core.
//!
//! These values define the deterministic math for progression and scoring.
//! Scenario-level tunables (negotiation patience, break-even stability) use
//! these as their serde defaults so catalogs can override them per scenario.

// Logging targets ----------------------------------------------------------
pub(crate) const LOG_TARGET_STORE: &str = "margins::store";
pub(crate) const LOG_TARGET_PHASE: &str = "margins::phase";
pub(crate) const LOG_TARGET_SESSION: &str = "margins::session";

// Progress -----------------------------------------------------------------
pub const STARTING_CASH_CENTS: i64 = 100_000;
pub const MAX_HEALTH: u32 = 100;
pub const DEFAULT_MISTAKE_SEVERITY: u32 = 10;
pub const LOBBY_PHASE: u8 = 0;
pub const FIRST_PHASE: u8 = 1;
pub const TERMINAL_PHASE: u8 = 6;
/// Consecutive mistakes on one scenario before a review topic is suggested.
pub const SUGGEST_TOPIC_AFTER: u32 = 2;

// Scoring ------------------------------------------------------------------
pub const BONUS_CLASSIFICATION: u32 = 1_000;
pub const BONUS_SPECIAL_ORDER: u32 = 1_500;
pub const BONUS_COSTING_DUEL: u32 = 2_000;
pub const BONUS_BREAK_EVEN: u32 = 2_500;
pub const BONUS_MARKET_SHOCK: u32 = 3_000;
pub const RANK_CONTROLLER_SCORE: u32 = 5_000;
pub const RANK_CFO_SCORE: u32 = 8_000;
pub const GRADE_GOOD_MAX_MISTAKES: u32 = 2;

// Cost model ---------------------------------------------------------------
pub const COST_TOLERANCE: f64 = 0.01;
pub const SURVIVAL_THRESHOLD: f64 = -500.0;

// Negotiation --------------------------------------------------------------
pub const PATIENCE_START: f64 = 100.0;
pub const WALK_AWAY_GATE: f64 = 80.0;
/// Patience lost per percent of price raised.
pub const PATIENCE_SENSITIVITY: f64 = 0.5;
pub const PATIENCE_MIN_DECAY: f64 = 5.0;

// Break-even simulation ----------------------------------------------------
pub const SALES_TICK_MS: u64 = 100;
pub const MARKET_TICK_MS: u64 = 3_000;
pub const SALES_INCREMENT_MIN: u32 = 10;
pub const SALES_INCREMENT_MAX: u32 = 59;
pub const TARGET_UNITS: u32 = 1_000;
pub const STABILITY_MAX: u32 = 100;
pub const STABILITY_DECAY: u32 = 5;
pub const STABILITY_RECOVERY: u32 = 2;
pub const STABILITY_RETRY_RESET: u32 = 20;
pub const STABILITY_BEP_CEILING: u32 = 600;
pub const MARKET_EVENT_CHANCE: f64 = 0.2;
pub const HISTORY_WINDOW: usize = 20;
pub const EVENT_LOG_WINDOW: usize = 10;

// Market shock -------------------------------------------------------------
pub const SHOCK_BASELINE_UNITS: f64 = 400.0;
pub const SHOCK_PRICE: f64 = 50.0;
