//! Mastery of Margins Game Engine
//!
//! Platform-agnostic core for the Mastery of Margins accounting game: the
//! cost model, progress store, the five phase engines and the session that
//! sequences them. Rendering, audio and persistence live with the host.

pub mod constants;
pub mod cost_model;
pub mod data;
pub mod numbers;
pub mod phase;
pub mod preferences;
pub mod rng;
pub mod session;
pub mod state;
pub mod store;
pub mod summary;
pub mod timer;

// Re-export commonly used types
pub use cost_model::{
    BreakEven, CostDescriptor, CostModelError, CostStructure, CostType, ProfitReconciliation,
    ShockOutcome, break_even_units, classify, contribution_per_unit, degree_of_operating_leverage,
    is_contributing, margin_of_safety, reconcile_profit, simulate_shock,
    simulate_shock_with_threshold, unit_cost_absorption, unit_cost_marginal,
};
pub use data::{CatalogError, ScenarioCatalog};
pub use phase::break_even::{
    BreakEvenAction, BreakEvenRules, BreakEvenScenario, BreakEvenView, CvpConfig, CvpParameter,
    CvpReadout, MarketEvent, SimulationPhase, StabilityTuning,
};
pub use phase::classification::{Assignment, ClassificationRules, ClassificationScenario, CostItem};
pub use phase::costing_duel::{CostingDuelAction, CostingDuelRules, CostingDuelScenario, DuelStage};
pub use phase::market_shock::{LeverageModel, MarketShockRules, SelectModel, ShockScenario, ShockSettings};
pub use phase::special_order::{
    NegotiationTuning, SpecialOrderAction, SpecialOrderRules, SpecialOrderScenario,
};
pub use phase::{
    Feedback, PhaseCtx, PhaseDetail, PhaseEngine, PhaseError, PhaseId, PhaseRules, PhaseStatus,
    PhaseView, StepOutcome, Tone, Verdict,
};
pub use preferences::{MemoryPreferences, PreferenceStore, Preferences};
pub use rng::{RandomSource, RandomStream, RngBundle, ScriptedRandom};
pub use session::{
    ActionReport, ActivePhase, PlayerAction, Screen, SessionController, SessionError,
    SessionSnapshot,
};
pub use state::{PhaseStats, ProgressState, Topic};
pub use store::{ProgressAction, ProgressChange, ProgressStore};
pub use summary::{
    FailureCause, GapReport, PhaseGrade, RunOutcome, RunRank, RunSummary, SummaryConfig,
    grade_phase, run_summary,
};
pub use timer::RepeatingTimer;

/// Trait for abstracting scenario catalog loading
/// Platform-specific implementations should provide this
pub trait CatalogLoader {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the scenario catalog from the platform-specific source
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read or parsed.
    fn load_catalog(&self) -> Result<ScenarioCatalog, Self::Error>;
}

/// Loader for the catalog compiled into the crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCatalog;

impl CatalogLoader for BuiltinCatalog {
    type Error = std::convert::Infallible;

    fn load_catalog(&self) -> Result<ScenarioCatalog, Self::Error> {
        Ok(ScenarioCatalog::builtin())
    }
}

/// Main game engine for creating sessions and holding preferences
pub struct GameEngine<L, P>
where
    L: CatalogLoader,
    P: PreferenceStore,
{
    catalog_loader: L,
    preferences: P,
}

impl<L, P> GameEngine<L, P>
where
    L: CatalogLoader,
    P: PreferenceStore,
{
    /// Create a new game engine with the provided catalog loader and preference store
    pub const fn new(catalog_loader: L, preferences: P) -> Self {
        Self {
            catalog_loader,
            preferences,
        }
    }

    /// Create a seeded session.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be loaded or fails validation.
    pub fn create_session(&self, seed: u64) -> Result<SessionController, anyhow::Error> {
        self.create_session_with(Box::new(RngBundle::from_user_seed(seed)))
    }

    /// Create a session over an explicit random source.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be loaded or fails validation.
    pub fn create_session_with(
        &self,
        rng: Box<dyn RandomSource>,
    ) -> Result<SessionController, anyhow::Error> {
        let catalog = self.catalog_loader.load_catalog()?;
        Ok(SessionController::new(catalog, rng)?)
    }

    /// Stored preferences, defaulting when nothing was saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the preference store cannot be read.
    pub fn preferences(&self) -> Result<Preferences, P::Error> {
        Ok(self.preferences.load()?.unwrap_or_default())
    }

    /// Flip the mute preference and persist it.
    ///
    /// # Errors
    ///
    /// Returns an error if the preference store cannot be read or written.
    pub fn toggle_mute(&self) -> Result<Preferences, P::Error> {
        let toggled = self.preferences()?.toggled_mute();
        self.preferences.save(&toggled)?;
        Ok(toggled)
    }
}
