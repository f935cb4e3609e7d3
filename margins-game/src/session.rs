//! One play session: the progress store, the mounted phase and the screens
//! between phases.
//!
//! The controller is the only writer of [`ProgressStore`] during play. The
//! engine for the current phase is mounted on phase entry and torn down on
//! every exit path (completion, phase select, lobby, game over, reset), so a
//! running break-even simulation can never outlive the phase that owns it.
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::constants::{LOBBY_PHASE, LOG_TARGET_SESSION, TERMINAL_PHASE};
use crate::cost_model::CostType;
use crate::data::{CatalogError, ScenarioCatalog};
use crate::phase::break_even::{BreakEvenAction, BreakEvenRules, CvpParameter};
use crate::phase::classification::{Assignment, ClassificationRules};
use crate::phase::costing_duel::{CostingDuelAction, CostingDuelRules};
use crate::phase::market_shock::{MarketShockRules, SelectModel};
use crate::phase::special_order::{SpecialOrderAction, SpecialOrderRules};
use crate::phase::{PhaseCtx, PhaseEngine, PhaseError, PhaseId, PhaseView, StepOutcome, Verdict};
use crate::rng::{RandomSource, RngBundle};
use crate::state::ProgressState;
use crate::store::ProgressStore;
use crate::summary::{PhaseGrade, RunSummary, SummaryConfig, grade_phase, run_summary};

/// Inbound player intents, one per phase transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerAction {
    /// Leave the briefing of the mounted phase.
    Begin,
    AssignItem { item_id: String, bucket: CostType },
    Decide { accept: bool },
    Negotiate { delta: f64 },
    Commit,
    SubmitCosts { marginal: f64, absorption: f64 },
    ChooseExplanation { option_id: String },
    SelectModel { model_key: String },
    AdjustParameter { parameter: CvpParameter, value: f64 },
    StartSimulation,
}

impl PlayerAction {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::AssignItem { .. } => "assign_item",
            Self::Decide { .. } => "decide",
            Self::Negotiate { .. } => "negotiate",
            Self::Commit => "commit",
            Self::SubmitCosts { .. } => "submit_costs",
            Self::ChooseExplanation { .. } => "choose_explanation",
            Self::SelectModel { .. } => "select_model",
            Self::AdjustParameter { .. } => "adjust_parameter",
            Self::StartSimulation => "start_simulation",
        }
    }
}

/// What the host should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "phase", rename_all = "snake_case")]
pub enum Screen {
    Lobby,
    /// Interstitial before a phase's briefing.
    Transition(PhaseId),
    Playing(PhaseId),
    /// Grade card for the phase just finished.
    PhaseSummary(PhaseId),
    RunSummary,
    GameOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overlay {
    Transition(PhaseId),
    PhaseSummary(PhaseId),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("the run is over; reset to play again")]
    GameOver,
    #[error("no phase is mounted")]
    NotPlaying,
    #[error("dismiss the {0:?} screen first")]
    OverlayShown(Screen),
    #[error("`{action}` does not apply to {phase}")]
    ActionNotApplicable {
        action: &'static str,
        phase: PhaseId,
    },
    #[error("nothing to dismiss")]
    NoOverlay,
    #[error(transparent)]
    Phase(#[from] PhaseError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Result of one action or resolved tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionReport {
    pub phase: PhaseId,
    /// `None` for actions that only move the phase lifecycle.
    pub verdict: Option<Verdict>,
    pub completed: bool,
    pub game_over: bool,
}

/// Read model for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub progress: ProgressState,
    pub game_over: bool,
    pub screen: Screen,
    pub phase: Option<PhaseView>,
}

/// The mounted engine, one variant per phase.
#[derive(Debug)]
pub enum ActivePhase {
    Classification(PhaseEngine<ClassificationRules>),
    SpecialOrder(PhaseEngine<SpecialOrderRules>),
    CostingDuel(PhaseEngine<CostingDuelRules>),
    BreakEven(PhaseEngine<BreakEvenRules>),
    MarketShock(PhaseEngine<MarketShockRules>),
}

macro_rules! with_engine {
    ($active:expr, $engine:ident => $body:expr) => {
        match $active {
            ActivePhase::Classification($engine) => $body,
            ActivePhase::SpecialOrder($engine) => $body,
            ActivePhase::CostingDuel($engine) => $body,
            ActivePhase::BreakEven($engine) => $body,
            ActivePhase::MarketShock($engine) => $body,
        }
    };
}

impl ActivePhase {
    /// Build a fresh engine for `phase` from the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::EmptyScenarioSet`] when the catalog has no
    /// scenarios for the phase.
    pub fn mount(phase: PhaseId, catalog: &ScenarioCatalog) -> Result<Self, PhaseError> {
        Ok(match phase {
            PhaseId::Classification => Self::Classification(PhaseEngine::new(
                ClassificationRules,
                catalog.classification.clone(),
            )?),
            PhaseId::SpecialOrder => Self::SpecialOrder(PhaseEngine::new(
                SpecialOrderRules::new(catalog.negotiation),
                catalog.special_orders.clone(),
            )?),
            PhaseId::CostingDuel => Self::CostingDuel(PhaseEngine::new(
                CostingDuelRules::new(catalog.cost_tolerance),
                catalog.costing_duels.clone(),
            )?),
            PhaseId::BreakEven => Self::BreakEven(PhaseEngine::new(
                BreakEvenRules::new(catalog.stability),
                catalog.break_even.clone(),
            )?),
            PhaseId::MarketShock => Self::MarketShock(PhaseEngine::new(
                MarketShockRules::new(catalog.leverage_models.clone(), catalog.shock_settings),
                catalog.market_shocks.clone(),
            )?),
        })
    }

    #[must_use]
    pub const fn id(&self) -> PhaseId {
        match self {
            Self::Classification(_) => PhaseId::Classification,
            Self::SpecialOrder(_) => PhaseId::SpecialOrder,
            Self::CostingDuel(_) => PhaseId::CostingDuel,
            Self::BreakEven(_) => PhaseId::BreakEven,
            Self::MarketShock(_) => PhaseId::MarketShock,
        }
    }

    #[must_use]
    pub fn view(&self) -> PhaseView {
        with_engine!(self, engine => engine.view())
    }

    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        with_engine!(self, engine => engine.is_torn_down())
    }

    fn start(&mut self) -> Result<(), PhaseError> {
        with_engine!(self, engine => engine.start())
    }

    fn tick(&mut self, elapsed: Duration, ctx: &mut PhaseCtx<'_>) -> Option<StepOutcome> {
        with_engine!(self, engine => engine.tick(elapsed, ctx))
    }

    fn teardown(&mut self) {
        with_engine!(self, engine => engine.teardown());
    }

    fn act(
        &mut self,
        action: PlayerAction,
        ctx: &mut PhaseCtx<'_>,
    ) -> Result<StepOutcome, SessionError> {
        let phase = self.id();
        let outcome = match (self, action) {
            (Self::Classification(engine), PlayerAction::AssignItem { item_id, bucket }) => {
                engine.act(Assignment { item_id, bucket }, ctx)?
            }
            (Self::SpecialOrder(engine), PlayerAction::Decide { accept }) => {
                engine.act(SpecialOrderAction::Decide { accept }, ctx)?
            }
            (Self::SpecialOrder(engine), PlayerAction::Negotiate { delta }) => {
                engine.act(SpecialOrderAction::Negotiate { delta }, ctx)?
            }
            (Self::SpecialOrder(engine), PlayerAction::Commit) => {
                engine.act(SpecialOrderAction::Commit, ctx)?
            }
            (
                Self::CostingDuel(engine),
                PlayerAction::SubmitCosts {
                    marginal,
                    absorption,
                },
            ) => engine.act(
                CostingDuelAction::SubmitCosts {
                    marginal,
                    absorption,
                },
                ctx,
            )?,
            (Self::CostingDuel(engine), PlayerAction::ChooseExplanation { option_id }) => {
                engine.act(CostingDuelAction::ChooseExplanation { option_id }, ctx)?
            }
            (Self::BreakEven(engine), PlayerAction::AdjustParameter { parameter, value }) => {
                engine.act(BreakEvenAction::AdjustParameter { parameter, value }, ctx)?
            }
            (Self::BreakEven(engine), PlayerAction::StartSimulation) => {
                engine.act(BreakEvenAction::StartSimulation, ctx)?
            }
            (Self::MarketShock(engine), PlayerAction::SelectModel { model_key }) => {
                engine.act(SelectModel { model_key }, ctx)?
            }
            (_, action) => {
                return Err(SessionError::ActionNotApplicable {
                    action: action.name(),
                    phase,
                });
            }
        };
        Ok(outcome)
    }
}

/// Drives a single run from the lobby to the run summary.
#[derive(Debug)]
pub struct SessionController {
    store: ProgressStore,
    catalog: ScenarioCatalog,
    rng: Box<dyn RandomSource>,
    active: Option<ActivePhase>,
    overlay: Option<Overlay>,
    summary_config: SummaryConfig,
}

impl SessionController {
    /// # Errors
    ///
    /// Returns [`SessionError::Catalog`] when the catalog fails validation.
    pub fn new(catalog: ScenarioCatalog, rng: Box<dyn RandomSource>) -> Result<Self, SessionError> {
        catalog.validate()?;
        Ok(Self {
            store: ProgressStore::new(),
            catalog,
            rng,
            active: None,
            overlay: None,
            summary_config: SummaryConfig::default(),
        })
    }

    /// Seeded session over the built-in catalog.
    ///
    /// # Errors
    ///
    /// Propagates catalog validation failures.
    pub fn with_seed(seed: u64) -> Result<Self, SessionError> {
        Self::new(
            ScenarioCatalog::builtin(),
            Box::new(RngBundle::from_user_seed(seed)),
        )
    }

    #[must_use]
    pub const fn with_summary_config(mut self, config: SummaryConfig) -> Self {
        self.summary_config = config;
        self
    }

    #[must_use]
    pub const fn store(&self) -> &ProgressStore {
        &self.store
    }

    #[must_use]
    pub const fn state(&self) -> &ProgressState {
        self.store.state()
    }

    #[must_use]
    pub const fn catalog(&self) -> &ScenarioCatalog {
        &self.catalog
    }

    #[must_use]
    pub const fn active(&self) -> Option<&ActivePhase> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn active_phase(&self) -> Option<PhaseId> {
        self.active.as_ref().map(ActivePhase::id)
    }

    #[must_use]
    pub const fn is_game_over(&self) -> bool {
        self.store.is_game_over()
    }

    /// Leave the lobby for phase 1.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::GameOver`] on a finished run.
    pub fn start_run(&mut self) -> Result<Screen, SessionError> {
        self.select_phase(PhaseId::Classification)
    }

    /// Jump to any phase, abandoning the current one.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::GameOver`] on a finished run.
    pub fn select_phase(&mut self, phase: PhaseId) -> Result<Screen, SessionError> {
        self.ensure_alive()?;
        self.unmount();
        self.store.set_phase(phase.number());
        self.mount(phase)?;
        self.overlay = Some(Overlay::Transition(phase));
        Ok(self.screen())
    }

    /// # Errors
    ///
    /// Returns [`SessionError::GameOver`] on a finished run.
    pub fn return_to_lobby(&mut self) -> Result<Screen, SessionError> {
        self.ensure_alive()?;
        self.unmount();
        self.overlay = None;
        self.store.set_phase(LOBBY_PHASE);
        debug!(target: LOG_TARGET_SESSION, "returned to lobby");
        Ok(self.screen())
    }

    /// Start the mounted phase, dismissing its transition screen.
    ///
    /// # Errors
    ///
    /// Fails on a finished run, with no phase mounted, on a phase-summary
    /// screen, or when the phase is already running.
    pub fn begin(&mut self) -> Result<ActionReport, SessionError> {
        self.ensure_alive()?;
        if let Some(Overlay::PhaseSummary(phase)) = self.overlay {
            return Err(SessionError::OverlayShown(Screen::PhaseSummary(phase)));
        }
        let active = self.active.as_mut().ok_or(SessionError::NotPlaying)?;
        active.start()?;
        self.overlay = None;
        Ok(ActionReport {
            phase: active.id(),
            verdict: None,
            completed: false,
            game_over: false,
        })
    }

    /// Route a player action to the mounted phase.
    ///
    /// # Errors
    ///
    /// Fails on a finished run, while an overlay is shown, with no phase
    /// mounted, for an action that belongs to another phase, or for a
    /// malformed action. Wrong answers are not errors.
    pub fn perform(&mut self, action: PlayerAction) -> Result<ActionReport, SessionError> {
        if matches!(action, PlayerAction::Begin) {
            return self.begin();
        }
        self.ensure_alive()?;
        if let Some(overlay) = self.overlay {
            return Err(SessionError::OverlayShown(overlay.screen()));
        }
        let active = self.active.as_mut().ok_or(SessionError::NotPlaying)?;
        let mut ctx = PhaseCtx {
            store: &mut self.store,
            rng: self.rng.as_mut(),
        };
        let outcome = active.act(action, &mut ctx)?;
        let phase = active.id();
        Ok(self.settle(phase, outcome))
    }

    /// Advance real time for the mounted phase.
    ///
    /// Ignored while an overlay is shown or nothing is mounted.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::GameOver`] on a finished run.
    pub fn tick(&mut self, elapsed: Duration) -> Result<Option<ActionReport>, SessionError> {
        self.ensure_alive()?;
        if self.overlay.is_some() {
            return Ok(None);
        }
        let Some(active) = self.active.as_mut() else {
            return Ok(None);
        };
        let mut ctx = PhaseCtx {
            store: &mut self.store,
            rng: self.rng.as_mut(),
        };
        let Some(outcome) = active.tick(elapsed, &mut ctx) else {
            return Ok(None);
        };
        let phase = active.id();
        Ok(Some(self.settle(phase, outcome)))
    }

    /// Close the transition or phase-summary screen.
    ///
    /// # Errors
    ///
    /// Fails on a finished run or when no overlay is shown.
    pub fn dismiss_overlay(&mut self) -> Result<Screen, SessionError> {
        self.ensure_alive()?;
        match self.overlay.take() {
            None => return Err(SessionError::NoOverlay),
            Some(Overlay::Transition(_)) => {}
            Some(Overlay::PhaseSummary(done)) => {
                if let Some(next) = done.next()
                    && self.store.phase() < TERMINAL_PHASE
                {
                    self.mount(next)?;
                    self.overlay = Some(Overlay::Transition(next));
                }
            }
        }
        Ok(self.screen())
    }

    /// Wipe the run and return to the lobby. The only way out of game over.
    pub fn reset(&mut self) {
        self.unmount();
        self.overlay = None;
        self.store.reset_game();
        info!(target: LOG_TARGET_SESSION, "run reset");
    }

    /// Drop the current review suggestion once the player has seen it.
    pub fn acknowledge_suggestion(&mut self) {
        self.store.clear_suggestion();
    }

    #[must_use]
    pub fn screen(&self) -> Screen {
        if self.store.is_game_over() {
            return Screen::GameOver;
        }
        if let Some(overlay) = self.overlay {
            return overlay.screen();
        }
        let phase = self.store.phase();
        if phase >= TERMINAL_PHASE {
            return Screen::RunSummary;
        }
        PhaseId::from_number(phase).map_or(Screen::Lobby, Screen::Playing)
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            progress: self.store.state().clone(),
            game_over: self.store.is_game_over(),
            screen: self.screen(),
            phase: self.active.as_ref().map(ActivePhase::view),
        }
    }

    #[must_use]
    pub fn run_summary(&self) -> RunSummary {
        run_summary(self.store.state(), &self.summary_config)
    }

    #[must_use]
    pub fn phase_grade(&self, phase: PhaseId) -> PhaseGrade {
        grade_phase(self.store.state(), phase, &self.summary_config)
    }

    const fn ensure_alive(&self) -> Result<(), SessionError> {
        if self.store.is_game_over() {
            Err(SessionError::GameOver)
        } else {
            Ok(())
        }
    }

    fn mount(&mut self, phase: PhaseId) -> Result<(), SessionError> {
        self.active = Some(ActivePhase::mount(phase, &self.catalog)?);
        debug!(target: LOG_TARGET_SESSION, "mounted {phase}");
        Ok(())
    }

    fn unmount(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.teardown();
            debug!(target: LOG_TARGET_SESSION, "unmounted {}", active.id());
        }
    }

    fn settle(&mut self, phase: PhaseId, outcome: StepOutcome) -> ActionReport {
        let game_over = self.store.is_game_over();
        if game_over {
            self.unmount();
            self.overlay = None;
            warn!(
                target: LOG_TARGET_SESSION,
                "game over during {phase}: cash {:.2}, health {}",
                self.store.state().cash(),
                self.store.state().health
            );
        } else if outcome.completed {
            self.unmount();
            let change = self.store.advance_phase();
            self.overlay = Some(Overlay::PhaseSummary(phase));
            if change.reached_terminal {
                info!(
                    target: LOG_TARGET_SESSION,
                    "run completed with score {}",
                    self.store.state().score
                );
            }
        }
        ActionReport {
            phase,
            verdict: Some(outcome.verdict),
            completed: outcome.completed,
            game_over,
        }
    }
}

impl Overlay {
    const fn screen(self) -> Screen {
        match self {
            Self::Transition(phase) => Screen::Transition(phase),
            Self::PhaseSummary(phase) => Screen::PhaseSummary(phase),
        }
    }
}
