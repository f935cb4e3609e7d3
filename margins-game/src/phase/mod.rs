//! Generic phase engine and the five rule sets it runs.
//!
//! Every phase has the same shape: a briefing, an ordered list of
//! scenarios that are retried until solved, and a fixed completion bonus.
//! [`PhaseEngine`] owns that shape; a [`PhaseRules`] implementation supplies
//! the per-phase evaluation and, for real-time phases, a tick hook.
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub mod break_even;
pub mod classification;
pub mod costing_duel;
pub mod market_shock;
pub mod special_order;

use crate::constants::{
    BONUS_BREAK_EVEN, BONUS_CLASSIFICATION, BONUS_COSTING_DUEL, BONUS_MARKET_SHOCK,
    BONUS_SPECIAL_ORDER, LOG_TARGET_PHASE, SUGGEST_TOPIC_AFTER,
};
use crate::cost_model::CostModelError;
use crate::rng::RandomSource;
use crate::state::Topic;
use crate::store::ProgressStore;

/// The five playable phases, numbered 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseId {
    Classification,
    SpecialOrder,
    CostingDuel,
    BreakEven,
    MarketShock,
}

impl PhaseId {
    pub const ALL: [Self; 5] = [
        Self::Classification,
        Self::SpecialOrder,
        Self::CostingDuel,
        Self::BreakEven,
        Self::MarketShock,
    ];

    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Classification => 1,
            Self::SpecialOrder => 2,
            Self::CostingDuel => 3,
            Self::BreakEven => 4,
            Self::MarketShock => 5,
        }
    }

    #[must_use]
    pub const fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::Classification),
            2 => Some(Self::SpecialOrder),
            3 => Some(Self::CostingDuel),
            4 => Some(Self::BreakEven),
            5 => Some(Self::MarketShock),
            _ => None,
        }
    }

    #[must_use]
    pub const fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Classification => "Cost Classification",
            Self::SpecialOrder => "The Special Order",
            Self::CostingDuel => "The Costing Duel",
            Self::BreakEven => "Break-Even Lab",
            Self::MarketShock => "Market Shock",
        }
    }

    /// Fixed score bonus awarded once when the phase completes.
    #[must_use]
    pub const fn bonus(self) -> u32 {
        match self {
            Self::Classification => BONUS_CLASSIFICATION,
            Self::SpecialOrder => BONUS_SPECIAL_ORDER,
            Self::CostingDuel => BONUS_COSTING_DUEL,
            Self::BreakEven => BONUS_BREAK_EVEN,
            Self::MarketShock => BONUS_MARKET_SHOCK,
        }
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phase {} ({})", self.number(), self.title())
    }
}

/// Lifecycle of one phase instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Briefing,
    Active,
    /// A real-time evaluation is spanning ticks.
    Evaluating,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Success,
    Info,
    Warning,
}

/// Player-facing message produced by an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub tone: Tone,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl Feedback {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            tone: Tone::Success,
            message: message.into(),
            hint: None,
        }
    }

    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            tone: Tone::Info,
            message: message.into(),
            hint: None,
        }
    }

    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            tone: Tone::Warning,
            message: message.into(),
            hint: None,
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Result of evaluating one player action or tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    /// Valid step; the scenario is still open.
    Progress { feedback: Feedback },
    /// The scenario is done.
    Solved { feedback: Feedback },
    /// Wrong answer; the same scenario is retried.
    Mistake {
        topic: Topic,
        severity: u32,
        feedback: Feedback,
    },
}

impl Verdict {
    #[must_use]
    pub const fn feedback(&self) -> &Feedback {
        match self {
            Self::Progress { feedback } | Self::Solved { feedback } | Self::Mistake { feedback, .. } => {
                feedback
            }
        }
    }

    #[must_use]
    pub const fn is_mistake(&self) -> bool {
        matches!(self, Self::Mistake { .. })
    }

    #[must_use]
    pub const fn is_solved(&self) -> bool {
        matches!(self, Self::Solved { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub verdict: Verdict,
    /// True exactly once: on the step that exhausted the scenario list.
    pub completed: bool,
}

/// Mutable collaborators handed to rules during evaluation.
pub struct PhaseCtx<'a> {
    pub store: &'a mut ProgressStore,
    pub rng: &'a mut dyn RandomSource,
}

impl fmt::Debug for PhaseCtx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseCtx")
            .field("phase", &self.store.phase())
            .finish_non_exhaustive()
    }
}

/// Input errors. Player mistakes are [`Verdict::Mistake`], never these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhaseError {
    #[error("{0} has not been started")]
    NotStarted(PhaseId),
    #[error("{0} is already running")]
    AlreadyStarted(PhaseId),
    #[error("{0} is already completed")]
    AlreadyCompleted(PhaseId),
    #[error("{0} has been torn down")]
    TornDown(PhaseId),
    #[error("{0} has no scenarios")]
    EmptyScenarioSet(PhaseId),
    #[error("unknown cost item `{0}`")]
    UnknownItem(String),
    #[error("cost item `{0}` is already classified")]
    ItemAlreadyPlaced(String),
    #[error("unknown explanation option `{0}`")]
    UnknownOption(String),
    #[error("unknown cost model `{0}`")]
    UnknownModel(String),
    #[error("{phase}: {reason}")]
    InvalidAction {
        phase: PhaseId,
        reason: &'static str,
    },
    #[error(transparent)]
    CostModel(#[from] CostModelError),
}

/// Per-phase behaviour plugged into [`PhaseEngine`].
pub trait PhaseRules {
    type Scenario: fmt::Debug;
    type Action: fmt::Debug;
    /// Transient per-scenario state, rebuilt for every scenario.
    type Local: fmt::Debug;

    const PHASE: PhaseId;

    fn prepare(&self, scenario: &Self::Scenario) -> Self::Local;

    /// Judge one action.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError`] when the action does not apply to the current
    /// scenario or stage.
    fn evaluate(
        &self,
        scenario: &Self::Scenario,
        local: &mut Self::Local,
        action: Self::Action,
        ctx: &mut PhaseCtx<'_>,
    ) -> Result<Verdict, PhaseError>;

    /// Advance real-time behaviour; only real-time phases override this.
    fn on_tick(
        &self,
        _scenario: &Self::Scenario,
        _local: &mut Self::Local,
        _elapsed: Duration,
        _ctx: &mut PhaseCtx<'_>,
    ) -> Option<Verdict> {
        None
    }

    /// Whether an evaluation is in flight across ticks.
    fn is_busy(&self, _local: &Self::Local) -> bool {
        false
    }

    /// Release anything that could fire later (timers).
    fn teardown(&self, _local: &mut Self::Local) {}

    fn detail(&self, scenario: &Self::Scenario, local: &Self::Local) -> PhaseDetail;
}

/// Rendering data for the active phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhaseDetail {
    Classification(classification::ClassificationView),
    SpecialOrder(special_order::SpecialOrderView),
    CostingDuel(costing_duel::CostingDuelView),
    BreakEven(break_even::BreakEvenView),
    MarketShock(market_shock::MarketShockView),
}

/// Read-only view of a mounted phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseView {
    pub phase: PhaseId,
    pub status: PhaseStatus,
    pub scenario_index: usize,
    pub scenario_count: usize,
    pub mistake_streak: u32,
    pub last_feedback: Option<Feedback>,
    pub detail: PhaseDetail,
}

/// Drives one phase through its scenarios.
#[derive(Debug)]
pub struct PhaseEngine<R: PhaseRules> {
    rules: R,
    scenarios: Vec<R::Scenario>,
    index: usize,
    local: R::Local,
    status: PhaseStatus,
    streak: u32,
    last_feedback: Option<Feedback>,
    bonus_awarded: bool,
    torn_down: bool,
}

impl<R: PhaseRules> PhaseEngine<R> {
    /// # Errors
    ///
    /// Returns [`PhaseError::EmptyScenarioSet`] when `scenarios` is empty.
    pub fn new(rules: R, scenarios: Vec<R::Scenario>) -> Result<Self, PhaseError> {
        let Some(first) = scenarios.first() else {
            return Err(PhaseError::EmptyScenarioSet(R::PHASE));
        };
        let local = rules.prepare(first);
        Ok(Self {
            rules,
            scenarios,
            index: 0,
            local,
            status: PhaseStatus::Briefing,
            streak: 0,
            last_feedback: None,
            bonus_awarded: false,
            torn_down: false,
        })
    }

    #[must_use]
    pub const fn phase(&self) -> PhaseId {
        R::PHASE
    }

    #[must_use]
    pub const fn status(&self) -> PhaseStatus {
        self.status
    }

    #[must_use]
    pub const fn scenario_index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn scenario_count(&self) -> usize {
        self.scenarios.len()
    }

    #[must_use]
    pub fn scenario(&self) -> &R::Scenario {
        &self.scenarios[self.index]
    }

    #[must_use]
    pub const fn local(&self) -> &R::Local {
        &self.local
    }

    #[must_use]
    pub const fn rules(&self) -> &R {
        &self.rules
    }

    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self.status, PhaseStatus::Completed)
    }

    /// Leave the briefing and accept actions.
    ///
    /// # Errors
    ///
    /// Fails when the phase is already running, completed or torn down.
    pub fn start(&mut self) -> Result<(), PhaseError> {
        self.ensure_live()?;
        match self.status {
            PhaseStatus::Briefing => {
                self.status = PhaseStatus::Active;
                debug!(target: LOG_TARGET_PHASE, "{} started", R::PHASE);
                Ok(())
            }
            PhaseStatus::Completed => Err(PhaseError::AlreadyCompleted(R::PHASE)),
            PhaseStatus::Active | PhaseStatus::Evaluating => {
                Err(PhaseError::AlreadyStarted(R::PHASE))
            }
        }
    }

    /// Evaluate a player action against the current scenario.
    ///
    /// # Errors
    ///
    /// Fails when the phase is not accepting actions or the rules reject
    /// the action as malformed.
    pub fn act(
        &mut self,
        action: R::Action,
        ctx: &mut PhaseCtx<'_>,
    ) -> Result<StepOutcome, PhaseError> {
        self.ensure_live()?;
        match self.status {
            PhaseStatus::Briefing => return Err(PhaseError::NotStarted(R::PHASE)),
            PhaseStatus::Completed => return Err(PhaseError::AlreadyCompleted(R::PHASE)),
            PhaseStatus::Active | PhaseStatus::Evaluating => {}
        }
        debug!(target: LOG_TARGET_PHASE, "{} action {action:?}", R::PHASE);
        let scenario = &self.scenarios[self.index];
        let verdict = self.rules.evaluate(scenario, &mut self.local, action, ctx)?;
        Ok(self.settle(verdict, ctx))
    }

    /// Feed elapsed time to a real-time phase. `None` when nothing resolved.
    pub fn tick(&mut self, elapsed: Duration, ctx: &mut PhaseCtx<'_>) -> Option<StepOutcome> {
        if self.torn_down || !matches!(self.status, PhaseStatus::Active | PhaseStatus::Evaluating)
        {
            return None;
        }
        let scenario = &self.scenarios[self.index];
        let verdict = self.rules.on_tick(scenario, &mut self.local, elapsed, ctx);
        self.refresh_status();
        verdict.map(|verdict| self.settle(verdict, ctx))
    }

    /// Cancel anything that could still fire. Idempotent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.rules.teardown(&mut self.local);
        self.torn_down = true;
        debug!(target: LOG_TARGET_PHASE, "{} torn down", R::PHASE);
    }

    #[must_use]
    pub const fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    #[must_use]
    pub fn view(&self) -> PhaseView {
        PhaseView {
            phase: R::PHASE,
            status: self.status,
            scenario_index: self.index,
            scenario_count: self.scenarios.len(),
            mistake_streak: self.streak,
            last_feedback: self.last_feedback.clone(),
            detail: self.rules.detail(&self.scenarios[self.index], &self.local),
        }
    }

    const fn ensure_live(&self) -> Result<(), PhaseError> {
        if self.torn_down {
            Err(PhaseError::TornDown(R::PHASE))
        } else {
            Ok(())
        }
    }

    fn settle(&mut self, verdict: Verdict, ctx: &mut PhaseCtx<'_>) -> StepOutcome {
        let mut completed = false;
        match &verdict {
            Verdict::Mistake {
                topic, severity, ..
            } => {
                ctx.store.record_mistake(*topic, *severity);
                self.streak = self.streak.saturating_add(1);
                if self.streak >= SUGGEST_TOPIC_AFTER {
                    ctx.store.suggest_topic(*topic);
                }
            }
            Verdict::Progress { .. } => {
                self.streak = 0;
            }
            Verdict::Solved { .. } => {
                self.streak = 0;
                self.rules.teardown(&mut self.local);
                if self.index + 1 < self.scenarios.len() {
                    self.index += 1;
                    self.local = self.rules.prepare(&self.scenarios[self.index]);
                    debug!(
                        target: LOG_TARGET_PHASE,
                        "{} scenario {}/{}",
                        R::PHASE,
                        self.index + 1,
                        self.scenarios.len()
                    );
                } else {
                    self.status = PhaseStatus::Completed;
                    completed = self.award_bonus(ctx.store);
                }
            }
        }
        self.refresh_status();
        self.last_feedback = Some(verdict.feedback().clone());
        StepOutcome { verdict, completed }
    }

    fn award_bonus(&mut self, store: &mut ProgressStore) -> bool {
        if self.bonus_awarded {
            return false;
        }
        self.bonus_awarded = true;
        store.add_score(R::PHASE.bonus());
        info!(
            target: LOG_TARGET_PHASE,
            "{} completed, bonus {}",
            R::PHASE,
            R::PHASE.bonus()
        );
        true
    }

    fn refresh_status(&mut self) {
        if matches!(self.status, PhaseStatus::Active | PhaseStatus::Evaluating) {
            self.status = if self.rules.is_busy(&self.local) {
                PhaseStatus::Evaluating
            } else {
                PhaseStatus::Active
            };
        }
    }
}
