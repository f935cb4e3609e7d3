//! The single owner of [`ProgressState`].
//!
//! Every mutation is a named [`ProgressAction`] run through one reducer, so
//! the convenience methods and `dispatch` can never drift apart.
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MISTAKE_SEVERITY, LOG_TARGET_STORE, TERMINAL_PHASE};
use crate::numbers::dollars_to_cents;
use crate::state::{ProgressState, Topic};

/// Named progress mutations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressAction {
    AdvancePhase,
    SetPhase { phase: u8 },
    AddCash { dollars: f64 },
    AddScore { points: u32 },
    RecordMistake { topic: Topic, severity: u32 },
    ResetGame,
    SuggestTopic { topic: Topic },
    ClearSuggestion,
}

/// What a dispatch changed at the run level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressChange {
    pub became_game_over: bool,
    pub reached_terminal: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ProgressStore {
    state: ProgressState,
}

impl ProgressStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing state (useful for resuming from a snapshot).
    #[must_use]
    pub const fn with_state(state: ProgressState) -> Self {
        Self { state }
    }

    #[must_use]
    pub const fn state(&self) -> &ProgressState {
        &self.state
    }

    #[must_use]
    pub const fn phase(&self) -> u8 {
        self.state.phase
    }

    #[must_use]
    pub const fn is_game_over(&self) -> bool {
        self.state.is_game_over()
    }

    /// Apply one action and report run-level transitions.
    pub fn dispatch(&mut self, action: ProgressAction) -> ProgressChange {
        let was_over = self.state.is_game_over();
        let was_terminal = self.state.phase >= TERMINAL_PHASE;
        self.reduce(action);
        let change = ProgressChange {
            became_game_over: !was_over && self.state.is_game_over(),
            reached_terminal: !was_terminal && self.state.phase >= TERMINAL_PHASE,
        };
        if change.became_game_over {
            warn!(
                target: LOG_TARGET_STORE,
                "run failed: cash_cents={} health={}",
                self.state.cash_cents,
                self.state.health
            );
        }
        if change.reached_terminal {
            info!(target: LOG_TARGET_STORE, "run complete with score {}", self.state.score);
        }
        change
    }

    fn reduce(&mut self, action: ProgressAction) {
        debug!(target: LOG_TARGET_STORE, "dispatch {action:?}");
        let state = &mut self.state;
        match action {
            ProgressAction::AdvancePhase => {
                state.phase = state.phase.saturating_add(1).min(TERMINAL_PHASE);
            }
            ProgressAction::SetPhase { phase } => {
                state.phase = phase.min(TERMINAL_PHASE);
            }
            ProgressAction::AddCash { dollars } => {
                state.cash_cents = state.cash_cents.saturating_add(dollars_to_cents(dollars));
            }
            ProgressAction::AddScore { points } => {
                state.score = state.score.saturating_add(points);
                let stats = state.phase_stats.entry(state.phase).or_default();
                stats.score = stats.score.saturating_add(points);
            }
            ProgressAction::RecordMistake { topic, severity } => {
                state.mistakes = state.mistakes.saturating_add(1);
                state.health = state.health.saturating_sub(severity);
                let count = state.mistake_details.entry(topic).or_insert(0);
                *count = count.saturating_add(1);
                let stats = state.phase_stats.entry(state.phase).or_default();
                stats.mistakes = stats.mistakes.saturating_add(1);
            }
            ProgressAction::ResetGame => {
                *state = ProgressState::default();
            }
            ProgressAction::SuggestTopic { topic } => {
                state.suggested_topic = Some(topic);
            }
            ProgressAction::ClearSuggestion => {
                state.suggested_topic = None;
            }
        }
    }

    pub fn advance_phase(&mut self) -> ProgressChange {
        self.dispatch(ProgressAction::AdvancePhase)
    }

    pub fn set_phase(&mut self, phase: u8) -> ProgressChange {
        self.dispatch(ProgressAction::SetPhase { phase })
    }

    pub fn add_cash(&mut self, dollars: f64) -> ProgressChange {
        self.dispatch(ProgressAction::AddCash { dollars })
    }

    pub fn add_score(&mut self, points: u32) -> ProgressChange {
        self.dispatch(ProgressAction::AddScore { points })
    }

    pub fn record_mistake(&mut self, topic: Topic, severity: u32) -> ProgressChange {
        self.dispatch(ProgressAction::RecordMistake { topic, severity })
    }

    pub fn record_default_mistake(&mut self, topic: Topic) -> ProgressChange {
        self.record_mistake(topic, DEFAULT_MISTAKE_SEVERITY)
    }

    pub fn reset_game(&mut self) -> ProgressChange {
        self.dispatch(ProgressAction::ResetGame)
    }

    pub fn suggest_topic(&mut self, topic: Topic) -> ProgressChange {
        self.dispatch(ProgressAction::SuggestTopic { topic })
    }

    pub fn clear_suggestion(&mut self) -> ProgressChange {
        self.dispatch(ProgressAction::ClearSuggestion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mistake_updates_every_tally() {
        let mut store = ProgressStore::new();
        store.set_phase(3);
        let change = store.record_mistake(Topic::Calculating, 15);
        assert!(!change.became_game_over);
        let state = store.state();
        assert_eq!(state.mistakes, 1);
        assert_eq!(state.health, 85);
        assert_eq!(state.mistakes_on(Topic::Calculating), 1);
        assert_eq!(state.stats_for(3).mistakes, 1);
    }

    #[test]
    fn health_clamps_at_zero_and_ends_run() {
        let mut store = ProgressStore::new();
        store.record_mistake(Topic::General, 95);
        let change = store.record_mistake(Topic::General, 10);
        assert!(change.became_game_over);
        assert_eq!(store.state().health, 0);
        let again = store.record_default_mistake(Topic::General);
        assert!(!again.became_game_over);
        assert_eq!(store.state().mistakes, 3);
    }

    #[test]
    fn cash_goes_negative_and_ends_run() {
        let mut store = ProgressStore::new();
        let change = store.add_cash(-1_000.0);
        assert!(!change.became_game_over);
        let change = store.add_cash(-0.01);
        assert!(change.became_game_over);
        assert_eq!(store.state().cash_cents, -1);
    }

    #[test]
    fn score_credits_current_phase() {
        let mut store = ProgressStore::new();
        store.set_phase(2);
        store.add_score(1_500);
        store.add_score(0);
        assert_eq!(store.state().score, 1_500);
        assert_eq!(store.state().stats_for(2).score, 1_500);
    }

    #[test]
    fn phase_caps_at_terminal() {
        let mut store = ProgressStore::new();
        store.set_phase(5);
        let change = store.advance_phase();
        assert!(change.reached_terminal);
        store.advance_phase();
        assert_eq!(store.phase(), 6);
        store.set_phase(42);
        assert_eq!(store.phase(), 6);
    }

    #[test]
    fn reset_restores_defaults() {
        let mut store = ProgressStore::new();
        store.set_phase(4);
        store.record_mistake(Topic::Leverage, 100);
        store.suggest_topic(Topic::Leverage);
        assert!(store.is_game_over());
        store.reset_game();
        assert_eq!(store.state(), &ProgressState::default());
    }

    #[test]
    fn suggestion_set_and_cleared() {
        let mut store = ProgressStore::new();
        store.suggest_topic(Topic::BreakEven);
        assert_eq!(store.state().suggested_topic, Some(Topic::BreakEven));
        store.clear_suggestion();
        assert_eq!(store.state().suggested_topic, None);
    }

    #[test]
    fn dispatch_matches_methods() {
        let mut via_dispatch = ProgressStore::new();
        let mut via_methods = ProgressStore::new();
        via_dispatch.dispatch(ProgressAction::SetPhase { phase: 1 });
        via_dispatch.dispatch(ProgressAction::AddCash { dollars: 40.0 });
        via_dispatch.dispatch(ProgressAction::RecordMistake {
            topic: Topic::Marginal,
            severity: 10,
        });
        via_methods.set_phase(1);
        via_methods.add_cash(40.0);
        via_methods.record_default_mistake(Topic::Marginal);
        assert_eq!(via_dispatch.state(), via_methods.state());
    }
}
