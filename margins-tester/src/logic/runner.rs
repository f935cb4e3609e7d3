use log::debug;
use margins_game::constants::{MAX_HEALTH, TERMINAL_PHASE};
use margins_game::{
    PlayerAction, ProgressState, RunSummary, Screen, SessionController, SessionError,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::policy::{PlayStyle, PlayerPolicy};

#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    pub max_steps: usize,
    /// Clock advanced whenever the policy waits.
    pub tick: Duration,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_steps: 5_000,
            tick: Duration::from_millis(100),
        }
    }
}

/// What happened in one scripted run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub seed: u64,
    pub style: PlayStyle,
    pub finished: bool,
    pub steps: usize,
    pub actions: usize,
    pub ticks: usize,
    /// Actions the session refused without changing state.
    pub rejected: usize,
    pub violations: Vec<String>,
    pub final_screen: Screen,
    pub summary: RunSummary,
    /// Serialized snapshot at the end of the run.
    pub final_snapshot: String,
    /// `action:verdict` pairs in play order.
    pub transcript: Vec<String>,
}

impl RunRecord {
    pub fn describe(&self) -> String {
        format!(
            "style {}, seed {}, steps {} ({} actions, {} rejected, {} ticks), score {}, mistakes {}, health {}, cash ${:.2}, outcome {:?}",
            self.style,
            self.seed,
            self.steps,
            self.actions,
            self.rejected,
            self.ticks,
            self.summary.score,
            self.summary.mistakes,
            self.summary.health,
            self.summary.cash,
            self.summary.outcome
        )
    }
}

/// Tracks progress values that may only grow.
#[derive(Debug, Default)]
struct InvariantGuard {
    score: u32,
    mistakes: u32,
}

impl InvariantGuard {
    fn check(&mut self, session: &SessionController, violations: &mut Vec<String>) {
        let state = session.state();
        if state.health > MAX_HEALTH {
            violations.push(format!("health {} exceeds {MAX_HEALTH}", state.health));
        }
        if state.phase > TERMINAL_PHASE {
            violations.push(format!("phase {} past terminal", state.phase));
        }
        if state.score < self.score {
            violations.push(format!("score fell from {} to {}", self.score, state.score));
        }
        if state.mistakes < self.mistakes {
            violations.push(format!(
                "mistakes fell from {} to {}",
                self.mistakes, state.mistakes
            ));
        }
        let derived = state.cash_cents < 0 || state.health == 0;
        if state.is_game_over() != derived {
            violations.push(format!(
                "game over flag {} disagrees with cash {} and health {}",
                state.is_game_over(),
                state.cash(),
                state.health
            ));
        }
        if derived && session.screen() != Screen::GameOver {
            violations.push(format!("game over but screen is {:?}", session.screen()));
        }
        self.score = state.score;
        self.mistakes = state.mistakes;
    }
}

/// Play one run from the lobby until it ends or the step budget runs out.
pub fn play_run(
    mut session: SessionController,
    policy: &mut dyn PlayerPolicy,
    style: PlayStyle,
    seed: u64,
    limits: RunLimits,
) -> RunRecord {
    let mut guard = InvariantGuard::default();
    let mut violations = Vec::new();
    let mut transcript = Vec::new();
    let (mut steps, mut actions, mut ticks, mut rejected) = (0, 0, 0, 0);
    let mut finished = false;

    while steps < limits.max_steps {
        steps += 1;
        let screen = session.screen();
        let step = match screen {
            Screen::Lobby => session.start_run().map(|_| ()),
            Screen::Transition(_) => session.begin().map(|_| ()),
            Screen::PhaseSummary(_) => session.dismiss_overlay().map(|_| ()),
            Screen::Playing(_) => match policy.next_action(&session) {
                Some(action) => {
                    let name = action.name();
                    let outcome = session.perform(action);
                    if let Ok(report) = &outcome {
                        actions += 1;
                        transcript.push(format!("{name}:{}", verdict_label(report.verdict.as_ref())));
                    }
                    outcome.map(|_| ())
                }
                None => {
                    ticks += 1;
                    session.tick(limits.tick).map(|report| {
                        if let Some(report) = report {
                            transcript
                                .push(format!("tick:{}", verdict_label(report.verdict.as_ref())));
                        }
                    })
                }
            },
            Screen::RunSummary | Screen::GameOver => {
                finished = true;
                break;
            }
        };
        match step {
            Ok(()) => {}
            Err(SessionError::Phase(err)) => {
                debug!("rejected on {screen:?}: {err}");
                rejected += 1;
            }
            Err(SessionError::ActionNotApplicable { action, phase }) => {
                debug!("{action} does not apply to {phase}");
                rejected += 1;
            }
            Err(err) => violations.push(format!("unexpected error on {screen:?}: {err}")),
        }
        guard.check(&session, &mut violations);
    }

    if session.is_game_over() {
        probe_game_over_lock(&mut session, &mut violations);
    }

    let summary = session.run_summary();
    let final_screen = session.screen();
    let final_snapshot = serde_json::to_string(&session.snapshot()).unwrap_or_default();

    session.reset();
    if session.state() != &ProgressState::default() || session.screen() != Screen::Lobby {
        violations.push("reset did not restore the initial state".to_string());
    }

    RunRecord {
        seed,
        style,
        finished,
        steps,
        actions,
        ticks,
        rejected,
        violations,
        final_screen,
        summary,
        final_snapshot,
        transcript,
    }
}

fn probe_game_over_lock(session: &mut SessionController, violations: &mut Vec<String>) {
    let before = session.state().clone();
    for action in [PlayerAction::Begin, PlayerAction::Commit] {
        if !matches!(session.perform(action), Err(SessionError::GameOver)) {
            violations.push("action accepted after game over".to_string());
        }
    }
    if !matches!(session.tick(Duration::from_secs(1)), Err(SessionError::GameOver)) {
        violations.push("tick accepted after game over".to_string());
    }
    if session.state() != &before {
        violations.push("state changed after game over".to_string());
    }
}

fn verdict_label(verdict: Option<&margins_game::Verdict>) -> &'static str {
    match verdict {
        None => "none",
        Some(margins_game::Verdict::Progress { .. }) => "progress",
        Some(margins_game::Verdict::Solved { .. }) => "solved",
        Some(margins_game::Verdict::Mistake { .. }) => "mistake",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use margins_game::{FailureCause, RunOutcome, RunRank};

    fn run(style: PlayStyle, seed: u64) -> RunRecord {
        let session = SessionController::with_seed(seed).unwrap();
        let mut policy = style.create_policy(seed);
        play_run(session, policy.as_mut(), style, seed, RunLimits::default())
    }

    #[test]
    fn perfect_run_completes_cleanly() {
        let record = run(PlayStyle::Perfect, 1337);
        assert!(record.finished, "{}", record.describe());
        assert!(record.violations.is_empty(), "{:?}", record.violations);
        assert_eq!(record.final_screen, Screen::RunSummary);
        assert_eq!(record.summary.outcome, RunOutcome::Completed);
        assert_eq!(record.summary.mistakes, 0);
        assert_eq!(record.summary.rank, RunRank::CfoMaterial);
    }

    #[test]
    fn reckless_run_collapses_in_audit() {
        let record = run(PlayStyle::Reckless, 3);
        assert!(record.finished);
        assert!(record.violations.is_empty(), "{:?}", record.violations);
        assert_eq!(record.final_screen, Screen::GameOver);
        assert_eq!(
            record.summary.outcome,
            RunOutcome::Failed(FailureCause::AuditCollapse)
        );
    }

    #[test]
    fn transcript_is_seed_stable() {
        let left = run(PlayStyle::Chaotic, 21);
        let right = run(PlayStyle::Chaotic, 21);
        assert_eq!(left.transcript, right.transcript);
        assert_eq!(left.final_snapshot, right.final_snapshot);
    }

    #[test]
    fn step_budget_stops_unfinished_runs() {
        let session = SessionController::with_seed(5).unwrap();
        let mut policy = PlayStyle::Perfect.create_policy(5);
        let limits = RunLimits {
            max_steps: 3,
            ..RunLimits::default()
        };
        let record = play_run(session, policy.as_mut(), PlayStyle::Perfect, 5, limits);
        assert!(!record.finished);
        assert_eq!(record.steps, 3);
        assert!(record.violations.is_empty());
    }
}
