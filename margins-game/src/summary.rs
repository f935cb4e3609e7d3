//! Phase grades, run rank and the learning-gap report shown after a run.
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{GRADE_GOOD_MAX_MISTAKES, RANK_CFO_SCORE, RANK_CONTROLLER_SCORE, TERMINAL_PHASE};
use crate::phase::PhaseId;
use crate::state::{ProgressState, Topic};

/// Thresholds for grading phases and ranking runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Score strictly above this earns the top rank.
    #[serde(default = "SummaryConfig::default_cfo_score")]
    pub cfo_score: u32,
    #[serde(default = "SummaryConfig::default_controller_score")]
    pub controller_score: u32,
    /// Most mistakes a phase may carry and still earn two stars.
    #[serde(default = "SummaryConfig::default_good_max_mistakes")]
    pub good_max_mistakes: u32,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            cfo_score: Self::default_cfo_score(),
            controller_score: Self::default_controller_score(),
            good_max_mistakes: Self::default_good_max_mistakes(),
        }
    }
}

impl SummaryConfig {
    const fn default_cfo_score() -> u32 {
        RANK_CFO_SCORE
    }

    const fn default_controller_score() -> u32 {
        RANK_CONTROLLER_SCORE
    }

    const fn default_good_max_mistakes() -> u32 {
        GRADE_GOOD_MAX_MISTAKES
    }
}

/// Star rating for one finished phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseGrade {
    pub phase: PhaseId,
    pub stars: u8,
    pub headline: String,
    pub mistakes: u32,
    pub score: u32,
}

impl PhaseGrade {
    #[must_use]
    pub const fn is_perfect(&self) -> bool {
        self.stars == 3
    }
}

#[must_use]
pub fn grade_phase(state: &ProgressState, phase: PhaseId, config: &SummaryConfig) -> PhaseGrade {
    let stats = state.stats_for(phase.number());
    let (stars, headline) = if stats.mistakes == 0 {
        (3, "PERFECT RUN!")
    } else if stats.mistakes <= config.good_max_mistakes {
        (2, "PHASE COMPLETE!")
    } else {
        (1, "PHASE SURVIVED")
    };
    PhaseGrade {
        phase,
        stars,
        headline: headline.to_string(),
        mistakes: stats.mistakes,
        score: stats.score,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunRank {
    JuniorAnalyst,
    CostController,
    CfoMaterial,
}

impl RunRank {
    #[must_use]
    pub const fn from_score(score: u32, config: &SummaryConfig) -> Self {
        if score > config.cfo_score {
            Self::CfoMaterial
        } else if score > config.controller_score {
            Self::CostController
        } else {
            Self::JuniorAnalyst
        }
    }

    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::JuniorAnalyst => "JUNIOR ANALYST",
            Self::CostController => "COST CONTROLLER",
            Self::CfoMaterial => "CFO MATERIAL",
        }
    }
}

impl fmt::Display for RunRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Mistake topics ordered from weakest to strongest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapReport {
    pub gaps: Vec<(Topic, u32)>,
}

impl GapReport {
    #[must_use]
    pub fn from_state(state: &ProgressState) -> Self {
        let mut gaps: Vec<(Topic, u32)> = state
            .mistake_details
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(topic, count)| (*topic, *count))
            .collect();
        // Stable sort keeps topic order for ties.
        gaps.sort_by(|left, right| right.1.cmp(&left.1));
        Self { gaps }
    }

    /// Topic to review first, if any mistakes were made.
    #[must_use]
    pub fn weakest(&self) -> Option<Topic> {
        self.gaps.first().map(|(topic, _)| *topic)
    }

    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.gaps.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// Cash went below zero.
    Bankrupt,
    /// Audit integrity (health) ran out.
    AuditCollapse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "cause", rename_all = "snake_case")]
pub enum RunOutcome {
    InProgress,
    Completed,
    Failed(FailureCause),
}

impl RunOutcome {
    #[must_use]
    pub const fn from_state(state: &ProgressState) -> Self {
        if state.cash_cents < 0 {
            Self::Failed(FailureCause::Bankrupt)
        } else if state.health == 0 {
            Self::Failed(FailureCause::AuditCollapse)
        } else if state.phase >= TERMINAL_PHASE {
            Self::Completed
        } else {
            Self::InProgress
        }
    }

    #[must_use]
    pub const fn is_finished(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// Everything the end-of-run screen shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub rank: RunRank,
    pub score: u32,
    pub cash: f64,
    pub health: u32,
    pub mistakes: u32,
    /// Grades for phases that recorded any activity.
    pub grades: Vec<PhaseGrade>,
    pub gaps: GapReport,
    pub recommended_topic: Option<Topic>,
}

#[must_use]
pub fn run_summary(state: &ProgressState, config: &SummaryConfig) -> RunSummary {
    let grades = PhaseId::ALL
        .into_iter()
        .filter(|phase| state.phase_stats.contains_key(&phase.number()))
        .map(|phase| grade_phase(state, phase, config))
        .collect();
    let gaps = GapReport::from_state(state);
    let recommended_topic = gaps.weakest();
    RunSummary {
        outcome: RunOutcome::from_state(state),
        rank: RunRank::from_score(state.score, config),
        score: state.score,
        cash: state.cash(),
        health: state.health,
        mistakes: state.mistakes,
        grades,
        gaps,
        recommended_topic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PhaseStats;

    #[test]
    fn grades_follow_mistake_count() {
        let config = SummaryConfig::default();
        let mut state = ProgressState::default();
        assert_eq!(grade_phase(&state, PhaseId::Classification, &config).stars, 3);
        for (mistakes, stars) in [(1, 2), (2, 2), (3, 1)] {
            state.phase_stats.insert(
                1,
                PhaseStats {
                    mistakes,
                    score: 1_000,
                },
            );
            let grade = grade_phase(&state, PhaseId::Classification, &config);
            assert_eq!(grade.stars, stars, "mistakes {mistakes}");
        }
    }

    #[test]
    fn rank_thresholds_are_strict() {
        let config = SummaryConfig::default();
        assert_eq!(RunRank::from_score(5_000, &config), RunRank::JuniorAnalyst);
        assert_eq!(RunRank::from_score(5_001, &config), RunRank::CostController);
        assert_eq!(RunRank::from_score(8_000, &config), RunRank::CostController);
        assert_eq!(RunRank::from_score(10_000, &config), RunRank::CfoMaterial);
        assert_eq!(RunRank::CfoMaterial.to_string(), "CFO MATERIAL");
    }

    #[test]
    fn gap_report_sorts_by_count() {
        let mut state = ProgressState::default();
        state.mistake_details.insert(Topic::Marginal, 1);
        state.mistake_details.insert(Topic::BreakEven, 4);
        state.mistake_details.insert(Topic::Leverage, 0);
        let report = GapReport::from_state(&state);
        assert_eq!(report.gaps, vec![(Topic::BreakEven, 4), (Topic::Marginal, 1)]);
        assert_eq!(report.weakest(), Some(Topic::BreakEven));
        assert!(GapReport::from_state(&ProgressState::default()).is_clean());
    }

    #[test]
    fn outcome_prefers_failure_causes() {
        let mut state = ProgressState::default();
        assert_eq!(RunOutcome::from_state(&state), RunOutcome::InProgress);
        state.phase = TERMINAL_PHASE;
        assert_eq!(RunOutcome::from_state(&state), RunOutcome::Completed);
        state.health = 0;
        assert_eq!(
            RunOutcome::from_state(&state),
            RunOutcome::Failed(FailureCause::AuditCollapse)
        );
        state.cash_cents = -1;
        assert_eq!(
            RunOutcome::from_state(&state),
            RunOutcome::Failed(FailureCause::Bankrupt)
        );
    }

    #[test]
    fn summary_only_grades_touched_phases() {
        let mut state = ProgressState::default();
        state.score = 6_000;
        state.phase_stats.insert(2, PhaseStats::default());
        let summary = run_summary(&state, &SummaryConfig::default());
        assert_eq!(summary.rank, RunRank::CostController);
        assert_eq!(summary.grades.len(), 1);
        assert_eq!(summary.grades[0].phase, PhaseId::SpecialOrder);
        assert_eq!(summary.recommended_topic, None);
    }
}
