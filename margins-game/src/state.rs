//! Authoritative run progress: cash, score, health, mistakes.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::constants::{LOBBY_PHASE, MAX_HEALTH, STARTING_CASH_CENTS};
use crate::numbers::cents_to_dollars;

/// Concept area a mistake is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Classification,
    Marginal,
    AbsorptionLogic,
    Calculating,
    BreakEven,
    Leverage,
    General,
}

impl Topic {
    pub const ALL: [Self; 7] = [
        Self::Classification,
        Self::Marginal,
        Self::AbsorptionLogic,
        Self::Calculating,
        Self::BreakEven,
        Self::Leverage,
        Self::General,
    ];

    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Marginal => "marginal",
            Self::AbsorptionLogic => "absorption_logic",
            Self::Calculating => "calculating",
            Self::BreakEven => "break_even",
            Self::Leverage => "leverage",
            Self::General => "general",
        }
    }

    /// Human-readable name used in review prompts.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Classification => "Cost Classification",
            Self::Marginal => "Marginal Costing",
            Self::AbsorptionLogic => "Absorption Logic",
            Self::Calculating => "Unit Cost Calculation",
            Self::BreakEven => "Break-Even Analysis",
            Self::Leverage => "Operating Leverage",
            Self::General => "General Concepts",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Per-phase tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseStats {
    pub mistakes: u32,
    pub score: u32,
}

/// Complete progress of a single run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    /// 0 is the lobby, 1..=5 the playable phases, 6 the completed run.
    pub phase: u8,
    /// Cash in cents; negative means bankrupt.
    pub cash_cents: i64,
    pub score: u32,
    pub mistakes: u32,
    pub health: u32,
    #[serde(default)]
    pub mistake_details: BTreeMap<Topic, u32>,
    #[serde(default)]
    pub phase_stats: BTreeMap<u8, PhaseStats>,
    #[serde(default)]
    pub suggested_topic: Option<Topic>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            phase: LOBBY_PHASE,
            cash_cents: STARTING_CASH_CENTS,
            score: 0,
            mistakes: 0,
            health: MAX_HEALTH,
            mistake_details: BTreeMap::new(),
            phase_stats: BTreeMap::new(),
            suggested_topic: None,
        }
    }
}

impl ProgressState {
    /// Cash in dollars.
    #[must_use]
    pub fn cash(&self) -> f64 {
        cents_to_dollars(self.cash_cents)
    }

    /// Derived every time; never stored.
    #[must_use]
    pub const fn is_game_over(&self) -> bool {
        self.cash_cents < 0 || self.health == 0
    }

    #[must_use]
    pub fn stats_for(&self, phase: u8) -> PhaseStats {
        self.phase_stats.get(&phase).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn mistakes_on(&self, topic: Topic) -> u32 {
        self.mistake_details.get(&topic).copied().unwrap_or(0)
    }
}
