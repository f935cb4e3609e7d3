use margins_game::constants::MAX_HEALTH;
use margins_game::{FailureCause, RunOutcome, RunRank, Topic};

use crate::logic::policy::PlayStyle;
use crate::logic::runner::RunRecord;

/// Check applied to a finished run; the message explains the miss.
pub type Expectation = fn(&RunRecord) -> Result<(), String>;

#[derive(Debug, Clone)]
pub enum ScenarioPlan {
    /// Play whole runs with one style and check each record.
    Playthrough {
        style: PlayStyle,
        expectations: Vec<Expectation>,
    },
    /// Play the same seed twice and require identical transcripts.
    Determinism { style: PlayStyle },
    /// Serialize the loaded catalog and load it back.
    CatalogRoundTrip,
}

#[derive(Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub plan: ScenarioPlan,
}

const SCENARIOS: [(&str, &str); 7] = [
    ("smoke", "Perfect player finishes the run without invariant violations"),
    ("perfect-run", "Perfect player earns three stars everywhere and the top rank"),
    ("novice-run", "Novice slips once per phase yet still completes the run"),
    ("reckless-run", "Reckless player collapses the audit and is locked out"),
    ("chaos-invariants", "Random button mashing never breaks progress invariants"),
    ("determinism", "Same seed, same policy, same transcript and snapshot"),
    ("catalog-roundtrip", "Loaded catalog survives JSON serialization"),
];

pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    SCENARIOS.to_vec()
}

pub fn scenario_names() -> Vec<String> {
    SCENARIOS.iter().map(|(name, _)| (*name).to_string()).collect()
}

pub fn get_scenario(name: &str) -> Option<TestScenario> {
    let plan = match name {
        "smoke" => ScenarioPlan::Playthrough {
            style: PlayStyle::Perfect,
            expectations: vec![finished, clean, completed],
        },
        "perfect-run" => ScenarioPlan::Playthrough {
            style: PlayStyle::Perfect,
            expectations: vec![finished, clean, completed, flawless, top_rank],
        },
        "novice-run" => ScenarioPlan::Playthrough {
            style: PlayStyle::Novice,
            expectations: vec![finished, clean, completed, health_tracks_mistakes],
        },
        "reckless-run" => ScenarioPlan::Playthrough {
            style: PlayStyle::Reckless,
            expectations: vec![finished, clean, audit_collapse, recommends_classification],
        },
        "chaos-invariants" => ScenarioPlan::Playthrough {
            style: PlayStyle::Chaotic,
            expectations: vec![clean],
        },
        "determinism" => ScenarioPlan::Determinism {
            style: PlayStyle::Chaotic,
        },
        "catalog-roundtrip" => ScenarioPlan::CatalogRoundTrip,
        _ => return None,
    };
    Some(TestScenario {
        name: name.to_string(),
        plan,
    })
}

fn finished(record: &RunRecord) -> Result<(), String> {
    if record.finished {
        Ok(())
    } else {
        Err(format!("run did not end within {} steps", record.steps))
    }
}

fn clean(record: &RunRecord) -> Result<(), String> {
    if record.violations.is_empty() {
        Ok(())
    } else {
        Err(format!("invariant violations: {}", record.violations.join("; ")))
    }
}

fn completed(record: &RunRecord) -> Result<(), String> {
    match record.summary.outcome {
        RunOutcome::Completed => Ok(()),
        other => Err(format!("expected a completed run, got {other:?}")),
    }
}

fn flawless(record: &RunRecord) -> Result<(), String> {
    if record.summary.mistakes > 0 {
        return Err(format!("{} mistakes recorded", record.summary.mistakes));
    }
    match record.summary.grades.iter().find(|grade| grade.stars < 3) {
        Some(grade) => Err(format!("{} graded {} stars", grade.phase, grade.stars)),
        None => Ok(()),
    }
}

fn top_rank(record: &RunRecord) -> Result<(), String> {
    if record.summary.rank == RunRank::CfoMaterial {
        Ok(())
    } else {
        Err(format!("rank {} below the top", record.summary.rank))
    }
}

fn health_tracks_mistakes(record: &RunRecord) -> Result<(), String> {
    let summary = &record.summary;
    if (summary.mistakes == 0) == (summary.health == MAX_HEALTH) {
        Ok(())
    } else {
        Err(format!(
            "health {} inconsistent with {} mistakes",
            summary.health, summary.mistakes
        ))
    }
}

fn audit_collapse(record: &RunRecord) -> Result<(), String> {
    match record.summary.outcome {
        RunOutcome::Failed(FailureCause::AuditCollapse) => Ok(()),
        other => Err(format!("expected an audit collapse, got {other:?}")),
    }
}

fn recommends_classification(record: &RunRecord) -> Result<(), String> {
    match record.summary.recommended_topic {
        Some(Topic::Classification) => Ok(()),
        other => Err(format!("expected a classification refresher, got {other:?}")),
    }
}
