use colored::Colorize;
use log::{info, warn};
use margins_game::{CatalogLoader, GameEngine, PhaseId, PreferenceStore, ScenarioCatalog};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::common::scenarios::{Expectation, ScenarioPlan, TestScenario};
use crate::logic::policy::PlayStyle;
use crate::logic::runner::{RunLimits, RunRecord, play_run};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub seed: u64,
    pub style: Option<PlayStyle>,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    pub failures: Vec<String>,
    #[serde(with = "duration_serde")]
    pub average_duration: Duration,
    #[serde(with = "duration_vec_serde")]
    pub performance_data: Vec<Duration>,
}

pub struct LogicTester<L, P>
where
    L: CatalogLoader,
    P: PreferenceStore,
{
    engine: GameEngine<L, P>,
    limits: RunLimits,
    verbose: bool,
}

impl<L, P> LogicTester<L, P>
where
    L: CatalogLoader,
    P: PreferenceStore,
{
    pub fn new(engine: GameEngine<L, P>, verbose: bool) -> Self {
        Self {
            engine,
            limits: RunLimits::default(),
            verbose,
        }
    }

    pub const fn engine(&self) -> &GameEngine<L, P> {
        &self.engine
    }

    pub fn run_scenario(
        &self,
        scenario: &TestScenario,
        seeds: &[u64],
        iterations: usize,
    ) -> Vec<ScenarioResult> {
        let mut results = Vec::new();

        for &seed in seeds {
            if self.verbose {
                println!(
                    "🧪 Testing scenario: {} (seed: {})",
                    scenario.name.bright_white(),
                    seed
                );
            }

            let result = self.run_single_scenario(scenario, seed, iterations);
            results.push(result);
        }

        results
    }

    fn run_single_scenario(
        &self,
        scenario: &TestScenario,
        seed: u64,
        iterations: usize,
    ) -> ScenarioResult {
        let mut successes = 0;
        let mut failures = Vec::new();
        let mut performance_data = Vec::new();

        for i in 0..iterations {
            let start_time = Instant::now();
            let iteration_seed = seed.wrapping_add(u64::try_from(i).unwrap_or(u64::MAX));

            let outcome = self.run_iteration(&scenario.plan, iteration_seed);
            performance_data.push(start_time.elapsed());

            match outcome {
                Ok(()) => successes += 1,
                Err(err) => {
                    if self.verbose {
                        println!(
                            "  ❌ Iteration {}/{} failed: {}",
                            i + 1,
                            iterations,
                            err.clone().red()
                        );
                    }
                    failures.push(format!("Iteration {} (seed {iteration_seed}): {err}", i + 1));
                }
            }
        }

        let average_duration = if performance_data.is_empty() {
            Duration::ZERO
        } else {
            performance_data.iter().sum::<Duration>()
                / u32::try_from(performance_data.len()).unwrap_or(1)
        };

        if failures.is_empty() {
            info!("{} passed {successes}/{iterations} at seed {seed}", scenario.name);
        } else {
            warn!(
                "{} failed {}/{iterations} at seed {seed}",
                scenario.name,
                failures.len()
            );
        }

        ScenarioResult {
            scenario_name: scenario.name.clone(),
            seed,
            style: plan_style(&scenario.plan),
            passed: failures.is_empty(),
            iterations_run: iterations,
            successful_iterations: successes,
            failures,
            average_duration,
            performance_data,
        }
    }

    fn run_iteration(&self, plan: &ScenarioPlan, seed: u64) -> Result<(), String> {
        match plan {
            ScenarioPlan::Playthrough {
                style,
                expectations,
            } => {
                let record = self.play(*style, seed)?;
                evaluate_expectations(expectations, &record)
            }
            ScenarioPlan::Determinism { style } => {
                let first = self.play(*style, seed)?;
                let second = self.play(*style, seed)?;
                compare_records(&first, &second)
            }
            ScenarioPlan::CatalogRoundTrip => self.round_trip_catalog(seed),
        }
    }

    fn play(&self, style: PlayStyle, seed: u64) -> Result<RunRecord, String> {
        let session = self
            .engine
            .create_session(seed)
            .map_err(|err| format!("session setup failed: {err:#}"))?;
        let mut policy = style.create_policy(seed);
        Ok(play_run(session, policy.as_mut(), style, seed, self.limits))
    }

    fn round_trip_catalog(&self, seed: u64) -> Result<(), String> {
        let session = self
            .engine
            .create_session(seed)
            .map_err(|err| format!("session setup failed: {err:#}"))?;
        let original = session.catalog();
        let json = original
            .to_json_pretty()
            .map_err(|err| format!("serialize failed: {err}"))?;
        let reloaded =
            ScenarioCatalog::from_json(&json).map_err(|err| format!("reload failed: {err}"))?;
        for phase in PhaseId::ALL {
            let (before, after) = (original.scenario_count(phase), reloaded.scenario_count(phase));
            if before != after {
                return Err(format!("{phase}: {before} scenarios became {after}"));
            }
        }
        let keys = |catalog: &ScenarioCatalog| -> Vec<String> {
            catalog
                .leverage_models
                .iter()
                .map(|model| model.key.clone())
                .collect()
        };
        if keys(original) != keys(&reloaded) {
            return Err("leverage model keys changed".to_string());
        }
        Ok(())
    }
}

const fn plan_style(plan: &ScenarioPlan) -> Option<PlayStyle> {
    match plan {
        ScenarioPlan::Playthrough { style, .. } | ScenarioPlan::Determinism { style } => {
            Some(*style)
        }
        ScenarioPlan::CatalogRoundTrip => None,
    }
}

fn evaluate_expectations(expectations: &[Expectation], record: &RunRecord) -> Result<(), String> {
    for expectation in expectations {
        expectation(record).map_err(|err| format!("{err} | {}", record.describe()))?;
    }
    Ok(())
}

fn compare_records(first: &RunRecord, second: &RunRecord) -> Result<(), String> {
    if first.transcript != second.transcript {
        let diverged = first
            .transcript
            .iter()
            .zip(&second.transcript)
            .position(|(left, right)| left != right)
            .unwrap_or_else(|| first.transcript.len().min(second.transcript.len()));
        return Err(format!("transcripts diverged at entry {diverged}"));
    }
    if first.final_snapshot != second.final_snapshot {
        return Err("final snapshots differ".to_string());
    }
    Ok(())
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u128::deserialize(deserializer)?;
        Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }
}

mod duration_vec_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis: Vec<u128> = durations.iter().map(Duration::as_millis).collect();
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis_vec = Vec::<u128>::deserialize(deserializer)?;
        Ok(millis_vec
            .into_iter()
            .map(|millis| Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::scenarios::get_scenario;
    use margins_game::{BuiltinCatalog, MemoryPreferences};

    fn tester() -> LogicTester<BuiltinCatalog, MemoryPreferences> {
        LogicTester::new(GameEngine::new(BuiltinCatalog, MemoryPreferences::new()), false)
    }

    #[test]
    fn smoke_passes_for_each_seed() {
        let scenario = get_scenario("smoke").unwrap();
        let results = tester().run_scenario(&scenario, &[1, 2], 2);
        assert_eq!(results.len(), 2);
        for result in results {
            assert!(result.passed, "{:?}", result.failures);
            assert_eq!(result.successful_iterations, 2);
            assert_eq!(result.style, Some(PlayStyle::Perfect));
        }
    }

    #[test]
    fn reckless_and_roundtrip_pass() {
        let tester = tester();
        for name in ["reckless-run", "catalog-roundtrip", "determinism"] {
            let scenario = get_scenario(name).unwrap();
            let result = &tester.run_scenario(&scenario, &[9], 1)[0];
            assert!(result.passed, "{name}: {:?}", result.failures);
        }
    }

    #[test]
    fn failing_expectation_is_reported_with_context() {
        fn never(_: &RunRecord) -> Result<(), String> {
            Err("nope".to_string())
        }
        let scenario = TestScenario {
            name: "never".to_string(),
            plan: ScenarioPlan::Playthrough {
                style: PlayStyle::Reckless,
                expectations: vec![never],
            },
        };
        let result = &tester().run_scenario(&scenario, &[4], 1)[0];
        assert!(!result.passed);
        assert!(result.failures[0].contains("nope"));
        assert!(result.failures[0].contains("seed 4"));
    }

    #[test]
    fn result_serializes_durations_as_millis() {
        let result = ScenarioResult {
            scenario_name: "smoke".to_string(),
            seed: 1,
            style: None,
            passed: true,
            iterations_run: 1,
            successful_iterations: 1,
            failures: Vec::new(),
            average_duration: Duration::from_millis(12),
            performance_data: vec![Duration::from_millis(12)],
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["average_duration"], 12);
        assert_eq!(value["performance_data"][0], 12);
    }
}
