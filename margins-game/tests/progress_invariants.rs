use margins_game::phase::special_order::SpecialOrderRules;
use margins_game::{
    Assignment, BreakEven, ClassificationRules, ClassificationScenario, CostDescriptor, CostItem,
    CostStructure, CostType, PhaseCtx, PhaseEngine, PhaseError, PhaseStatus, ProgressAction,
    ProgressState, ProgressStore, RandomSource, RandomStream, RngBundle, ScenarioCatalog,
    ScriptedRandom, SpecialOrderAction, SpecialOrderScenario, Topic, break_even_units, classify,
    contribution_per_unit, reconcile_profit, simulate_shock,
};

const EPS: f64 = 0.01;

fn close(left: f64, right: f64) -> bool {
    (left - right).abs() < EPS
}

#[test]
fn classify_is_total_over_catalog_and_grid() {
    let catalog = ScenarioCatalog::builtin();
    for item in &catalog.classification[0].items {
        let first = classify(&item.descriptor);
        assert_eq!(first, classify(&item.descriptor.clone()));
        assert!(CostType::ALL.contains(&first));
    }
    for amount in [0.0, 10.0] {
        for rate in [None, Some(0.0), Some(0.5)] {
            for threshold in [None, Some(0), Some(50)] {
                let descriptor = CostDescriptor {
                    amount,
                    per_unit_rate: rate,
                    step_threshold: threshold,
                };
                assert!(CostType::ALL.contains(&classify(&descriptor)));
            }
        }
    }
}

#[test]
fn accepting_profitable_order_adds_full_contribution() {
    for (units, price, variable_cost) in [(100, 0.60, 0.20), (50, 1.10, 0.20), (7, 3.0, 2.5)] {
        assert!(contribution_per_unit(price, variable_cost) > 0.0);
        let scenario = SpecialOrderScenario {
            title: "order".to_string(),
            description: String::new(),
            units,
            offer_price: price,
            normal_price: price * 2.0,
            variable_cost,
            hint: String::new(),
            negotiable: false,
            severity: 10,
        };
        let mut store = ProgressStore::new();
        let mut rng = ScriptedRandom::new();
        let mut engine = PhaseEngine::new(SpecialOrderRules::default(), vec![scenario]).unwrap();
        engine.start().unwrap();
        let before = store.state().cash();
        let mut ctx = PhaseCtx {
            store: &mut store,
            rng: &mut rng,
        };
        engine
            .act(SpecialOrderAction::Decide { accept: true }, &mut ctx)
            .unwrap();
        let expected = f64::from(units) * (price - variable_cost);
        assert!(close(store.state().cash() - before, expected));
    }
}

#[test]
fn equal_production_and_sales_reconcile_exactly() {
    for units in [1_u32, 250, 800, 10_000] {
        let rec = reconcile_profit(units, units, 5_000.0, 50.0, 10.0).unwrap();
        assert!(close(rec.inventory_valuation_gap, 0.0));
        assert!(close(rec.marginal_profit, rec.absorption_profit));
    }
}

#[test]
fn reference_reconciliation_values() {
    let rec = reconcile_profit(1_000, 800, 5_000.0, 50.0, 10.0).unwrap();
    assert!(close(rec.fixed_rate, 5.0));
    assert!(close(rec.marginal_profit, 27_000.0));
    assert!(close(rec.inventory_valuation_gap, 1_000.0));
    assert!(close(rec.absorption_profit, 28_000.0));
}

#[test]
fn reference_break_even() {
    assert_eq!(break_even_units(4_000.0, 30.0), BreakEven::Units(134));
}

#[test]
fn ten_default_mistakes_exhaust_health() {
    let mut store = ProgressStore::new();
    for _ in 0..9 {
        store.record_default_mistake(Topic::General);
        assert!(!store.is_game_over());
    }
    let change = store.record_default_mistake(Topic::General);
    assert!(change.became_game_over);
    assert_eq!(store.state().health, 0);
    store.record_default_mistake(Topic::General);
    assert_eq!(store.state().health, 0);
    assert!(store.is_game_over());
    assert_eq!(store.state().mistakes, 11);
}

#[test]
fn overdraft_is_game_over() {
    let mut store = ProgressStore::new();
    let change = store.add_cash(-1_500.0);
    assert!(close(store.state().cash(), -500.0));
    assert!(change.became_game_over);
    assert!(store.is_game_over());
}

#[test]
fn reset_restores_initial_state_after_random_sequences() {
    for seed in 0..20_u64 {
        let mut rng = RngBundle::from_user_seed(seed);
        let mut store = ProgressStore::new();
        for _ in 0..40 {
            let action = match rng.next_below(RandomStream::SalesTick, 6) {
                0 => ProgressAction::AdvancePhase,
                1 => ProgressAction::SetPhase {
                    phase: u8::try_from(rng.next_below(RandomStream::SalesTick, 7)).unwrap(),
                },
                2 => ProgressAction::AddCash {
                    dollars: f64::from(rng.next_below(RandomStream::SalesTick, 900)) - 600.0,
                },
                3 => ProgressAction::AddScore {
                    points: rng.next_below(RandomStream::SalesTick, 2_000),
                },
                4 => ProgressAction::RecordMistake {
                    topic: Topic::ALL[rng.next_below(RandomStream::SalesTick, 7) as usize],
                    severity: rng.next_below(RandomStream::SalesTick, 40),
                },
                _ => ProgressAction::SuggestTopic {
                    topic: Topic::Leverage,
                },
            };
            store.dispatch(action);
            assert!(store.state().health <= 100);
            assert!(store.state().phase <= 6);
        }
        store.reset_game();
        let state = store.state();
        assert_eq!(state, &ProgressState::default());
        assert!(close(state.cash(), 1_000.0));
        assert_eq!((state.score, state.mistakes, state.health, state.phase), (0, 0, 100, 0));
        assert!(!state.is_game_over());
    }
}

#[test]
fn score_and_mistakes_never_decrease() {
    let mut rng = RngBundle::from_user_seed(99);
    let mut store = ProgressStore::new();
    let (mut score, mut mistakes) = (0, 0);
    for _ in 0..200 {
        if rng.next_unit(RandomStream::MarketEvent) < 0.5 {
            store.add_score(rng.next_below(RandomStream::MarketEvent, 500));
        } else {
            store.record_mistake(Topic::Marginal, 1);
        }
        assert!(store.state().score >= score);
        assert!(store.state().mistakes >= mistakes);
        score = store.state().score;
        mistakes = store.state().mistakes;
    }
}

fn two_item_scenario() -> ClassificationScenario {
    let item = |id: &str, descriptor: CostDescriptor| CostItem {
        id: id.to_string(),
        name: format!("item {id}"),
        amount_label: String::new(),
        description: String::new(),
        label: classify(&descriptor),
        descriptor,
    };
    ClassificationScenario {
        title: "Two items".to_string(),
        items: vec![
            item("rent", CostDescriptor::fixed(100.0)),
            item("cups", CostDescriptor::variable(0.05)),
        ],
    }
}

#[test]
fn classification_completes_and_awards_bonus_once() {
    let mut store = ProgressStore::new();
    store.set_phase(1);
    let mut rng = ScriptedRandom::new();
    let mut engine = PhaseEngine::new(ClassificationRules, vec![two_item_scenario()]).unwrap();
    engine.start().unwrap();
    let mut ctx = PhaseCtx {
        store: &mut store,
        rng: &mut rng,
    };
    let first = engine
        .act(
            Assignment {
                item_id: "rent".to_string(),
                bucket: CostType::Fixed,
            },
            &mut ctx,
        )
        .unwrap();
    assert!(!first.completed);
    let second = engine
        .act(
            Assignment {
                item_id: "cups".to_string(),
                bucket: CostType::Variable,
            },
            &mut ctx,
        )
        .unwrap();
    assert!(second.completed);
    assert_eq!(engine.status(), PhaseStatus::Completed);
    assert_eq!(ctx.store.state().score, 1_000);

    let again = engine.act(
        Assignment {
            item_id: "cups".to_string(),
            bucket: CostType::Variable,
        },
        &mut ctx,
    );
    assert!(matches!(again, Err(PhaseError::AlreadyCompleted(_))));
    assert_eq!(store.state().score, 1_000);
    assert_eq!(store.state().stats_for(1).score, 1_000);
}

#[test]
fn reference_market_shock() {
    let outcome = simulate_shock(
        &CostStructure {
            fixed_cost: 2_000.0,
            variable_cost: 25.0,
        },
        0.5,
        50.0,
        400.0,
    );
    assert!(close(outcome.resulting_units, 200.0));
    assert!(close(outcome.profit, 3_000.0));
    assert!(outcome.survived);
}
