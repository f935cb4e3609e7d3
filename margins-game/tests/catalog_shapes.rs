use margins_game::{
    CatalogError, CostType, NegotiationTuning, PhaseId, ScenarioCatalog, ShockSettings,
    StabilityTuning, classify,
};
use serde_json::Value;

fn builtin_value() -> Value {
    serde_json::to_value(ScenarioCatalog::builtin()).unwrap()
}

fn parse(value: &Value) -> Result<ScenarioCatalog, CatalogError> {
    ScenarioCatalog::from_json(&value.to_string())
}

#[test]
fn builtin_catalog_survives_json() {
    let json = ScenarioCatalog::builtin().to_json_pretty().unwrap();
    let catalog = ScenarioCatalog::from_json(&json).unwrap();
    assert_eq!(catalog.scenario_count(PhaseId::Classification), 1);
    assert_eq!(catalog.scenario_count(PhaseId::SpecialOrder), 4);
    assert_eq!(catalog.scenario_count(PhaseId::CostingDuel), 2);
    assert_eq!(catalog.scenario_count(PhaseId::BreakEven), 1);
    assert_eq!(catalog.scenario_count(PhaseId::MarketShock), 2);
    assert_eq!(catalog.break_even[0].events.len(), 5);
}

#[test]
fn wire_ids_are_stable() {
    let value = builtin_value();
    let labels: Vec<&str> = value["classification"][0]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["label"].as_str().unwrap())
        .collect();
    assert_eq!(
        labels,
        ["fixed", "variable", "variable", "step-fixed", "semi-variable", "variable"]
    );
    assert_eq!(value["leverage_models"][0]["key"], "manual");
    assert_eq!(value["leverage_models"][1]["key"], "automated");
}

#[test]
fn omitted_tunables_take_defaults() {
    let mut value = builtin_value();
    let object = value.as_object_mut().unwrap();
    for key in ["negotiation", "stability", "shock_settings", "cost_tolerance"] {
        object.remove(key);
    }
    let catalog = parse(&value).unwrap();
    assert_eq!(catalog.negotiation, NegotiationTuning::default());
    assert_eq!(catalog.stability, StabilityTuning::default());
    assert_eq!(catalog.shock_settings, ShockSettings::default());
    assert!((catalog.cost_tolerance - 0.01).abs() < f64::EPSILON);
}

#[test]
fn zero_production_never_loads() {
    let mut value = builtin_value();
    value["costing_duels"][1]["units_produced"] = Value::from(0);
    assert!(matches!(
        parse(&value),
        Err(CatalogError::ZeroProduction { .. })
    ));
}

#[test]
fn mislabelled_json_item_is_rejected() {
    let mut value = builtin_value();
    value["classification"][0]["items"][3]["label"] = Value::from("fixed");
    let err = parse(&value).unwrap_err();
    assert!(matches!(
        err,
        CatalogError::LabelMismatch {
            label: CostType::Fixed,
            derived: CostType::StepFixed,
            ..
        }
    ));
}

#[test]
fn out_of_range_tunables_are_rejected() {
    let mut value = builtin_value();
    value["stability"]["event_chance"] = Value::from(1.5);
    assert!(matches!(
        parse(&value),
        Err(CatalogError::RangeViolation {
            field: "stability.event_chance",
            ..
        })
    ));
}

#[test]
fn lessons_must_name_known_models() {
    let mut value = builtin_value();
    value["market_shocks"][0]["lessons"]["robots"] = Value::from("Beep.");
    assert!(matches!(
        parse(&value),
        Err(CatalogError::UnknownLessonModel { .. })
    ));
}

#[test]
fn builtin_labels_match_classifier() {
    let catalog = ScenarioCatalog::builtin();
    for item in &catalog.classification[0].items {
        assert_eq!(item.label, classify(&item.descriptor), "{}", item.id);
    }
}
