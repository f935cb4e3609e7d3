use std::process::Command;

fn temp_path(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "margins-cli-{label}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ))
}

#[test]
fn cli_list_scenarios_writes_output() {
    let exe = env!("CARGO_BIN_EXE_margins-tester");
    let output_path = temp_path("list");
    let status = Command::new(exe)
        .args(["--list-scenarios", "--output"])
        .arg(&output_path)
        .status()
        .expect("run cli");
    assert!(status.success());
    let content = std::fs::read_to_string(output_path).expect("read output");
    assert!(content.contains("Available scenarios"));
    assert!(content.contains("reckless-run"));
}

#[test]
fn cli_smoke_run_writes_json_report() {
    let exe = env!("CARGO_BIN_EXE_margins-tester");
    let output_path = temp_path("run");
    let output = Command::new(exe)
        .args([
            "--report",
            "json",
            "--scenarios",
            "smoke,catalog-roundtrip",
            "--iterations",
            "1",
            "--seeds",
            "1,0x2",
            "--output",
        ])
        .arg(&output_path)
        .output()
        .expect("run cli");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Mastery of Margins Automated Tester"));
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(output_path).expect("read report"))
            .expect("json report");
    assert_eq!(report["total"], 4);
    assert_eq!(report["passed"], 4);
}

#[test]
fn cli_rejects_broken_catalog() {
    let exe = env!("CARGO_BIN_EXE_margins-tester");
    let catalog_path = temp_path("catalog");
    std::fs::write(&catalog_path, "not json").expect("write catalog");
    let output = Command::new(exe)
        .args(["--scenarios", "smoke", "--iterations", "1", "--catalog"])
        .arg(&catalog_path)
        .output()
        .expect("run cli");
    assert!(!output.status.success());
}

#[test]
fn cli_toggle_mute_persists() {
    let exe = env!("CARGO_BIN_EXE_margins-tester");
    let prefs_path = temp_path("prefs");
    let toggle = |expected: &str| {
        let output = Command::new(exe)
            .args(["--toggle-mute", "--preferences"])
            .arg(&prefs_path)
            .output()
            .expect("run cli");
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains(expected), "{stdout}");
    };
    toggle("muted: true");
    toggle("muted: false");
}
