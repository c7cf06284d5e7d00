use std::process::Command;

#[derive(Debug)]
struct Kpis {
    import_kwh: f64,
    export_kwh: f64,
    self_sufficiency_pct: f64,
}

#[test]
fn scenario_files_run_via_cli_and_produce_distinct_dynamics() {
    let baseline = run_and_parse_kpis("scenarios/baseline.toml");
    let high_pv = run_and_parse_kpis("scenarios/high_pv.toml");
    let buffer_grid = run_and_parse_kpis("scenarios/buffer_grid.toml");
    let rc_battery = run_and_parse_kpis("scenarios/rc_battery.toml");

    assert!(
        high_pv.export_kwh > baseline.export_kwh + 1.0,
        "expected high_pv to export more: baseline={:.3}, high_pv={:.3}",
        baseline.export_kwh,
        high_pv.export_kwh
    );

    assert!(
        (baseline.import_kwh - buffer_grid.import_kwh).abs() > 1e-3,
        "expected baseline and buffer_grid import to differ: baseline={:.3}, buffer_grid={:.3}",
        baseline.import_kwh,
        buffer_grid.import_kwh
    );

    for (name, k) in [
        ("baseline", &baseline),
        ("high_pv", &high_pv),
        ("buffer_grid", &buffer_grid),
        ("rc_battery", &rc_battery),
    ] {
        assert!(
            (0.0..=100.0).contains(&k.self_sufficiency_pct),
            "{name}: self-sufficiency out of range: {:.3}",
            k.self_sufficiency_pct
        );
    }
}

#[test]
fn unknown_preset_fails_with_nonzero_exit() {
    let output = Command::new(env!("CARGO_BIN_EXE_prosumer-sim"))
        .args(["--preset", "nonexistent"])
        .output()
        .expect("prosumer-sim process should run");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown preset"), "stderr={stderr}");
}

fn run_and_parse_kpis(path: &str) -> Kpis {
    let output = Command::new(env!("CARGO_BIN_EXE_prosumer-sim"))
        .args(["--scenario", path, "--quiet"])
        .output()
        .expect("prosumer-sim process should run");

    assert!(
        output.status.success(),
        "scenario run failed for {path}: stderr={} ",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout).expect("stdout should be valid UTF-8");
    assert!(stdout.contains("--- KPI Report ---"));
    parse_kpis(&stdout)
}

fn parse_kpis(stdout: &str) -> Kpis {
    Kpis {
        import_kwh: parse_value(stdout, "Grid import:"),
        export_kwh: parse_value(stdout, "Grid export:"),
        self_sufficiency_pct: parse_value(stdout, "Self-sufficiency:"),
    }
}

fn parse_value(stdout: &str, label: &str) -> f64 {
    let line = stdout
        .lines()
        .find(|l| l.starts_with(label))
        .unwrap_or_else(|| panic!("missing KPI line {label:?} in output:\n{stdout}"));
    line[label.len()..]
        .trim()
        .trim_end_matches("kWh")
        .trim_end_matches('%')
        .trim()
        .parse()
        .unwrap_or_else(|e| panic!("cannot parse {label:?} from {line:?}: {e}"))
}
