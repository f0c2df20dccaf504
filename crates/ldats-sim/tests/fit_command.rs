use std::fs;
use std::path::Path;

use ldats_mcmc::FittedModel;
use ldats_sim::commands::check_config::{self, CheckConfigArgs};
use ldats_sim::commands::fit::{self, FitArgs, SelectionReport};
use ldats_sim::load_table;

fn write_dataset(dir: &Path) -> std::path::PathBuf {
    let mut body = String::from("time,x,low,high,w\n");
    for time in 1..=30 {
        let share = if time <= 15 { 0.15 } else { 0.85 };
        let x = time as f64 / 30.0;
        let weight = 1.0 + 0.1 * (time % 3) as f64;
        body.push_str(&format!("{time},{x},{},{share},{weight}\n", 1.0 - share));
    }
    let path = dir.join("series.csv");
    fs::write(&path, body).unwrap();
    path
}

fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("control.yaml");
    fs::write(
        &path,
        "iterations: 150\nburnin: 30\nthin: 3\nladder:\n  chains: 3\n  policy:\n    type: geometric\n    ratio: 2.0\nmeasurer: bic\n",
    )
    .unwrap();
    path
}

fn fit_args(dir: &Path) -> FitArgs {
    FitArgs {
        data: write_dataset(dir),
        config: Some(write_config(dir)),
        time: "time".into(),
        responses: vec!["low".into(), "high".into()],
        formula: "~ 1".into(),
        changepoints: vec![0, 1, 2],
        weights_column: Some("w".into()),
        seed: Some(11),
        out: dir.join("out"),
    }
}

#[test]
fn csv_columns_load_by_header() {
    let dir = tempfile::tempdir().unwrap();
    let table = load_table(&write_dataset(dir.path())).unwrap();
    assert_eq!(table.rows(), 30);
    assert_eq!(table.names(), &["time", "x", "low", "high", "w"]);
    assert_eq!(table.column("time").unwrap()[29], 30.0);
}

#[test]
fn non_numeric_cells_are_data_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.csv");
    fs::write(&path, "time,a,b\n1,0.5,0.5\n2,oops,0.5\n").unwrap();
    let err = load_table(&path).unwrap_err();
    assert_eq!(err.info().code, "non-numeric-cell");
}

#[test]
fn fit_writes_models_draws_and_selection() {
    let dir = tempfile::tempdir().unwrap();
    let args = fit_args(dir.path());
    let report = fit::run(&args).unwrap();
    assert_eq!(report.candidates.len(), 3);
    assert_ne!(report.best_k, 0);

    for k in 0..=2 {
        let json = fs::read_to_string(args.out.join(format!("model_k{k}.json"))).unwrap();
        let model: FittedModel = serde_json::from_str(&json).unwrap();
        assert_eq!(model.k, k);
        assert_eq!(model.draws.len(), 40);
        assert_eq!(model.config.seed_policy.master_seed, 11);
        let draws = fs::read_to_string(args.out.join(format!("draws_k{k}.csv"))).unwrap();
        assert_eq!(draws.lines().count(), 41);
    }
    let selection: SelectionReport =
        serde_json::from_str(&fs::read_to_string(args.out.join("selection.json")).unwrap())
            .unwrap();
    assert_eq!(selection.best_k, report.best_k);
    let ks: Vec<usize> = selection.candidates.iter().map(|c| c.k).collect();
    assert_eq!(ks, vec![0, 1, 2]);
    assert!(args.out.join("config.yaml").exists());
}

#[test]
fn fit_is_reproducible_from_the_command_line_inputs() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let a = fit::run(&fit_args(first.path())).unwrap();
    let b = fit::run(&fit_args(second.path())).unwrap();
    assert_eq!(a, b);
}

#[test]
fn unknown_formula_terms_fail_before_sampling() {
    let dir = tempfile::tempdir().unwrap();
    let mut args = fit_args(dir.path());
    args.formula = "~ missing".into();
    let err = fit::run(&args).unwrap_err();
    assert!(err.to_string().contains("config error"), "{err}");
    assert!(!args.out.join("model_k0.json").exists());
}

#[test]
fn check_config_reports_ladder_and_draws() {
    let dir = tempfile::tempdir().unwrap();
    let args = CheckConfigArgs {
        config: write_config(dir.path()),
    };
    let resolved = check_config::run(&args).unwrap();
    assert_eq!(resolved["retained_draws"], 40);
    assert_eq!(resolved["temperatures"], serde_json::json!([1.0, 2.0, 4.0]));
    assert_eq!(resolved["config"]["measurer"], "bic");
}

#[test]
fn malformed_ladders_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.yaml");
    fs::write(
        &path,
        "iterations: 10\nladder:\n  chains: 2\n  policy:\n    type: manual\n    temperatures: [2.0, 4.0]\n",
    )
    .unwrap();
    assert!(check_config::run(&CheckConfigArgs { config: path }).is_err());
}
