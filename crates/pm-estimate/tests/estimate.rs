//! Integration tests: parameter estimation and YAML fit configuration.

mod common;

use common::{Decay, init_tracing, thrown_run, thrown_with_speed};
use pm_estimate::{
    ErrorKind, EstimateError, EstimateOptions, EstimateWarning, FitConfig, OptimizerMethod,
    estimate_params,
};
use pm_models::ThrownObject;
use pm_sim::PrognosticsModel;
use std::collections::BTreeMap;

fn speed(m: &ThrownObject) -> f64 {
    m.parameters().scalar("throwing_speed").unwrap()
}

#[test]
fn recovers_throwing_speed_with_every_optimizer() {
    init_tracing();
    let runs = vec![thrown_run(&ThrownObject::new())];
    for method in [
        OptimizerMethod::NelderMead,
        OptimizerMethod::Powell,
        OptimizerMethod::ConjugateGradient,
    ] {
        let mut m = thrown_with_speed(35.0);
        let opts = EstimateOptions {
            method: method.to_string(),
            ..EstimateOptions::default()
        };
        let report = estimate_params(&mut m, &runs, &["throwing_speed"], &opts).unwrap();

        assert_eq!(report.initial, vec![35.0]);
        assert!((speed(&m) - 40.0).abs() < 1e-3, "{method}: {}", speed(&m));
        assert_eq!(report.value("throwing_speed"), Some(speed(&m)));
        assert!(report.final_error < report.initial_error);
        assert!(report.final_error < 1e-6);
        assert_eq!(report.method, method);
        assert!(report.evaluations > 0);
    }
}

#[test]
fn fits_two_keys_over_several_runs() {
    let truth = ThrownObject::new();
    let mut high = ThrownObject::new();
    high.parameters_mut().set_scalar("thrower_height", 3.0).unwrap();
    let runs = vec![thrown_run(&truth), thrown_run(&truth)];

    let report = estimate_params(
        &mut high,
        &runs,
        &["thrower_height", "throwing_speed"],
        &EstimateOptions::default(),
    )
    .unwrap();
    assert!((report.values[0] - 1.83).abs() < 1e-2);
    assert!((report.values[1] - 40.0).abs() < 1e-2);
}

#[test]
fn bounds_limit_the_search() {
    let runs = vec![thrown_run(&ThrownObject::new())];
    let mut m = thrown_with_speed(30.0);
    let mut bounds = BTreeMap::new();
    bounds.insert("throwing_speed".to_string(), (20.0, 38.0));
    let opts = EstimateOptions {
        method: "Powell".into(),
        bounds,
        ..EstimateOptions::default()
    };
    estimate_params(&mut m, &runs, &["throwing_speed"], &opts).unwrap();
    assert!(speed(&m) <= 38.0);
    assert!(speed(&m) > 37.9);
}

#[test]
fn report_starts_from_the_clamped_point() {
    let runs = vec![thrown_run(&ThrownObject::new())];
    let mut m = thrown_with_speed(45.0);
    let mut bounds = BTreeMap::new();
    bounds.insert("throwing_speed".to_string(), (20.0, 38.0));
    let opts = EstimateOptions {
        method: "Powell".into(),
        bounds,
        ..EstimateOptions::default()
    };
    let report = estimate_params(&mut m, &runs, &["throwing_speed"], &opts).unwrap();
    assert_eq!(report.initial, vec![38.0]);
    assert!(report.final_error <= report.initial_error);

    let mut at_bound = thrown_with_speed(38.0);
    let from_bound = estimate_params(&mut at_bound, &runs, &["throwing_speed"], &opts).unwrap();
    assert_eq!(report.initial_error, from_bound.initial_error);
}

#[test]
fn invalid_inputs_leave_parameters_untouched() {
    let runs = vec![thrown_run(&ThrownObject::new())];
    let cases: Vec<(Vec<&str>, EstimateOptions, ErrorKind)> = vec![
        (vec!["nope"], EstimateOptions::default(), ErrorKind::Input),
        (vec![], EstimateOptions::default(), ErrorKind::Input),
        (
            vec!["throwing_speed"],
            EstimateOptions {
                method: "BFGS".into(),
                ..EstimateOptions::default()
            },
            ErrorKind::Input,
        ),
        (
            vec!["throwing_speed"],
            EstimateOptions {
                error_method: "Test".into(),
                ..EstimateOptions::default()
            },
            ErrorKind::Input,
        ),
        (
            vec!["throwing_speed"],
            EstimateOptions {
                dt: Some(0.0),
                ..EstimateOptions::default()
            },
            ErrorKind::Value,
        ),
        (
            vec!["throwing_speed"],
            EstimateOptions {
                bounds: BTreeMap::from([("throwing_speed".to_string(), (50.0, 10.0))]),
                ..EstimateOptions::default()
            },
            ErrorKind::Value,
        ),
        (
            vec!["throwing_speed"],
            EstimateOptions {
                bounds: BTreeMap::from([("g".to_string(), (-10.0, -9.0))]),
                ..EstimateOptions::default()
            },
            ErrorKind::Input,
        ),
    ];

    for (keys, opts, kind) in cases {
        let mut m = thrown_with_speed(35.0);
        let before = m.parameters().clone();
        let err = estimate_params(&mut m, &runs, &keys, &opts).unwrap_err();
        assert_eq!(err.kind(), kind, "{err}");
        assert_eq!(m.parameters(), &before);
    }

    let mut m = thrown_with_speed(35.0);
    let err = estimate_params(&mut m, &[], &["throwing_speed"], &EstimateOptions::default())
        .unwrap_err();
    assert_eq!(err, EstimateError::NoRuns);
}

#[test]
fn no_finite_candidate_restores_parameters() {
    init_tracing();
    let runs = vec![Decay::observed(0.1, 10)];
    let mut m = Decay::new(0.3, 1.0);
    let before = m.parameters().clone();
    let opts = EstimateOptions {
        optimizer: pm_estimate::OptimizerConfig {
            max_evaluations: 40,
            ..Default::default()
        },
        ..EstimateOptions::default()
    };

    let report = estimate_params(&mut m, &runs, &["k"], &opts).unwrap();
    assert_eq!(m.parameters(), &before);
    assert!(report.initial_error.is_infinite());
    assert_eq!(report.values, vec![0.3]);
    assert!(!report.converged);
    assert!(report.warnings.contains(&EstimateWarning::NoFiniteError));
    assert!(
        report
            .warnings
            .iter()
            .any(|w| matches!(w, EstimateWarning::NotConverged { .. }))
    );
}

#[test]
fn stability_tol_reset_is_reported_once() {
    let runs = vec![Decay::observed(0.1, 10)];
    let mut m = Decay::new(0.2, f64::INFINITY);
    let opts = EstimateOptions {
        stability_tol: 70.0,
        ..EstimateOptions::default()
    };
    let report = estimate_params(&mut m, &runs, &["k"], &opts).unwrap();
    let resets = report
        .warnings
        .iter()
        .filter(|w| matches!(w, EstimateWarning::Calc(_)))
        .count();
    assert_eq!(resets, 1);
    assert!((report.values[0] - 0.1).abs() < 1e-4);
}

#[test]
fn yaml_config_overrides_then_fits() {
    let runs = vec![thrown_run(&ThrownObject::new())];
    let cfg = FitConfig::from_yaml_str(
        "keys: [throwing_speed]\n\
         parameters:\n  throwing_speed: 33.0\n\
         method: CG\n\
         bounds:\n  throwing_speed: [20, 60]\n",
    )
    .unwrap();

    let mut m = ThrownObject::new();
    let report = cfg.apply(&mut m, &runs).unwrap();
    assert_eq!(report.initial, vec![33.0]);
    assert_eq!(report.method, OptimizerMethod::ConjugateGradient);
    assert!((speed(&m) - 40.0).abs() < 1e-3);

    let unknown = FitConfig::from_yaml_str("keys: [g]\nparameters:\n  drag: 0.1\n").unwrap();
    let mut m = ThrownObject::new();
    let before = m.parameters().clone();
    let err = unknown.apply(&mut m, &runs).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);
    assert_eq!(m.parameters(), &before);
}

#[test]
fn failed_config_fit_rolls_back_overrides() {
    let runs = vec![thrown_run(&ThrownObject::new())];
    let cfg = FitConfig::from_yaml_str(
        "keys: [nope]\n\
         parameters:\n  throwing_speed: 33.0\n",
    )
    .unwrap();

    let mut m = ThrownObject::new();
    let before = m.parameters().clone();
    let err = cfg.apply(&mut m, &runs).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);
    assert_eq!(m.parameters(), &before);
    assert_eq!(speed(&m), 40.0);
}

#[test]
fn config_loads_from_file() {
    let path = std::env::temp_dir().join(format!("pm-estimate-fit-{}.yaml", std::process::id()));
    std::fs::write(&path, "keys: [g]\nerror_method: rmse\n").unwrap();
    let cfg = FitConfig::load_yaml(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(cfg.keys, vec!["g".to_string()]);
    assert_eq!(cfg.options.error_method, "rmse");

    let missing = FitConfig::load_yaml(&path).unwrap_err();
    assert!(matches!(missing, EstimateError::Config { .. }));
}
