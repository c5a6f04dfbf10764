//! Integration tests: error calculation against simulated and hand-built runs.

mod common;

use common::{Decay, init_tracing, thrown_run, thrown_with_speed};
use pm_core::{FieldSet, Tolerances, VectorContainer, nearly_equal};
use pm_estimate::{
    CalcErrorOptions, CalcWarning, Data, ErrorKind, EstimateError, RunData, calc_error,
    calc_error_report, calc_error_run,
};
use pm_models::ThrownObject;
use pm_sim::PrognosticsModel;

fn opts() -> CalcErrorOptions {
    CalcErrorOptions::default()
}

#[test]
fn error_is_zero_at_truth_and_grows_with_mismatch() {
    init_tracing();
    let truth = ThrownObject::new();
    let run = thrown_run(&truth);

    let at_truth = calc_error_run(&truth, &run, &opts()).unwrap();
    assert!(at_truth.abs() < 1e-12, "error at truth = {at_truth}");

    let slow = calc_error_run(&thrown_with_speed(35.0), &run, &opts()).unwrap();
    let slower = calc_error_run(&thrown_with_speed(30.0), &run, &opts()).unwrap();
    assert!(slow > 1.0);
    assert!(slower > slow);
}

#[test]
fn error_is_deterministic_across_calls_and_instances() {
    let run = thrown_run(&ThrownObject::new());
    let a = thrown_with_speed(37.0);
    let b = thrown_with_speed(37.0);
    let first = calc_error_run(&a, &run, &opts()).unwrap();
    assert_eq!(first, calc_error_run(&a, &run, &opts()).unwrap());
    assert_eq!(first, calc_error_run(&b, &run, &opts()).unwrap());
}

#[test]
fn every_metric_is_available() {
    let run = thrown_run(&ThrownObject::new());
    let m = thrown_with_speed(38.0);
    let score = |method: &str| {
        calc_error_run(
            &m,
            &run,
            &CalcErrorOptions {
                method: method.to_string(),
                ..opts()
            },
        )
        .unwrap()
    };
    let mse = score("mse");
    let rmse = score("RMSE");
    assert!(nearly_equal(rmse, mse.sqrt(), Tolerances::default()));
    assert!(score("mae") <= rmse);
    assert!(rmse <= score("max_e"));
    assert!(score("mape") > 0.0);
}

#[test]
fn dt_must_be_positive() {
    let m = ThrownObject::new();
    let run = thrown_run(&m);
    for dt in [0.0, -1.0] {
        let err = calc_error_run(
            &m,
            &run,
            &CalcErrorOptions {
                dt: Some(dt),
                ..opts()
            },
        )
        .unwrap_err();
        assert!(err.is_value_error());
        assert!(err.to_string().starts_with("Keyword argument 'dt' must be initialized"));
    }

    let coarse = calc_error_run(
        &m,
        &run,
        &CalcErrorOptions {
            dt: Some(1.5),
            ..opts()
        },
    )
    .unwrap();
    assert!(coarse.abs() < 1e-12);

    let fine = calc_error_run(
        &m,
        &run,
        &CalcErrorOptions {
            dt: Some(0.1),
            ..opts()
        },
    )
    .unwrap();
    assert!(fine.is_finite());
    assert!(fine > 0.0);
}

#[test]
fn out_of_range_stability_tol_warns_once() {
    let m = ThrownObject::new();
    let run = thrown_run(&m);
    let report = calc_error_report(
        &m,
        &run.times,
        &run.inputs,
        &run.outputs,
        &CalcErrorOptions {
            stability_tol: 70.0,
            ..opts()
        },
    )
    .unwrap();
    assert_eq!(report.warnings, vec![CalcWarning::StabilityTolReset { received: 70.0 }]);
    assert_eq!(report.stability_tol, 0.95);
    assert_eq!(report.runs, 1);
    assert_eq!(report.samples, 17);
}

#[test]
fn unknown_method_is_input_error() {
    let m = ThrownObject::new();
    let err = calc_error_run(
        &m,
        &thrown_run(&m),
        &CalcErrorOptions {
            method: "Test".into(),
            ..opts()
        },
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);
    assert_eq!(
        err.to_string(),
        "Error method 'Test' not supported. Supported methods: mse, rmse, mae, mape, max_e"
    );
}

#[test]
fn divergence_before_cutoff_fails() {
    let run = Decay::observed(0.1, 10);
    let err = calc_error_run(&Decay::new(0.1, 5.0), &run, &opts()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Instability);
    assert!(err.is_value_error());
    assert_eq!(
        err.to_string(),
        "Model unstable- NaN reached in simulation (t=5) before cutoff threshold. Cutoff threshold is 9.5, or roughly 95.0% of the data"
    );
}

#[test]
fn divergence_after_cutoff_warns_and_scores_prefix() {
    let run = Decay::observed(0.1, 10);
    let report = calc_error_report(
        &Decay::new(0.1, 10.0),
        &run.times,
        &run.inputs,
        &run.outputs,
        &opts(),
    )
    .unwrap();
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(
        report.warnings[0].to_string(),
        "Model unstable- NaN reached in simulation (t=10)"
    );
    assert_eq!(report.samples, 10);
    assert!(report.value.abs() < 1e-12);

    // A lower tolerance moves the cutoff before t=5.
    let lenient = calc_error_report(
        &Decay::new(0.1, 5.0),
        &run.times,
        &run.inputs,
        &run.outputs,
        &CalcErrorOptions {
            stability_tol: 0.4,
            ..opts()
        },
    )
    .unwrap();
    assert!(matches!(
        lenient.warnings.as_slice(),
        [CalcWarning::UnstableAfterCutoff { time, .. }] if *time == 5.0
    ));
}

#[test]
fn missing_observations_are_skipped() {
    let model = Decay::new(0.2, f64::INFINITY);
    let short = Decay::observed(0.1, 9);
    let mut full = Decay::observed(0.1, 10);
    if let Data::Seq(outputs) = &mut full.outputs {
        let fields = FieldSet::fixed(&["x"]);
        outputs[10] = Data::Sample(VectorContainer::from_column(&fields, &[f64::NAN]).unwrap());
    }
    let a = calc_error_run(&model, &short, &opts()).unwrap();
    let b = calc_error_run(&model, &full, &opts()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn nested_runs_pool_every_sample() {
    let model = Decay::new(0.1, f64::INFINITY);
    let exact = Decay::observed(0.1, 10);
    let off = Decay::observed(0.15, 10);
    let nested = RunData::new(
        Data::Seq(vec![exact.times.clone(), off.times.clone()]),
        Data::Seq(vec![exact.inputs.clone(), off.inputs.clone()]),
        Data::Seq(vec![exact.outputs.clone(), off.outputs.clone()]),
    );

    let off_alone = calc_error_run(&model, &off, &opts()).unwrap();
    let report =
        calc_error_report(&model, &nested.times, &nested.inputs, &nested.outputs, &opts()).unwrap();
    assert_eq!(report.runs, 2);
    assert_eq!(report.samples, 22);
    assert!(nearly_equal(report.value, off_alone / 2.0, Tolerances::default()));
}

#[test]
fn nested_run_with_one_point_names_its_location() {
    let u = VectorContainer::zeros(&FieldSet::empty(), 1);
    let fields = FieldSet::fixed(&["x"]);
    let z = |v: f64| VectorContainer::from_column(&fields, &[v]).unwrap();
    let err = calc_error(
        &Decay::new(0.1, f64::INFINITY),
        &Data::from(vec![vec![0.0, 1.0], vec![2.0]]),
        &Data::from(vec![vec![u.clone(), u.clone()], vec![u.clone()]]),
        &Data::from(vec![vec![z(10.0), z(9.0)], vec![z(8.0)]]),
        &opts(),
    )
    .unwrap_err();
    assert!(err.is_value_error());
    assert_eq!(
        err.to_string(),
        "Must provide at least 2 data points for times, inputs, and outputs at data location (1)"
    );
}

#[test]
fn explicit_x0_must_match_state_fields() {
    let m = ThrownObject::new();
    let run = thrown_run(&m);

    let wrong = VectorContainer::from_column(&FieldSet::fixed(&["x"]), &[1.83]).unwrap();
    let err = calc_error_run(
        &m,
        &run,
        &CalcErrorOptions {
            x0: Some(wrong),
            ..opts()
        },
    )
    .unwrap_err();
    assert!(err.is_type_error());
    assert!(matches!(err, EstimateError::X0Fields { .. }));

    let slow_start = m.state_container([("x", 1.83), ("v", 35.0)]);
    let err_slow = calc_error_run(
        &m,
        &run,
        &CalcErrorOptions {
            x0: Some(slow_start),
            ..opts()
        },
    )
    .unwrap();
    assert!(err_slow > 1.0);
}
