use aligner::{AlignedFrame, Aligner};
use analytics::{AnalyticsError, DriftEngine};
use approx::assert_abs_diff_eq;
use chrono::{Duration, TimeZone, Utc};
use configuration::{EngineConfig, OptimizerConfig};
use core_types::{ObjectiveKind, PriceSeries, SolverKind};
use nalgebra::{DMatrix, DVector};
use optimizer::{
    OptimizationResult, OptimizerError, SolveBudget, SolveMethod, SolveStatus, StopReason,
    WeightOptimizer,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

// --- Helpers ---

fn frame(columns: &[(&str, Vec<f64>)]) -> AlignedFrame {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let series: Vec<PriceSeries> = columns
        .iter()
        .map(|(symbol, prices)| {
            PriceSeries::from_pairs(
                *symbol,
                prices
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (start + Duration::days(i as i64), *p)),
            )
        })
        .collect();
    Aligner::default().align(&series, None).unwrap()
}

/// A multiplicative random walk starting at 100.
fn walk(rng: &mut StdRng, len: usize) -> Vec<f64> {
    let mut price = 100.0;
    (0..len)
        .map(|i| {
            if i > 0 {
                price *= 1.0 + rng.gen_range(-0.02..0.02);
            }
            price
        })
        .collect()
}

fn mix(columns: &[&Vec<f64>], weights: &[f64]) -> Vec<f64> {
    (0..columns[0].len())
        .map(|i| columns.iter().zip(weights).map(|(c, w)| c[i] * w).sum())
        .collect()
}

fn optimizer(config: OptimizerConfig) -> WeightOptimizer {
    WeightOptimizer::new(config, EngineConfig::default()).unwrap()
}

fn weight(result: &OptimizationResult, symbol: &str) -> f64 {
    result.weights.get(symbol).unwrap()
}

// --- Exact recovery ---

#[test]
fn recovers_even_split_with_zero_drift() {
    let f = frame(&[
        ("T", vec![100.0, 101.0, 102.0, 103.0]),
        ("A", vec![100.0, 100.0, 100.0, 100.0]),
        ("B", vec![100.0, 102.0, 104.0, 106.0]),
    ]);

    for config in [OptimizerConfig::unconstrained(), OptimizerConfig::default()] {
        let result = optimizer(config).optimize(&f, "T", &["A", "B"]).unwrap();
        assert!(result.is_converged());
        assert_abs_diff_eq!(weight(&result, "A"), 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(weight(&result, "B"), 0.5, epsilon = 1e-9);

        let drift = DriftEngine::new(&f, EngineConfig::default())
            .drift("T", &result.weights)
            .unwrap();
        assert!(drift.values().iter().all(|d| d.abs() < 1e-9));
    }
}

#[test]
fn unconstrained_matches_normal_equations() {
    let mut rng = StdRng::seed_from_u64(7);
    let a = walk(&mut rng, 120);
    let b = walk(&mut rng, 120);
    let target: Vec<f64> = mix(&[&a, &b], &[0.4, 0.6])
        .into_iter()
        .map(|p| p + rng.gen_range(-1.0..1.0))
        .collect();
    let f = frame(&[("T", target), ("A", a), ("B", b)]);

    let result = optimizer(OptimizerConfig::unconstrained())
        .optimize(&f, "T", &["A", "B"])
        .unwrap();
    assert_eq!(result.method, SolveMethod::ClosedForm);

    let design = DriftEngine::new(&f, EngineConfig::default())
        .design("T", &["A", "B"])
        .unwrap();
    let x = DMatrix::from_fn(design.rows(), 2, |i, j| design.columns[j][i]);
    let y = DVector::from_column_slice(&design.target);
    let xt = x.transpose();
    let expected = (&xt * &x).try_inverse().unwrap() * xt * y;

    assert_abs_diff_eq!(weight(&result, "A"), expected[0], epsilon = 1e-6);
    assert_abs_diff_eq!(weight(&result, "B"), expected[1], epsilon = 1e-6);
}

#[test]
fn active_set_pins_weights_at_the_box() {
    let mut rng = StdRng::seed_from_u64(11);
    let a = walk(&mut rng, 60);
    let b = walk(&mut rng, 60);
    // The sum-to-one optimum is (-0.5, 1.5); inside [0, 1] the best is all B.
    let target = mix(&[&a, &b], &[-0.5, 1.5]);
    let f = frame(&[("T", target), ("A", a), ("B", b)]);

    let free = optimizer(OptimizerConfig::sum_to_one())
        .optimize(&f, "T", &["A", "B"])
        .unwrap();
    assert_abs_diff_eq!(weight(&free, "A"), -0.5, epsilon = 1e-8);

    let result = optimizer(OptimizerConfig::default())
        .optimize(&f, "T", &["A", "B"])
        .unwrap();
    assert_eq!(result.method, SolveMethod::ActiveSet);
    assert!(result.is_converged());
    assert_abs_diff_eq!(weight(&result, "A"), 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(weight(&result, "B"), 1.0, epsilon = 1e-9);
}

#[test]
fn active_set_settles_when_several_caps_bind_at_once() {
    let mut rng = StdRng::seed_from_u64(17);
    let columns: Vec<Vec<f64>> = (0..4).map(|_| walk(&mut rng, 80)).collect();
    let refs: Vec<&Vec<f64>> = columns.iter().collect();
    // A and B both want 0.4 against a 1/3 cap, so they block on the same step
    // and the second pin is a zero-length step.
    let target = mix(&refs, &[0.4, 0.4, 0.2, 0.0]);
    let f = frame(&[
        ("T", target),
        ("A", columns[0].clone()),
        ("B", columns[1].clone()),
        ("C", columns[2].clone()),
        ("D", columns[3].clone()),
    ]);
    let proxies = ["A", "B", "C", "D"];
    let config = OptimizerConfig::bounded(0.0, 1.0 / 3.0, true);

    let exact = optimizer(config.clone()).optimize(&f, "T", &proxies).unwrap();
    assert_eq!(exact.method, SolveMethod::ActiveSet);
    assert!(exact.is_converged());
    assert!(exact.iterations <= 20, "took {} iterations", exact.iterations);
    assert!(exact.constraint_violation <= 1e-12);

    let reference = optimizer(OptimizerConfig {
        solver: SolverKind::Iterative,
        ..config
    })
    .optimize(&f, "T", &proxies)
    .unwrap();
    assert!(exact.objective_value <= reference.objective_value * (1.0 + 1e-7) + 1e-9);
}

// --- Constraint invariants ---

#[test]
fn long_only_weights_stay_in_the_simplex_for_random_inputs() {
    for seed in 0..25 {
        let mut rng = StdRng::seed_from_u64(seed);
        let columns: Vec<Vec<f64>> = (0..5).map(|_| walk(&mut rng, 80)).collect();
        let f = frame(&[
            ("T", columns[0].clone()),
            ("P1", columns[1].clone()),
            ("P2", columns[2].clone()),
            ("P3", columns[3].clone()),
            ("P4", columns[4].clone()),
        ]);

        let result = optimizer(OptimizerConfig::default())
            .optimize(&f, "T", &["P1", "P2", "P3", "P4"])
            .unwrap();
        assert!(result.is_converged(), "seed {seed} did not converge");
        assert_abs_diff_eq!(result.weights.sum(), 1.0, epsilon = 1e-6);
        for (symbol, w) in result.weights.iter() {
            assert!(
                (-1e-9..=1.0 + 1e-9).contains(&w),
                "seed {seed}: {symbol} = {w}"
            );
        }
    }
}

#[test]
fn infeasible_bounds_are_rejected_before_solving() {
    let f = frame(&[
        ("T", vec![100.0, 101.0, 102.0]),
        ("A", vec![100.0, 99.0, 98.0]),
        ("B", vec![100.0, 100.5, 101.0]),
        ("C", vec![100.0, 103.0, 101.0]),
    ]);
    let err = optimizer(OptimizerConfig::bounded(0.0, 0.2, true))
        .optimize(&f, "T", &["A", "B", "C"])
        .unwrap_err();
    assert!(matches!(err, OptimizerError::InvalidConstraints(_)));
}

#[test]
fn rejects_unknown_and_duplicate_proxies() {
    let f = frame(&[
        ("T", vec![100.0, 101.0, 102.0]),
        ("A", vec![100.0, 99.0, 98.0]),
    ]);
    let opt = optimizer(OptimizerConfig::default());

    let err = opt.optimize(&f, "T", &["A", "ZZZ"]).unwrap_err();
    assert_eq!(
        err,
        OptimizerError::Analytics(AnalyticsError::UnknownSymbol("ZZZ".to_string()))
    );
    assert!(matches!(
        opt.optimize(&f, "T", &["A", "A"]),
        Err(OptimizerError::InvalidInput(_))
    ));
    assert!(matches!(
        opt.optimize(&f, "T", &["T"]),
        Err(OptimizerError::InvalidInput(_))
    ));
}

// --- Determinism and diagnostics ---

#[test]
fn repeated_solves_agree() {
    let mut rng = StdRng::seed_from_u64(3);
    let columns: Vec<Vec<f64>> = (0..4).map(|_| walk(&mut rng, 90)).collect();
    let f = frame(&[
        ("T", columns[0].clone()),
        ("A", columns[1].clone()),
        ("B", columns[2].clone()),
        ("C", columns[3].clone()),
    ]);

    let iterative = OptimizerConfig {
        solver: SolverKind::Iterative,
        ..OptimizerConfig::default()
    };
    for config in [OptimizerConfig::default(), iterative] {
        let opt = optimizer(config);
        let first = opt.optimize(&f, "T", &["A", "B", "C"]).unwrap();
        let second = opt.optimize(&f, "T", &["A", "B", "C"]).unwrap();
        for (symbol, w) in first.weights.iter() {
            assert_abs_diff_eq!(w, second.weights.get(symbol).unwrap(), epsilon = 1e-6);
        }
    }
}

#[test]
fn warns_about_collinear_proxies_but_still_solves() {
    let mut rng = StdRng::seed_from_u64(5);
    let a = walk(&mut rng, 50);
    let b = walk(&mut rng, 50);
    let twin: Vec<f64> = b.iter().map(|p| p * 1.5).collect();
    let target = mix(&[&a, &b], &[0.5, 0.5]);
    let f = frame(&[("T", target), ("A", a), ("B", b), ("B2", twin)]);

    let result = optimizer(OptimizerConfig::default())
        .optimize(&f, "T", &["A", "B", "B2"])
        .unwrap();
    assert_eq!(result.warnings.len(), 1);
    let warning = &result.warnings[0];
    assert_eq!((warning.first.as_str(), warning.second.as_str()), ("B", "B2"));
    assert!(warning.correlation > 0.999);
    assert_abs_diff_eq!(result.weights.sum(), 1.0, epsilon = 1e-9);
    // The twins share B's half in some split.
    assert_abs_diff_eq!(
        weight(&result, "B") + weight(&result, "B2"),
        0.5,
        epsilon = 1e-6
    );
}

// --- General solver path ---

#[test]
fn iterative_path_agrees_with_active_set() {
    let mut rng = StdRng::seed_from_u64(21);
    let a = walk(&mut rng, 150);
    let b = walk(&mut rng, 150);
    let c = walk(&mut rng, 150);
    let target: Vec<f64> = mix(&[&a, &b, &c], &[0.2, 0.5, 0.3])
        .into_iter()
        .map(|p| p + rng.gen_range(-0.5..0.5))
        .collect();
    let f = frame(&[("T", target), ("A", a), ("B", b), ("C", c)]);

    let exact = optimizer(OptimizerConfig::default())
        .optimize(&f, "T", &["A", "B", "C"])
        .unwrap();
    let iterative = optimizer(OptimizerConfig {
        solver: SolverKind::Iterative,
        gradient_tolerance: 1e-10,
        ..OptimizerConfig::default()
    })
    .optimize(&f, "T", &["A", "B", "C"])
    .unwrap();

    assert_eq!(iterative.method, SolveMethod::ProjectedGradient);
    for symbol in ["A", "B", "C"] {
        assert_abs_diff_eq!(weight(&iterative, symbol), weight(&exact, symbol), epsilon = 1e-4);
    }
}

#[test]
fn correlation_objective_recovers_the_mixture() {
    let mut rng = StdRng::seed_from_u64(13);
    let a = walk(&mut rng, 100);
    let b = walk(&mut rng, 100);
    let target = mix(&[&a, &b], &[0.3, 0.7]);
    let f = frame(&[("T", target), ("A", a), ("B", b)]);

    let result = optimizer(OptimizerConfig {
        objective: ObjectiveKind::MaxCorrelation,
        ..OptimizerConfig::default()
    })
    .optimize(&f, "T", &["A", "B"])
    .unwrap();

    assert_eq!(result.method, SolveMethod::ProjectedGradient);
    assert_eq!(result.objective, "max_correlation");
    assert!(result.objective_value < 1e-6);
    assert_abs_diff_eq!(weight(&result, "A"), 0.3, epsilon = 1e-3);
    assert_abs_diff_eq!(weight(&result, "B"), 0.7, epsilon = 1e-3);
}

const FIVE_PROXIES: [&str; 5] = ["A", "B", "C", "D", "E"];

/// Six unrelated 60-day walks: a target and five proxies.
fn five_proxy_frame(seed: u64) -> AlignedFrame {
    let mut rng = StdRng::seed_from_u64(seed);
    let columns: Vec<(&str, Vec<f64>)> = ["T", "A", "B", "C", "D", "E"]
        .into_iter()
        .map(|symbol| (symbol, walk(&mut rng, 60)))
        .collect();
    frame(&columns)
}

#[test]
fn iterative_path_converges_on_random_baskets() {
    let exact = optimizer(OptimizerConfig::default());
    let iterative = optimizer(OptimizerConfig {
        solver: SolverKind::Iterative,
        ..OptimizerConfig::default()
    });

    for seed in 0..40 {
        let f = five_proxy_frame(seed);
        let reference = exact.optimize(&f, "T", &FIVE_PROXIES).unwrap();
        let result = iterative
            .optimize(&f, "T", &FIVE_PROXIES)
            .unwrap_or_else(|e| panic!("seed {seed}: {e}"));

        assert_eq!(result.method, SolveMethod::ProjectedGradient);
        assert!(result.is_converged(), "seed {seed}");
        assert!(result.constraint_violation <= 1e-12, "seed {seed}: {}", result.constraint_violation);
        assert!(
            result.objective_value <= reference.objective_value * (1.0 + 1e-7) + 1e-9,
            "seed {seed}: {} vs {}",
            result.objective_value,
            reference.objective_value
        );
    }
}

#[test]
fn correlation_objective_converges_on_random_baskets() {
    let opt = optimizer(OptimizerConfig {
        objective: ObjectiveKind::MaxCorrelation,
        ..OptimizerConfig::default()
    });

    for seed in 0..40 {
        let f = five_proxy_frame(seed);
        let result = opt
            .optimize(&f, "T", &FIVE_PROXIES)
            .unwrap_or_else(|e| panic!("seed {seed}: {e}"));

        assert!(result.is_converged(), "seed {seed}");
        assert!(result.constraint_violation <= 1e-12, "seed {seed}: {}", result.constraint_violation);
        assert!(result.weights.iter().all(|(_, w)| (0.0..=1.0).contains(&w)));
        assert!((0.0..=2.0).contains(&result.objective_value), "seed {seed}");
    }
}

// --- Budgets and divergence ---

fn three_proxy_frame(seed: u64) -> AlignedFrame {
    let mut rng = StdRng::seed_from_u64(seed);
    let columns: Vec<Vec<f64>> = (0..4).map(|_| walk(&mut rng, 70)).collect();
    frame(&[
        ("T", columns[0].clone()),
        ("A", columns[1].clone()),
        ("B", columns[2].clone()),
        ("C", columns[3].clone()),
    ])
}

#[test]
fn cancelled_solve_returns_a_feasible_partial_result() {
    let f = three_proxy_frame(17);
    let cancel = Arc::new(AtomicBool::new(true));
    let budget = SolveBudget::unlimited().with_cancel_flag(cancel);

    for solver in [SolverKind::Auto, SolverKind::Iterative] {
        let result = optimizer(OptimizerConfig {
            solver,
            ..OptimizerConfig::default()
        })
        .optimize_with_budget(&f, "T", &["A", "B", "C"], &budget)
        .unwrap();
        assert_eq!(result.status, SolveStatus::Partial(StopReason::Cancelled));
        assert!(!result.is_converged());
        assert_abs_diff_eq!(result.weights.sum(), 1.0, epsilon = 1e-9);
    }
}

#[test]
fn iteration_budget_is_partial_not_divergence() {
    let f = three_proxy_frame(19);
    let budget = SolveBudget::unlimited().with_max_iterations(1);
    let result = optimizer(OptimizerConfig {
        solver: SolverKind::Iterative,
        ..OptimizerConfig::default()
    })
    .optimize_with_budget(&f, "T", &["A", "B", "C"], &budget)
    .unwrap();
    assert_eq!(result.status, SolveStatus::Partial(StopReason::IterationBudget));
    assert_eq!(result.iterations, 1);
    assert!(result.constraint_violation <= 1e-9);
}

#[test]
fn exhausting_the_iteration_cap_is_divergence() {
    let f = three_proxy_frame(23);
    let err = optimizer(OptimizerConfig {
        solver: SolverKind::Iterative,
        max_iterations: 1,
        ..OptimizerConfig::default()
    })
    .optimize(&f, "T", &["A", "B", "C"])
    .unwrap_err();

    match err {
        OptimizerError::Diverged {
            best,
            violation,
            iterations,
            ..
        } => {
            assert_eq!(iterations, 1);
            assert!(violation <= 1e-9);
            assert_abs_diff_eq!(best.sum(), 1.0, epsilon = 1e-9);
        }
        other => panic!("expected divergence, got {other:?}"),
    }
}
