use approx::assert_abs_diff_eq;
use ccdr::blocks::BlockList;
use ccdr::correlation::CorrelationMatrix;
use ccdr::estimate::CcdrError;
use ccdr::generative::{random_dag, sample_sem};
use ccdr::graph::{GraphError, SparseDag};
use ccdr::linalg::utils::sample_correlation;
use ccdr::solver::{MIN_VARIANCE, single_ccdr};
use ccdr::types::CcdrConfig;
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn simulated_problem(seed: u64) -> CorrelationMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let truth = random_dag(8, 10, 0.8, &mut rng).unwrap();
    let data = sample_sem(&truth, 400, &mut rng).unwrap();
    sample_correlation(data.view()).unwrap()
}

fn assert_graph_invariants(graph: &SparseDag) {
    assert!(graph.edges().all(|e| e.row > e.col));
    assert!(graph.edges().all(|e| e.weight != 0.0));
    assert!(graph.sigmas().iter().all(|&s| s >= MIN_VARIANCE && s.is_finite()));
    let incremental = graph.active_set_size();
    let mut recounted = graph.clone();
    assert_eq!(recounted.recompute_active_set_size(true), incremental);
}

#[test]
fn identity_correlation_with_large_penalty_gives_the_empty_graph() {
    let cors = CorrelationMatrix::from_dense(Array2::eye(5)).unwrap();
    let mut blocks = BlockList::full(5);
    let out = single_ccdr(
        &cors,
        SparseDag::new(5),
        &[-1.0; 5],
        25,
        10.0,
        &CcdrConfig::default(),
        false,
        &mut blocks,
    )
    .unwrap();
    assert_eq!(out.graph.active_set_size(), 0);
    assert!(out.summary.converged);
    for &s in out.graph.sigmas() {
        assert_abs_diff_eq!(s, 1.0, epsilon = 1e-12);
    }
}

#[test]
fn unpenalized_pair_recovers_the_correlation() {
    let mut m = Array2::<f64>::eye(3);
    m[[1, 0]] = 0.9;
    m[[0, 1]] = 0.9;
    let cors = CorrelationMatrix::from_dense(m).unwrap();
    let mut blocks = BlockList::full(3);
    let out = single_ccdr(
        &cors,
        SparseDag::new(3),
        &[-1.0; 3],
        10,
        0.0,
        &CcdrConfig::default(),
        false,
        &mut blocks,
    )
    .unwrap();
    assert_eq!(out.graph.active_set_size(), 1);
    assert_abs_diff_eq!(out.graph.weight(1, 0), 0.9, epsilon = 1e-12);
    assert_abs_diff_eq!(out.graph.sigma(0), 0.19, epsilon = 1e-12);
}

#[test]
fn self_loop_block_is_rejected() {
    let cors = CorrelationMatrix::from_dense(Array2::eye(3)).unwrap();
    let mut blocks = BlockList::new(vec![(1, 0), (2, 2)]);
    let err = single_ccdr(
        &cors,
        SparseDag::new(3),
        &[],
        10,
        1.0,
        &CcdrConfig::default(),
        false,
        &mut blocks,
    );
    assert!(matches!(err, Err(CcdrError::Graph(GraphError::SelfLoop(2)))));
}

#[test]
fn shuffled_solves_keep_the_graph_invariants() {
    let cors = simulated_problem(11);
    let cfg = CcdrConfig {
        shuffle_blocks: true,
        seed: 5,
        ..CcdrConfig::default()
    };
    let original = BlockList::full(8);
    let mut blocks = original.clone();
    let out = single_ccdr(
        &cors,
        SparseDag::new(8),
        &[-1.0; 8],
        400,
        4.0,
        &cfg,
        false,
        &mut blocks,
    )
    .unwrap();
    assert_graph_invariants(&out.graph);
    assert!(out.graph.active_set_size() > 0);

    let mut before: Vec<_> = original.iter().collect();
    let mut after: Vec<_> = blocks.iter().collect();
    before.sort_unstable();
    after.sort_unstable();
    assert_eq!(before, after);
}

#[test]
fn shuffled_solves_are_reproducible_for_a_fixed_seed() {
    let cors = simulated_problem(23);
    let cfg = CcdrConfig {
        shuffle_blocks: true,
        seed: 99,
        ..CcdrConfig::default()
    };
    let solve = || {
        let mut blocks = BlockList::full(8);
        single_ccdr(
            &cors,
            SparseDag::new(8),
            &[-1.0; 8],
            400,
            3.0,
            &cfg,
            false,
            &mut blocks,
        )
        .unwrap()
    };
    let a = solve();
    let b = solve();
    assert_eq!(a.graph.to_dense(), b.graph.to_dense());
    assert_eq!(a.graph.sigmas(), b.graph.sigmas());
    assert_eq!(a.summary, b.summary);
}

#[test]
fn restarting_from_a_converged_solution_takes_one_sweep() {
    let mut m = Array2::<f64>::eye(4);
    m[[1, 0]] = 0.8;
    m[[0, 1]] = 0.8;
    m[[3, 2]] = 0.5;
    m[[2, 3]] = 0.5;
    let cors = CorrelationMatrix::from_dense(m).unwrap();
    let tight = CcdrConfig {
        gamma: 3.0,
        eps: 1e-12,
        max_iters: 1000,
        ..CcdrConfig::default()
    };
    let mut blocks = BlockList::full(4);
    let first = single_ccdr(
        &cors,
        SparseDag::new(4),
        &[-1.0; 4],
        100,
        3.0,
        &tight,
        false,
        &mut blocks,
    )
    .unwrap();
    assert!(first.summary.converged);
    assert_eq!(first.graph.active_set_size(), 2);

    let loose = CcdrConfig {
        eps: 1e-6,
        ..tight
    };
    let again = single_ccdr(
        &cors,
        first.graph.clone(),
        &[],
        100,
        3.0,
        &loose,
        false,
        &mut blocks,
    )
    .unwrap();
    assert_eq!(again.summary.sweeps, 1);
    assert!(again.summary.converged);
    for (a, b) in first.graph.vals().iter().zip(again.graph.vals()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
    }
}

#[test]
fn supplied_variances_are_used_and_sentinels_recomputed() {
    let mut m = Array2::<f64>::eye(2);
    m[[1, 0]] = 0.6;
    m[[0, 1]] = 0.6;
    let cors = CorrelationMatrix::from_dense(m).unwrap();
    let cfg = CcdrConfig {
        max_iters: 1,
        penalty: ccdr::penalty::PenaltyKind::Lasso,
        ..CcdrConfig::default()
    };
    // lambda_eff = 0.2
    let run = |sigmas: &[f64]| {
        let mut blocks = BlockList::full(2);
        single_ccdr(
            &cors,
            SparseDag::new(2),
            sigmas,
            100,
            2.0,
            &cfg,
            false,
            &mut blocks,
        )
        .unwrap()
        .graph
        .weight(1, 0)
    };
    // soft(0.6, 0.5 * 0.2) and soft(0.6, 1.0 * 0.2)
    assert_abs_diff_eq!(run(&[0.5, 1.0]), 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(run(&[-1.0, f64::NAN]), 0.4, epsilon = 1e-12);
}
