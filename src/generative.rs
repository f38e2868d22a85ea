//! Test-data generators: random DAGs, uniform draws, lambda grids and
//! Gaussian structural-equation samples.

use crate::estimate::CcdrError;
use crate::graph::{FLAG_EXTERNAL, SparseDag};
use ndarray::Array2;
use rand::RngExt;

/// Random DAG over `p` nodes built from `nnz` edge draws of weight `coef`.
///
/// Each draw picks `row` in `[1, p)` and `col` in `[0, row)`, so the result is
/// acyclic. Repeated draws overwrite, leaving at most `nnz` edges.
pub fn random_dag<R: rand::Rng + ?Sized>(
    p: usize,
    nnz: usize,
    coef: f64,
    rng: &mut R,
) -> Result<SparseDag, CcdrError> {
    let mut graph = SparseDag::new(p);
    if p < 2 {
        return Ok(graph);
    }
    for _ in 0..nnz {
        let row = rng.random_range(1..p);
        let col = rng.random_range(0..row);
        graph.add_block(row, col, coef, FLAG_EXTERNAL)?;
    }
    Ok(graph)
}

/// `len` independent Uniform[0, 1) draws.
pub fn random_unif<R: rand::Rng + ?Sized>(len: usize, rng: &mut R) -> Vec<f64> {
    (0..len).map(|_| rng.random_range(0.0..1.0)).collect()
}

/// `nlam` values decreasing on a log scale from `maxlam` to `minlam`.
pub fn lambda_grid(maxlam: f64, minlam: f64, nlam: usize) -> Result<Vec<f64>, CcdrError> {
    if !(maxlam.is_finite() && minlam.is_finite() && maxlam > 0.0 && minlam > 0.0) {
        return Err(CcdrError::InvalidInput(format!(
            "lambda grid bounds must be positive and finite, got max={maxlam}, min={minlam}"
        )));
    }
    if minlam > maxlam {
        return Err(CcdrError::InvalidInput(format!(
            "lambda grid minimum {minlam} exceeds maximum {maxlam}"
        )));
    }
    match nlam {
        0 => Ok(Vec::new()),
        1 => Ok(vec![maxlam]),
        _ => {
            let delta = (maxlam / minlam).ln() / (nlam as f64 - 1.0);
            let log_max = maxlam.ln();
            let mut grid: Vec<f64> = (0..nlam)
                .map(|k| (log_max - delta * k as f64).exp())
                .collect();
            grid[0] = maxlam;
            grid[nlam - 1] = minlam;
            Ok(grid)
        }
    }
}

/// Grid from `sqrt(nn)` down to `ratio * sqrt(nn)`.
pub fn default_lambda_grid(nn: usize, ratio: f64, nlam: usize) -> Result<Vec<f64>, CcdrError> {
    let maxlam = (nn as f64).sqrt();
    lambda_grid(maxlam, ratio * maxlam, nlam)
}

/// Draw `n` observations from the Gaussian SEM encoded by `graph`.
///
/// Nodes are generated from the highest index down, so every parent is
/// available before its children.
pub fn sample_sem<R: rand::Rng + ?Sized>(
    graph: &SparseDag,
    n: usize,
    rng: &mut R,
) -> Result<Array2<f64>, CcdrError> {
    let p = graph.dim();
    let mut data = Array2::<f64>::zeros((n, p));
    let noises = (0..p)
        .map(|j| {
            rand_distr::Normal::new(0.0, graph.sigma(j).sqrt()).map_err(|e| {
                CcdrError::InvalidInput(format!("invalid noise variance at node {j}: {e}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    for i in 0..n {
        for j in (0..p).rev() {
            let mut value = rand_distr::Distribution::sample(&noises[j], rng);
            for (parent, weight) in graph.parents(j) {
                value += weight * data[[i, parent]];
            }
            data[[i, j]] = value;
        }
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn random_dag_respects_the_topological_order() {
        let mut rng = StdRng::seed_from_u64(3);
        let g = random_dag(10, 25, 1.5, &mut rng).unwrap();
        assert!(g.active_set_size() <= 25);
        assert!(g.active_set_size() > 0);
        assert!(g.edges().all(|e| e.col < e.row && e.weight == 1.5));
    }

    #[test]
    fn tiny_graphs_get_no_edges() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(random_dag(1, 5, 1.0, &mut rng).unwrap().active_set_size(), 0);
    }

    #[test]
    fn uniform_draws_stay_in_the_unit_interval() {
        let mut rng = StdRng::seed_from_u64(9);
        let u = random_unif(500, &mut rng);
        assert_eq!(u.len(), 500);
        assert!(u.iter().all(|&x| (0.0..1.0).contains(&x)));
    }

    #[test]
    fn lambda_grid_is_log_spaced_and_inclusive() {
        let grid = lambda_grid(10.0, 0.1, 5).unwrap();
        let expected = [10.0, 10f64.sqrt(), 1.0, 10f64.sqrt().recip(), 0.1];
        for (g, e) in grid.iter().zip(expected) {
            assert_abs_diff_eq!(*g, e, epsilon = 1e-9);
        }
        assert!(grid.windows(2).all(|w| w[1] < w[0]));
        assert_eq!(lambda_grid(4.0, 1.0, 1).unwrap(), vec![4.0]);
        assert!(lambda_grid(4.0, 1.0, 0).unwrap().is_empty());
        assert!(lambda_grid(1.0, 4.0, 3).is_err());
        assert!(lambda_grid(0.0, 0.0, 3).is_err());
    }

    #[test]
    fn default_grid_starts_at_root_n() {
        let grid = default_lambda_grid(400, 1e-2, 3).unwrap();
        assert_abs_diff_eq!(grid[0], 20.0, epsilon = 1e-12);
        assert_abs_diff_eq!(grid[2], 0.2, epsilon = 1e-12);
    }

    #[test]
    fn sem_samples_carry_the_edge_signal() {
        let mut g = SparseDag::new(2);
        g.add_block(1, 0, 2.0, FLAG_EXTERNAL).unwrap();
        let mut rng = StdRng::seed_from_u64(17);
        let data = sample_sem(&g, 4000, &mut rng).unwrap();
        // x0 = 2 x1 + e  =>  Var(x0) = 5
        let x0 = data.column(0);
        let var0 = x0.iter().map(|v| v * v).sum::<f64>() / 4000.0;
        assert!((var0 - 5.0).abs() < 0.5, "var0 = {var0}");
    }
}
