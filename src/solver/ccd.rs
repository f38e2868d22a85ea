//! Concave penalized block coordinate descent for one penalty value.
//!
//! The graph stores structural weights `beta` and noise variances
//! `sigma^2`. For target `j`, a sweep minimises
//!
//! ```text
//! 1/2 log sigma_j^2 + r_j(beta) / (2 sigma_j^2) + sum_k p(beta_kj)
//! ```
//!
//! one edge at a time, where `r_j` is the residual variance of node `j`
//! under the correlation matrix. The penalty is evaluated at
//! `lambda / sqrt(nn)`, so `lambda = sqrt(nn)` keeps the empty graph fixed
//! whenever every off-diagonal correlation is below one in magnitude.

use crate::blocks::BlockList;
use crate::correlation::CorrelationMatrix;
use crate::estimate::CcdrError;
use crate::graph::SparseDag;
use crate::penalty::Penalty;
use crate::types::CcdrConfig;
use log::Level;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Floor that keeps every noise variance strictly positive.
pub const MIN_VARIANCE: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveSummary {
    pub sweeps: usize,
    /// Largest absolute weight change in the final sweep.
    pub max_change: f64,
    pub converged: bool,
    pub active_set_size: usize,
}

#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub graph: SparseDag,
    pub summary: SolveSummary,
}

pub struct ConcaveCdSolver<'a> {
    cors: &'a CorrelationMatrix,
    nn: usize,
    config: &'a CcdrConfig,
    penalty: &'a dyn Penalty,
    verbose: bool,
}

impl<'a> ConcaveCdSolver<'a> {
    pub fn new(
        cors: &'a CorrelationMatrix,
        nn: usize,
        config: &'a CcdrConfig,
        verbose: bool,
    ) -> Result<Self, CcdrError> {
        if nn == 0 {
            return Err(CcdrError::InvalidInput(
                "sample size must be positive".to_string(),
            ));
        }
        if let Some(j) = (0..cors.dim()).find(|&j| !(cors.get(j, j) > 0.0)) {
            return Err(CcdrError::InvalidInput(format!(
                "correlation diagonal entry {j} must be positive, got {}",
                cors.get(j, j)
            )));
        }
        Ok(Self {
            cors,
            nn,
            config,
            penalty: config.penalty.as_penalty(),
            verbose,
        })
    }

    /// Replace the configured penalty family.
    pub fn with_penalty(mut self, penalty: &'a dyn Penalty) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn effective_lambda(&self, lambda: f64) -> f64 {
        lambda / (self.nn as f64).sqrt()
    }

    pub(crate) fn progress_level(&self) -> Level {
        if self.verbose { Level::Info } else { Level::Debug }
    }

    /// Run sweeps on `graph` until the weights settle or the cap is hit.
    ///
    /// `init_sigmas` entries that are non-positive or non-finite are replaced
    /// by the variance update at the initial graph; an empty slice keeps the
    /// graph's own variances.
    pub fn solve<R: rand::Rng + ?Sized>(
        &self,
        graph: &mut SparseDag,
        init_sigmas: &[f64],
        lambda: f64,
        blocks: &mut BlockList,
        rng: &mut R,
    ) -> Result<SolveSummary, CcdrError> {
        let dim = self.cors.dim();
        if graph.dim() != dim {
            return Err(CcdrError::DimensionMismatch {
                what: "graph nodes",
                expected: dim,
                found: graph.dim(),
            });
        }
        if !(lambda.is_finite() && lambda >= 0.0) {
            return Err(CcdrError::InvalidInput(format!(
                "penalty value must be finite and non-negative, got {lambda}"
            )));
        }
        blocks.validate(dim)?;
        self.initialise_variances(graph, init_sigmas)?;

        let level = self.progress_level();
        let lambda_eff = self.effective_lambda(lambda);
        let gamma = self.config.gamma;
        log::debug!(
            "{} solve at lambda {:.5} (effective {:.5}) over {} blocks",
            self.penalty.name(),
            lambda,
            lambda_eff,
            blocks.size()
        );
        let mut summary = SolveSummary {
            sweeps: 0,
            max_change: 0.0,
            converged: false,
            active_set_size: graph.active_set_size(),
        };

        while summary.sweeps < self.config.max_iters {
            if summary.sweeps > 0 && self.config.shuffle_blocks {
                blocks.shuffle(rng);
            }

            let mut max_change = 0.0_f64;
            for (row, col) in blocks.iter() {
                let old = graph.weight(row, col);
                let z = self.coordinate_target(graph, row, col);
                let s = graph.sigma(col) / self.cors.get(row, row);
                let new = self.penalty.threshold(z, lambda_eff, gamma, s);
                if new != old {
                    if old == 0.0 {
                        log::trace!("activate {row} -> {col}: {new:.6}");
                    } else if new == 0.0 {
                        log::trace!("deactivate {row} -> {col} (was {old:.6})");
                    }
                    graph.update_weight(row, col, new)?;
                }
                max_change = max_change.max((new - old).abs());
            }
            self.update_variances(graph)?;

            summary.sweeps += 1;
            summary.max_change = max_change;
            log::log!(
                level,
                "lambda {:.5}: sweep {} max change {:.3e}, {} active edges",
                lambda,
                summary.sweeps,
                max_change,
                graph.active_set_size()
            );
            if max_change < self.config.eps {
                summary.converged = true;
                break;
            }
        }

        if !summary.converged && self.config.max_iters > 0 {
            log::warn!(
                "lambda {:.5}: reached {} sweeps without meeting eps={:.1e} (last change {:.3e})",
                lambda,
                self.config.max_iters,
                self.config.eps,
                summary.max_change
            );
        }
        summary.active_set_size = graph.active_set_size();
        Ok(summary)
    }

    /// Partial-residual correlation of `row` with `col` after removing the
    /// other parents of `col`, scaled by `S[row, row]`.
    fn coordinate_target(&self, graph: &SparseDag, row: usize, col: usize) -> f64 {
        let mut z = self.cors.get(row, col);
        for (parent, weight) in graph.parents(col) {
            if parent != row {
                z -= weight * self.cors.get(row, parent);
            }
        }
        z / self.cors.get(row, row)
    }

    /// `r_j = S_jj - 2 sum_k b_k S_kj + sum_k sum_l b_k b_l S_kl` over the parents of `j`.
    pub(crate) fn residual_variance(&self, graph: &SparseDag, j: usize) -> f64 {
        let parents: Vec<(usize, f64)> = graph.parents(j).collect();
        let mut r = self.cors.get(j, j);
        for &(k, bk) in &parents {
            r -= 2.0 * bk * self.cors.get(k, j);
            for &(l, bl) in &parents {
                r += bk * bl * self.cors.get(k, l);
            }
        }
        r
    }

    /// Ridge-shrunk variance `(nn r_j + alpha) / (nn + alpha)`, floored.
    pub(crate) fn variance_update(&self, graph: &SparseDag, j: usize) -> f64 {
        let nn = self.nn as f64;
        let alpha = self.config.alpha;
        let r = self.residual_variance(graph, j).max(0.0);
        let updated = (nn * r + alpha) / (nn + alpha);
        if updated.is_finite() {
            updated.max(MIN_VARIANCE)
        } else {
            MIN_VARIANCE
        }
    }

    fn update_variances(&self, graph: &mut SparseDag) -> Result<(), CcdrError> {
        for j in 0..graph.dim() {
            let sigma = self.variance_update(graph, j);
            graph.set_sigma(j, sigma)?;
        }
        Ok(())
    }

    fn initialise_variances(
        &self,
        graph: &mut SparseDag,
        init_sigmas: &[f64],
    ) -> Result<(), CcdrError> {
        if init_sigmas.is_empty() {
            return Ok(());
        }
        if init_sigmas.len() != graph.dim() {
            return Err(CcdrError::DimensionMismatch {
                what: "initial variances",
                expected: graph.dim(),
                found: init_sigmas.len(),
            });
        }
        for (j, &s) in init_sigmas.iter().enumerate() {
            let sigma = if s.is_finite() && s > 0.0 {
                s
            } else {
                self.variance_update(graph, j)
            };
            graph.set_sigma(j, sigma)?;
        }
        Ok(())
    }
}

/// Solve one penalty value from `graph`, shuffling with `config.seed`.
///
/// The active-set counter is kept incrementally; callers outside the path
/// driver should still run `recompute_active_set_size(true)` on the result.
pub fn single_ccdr(
    cors: &CorrelationMatrix,
    graph: SparseDag,
    init_sigmas: &[f64],
    nn: usize,
    lambda: f64,
    config: &CcdrConfig,
    verbose: bool,
    blocks: &mut BlockList,
) -> Result<SolveOutcome, CcdrError> {
    let solver = ConcaveCdSolver::new(cors, nn, config, verbose)?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut graph = graph;
    let summary = solver.solve(&mut graph, init_sigmas, lambda, blocks, &mut rng)?;
    Ok(SolveOutcome { graph, summary })
}
