use super::ccd::{ConcaveCdSolver, SolveSummary};
use crate::blocks::BlockList;
use crate::correlation::CorrelationMatrix;
use crate::estimate::CcdrError;
use crate::graph::{GraphRecord, SparseDag};
use crate::types::CcdrConfig;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Solutions along a decreasing sequence of penalty values.
#[derive(Debug, Clone, Default)]
pub struct RegularizationPath {
    pub lambdas: Vec<f64>,
    pub graphs: Vec<SparseDag>,
    pub summaries: Vec<SolveSummary>,
    /// Set when `max_edges_ratio` cut the path short.
    pub stopped_early: bool,
}

impl RegularizationPath {
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &SparseDag, &SolveSummary)> + '_ {
        self.lambdas
            .iter()
            .zip(self.graphs.iter())
            .zip(self.summaries.iter())
            .map(|((&lambda, graph), summary)| (lambda, graph, summary))
    }

    pub fn active_set_sizes(&self) -> Vec<usize> {
        self.graphs.iter().map(SparseDag::active_set_size).collect()
    }

    /// One record per solution, each tagged with its penalty value.
    pub fn to_records(&self) -> Vec<GraphRecord> {
        self.iter()
            .map(|(lambda, graph, _)| graph.to_record(lambda))
            .collect()
    }

    fn push(&mut self, lambda: f64, graph: SparseDag, summary: SolveSummary) {
        self.lambdas.push(lambda);
        self.graphs.push(graph);
        self.summaries.push(summary);
    }
}

fn check_lambdas(lambdas: &[f64]) -> Result<(), CcdrError> {
    if let Some((k, &lambda)) = lambdas
        .iter()
        .enumerate()
        .find(|&(_, &l)| !(l.is_finite() && l >= 0.0))
    {
        return Err(CcdrError::InvalidInput(format!(
            "penalty value {k} must be finite and non-negative, got {lambda}"
        )));
    }
    if lambdas.windows(2).any(|w| w[1] >= w[0]) {
        log::warn!("penalty sequence is not strictly decreasing; warm starts lose efficiency");
    }
    Ok(())
}

/// Solve every value in `lambdas`, warm-starting each from the previous
/// solution.
///
/// `init_sigmas` applies to the first solve only; later solves start from
/// the variances of the previous solution. Each stored graph has had a full
/// active-set recount.
pub fn grid_ccdr(
    cors: &CorrelationMatrix,
    init: SparseDag,
    init_sigmas: &[f64],
    nn: usize,
    lambdas: &[f64],
    config: &CcdrConfig,
    verbose: bool,
    blocks: &mut BlockList,
) -> Result<RegularizationPath, CcdrError> {
    check_lambdas(lambdas)?;
    let solver = ConcaveCdSolver::new(cors, nn, config, verbose)?;
    let level = solver.progress_level();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut path = RegularizationPath::default();
    let mut current = init;

    for (k, &lambda) in lambdas.iter().enumerate() {
        let sigmas = if k == 0 { init_sigmas } else { &[] };
        let summary = solver.solve(&mut current, sigmas, lambda, blocks, &mut rng)?;
        let edges = current.recompute_active_set_size(true);
        log::log!(
            level,
            "path step {}/{}: lambda {:.5}, {} edges after {} sweeps",
            k + 1,
            lambdas.len(),
            lambda,
            edges,
            summary.sweeps
        );
        path.push(lambda, current.clone(), summary);

        if let Some(ratio) = config.max_edges_ratio
            && edges as f64 > ratio * current.dim() as f64
        {
            log::log!(
                level,
                "stopping path at lambda {lambda:.5}: {edges} edges exceed {ratio} x {} nodes",
                current.dim()
            );
            path.stopped_early = true;
            break;
        }
    }
    Ok(path)
}
