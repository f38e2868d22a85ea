//! Top-level estimation entry points.
//!
//! [`fit_ccdr`] is the convenience driver: it starts from the empty graph,
//! orders candidate blocks by marginal correlation strength and runs the
//! regularization path. The `*_flat` functions take the packed inputs used
//! by foreign callers (the packed upper triangle of the correlation matrix,
//! column by column, a flat block
//! list and a positional tuning vector) and return serializable records.

use crate::blocks::{BlockList, BlockListError};
use crate::correlation::CorrelationMatrix;
use crate::graph::{GraphError, GraphRecord, SparseDag};
use crate::solver::ccd::single_ccdr;
use crate::solver::path::{RegularizationPath, grid_ccdr};
use crate::types::CcdrConfig;
use thiserror::Error;

#[derive(Error)]
pub enum CcdrError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Candidate block error: {0}")]
    Blocks(#[from] BlockListError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Invalid tuning parameters: {0}")]
    InvalidParameters(String),
}

// Ensure Debug prints the same human-readable message as Display.
impl core::fmt::Debug for CcdrError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self)
    }
}

/// Fit a full path from the empty graph.
///
/// Variances start from the variance update at the empty graph, and the
/// candidate blocks follow [`CorrelationMatrix::node_order`].
pub fn fit_ccdr(
    cors: &CorrelationMatrix,
    nn: usize,
    lambdas: &[f64],
    config: &CcdrConfig,
) -> Result<RegularizationPath, CcdrError> {
    let p = cors.dim();
    let mut blocks = BlockList::from_node_order(&cors.node_order())?;
    log::debug!(
        "fitting {} penalty values over {} nodes and {} candidate blocks",
        lambdas.len(),
        p,
        blocks.size()
    );
    grid_ccdr(
        cors,
        SparseDag::new(p),
        &vec![-1.0; p],
        nn,
        lambdas,
        config,
        false,
        &mut blocks,
    )
}

struct FlatInputs {
    cors: CorrelationMatrix,
    graph: SparseDag,
    init_sigmas: Vec<f64>,
    config: CcdrConfig,
    blocks: BlockList,
}

/// Load the starting graph of a flat call.
///
/// Callers may send placeholder variances (zero or the `-1` sentinel) in the
/// record as long as `init_sigmas` supplies one starting value per node.
/// Those nodes start from `init_sigmas` when it holds a positive value and
/// from the variance update otherwise. Non-finite record variances are
/// always rejected.
fn initial_graph(
    init: &GraphRecord,
    init_sigmas: &[f64],
) -> Result<(SparseDag, Vec<f64>), CcdrError> {
    if init_sigmas.is_empty() || init_sigmas.len() != init.sigmas.len() {
        return Ok((SparseDag::from_record(init)?, init_sigmas.to_vec()));
    }

    let mut record = init.clone();
    let mut starts = init_sigmas.to_vec();
    for (node, sigma) in record.sigmas.iter_mut().enumerate() {
        if sigma.is_finite() && *sigma <= 0.0 {
            *sigma = 1.0;
            if !(starts[node].is_finite() && starts[node] > 0.0) {
                starts[node] = -1.0;
            }
        }
    }
    Ok((SparseDag::from_record(&record)?, starts))
}

fn unpack(
    cors: &[f64],
    init: &GraphRecord,
    init_sigmas: &[f64],
    params: &[f64],
    blocks: &[i64],
) -> Result<FlatInputs, CcdrError> {
    let (graph, init_sigmas) = initial_graph(init, init_sigmas)?;
    Ok(FlatInputs {
        cors: CorrelationMatrix::from_packed(cors, graph.dim())?,
        graph,
        init_sigmas,
        config: CcdrConfig::from_params(params)?,
        blocks: BlockList::from_flat(blocks)?,
    })
}

/// Single penalty value over packed inputs.
///
/// `params` is `{gamma, eps, maxIters, alpha[, reserved]}` and `blocks` holds
/// `(row, col)` pairs back to back. The returned record carries `lambda`.
pub fn single_ccdr_flat(
    cors: &[f64],
    init: &GraphRecord,
    init_sigmas: &[f64],
    nn: usize,
    lambda: f64,
    params: &[f64],
    blocks: &[i64],
    verbose: bool,
) -> Result<GraphRecord, CcdrError> {
    let FlatInputs {
        cors,
        graph,
        init_sigmas,
        config,
        mut blocks,
    } = unpack(cors, init, init_sigmas, params, blocks)?;
    let mut outcome = single_ccdr(
        &cors,
        graph,
        &init_sigmas,
        nn,
        lambda,
        &config,
        verbose,
        &mut blocks,
    )?;
    outcome.graph.recompute_active_set_size(true);
    Ok(outcome.graph.to_record(lambda))
}

/// Whole penalty sequence over packed inputs, one record per value.
pub fn grid_ccdr_flat(
    cors: &[f64],
    init: &GraphRecord,
    init_sigmas: &[f64],
    nn: usize,
    lambdas: &[f64],
    params: &[f64],
    blocks: &[i64],
    verbose: bool,
) -> Result<Vec<GraphRecord>, CcdrError> {
    let FlatInputs {
        cors,
        graph,
        init_sigmas,
        config,
        mut blocks,
    } = unpack(cors, init, init_sigmas, params, blocks)?;
    let path = grid_ccdr(
        &cors,
        graph,
        &init_sigmas,
        nn,
        lambdas,
        &config,
        verbose,
        &mut blocks,
    )?;
    Ok(path.to_records())
}
