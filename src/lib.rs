#![deny(dead_code)]
#![deny(unused_imports)]

pub mod blocks;
pub mod correlation;
pub mod estimate;
pub mod generative;
pub mod graph;
pub mod linalg;
pub mod penalty;
pub mod solver;
pub mod types;

pub use blocks::{BlockList, BlockListError};
pub use correlation::{CorrelationMatrix, packed_index, packed_len};
pub use estimate::{CcdrError, fit_ccdr, grid_ccdr_flat, single_ccdr_flat};
pub use generative::{default_lambda_grid, lambda_grid, random_dag, random_unif, sample_sem};
pub use graph::{Edge, FLAG_EXTERNAL, FLAG_SOLVER, GraphError, GraphRecord, SparseDag};
pub use linalg::utils::sample_correlation;
pub use penalty::{Lasso, Mcp, Penalty, PenaltyKind, Scad, soft_threshold};
pub use solver::{
    ConcaveCdSolver, MIN_VARIANCE, RegularizationPath, SolveOutcome, SolveSummary, grid_ccdr,
    single_ccdr,
};
pub use types::CcdrConfig;
