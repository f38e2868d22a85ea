pub mod ccd;
pub mod path;

pub use ccd::{ConcaveCdSolver, MIN_VARIANCE, SolveOutcome, SolveSummary, single_ccdr};
pub use path::{RegularizationPath, grid_ccdr};
