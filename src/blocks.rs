//! Candidate-edge scheduler: the ordered node pairs visited by each sweep.

use crate::graph::{GraphError, check_topological};
use rand::seq::SliceRandom;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockListError {
    #[error("block index {index} is out of range for a list of {len} blocks")]
    OutOfRange { index: usize, len: usize },

    #[error("flat block input must hold (row, col) pairs, got {0} integers")]
    OddLength(usize),

    #[error("flat block input has negative node index {value} at position {position}")]
    NegativeIndex { position: usize, value: i64 },

    #[error("node order is not a permutation of 0..{len}: bad entry {node} at position {position}")]
    InvalidOrder {
        position: usize,
        node: usize,
        len: usize,
    },
}

/// Ordered list of `(row, col)` blocks.
///
/// The list does not enforce `row > col`; solvers validate it against the
/// graph dimension before sweeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockList {
    blocks: Vec<(usize, usize)>,
    nodes: usize,
}

impl BlockList {
    pub fn new(blocks: Vec<(usize, usize)>) -> Self {
        Self { blocks, nodes: 0 }
    }

    /// Same as [`BlockList::new`], recording the node count as a hint.
    pub fn with_nodes(blocks: Vec<(usize, usize)>, nodes: usize) -> Self {
        Self { blocks, nodes }
    }

    /// Read adjacent integers as `(row, col)` pairs.
    pub fn from_flat(flat: &[i64]) -> Result<Self, BlockListError> {
        if flat.len() % 2 != 0 {
            return Err(BlockListError::OddLength(flat.len()));
        }
        let mut blocks = Vec::with_capacity(flat.len() / 2);
        for (k, pair) in flat.chunks_exact(2).enumerate() {
            let row = to_index(pair[0], 2 * k)?;
            let col = to_index(pair[1], 2 * k + 1)?;
            blocks.push((row, col));
        }
        Ok(Self::new(blocks))
    }

    /// Every `row > col` pair over `nodes`, column by column.
    pub fn full(nodes: usize) -> Self {
        let mut blocks = Vec::with_capacity(nodes * nodes.saturating_sub(1) / 2);
        for col in 0..nodes {
            for row in (col + 1)..nodes {
                blocks.push((row, col));
            }
        }
        Self::with_nodes(blocks, nodes)
    }

    /// Every `row > col` pair, visiting nodes that appear early in `order` first.
    ///
    /// Pairs are sorted by the rank of their earlier-ranked endpoint, then by
    /// the rank of the other endpoint. `order` must be a permutation of
    /// `0..order.len()`.
    pub fn from_node_order(order: &[usize]) -> Result<Self, BlockListError> {
        let nodes = order.len();
        let mut rank = vec![usize::MAX; nodes];
        for (position, &node) in order.iter().enumerate() {
            match rank.get_mut(node) {
                Some(slot) if *slot == usize::MAX => *slot = position,
                _ => {
                    return Err(BlockListError::InvalidOrder {
                        position,
                        node,
                        len: nodes,
                    });
                }
            }
        }
        let mut blocks = Self::full(nodes).blocks;
        blocks.sort_by_key(|&(row, col)| {
            let (a, b) = (rank[row], rank[col]);
            (a.min(b), a.max(b))
        });
        Ok(Self::with_nodes(blocks, nodes))
    }

    pub fn get_block(&self, k: usize) -> Result<(usize, usize), BlockListError> {
        self.blocks
            .get(k)
            .copied()
            .ok_or(BlockListError::OutOfRange {
                index: k,
                len: self.blocks.len(),
            })
    }

    pub fn size(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn nodes(&self) -> usize {
        self.nodes
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.blocks.iter().copied()
    }

    /// Uniformly permute the visiting order in place.
    pub fn shuffle<R: rand::Rng + ?Sized>(&mut self, rng: &mut R) {
        self.blocks.shuffle(rng);
    }

    /// Check every block against the topological convention for `dim` nodes.
    pub fn validate(&self, dim: usize) -> Result<(), GraphError> {
        for &(row, col) in &self.blocks {
            for node in [row, col] {
                if node >= dim {
                    return Err(GraphError::NodeOutOfRange { node, dim });
                }
            }
            check_topological(row, col)?;
        }
        Ok(())
    }
}

fn to_index(value: i64, position: usize) -> Result<usize, BlockListError> {
    usize::try_from(value).map_err(|_| BlockListError::NegativeIndex { position, value })
}
