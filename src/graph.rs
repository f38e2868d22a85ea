//! Sparse weighted DAG with active-set bookkeeping.
//!
//! Edges always point from a higher-indexed node to a lower-indexed one
//! (`row > col`). That fixed topological order is the only acyclicity
//! guarantee in the engine, so every mutating entry point enforces it.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Flag for edges supplied by the caller (warm starts, records, generators).
pub const FLAG_EXTERNAL: u32 = 0;
/// Flag for edges activated by the coordinate descent solver.
pub const FLAG_SOLVER: u32 = 1;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("self loop on node {0} is not allowed")]
    SelfLoop(usize),

    #[error("edge {row} -> {col} violates the topological order (source must exceed target)")]
    NotTopological { row: usize, col: usize },

    #[error("node {node} is out of range for a graph over {dim} nodes")]
    NodeOutOfRange { node: usize, dim: usize },

    #[error("noise variance for node {node} must be positive and finite, got {value}")]
    NonPositiveVariance { node: usize, value: f64 },

    #[error("edge {row} -> {col} appears more than once")]
    DuplicateEdge { row: usize, col: usize },

    #[error("malformed graph record: {0}")]
    MalformedRecord(String),
}

/// Plain transfer record for a graph, optionally tagged with its penalty value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRecord {
    pub rows: Vec<usize>,
    pub vals: Vec<f64>,
    pub sigmas: Vec<f64>,
    pub blocks: Vec<[usize; 2]>,
    pub length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lambda: Option<f64>,
}

/// One active edge as seen through [`SparseDag::edges`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub row: usize,
    pub col: usize,
    pub weight: f64,
    pub flag: u32,
}

#[derive(Debug, Clone)]
pub struct SparseDag {
    dim: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    vals: Vec<f64>,
    flags: Vec<u32>,
    sigmas: Vec<f64>,
    active_set_length: usize,
    // (row, col) -> slot in the parallel edge vectors
    slots: HashMap<(usize, usize), usize>,
    // target -> slots of its incoming edges
    incoming: Vec<Vec<usize>>,
}

impl SparseDag {
    /// Empty graph over `dim` nodes with unit noise variances.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            rows: Vec::new(),
            cols: Vec::new(),
            vals: Vec::new(),
            flags: Vec::new(),
            sigmas: vec![1.0; dim],
            active_set_length: 0,
            slots: HashMap::new(),
            incoming: vec![Vec::new(); dim],
        }
    }

    /// Empty graph whose noise variances are taken from `sigmas`.
    pub fn with_sigmas(sigmas: Vec<f64>) -> Result<Self, GraphError> {
        for (node, &value) in sigmas.iter().enumerate() {
            check_variance(node, value)?;
        }
        let mut graph = Self::new(sigmas.len());
        graph.sigmas = sigmas;
        Ok(graph)
    }

    /// Rebuild a graph from a transfer record, e.g. a warm start.
    ///
    /// The dimension is taken from `sigmas`. Explicit zero weights are kept
    /// as slots until the next full recount.
    pub fn from_record(record: &GraphRecord) -> Result<Self, GraphError> {
        let n = record.blocks.len();
        if record.rows.len() != n || record.vals.len() != n {
            return Err(GraphError::MalformedRecord(format!(
                "rows ({}), vals ({}) and blocks ({}) must have equal length",
                record.rows.len(),
                record.vals.len(),
                n
            )));
        }
        if record.length != n {
            return Err(GraphError::MalformedRecord(format!(
                "length field {} does not match {} stored edges",
                record.length, n
            )));
        }

        let mut graph = Self::with_sigmas(record.sigmas.clone())?;
        for (k, block) in record.blocks.iter().enumerate() {
            let [row, col] = *block;
            if record.rows[k] != row {
                return Err(GraphError::MalformedRecord(format!(
                    "rows[{k}] = {} disagrees with blocks[{k}] = ({row}, {col})",
                    record.rows[k]
                )));
            }
            if !record.vals[k].is_finite() {
                return Err(GraphError::MalformedRecord(format!(
                    "vals[{k}] is not finite"
                )));
            }
            if graph.slots.contains_key(&(row, col)) {
                return Err(GraphError::DuplicateEdge { row, col });
            }
            graph.add_block(row, col, record.vals[k], FLAG_EXTERNAL)?;
        }
        Ok(graph)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn active_set_size(&self) -> usize {
        self.active_set_length
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn cols(&self) -> &[usize] {
        &self.cols
    }

    pub fn vals(&self) -> &[f64] {
        &self.vals
    }

    pub fn sigmas(&self) -> &[f64] {
        &self.sigmas
    }

    pub fn sigma(&self, node: usize) -> f64 {
        self.sigmas[node]
    }

    pub fn set_sigma(&mut self, node: usize, value: f64) -> Result<(), GraphError> {
        self.check_node(node)?;
        check_variance(node, value)?;
        self.sigmas[node] = value;
        Ok(())
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.slots.contains_key(&(row, col))
    }

    /// Weight of `row -> col`, zero when the edge is inactive.
    pub fn weight(&self, row: usize, col: usize) -> f64 {
        self.slots
            .get(&(row, col))
            .map(|&slot| self.vals[slot])
            .unwrap_or(0.0)
    }

    pub fn flag(&self, row: usize, col: usize) -> Option<u32> {
        self.slots.get(&(row, col)).map(|&slot| self.flags[slot])
    }

    /// Incoming edges of `target` as `(source, weight)` pairs.
    pub fn parents(&self, target: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.incoming[target]
            .iter()
            .map(move |&slot| (self.rows[slot], self.vals[slot]))
    }

    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        (0..self.rows.len()).map(move |slot| Edge {
            row: self.rows[slot],
            col: self.cols[slot],
            weight: self.vals[slot],
            flag: self.flags[slot],
        })
    }

    /// Activate or overwrite the edge `row -> col`.
    pub fn add_block(
        &mut self,
        row: usize,
        col: usize,
        weight: f64,
        flag: u32,
    ) -> Result<(), GraphError> {
        self.check_edge(row, col)?;
        if let Some(&slot) = self.slots.get(&(row, col)) {
            self.vals[slot] = weight;
            self.flags[slot] = flag;
            return Ok(());
        }
        let slot = self.rows.len();
        self.rows.push(row);
        self.cols.push(col);
        self.vals.push(weight);
        self.flags.push(flag);
        self.slots.insert((row, col), slot);
        self.incoming[col].push(slot);
        self.active_set_length += 1;
        Ok(())
    }

    /// Deactivate `row -> col`, returning its last weight.
    pub fn remove_block(&mut self, row: usize, col: usize) -> Option<f64> {
        let slot = self.slots.remove(&(row, col))?;
        let removed = self.vals[slot];
        detach(&mut self.incoming[col], slot);

        let last = self.rows.len() - 1;
        if slot != last {
            let (moved_row, moved_col) = (self.rows[last], self.cols[last]);
            self.slots.insert((moved_row, moved_col), slot);
            for entry in self.incoming[moved_col].iter_mut() {
                if *entry == last {
                    *entry = slot;
                }
            }
        }
        self.rows.swap_remove(slot);
        self.cols.swap_remove(slot);
        self.vals.swap_remove(slot);
        self.flags.swap_remove(slot);
        self.active_set_length -= 1;
        Some(removed)
    }

    /// Set the weight of `row -> col`, removing the edge when `weight == 0`.
    pub(crate) fn update_weight(
        &mut self,
        row: usize,
        col: usize,
        weight: f64,
    ) -> Result<(), GraphError> {
        if weight == 0.0 {
            self.remove_block(row, col);
            return Ok(());
        }
        let flag = self.flag(row, col).unwrap_or(FLAG_SOLVER);
        self.add_block(row, col, weight, flag)
    }

    /// Recount the active set.
    ///
    /// With `force_full`, zero-weight slots left behind by external mutation
    /// paths are dropped and every index is rebuilt from `rows`/`cols`.
    pub fn recompute_active_set_size(&mut self, force_full: bool) -> usize {
        if force_full {
            let keep: Vec<usize> = (0..self.rows.len())
                .filter(|&slot| self.vals[slot] != 0.0)
                .collect();
            if keep.len() != self.rows.len() {
                log::debug!(
                    "full recount dropped {} zero-weight slots",
                    self.rows.len() - keep.len()
                );
            }
            self.rows = keep.iter().map(|&s| self.rows[s]).collect();
            self.cols = keep.iter().map(|&s| self.cols[s]).collect();
            self.vals = keep.iter().map(|&s| self.vals[s]).collect();
            self.flags = keep.iter().map(|&s| self.flags[s]).collect();
            self.rebuild_index();
        }
        self.active_set_length = self.rows.len();
        self.active_set_length
    }

    /// Dense `dim x dim` weight matrix with `B[[row, col]] = weight`.
    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::<f64>::zeros((self.dim, self.dim));
        for edge in self.edges() {
            dense[[edge.row, edge.col]] = edge.weight;
        }
        dense
    }

    /// Serialize to a transfer record; `lambda < 0` omits the penalty field.
    pub fn to_record(&self, lambda: f64) -> GraphRecord {
        GraphRecord {
            rows: self.rows.clone(),
            vals: self.vals.clone(),
            sigmas: self.sigmas.clone(),
            blocks: self
                .rows
                .iter()
                .zip(&self.cols)
                .map(|(&r, &c)| [r, c])
                .collect(),
            length: self.active_set_length,
            lambda: (lambda >= 0.0).then_some(lambda),
        }
    }

    fn rebuild_index(&mut self) {
        self.slots.clear();
        for list in self.incoming.iter_mut() {
            list.clear();
        }
        for slot in 0..self.rows.len() {
            self.slots.insert((self.rows[slot], self.cols[slot]), slot);
            self.incoming[self.cols[slot]].push(slot);
        }
    }

    fn check_node(&self, node: usize) -> Result<(), GraphError> {
        if node >= self.dim {
            return Err(GraphError::NodeOutOfRange {
                node,
                dim: self.dim,
            });
        }
        Ok(())
    }

    fn check_edge(&self, row: usize, col: usize) -> Result<(), GraphError> {
        self.check_node(row)?;
        self.check_node(col)?;
        check_topological(row, col)
    }
}

/// Reject self loops and edges pointing from a lower to a higher index.
pub fn check_topological(row: usize, col: usize) -> Result<(), GraphError> {
    if row == col {
        return Err(GraphError::SelfLoop(row));
    }
    if col > row {
        return Err(GraphError::NotTopological { row, col });
    }
    Ok(())
}

fn check_variance(node: usize, value: f64) -> Result<(), GraphError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(GraphError::NonPositiveVariance { node, value });
    }
    Ok(())
}

fn detach(list: &mut Vec<usize>, slot: usize) {
    if let Some(pos) = list.iter().position(|&s| s == slot) {
        list.swap_remove(pos);
    }
}
