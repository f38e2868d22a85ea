use crate::estimate::CcdrError;
use ndarray::{Array1, Array2, ArrayView2};

const SYMMETRY_TOLERANCE: f64 = 1e-10;

/// Length of the packed upper triangle (diagonal included) of a `p x p` matrix.
pub fn packed_len(p: usize) -> usize {
    p * (p + 1) / 2
}

/// Position of `(i, j)`, `i <= j`, in the packed upper triangle.
#[inline]
pub fn packed_index(i: usize, j: usize) -> usize {
    debug_assert!(i <= j);
    i + j * (j + 1) / 2
}

/// Symmetric correlation matrix; immutable for the duration of a solve.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    data: Array2<f64>,
}

impl CorrelationMatrix {
    /// Unpack a column-major upper triangle over `ncol` nodes.
    pub fn from_packed(cors: &[f64], ncol: usize) -> Result<Self, CcdrError> {
        let expected = packed_len(ncol);
        if cors.len() != expected {
            return Err(CcdrError::DimensionMismatch {
                what: "packed correlation vector",
                expected,
                found: cors.len(),
            });
        }
        if let Some(pos) = cors.iter().position(|v| !v.is_finite()) {
            return Err(CcdrError::InvalidInput(format!(
                "packed correlation entry {pos} is not finite"
            )));
        }

        let mut data = Array2::<f64>::zeros((ncol, ncol));
        for j in 0..ncol {
            for i in 0..=j {
                let v = cors[packed_index(i, j)];
                data[[i, j]] = v;
                data[[j, i]] = v;
            }
        }
        Ok(Self { data })
    }

    /// Unpack, inferring the node count from the vector length.
    pub fn from_packed_infer(cors: &[f64]) -> Result<Self, CcdrError> {
        let p = infer_dim(cors.len()).ok_or_else(|| {
            CcdrError::InvalidInput(format!(
                "{} values cannot form a packed upper triangle",
                cors.len()
            ))
        })?;
        Self::from_packed(cors, p)
    }

    /// Wrap a dense matrix, checking that it is square and symmetric.
    pub fn from_dense(data: Array2<f64>) -> Result<Self, CcdrError> {
        let (n, m) = data.dim();
        if n != m {
            return Err(CcdrError::DimensionMismatch {
                what: "correlation matrix columns",
                expected: n,
                found: m,
            });
        }
        for i in 0..n {
            for j in (i + 1)..n {
                if (data[[i, j]] - data[[j, i]]).abs() > SYMMETRY_TOLERANCE {
                    return Err(CcdrError::InvalidInput(format!(
                        "correlation matrix is not symmetric at ({i}, {j})"
                    )));
                }
            }
        }
        Ok(Self { data })
    }

    pub fn dim(&self) -> usize {
        self.data.nrows()
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[[i, j]]
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn to_packed(&self) -> Vec<f64> {
        let p = self.dim();
        let mut out = vec![0.0; packed_len(p)];
        for j in 0..p {
            for i in 0..=j {
                out[packed_index(i, j)] = self.data[[i, j]];
            }
        }
        out
    }

    /// Largest absolute off-diagonal entry of every column.
    pub fn max_abs_by_column(&self) -> Array1<f64> {
        let p = self.dim();
        let mut maxcor = Array1::<f64>::zeros(p);
        for j in 0..p {
            for i in 0..p {
                if i != j {
                    maxcor[j] = maxcor[j].max(self.data[[i, j]].abs());
                }
            }
        }
        maxcor
    }

    /// Nodes sorted by decreasing maximal absolute correlation.
    pub fn node_order(&self) -> Vec<usize> {
        order_decreasing(self.max_abs_by_column().as_slice().unwrap_or(&[]))
    }
}

fn infer_dim(len: usize) -> Option<usize> {
    // p(p+1)/2 = len  =>  p = (sqrt(8 len + 1) - 1) / 2
    let p = ((((8 * len + 1) as f64).sqrt() - 1.0) / 2.0).round() as usize;
    (packed_len(p) == len).then_some(p)
}

/// Indices that sort `values` in decreasing order; ties keep ascending index.
pub fn order_decreasing(values: &[f64]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..values.len()).collect();
    idx.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    idx
}

/// Permute `items` so that `out[k] = items[order[k]]`.
pub fn reorder<T: Clone>(items: &[T], order: &[usize]) -> Vec<T> {
    order.iter().map(|&k| items[k].clone()).collect()
}
