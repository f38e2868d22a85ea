use crate::correlation::CorrelationMatrix;
use crate::estimate::CcdrError;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

// Columns below this count are not worth a parallel Gram pass.
const PARALLEL_GRAM_MIN_COLS: usize = 32;

#[derive(Default, Clone, Copy)]
pub(crate) struct KahanSum {
    sum: f64,
    c: f64,
}

impl KahanSum {
    pub(crate) fn add(&mut self, value: f64) {
        let y = value - self.c;
        let t = self.sum + y;
        self.c = (t - self.sum) - y;
        self.sum = t;
    }

    pub(crate) fn sum(self) -> f64 {
        self.sum
    }
}

pub fn mean(x: ArrayView1<'_, f64>) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let mut acc = KahanSum::default();
    for &v in x.iter() {
        acc.add(v);
    }
    acc.sum() / x.len() as f64
}

pub fn inner_product(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    let mut acc = KahanSum::default();
    for (&a, &b) in x.iter().zip(y.iter()) {
        acc.add(a * b);
    }
    acc.sum()
}

pub fn vector_norm(x: ArrayView1<'_, f64>) -> f64 {
    inner_product(x, x).sqrt()
}

/// Inner product of columns `c1` and `c2` of `x`.
pub fn column_inner_product(x: ArrayView2<'_, f64>, c1: usize, c2: usize) -> f64 {
    inner_product(x.column(c1), x.column(c2))
}

/// Gram matrix `X'X`, filled column-parallel for wide inputs.
pub fn gram(x: ArrayView2<'_, f64>) -> Array2<f64> {
    let p = x.ncols();
    let mut out = Array2::<f64>::zeros((p, p));
    let fill_column = |j: usize| -> Vec<f64> {
        (0..=j).map(|i| column_inner_product(x, i, j)).collect()
    };
    let columns: Vec<Vec<f64>> = if p >= PARALLEL_GRAM_MIN_COLS {
        (0..p).into_par_iter().map(fill_column).collect()
    } else {
        (0..p).map(fill_column).collect()
    };
    for (j, col) in columns.into_iter().enumerate() {
        for (i, v) in col.into_iter().enumerate() {
            out[[i, j]] = v;
            out[[j, i]] = v;
        }
    }
    out
}

/// Pearson correlation of the columns of an `n x p` data matrix.
pub fn sample_correlation(data: ArrayView2<'_, f64>) -> Result<CorrelationMatrix, CcdrError> {
    let n = data.nrows();
    if n < 2 {
        return Err(CcdrError::InvalidInput(format!(
            "need at least two observations to form correlations, got {n}"
        )));
    }
    let mut centered = data.to_owned();
    for mut col in centered.axis_iter_mut(Axis(1)) {
        let m = mean(col.view());
        col.mapv_inplace(|v| v - m);
    }

    let mut cors = gram(centered.view());
    let scale: Vec<f64> = cors.diag().iter().map(|v| v.sqrt()).collect();
    if let Some(j) = scale.iter().position(|&s| !(s > 0.0 && s.is_finite())) {
        return Err(CcdrError::InvalidInput(format!(
            "column {j} has zero or non-finite variance"
        )));
    }
    let p = cors.nrows();
    for i in 0..p {
        for j in 0..p {
            cors[[i, j]] /= scale[i] * scale[j];
        }
        cors[[i, i]] = 1.0;
    }
    CorrelationMatrix::from_dense(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    #[test]
    fn kahan_mean_and_inner_products() {
        let x = array![1.0, 2.0, 3.0, 4.0];
        let y = array![0.5, -1.0, 0.0, 2.0];
        assert_abs_diff_eq!(mean(x.view()), 2.5, epsilon = 1e-15);
        assert_abs_diff_eq!(inner_product(x.view(), y.view()), 6.5, epsilon = 1e-15);
        assert_abs_diff_eq!(vector_norm(y.view()), 5.25_f64.sqrt(), epsilon = 1e-15);
    }

    #[test]
    fn gram_matches_ndarray_dot() {
        let x = array![[1.0, 2.0, -1.0], [0.5, -3.0, 4.0], [2.0, 0.0, 1.5]];
        let expected = x.t().dot(&x);
        let got = gram(x.view());
        for i in 0..3 {
            for j in 0..3 {
                assert_abs_diff_eq!(got[[i, j]], expected[[i, j]], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn wide_gram_takes_the_parallel_path() {
        let x = Array2::from_shape_fn((5, 40), |(i, j)| ((i * 7 + j * 3) % 11) as f64 - 5.0);
        let expected = x.t().dot(&x);
        let got = gram(x.view());
        assert_abs_diff_eq!(got[[3, 38]], expected[[3, 38]], epsilon = 1e-9);
        assert_abs_diff_eq!(got[[39, 0]], expected[[39, 0]], epsilon = 1e-9);
    }

    #[test]
    fn sample_correlation_of_collinear_columns() {
        let data = array![[1.0, 2.0, 3.0], [2.0, 4.0, 1.0], [3.0, 6.0, 2.0]];
        let cors = sample_correlation(data.view()).unwrap();
        assert_abs_diff_eq!(cors.get(0, 1), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cors.get(2, 2), 1.0, epsilon = 1e-15);
        assert_abs_diff_eq!(cors.get(0, 2), cors.get(2, 0), epsilon = 1e-15);
        assert!(cors.get(0, 2).abs() <= 1.0);
    }

    #[test]
    fn constant_column_is_rejected() {
        let data = array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0]];
        assert!(sample_correlation(data.view()).is_err());
    }
}
