//! Sparsity penalties and their coordinate-wise thresholding rules.
//!
//! Every rule solves the scalar problem
//!
//! ```text
//! argmin_b  1/2 (b - z)^2 + s * p(|b|; lambda, gamma)
//! ```
//!
//! where `s > 0` is the coordinate's noise scale. Closed forms are used
//! whenever the scalar problem is convex; otherwise the rule compares the
//! stationary candidates by objective value.

use serde::{Deserialize, Serialize};

/// Soft-thresholding operator `sign(z) * max(|z| - t, 0)`.
#[inline]
pub fn soft_threshold(z: f64, t: f64) -> f64 {
    if z > t {
        z - t
    } else if z < -t {
        z + t
    } else {
        0.0
    }
}

pub trait Penalty {
    fn name(&self) -> &'static str;

    /// Penalty value at weight `b`.
    fn value(&self, b: f64, lambda: f64, gamma: f64) -> f64;

    /// Minimiser of `1/2 (b - z)^2 + s * value(b)`.
    fn threshold(&self, z: f64, lambda: f64, gamma: f64, s: f64) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PenaltyKind {
    #[default]
    Mcp,
    Scad,
    Lasso,
}

impl PenaltyKind {
    pub fn as_penalty(self) -> &'static dyn Penalty {
        match self {
            Self::Mcp => &Mcp,
            Self::Scad => &Scad,
            Self::Lasso => &Lasso,
        }
    }
}

/// Minimax concave penalty.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mcp;

/// Smoothly clipped absolute deviation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scad;

/// Plain L1 penalty; `gamma` is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lasso;

impl Penalty for Mcp {
    fn name(&self) -> &'static str {
        "mcp"
    }

    fn value(&self, b: f64, lambda: f64, gamma: f64) -> f64 {
        let a = b.abs();
        if a <= gamma * lambda {
            lambda * a - 0.5 * a * a / gamma
        } else {
            0.5 * gamma * lambda * lambda
        }
    }

    fn threshold(&self, z: f64, lambda: f64, gamma: f64, s: f64) -> f64 {
        if gamma > s {
            if z.abs() > gamma * lambda {
                return z;
            }
            return soft_threshold(z, s * lambda) / (1.0 - s / gamma);
        }
        let edge = z.signum() * gamma * lambda;
        best_candidate(self, z, lambda, gamma, s, &[0.0, edge, z])
    }
}

impl Penalty for Scad {
    fn name(&self) -> &'static str {
        "scad"
    }

    fn value(&self, b: f64, lambda: f64, gamma: f64) -> f64 {
        let a = b.abs();
        if a <= lambda {
            lambda * a
        } else if a <= gamma * lambda {
            (2.0 * gamma * lambda * a - a * a - lambda * lambda) / (2.0 * (gamma - 1.0))
        } else {
            0.5 * lambda * lambda * (gamma + 1.0)
        }
    }

    fn threshold(&self, z: f64, lambda: f64, gamma: f64, s: f64) -> f64 {
        let a = z.abs();
        if gamma - 1.0 > s {
            if a > gamma * lambda {
                return z;
            }
            if a <= (1.0 + s) * lambda {
                return soft_threshold(z, s * lambda);
            }
            let shrink = s * gamma * lambda / (gamma - 1.0);
            return soft_threshold(z, shrink) / (1.0 - s / (gamma - 1.0));
        }
        let sign = z.signum();
        let inner = soft_threshold(z, s * lambda).clamp(-lambda, lambda);
        best_candidate(
            self,
            z,
            lambda,
            gamma,
            s,
            &[0.0, inner, sign * lambda, sign * gamma * lambda, z],
        )
    }
}

impl Penalty for Lasso {
    fn name(&self) -> &'static str {
        "lasso"
    }

    fn value(&self, b: f64, lambda: f64, _gamma: f64) -> f64 {
        lambda * b.abs()
    }

    fn threshold(&self, z: f64, lambda: f64, _gamma: f64, s: f64) -> f64 {
        soft_threshold(z, s * lambda)
    }
}

fn scalar_objective<P: Penalty + ?Sized>(
    penalty: &P,
    b: f64,
    z: f64,
    lambda: f64,
    gamma: f64,
    s: f64,
) -> f64 {
    0.5 * (b - z) * (b - z) + s * penalty.value(b, lambda, gamma)
}

// Non-convex scalar problem: the minimiser is one of the candidates (zero,
// region boundaries, the unpenalised point). Ties go to the earlier one.
fn best_candidate<P: Penalty + ?Sized>(
    penalty: &P,
    z: f64,
    lambda: f64,
    gamma: f64,
    s: f64,
    candidates: &[f64],
) -> f64 {
    let mut best = 0.0;
    let mut best_obj = f64::INFINITY;
    for &b in candidates {
        let obj = scalar_objective(penalty, b, z, lambda, gamma, s);
        if obj < best_obj {
            best = b;
            best_obj = obj;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn brute_force<P: Penalty>(p: &P, z: f64, lambda: f64, gamma: f64, s: f64) -> f64 {
        let mut best = 0.0;
        let mut best_obj = f64::INFINITY;
        let steps = 200_000;
        for k in 0..=steps {
            let b = -4.0 + 8.0 * (k as f64) / (steps as f64);
            let obj = scalar_objective(p, b, z, lambda, gamma, s);
            if obj < best_obj {
                best = b;
                best_obj = obj;
            }
        }
        best
    }

    #[test]
    fn soft_threshold_shrinks_toward_zero() {
        assert_eq!(soft_threshold(0.3, 0.5), 0.0);
        assert_abs_diff_eq!(soft_threshold(0.8, 0.5), 0.3, epsilon = 1e-15);
        assert_abs_diff_eq!(soft_threshold(-0.8, 0.5), -0.3, epsilon = 1e-15);
    }

    #[test]
    fn mcp_zero_inside_threshold_identity_beyond_gamma_lambda() {
        let (lambda, gamma) = (0.5, 3.0);
        assert_eq!(Mcp.threshold(0.4, lambda, gamma, 1.0), 0.0);
        assert_eq!(Mcp.threshold(-0.5, lambda, gamma, 1.0), 0.0);
        assert_eq!(Mcp.threshold(1.6, lambda, gamma, 1.0), 1.6);
        assert_abs_diff_eq!(
            Mcp.threshold(0.8, lambda, gamma, 1.0),
            0.3 * 1.5,
            epsilon = 1e-12
        );
        // continuous at gamma * lambda
        let inside = Mcp.threshold(1.5 - 1e-9, lambda, gamma, 1.0);
        assert_abs_diff_eq!(inside, 1.5, epsilon = 1e-6);
    }

    #[test]
    fn scad_is_continuous_at_breakpoints() {
        let (lambda, gamma) = (0.4, 3.7);
        let s = 1.0;
        let first = (1.0 + s) * lambda;
        assert_abs_diff_eq!(
            Scad.threshold(first, lambda, gamma, s),
            Scad.threshold(first + 1e-9, lambda, gamma, s),
            epsilon = 1e-6
        );
        let second = gamma * lambda;
        assert_abs_diff_eq!(
            Scad.threshold(second, lambda, gamma, s),
            second,
            epsilon = 1e-9
        );
        assert_eq!(Scad.threshold(0.3, lambda, gamma, s), 0.0);
    }

    #[test]
    fn zero_lambda_returns_the_unpenalised_solution() {
        for kind in [PenaltyKind::Mcp, PenaltyKind::Scad, PenaltyKind::Lasso] {
            let p = kind.as_penalty();
            assert_eq!(p.threshold(0.9, 0.0, 3.0, 0.7), 0.9, "{}", p.name());
            assert_eq!(p.threshold(-0.2, 0.0, 3.0, 0.7), -0.2, "{}", p.name());
        }
    }

    #[test]
    fn closed_forms_match_brute_force_minimisation() {
        let cases = [
            (0.75, 0.3, 2.5, 0.8),
            (-1.1, 0.5, 3.0, 0.6),
            (0.45, 0.25, 2.2, 1.0),
            (0.6, 0.3, 1.5, 2.0),
            (0.5, 0.3, 1.5, 2.0),
        ];
        for &(z, lambda, gamma, s) in &cases {
            assert_abs_diff_eq!(
                Mcp.threshold(z, lambda, gamma, s),
                brute_force(&Mcp, z, lambda, gamma, s),
                epsilon = 1e-3
            );
            assert_abs_diff_eq!(
                Lasso.threshold(z, lambda, gamma, s),
                brute_force(&Lasso, z, lambda, gamma, s),
                epsilon = 1e-3
            );
        }
        for &(z, lambda, gamma, s) in &[
            (0.9, 0.3, 3.7, 0.8),
            (-0.7, 0.2, 3.7, 1.0),
            (0.8, 0.2, 2.5, 2.0),
        ] {
            assert_abs_diff_eq!(
                Scad.threshold(z, lambda, gamma, s),
                brute_force(&Scad, z, lambda, gamma, s),
                epsilon = 1e-3
            );
        }
    }

    #[test]
    fn penalty_kind_deserialises_lowercase() {
        let kind: PenaltyKind = serde_json::from_str("\"scad\"").unwrap();
        assert_eq!(kind, PenaltyKind::Scad);
    }
}
