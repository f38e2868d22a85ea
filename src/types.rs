use crate::estimate::CcdrError;
use crate::penalty::PenaltyKind;
use serde::{Deserialize, Serialize};

pub fn default_gamma() -> f64 {
    2.0
}

pub fn default_eps() -> f64 {
    1e-4
}

pub fn default_max_iters() -> usize {
    100
}

/// Tuning parameters for the concave coordinate descent solver.
///
/// Expected ranges (not enforced): `gamma > 1` for MCP and `gamma > 2` for
/// SCAD, `eps > 0`, `max_iters >= 1`, `alpha >= 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CcdrConfig {
    /// Concavity of the penalty.
    #[serde(default = "default_gamma")]
    pub gamma: f64,
    /// Tolerance on the largest absolute weight change in one sweep.
    #[serde(default = "default_eps")]
    pub eps: f64,
    /// Sweep cap per penalty value.
    #[serde(default = "default_max_iters")]
    pub max_iters: usize,
    /// Ridge weight pulling each noise variance toward one.
    #[serde(default)]
    pub alpha: f64,
    #[serde(default)]
    pub penalty: PenaltyKind,
    /// Reshuffle the candidate blocks before every sweep after the first.
    #[serde(default)]
    pub shuffle_blocks: bool,
    #[serde(default)]
    pub seed: u64,
    /// Stop a path once a solution has more than `ratio * P` edges.
    #[serde(default)]
    pub max_edges_ratio: Option<f64>,
}

impl Default for CcdrConfig {
    fn default() -> Self {
        Self {
            gamma: default_gamma(),
            eps: default_eps(),
            max_iters: default_max_iters(),
            alpha: 0.0,
            penalty: PenaltyKind::default(),
            shuffle_blocks: false,
            seed: 0,
            max_edges_ratio: None,
        }
    }
}

impl CcdrConfig {
    /// Read the positional `{gamma, eps, maxIters, alpha, reserved}` vector.
    ///
    /// The reserved slot is optional and ignored.
    pub fn from_params(params: &[f64]) -> Result<Self, CcdrError> {
        if !(params.len() == 4 || params.len() == 5) {
            return Err(CcdrError::InvalidParameters(format!(
                "expected 4 or 5 tuning values (gamma, eps, maxIters, alpha[, reserved]), got {}",
                params.len()
            )));
        }
        let max_iters = params[2];
        if !(max_iters.is_finite() && max_iters >= 0.0 && max_iters.fract() == 0.0) {
            return Err(CcdrError::InvalidParameters(format!(
                "maxIters must be a non-negative integer, got {max_iters}"
            )));
        }
        Ok(Self {
            gamma: params[0],
            eps: params[1],
            max_iters: max_iters as usize,
            alpha: params[3],
            ..Self::default()
        })
    }

    pub fn to_params(&self) -> [f64; 5] {
        [self.gamma, self.eps, self.max_iters as f64, self.alpha, 0.0]
    }

    pub fn with_penalty(mut self, penalty: PenaltyKind) -> Self {
        self.penalty = penalty;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_vector_maps_to_named_fields() {
        let cfg = CcdrConfig::from_params(&[2.0, 1e-2, 5.0, 3.0, 0.0]).unwrap();
        assert_eq!(cfg.gamma, 2.0);
        assert_eq!(cfg.eps, 1e-2);
        assert_eq!(cfg.max_iters, 5);
        assert_eq!(cfg.alpha, 3.0);
        assert_eq!(cfg.penalty, PenaltyKind::Mcp);
        assert_eq!(cfg.to_params(), [2.0, 1e-2, 5.0, 3.0, 0.0]);

        let four = CcdrConfig::from_params(&[2.0, 1e-2, 5.0, 3.0]).unwrap();
        assert_eq!(four, cfg);
    }

    #[test]
    fn malformed_vectors_are_rejected() {
        assert!(CcdrConfig::from_params(&[2.0, 1e-2, 5.0]).is_err());
        assert!(CcdrConfig::from_params(&[2.0, 1e-2, 2.5, 0.0]).is_err());
        assert!(CcdrConfig::from_params(&[2.0, 1e-2, f64::NAN, 0.0]).is_err());
    }

    #[test]
    fn serde_fills_defaults() {
        let cfg: CcdrConfig =
            serde_json::from_str(r#"{"gamma": 3.0, "penalty": "lasso"}"#).unwrap();
        assert_eq!(cfg.gamma, 3.0);
        assert_eq!(cfg.eps, default_eps());
        assert_eq!(cfg.max_iters, default_max_iters());
        assert_eq!(cfg.penalty, PenaltyKind::Lasso);
        assert_eq!(cfg.max_edges_ratio, None);
    }
}
