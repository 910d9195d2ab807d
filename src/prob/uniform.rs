use rand::{distributions::Uniform, Rng};
use rand_distr::Distribution;

use crate::error::{ensure_dimension, Error, Result};

use super::RewardPrior;

/// Uniform prior on the box `[-rmax, rmax]^dim`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformRewardPrior {
    dim: usize,
    rmax: f64,
}

impl UniformRewardPrior {
    /// **Returns** [`Error::InvalidParameter`] unless `rmax` is positive and finite
    pub fn new(dim: usize, rmax: f64) -> Result<Self> {
        if !(rmax.is_finite() && rmax > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "`rmax` must be positive and finite, got {rmax}"
            )));
        }
        Ok(Self { dim, rmax })
    }

    pub fn rmax(&self) -> f64 {
        self.rmax
    }
}

impl RewardPrior for UniformRewardPrior {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn log_density(&self, weights: &[f64]) -> Result<f64> {
        ensure_dimension(self.dim, weights.len())?;
        if weights.iter().all(|w| w.abs() <= self.rmax) {
            Ok(-(self.dim as f64) * (2.0 * self.rmax).ln())
        } else {
            Ok(f64::NEG_INFINITY)
        }
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        let dist = Uniform::new_inclusive(-self.rmax, self.rmax);
        (0..self.dim).map(|_| dist.sample(rng)).collect()
    }
}
