mod gaussian;
mod laplace;
mod uniform;

pub use gaussian::GaussianRewardPrior;
pub use laplace::LaplacianRewardPrior;
pub use uniform::UniformRewardPrior;

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::Result;

/// Prior distribution over reward weight vectors
pub trait RewardPrior {
    /// Length of the weight vectors the prior is defined on
    fn dimension(&self) -> usize;

    /// Log-density of `weights`, `-inf` outside the support
    ///
    /// **Returns** [`Error::InvalidDimension`](crate::Error::InvalidDimension) on a length mismatch
    fn log_density(&self, weights: &[f64]) -> Result<f64>;

    /// Draw a weight vector from the prior
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64>;

    /// A nearby candidate: `weights` plus independent Gaussian noise with standard deviation `delta`
    ///
    /// **Panics** if `delta` is negative or not finite
    fn perturb<R: Rng + ?Sized>(&self, weights: &[f64], delta: f64, rng: &mut R) -> Vec<f64> {
        let noise = Normal::new(0.0, delta).expect("`delta` is a valid standard deviation");
        weights.iter().map(|w| w + noise.sample(rng)).collect()
    }
}
