use rand::{distributions::Open01, Rng};

use crate::error::{ensure_dimension, Error, Result};

use super::RewardPrior;

/// Laplacian prior with a shared location and scale, favoring sparse rewards
#[derive(Debug, Clone, PartialEq)]
pub struct LaplacianRewardPrior {
    location: Vec<f64>,
    scale: f64,
}

impl LaplacianRewardPrior {
    /// **Returns** [`Error::InvalidParameter`] unless `scale` is positive and finite
    pub fn new(dim: usize, location: f64, scale: f64) -> Result<Self> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "`scale` must be positive and finite, got {scale}"
            )));
        }
        Ok(Self {
            location: vec![location; dim],
            scale,
        })
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl RewardPrior for LaplacianRewardPrior {
    fn dimension(&self) -> usize {
        self.location.len()
    }

    fn log_density(&self, weights: &[f64]) -> Result<f64> {
        ensure_dimension(self.dimension(), weights.len())?;
        let b = self.scale;
        Ok(weights
            .iter()
            .zip(&self.location)
            .map(|(w, mu)| -(2.0 * b).ln() - (w - mu).abs() / b)
            .sum())
    }

    /// Inverse-CDF sampling, `μ - b·sgn(u)·ln(1 - 2|u|)` with `u` uniform in `(-1/2, 1/2)`
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        self.location
            .iter()
            .map(|mu| {
                let u: f64 = rng.sample::<f64, _>(Open01) - 0.5;
                mu - self.scale * u.signum() * (1.0 - 2.0 * u.abs()).ln()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};
    use statrs::distribution::{Continuous, Laplace};

    use super::*;

    #[test]
    fn log_density_matches_reference() {
        let prior = LaplacianRewardPrior::new(2, 0.1, 0.3).unwrap();
        let reference = Laplace::new(0.1, 0.3).unwrap();
        let expected = reference.ln_pdf(0.4) + reference.ln_pdf(-0.2);
        assert!((prior.log_density(&[0.4, -0.2]).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn sample_median_is_location() {
        let prior = LaplacianRewardPrior::new(1, 1.0, 0.5).unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        let mut xs = (0..10_001).map(|_| prior.sample(&mut rng)[0]).collect::<Vec<_>>();
        xs.sort_by(f64::total_cmp);
        assert!((xs[5_000] - 1.0).abs() < 0.05, "median {}", xs[5_000]);
        assert!(xs.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn rejects_bad_scale() {
        assert!(LaplacianRewardPrior::new(2, 0.0, 0.0).is_err());
    }
}
