use std::f64::consts::PI;

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{ensure_dimension, Error, Result};

use super::RewardPrior;

/// Gaussian prior with diagonal covariance
#[derive(Debug, Clone)]
pub struct GaussianRewardPrior {
    mean: Vec<f64>,
    sigma: Vec<f64>,
    normals: Vec<Normal<f64>>,
}

impl GaussianRewardPrior {
    /// Isotropic prior with the same `mean` and `sigma` in every dimension
    pub fn new(dim: usize, mean: f64, sigma: f64) -> Result<Self> {
        Self::from_vectors(vec![mean; dim], vec![sigma; dim])
    }

    /// Prior with per-dimension means and standard deviations
    ///
    /// **Returns** [`Error::InvalidDimension`] if the vectors differ in length and
    /// [`Error::InvalidParameter`] unless every `sigma` is positive and finite
    pub fn from_vectors(mean: Vec<f64>, sigma: Vec<f64>) -> Result<Self> {
        ensure_dimension(mean.len(), sigma.len())?;
        let normals = mean
            .iter()
            .zip(&sigma)
            .map(|(&m, &s)| {
                if !(s.is_finite() && s > 0.0) {
                    return Err(Error::InvalidParameter(format!(
                        "`sigma` must be positive and finite, got {s}"
                    )));
                }
                Normal::new(m, s).map_err(|e| Error::InvalidParameter(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            mean,
            sigma,
            normals,
        })
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn sigma(&self) -> &[f64] {
        &self.sigma
    }
}

impl RewardPrior for GaussianRewardPrior {
    fn dimension(&self) -> usize {
        self.mean.len()
    }

    fn log_density(&self, weights: &[f64]) -> Result<f64> {
        ensure_dimension(self.dimension(), weights.len())?;
        Ok(weights
            .iter()
            .zip(self.mean.iter().zip(&self.sigma))
            .map(|(w, (m, s))| {
                let z = (w - m) / s;
                -0.5 * z * z - s.ln() - 0.5 * (2.0 * PI).ln()
            })
            .sum())
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        self.normals.iter().map(|n| n.sample(rng)).collect()
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};
    use statrs::distribution::{Continuous, Normal as StatNormal};

    use super::*;

    #[test]
    fn log_density_matches_reference() {
        let prior = GaussianRewardPrior::from_vectors(vec![0.0, 1.0], vec![0.15, 2.0]).unwrap();
        let w = [0.1, -0.5];
        let expected = StatNormal::new(0.0, 0.15).unwrap().ln_pdf(0.1)
            + StatNormal::new(1.0, 2.0).unwrap().ln_pdf(-0.5);
        assert!((prior.log_density(&w).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn density_peaks_at_mean() {
        let prior = GaussianRewardPrior::new(3, 0.0, 0.15).unwrap();
        let at_mean = prior.log_density(&[0.0; 3]).unwrap();
        let away = prior.log_density(&[0.1, 0.0, 0.0]).unwrap();
        assert!(at_mean > away);
    }

    #[test]
    fn construction_errors() {
        assert!(matches!(
            GaussianRewardPrior::from_vectors(vec![0.0; 3], vec![1.0; 2]),
            Err(Error::InvalidDimension { .. })
        ));
        assert!(matches!(
            GaussianRewardPrior::new(2, 0.0, 0.0),
            Err(Error::InvalidParameter(_))
        ));
        let prior = GaussianRewardPrior::new(3, 0.0, 1.0).unwrap();
        assert!(matches!(
            prior.log_density(&[0.0; 2]),
            Err(Error::InvalidDimension {
                expected: 3,
                found: 2
            })
        ));
    }

    #[test]
    fn samples_have_prior_moments() {
        let prior = GaussianRewardPrior::new(1, 2.0, 0.5).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let n = 20_000;
        let xs = (0..n).map(|_| prior.sample(&mut rng)[0]).collect::<Vec<_>>();
        let mean = xs.iter().sum::<f64>() / n as f64;
        let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        assert!((mean - 2.0).abs() < 0.02, "mean {mean}");
        assert!((var.sqrt() - 0.5).abs() < 0.02, "sd {}", var.sqrt());
    }

    #[test]
    fn perturb_stays_close() {
        let prior = GaussianRewardPrior::new(3, 0.0, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let w = [0.2, -0.1, 0.4];
        let candidate = prior.perturb(&w, 0.01, &mut rng);
        assert_eq!(candidate.len(), 3);
        assert_ne!(candidate, w);
        assert!(candidate.iter().zip(w).all(|(c, w)| (c - w).abs() < 0.1));
    }
}
