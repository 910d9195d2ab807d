use std::sync::Arc;

use crate::error::{ensure_dimension, Error, Result};

/// A reward that is linear in per-state features, `R(s) = clamp(wᵀφ(s), -rmax, rmax)`
///
/// The feature table is shared between clones, so re-weighting a reward is cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearReward {
    features: Arc<Vec<Vec<f64>>>,
    weights: Vec<f64>,
    rmax: f64,
}

impl LinearReward {
    /// Build a reward from a `num_states x dimension` feature table
    ///
    /// ### Parameters
    /// - `features` - one feature vector per state, each as long as `weights`
    /// - `weights` - the initial weight vector
    /// - `rmax` - bound on the magnitude of the reward, must be positive
    pub fn new(features: Vec<Vec<f64>>, weights: Vec<f64>, rmax: f64) -> Result<Self> {
        if !(rmax.is_finite() && rmax > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "`rmax` must be positive and finite, got {rmax}"
            )));
        }
        for phi in &features {
            ensure_dimension(weights.len(), phi.len())?;
        }
        Ok(Self {
            features: Arc::new(features),
            weights,
            rmax,
        })
    }

    /// Number of weights
    pub fn dimension(&self) -> usize {
        self.weights.len()
    }

    /// Number of states covered by the feature table
    pub fn num_states(&self) -> usize {
        self.features.len()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn rmax(&self) -> f64 {
        self.rmax
    }

    /// Feature vector of `state`
    pub fn features(&self, state: usize) -> &[f64] {
        &self.features[state]
    }

    /// Replace the weight vector
    ///
    /// **Returns** [`Error::InvalidDimension`] if `weights` has the wrong length, in which case
    /// the current weights are left untouched
    pub fn update_parameters(&mut self, weights: &[f64]) -> Result<()> {
        ensure_dimension(self.dimension(), weights.len())?;
        self.weights.copy_from_slice(weights);
        Ok(())
    }

    /// Copy of this reward carrying different weights
    pub fn with_weights(&self, weights: &[f64]) -> Result<Self> {
        let mut reward = self.clone();
        reward.update_parameters(weights)?;
        Ok(reward)
    }

    /// Reward collected in `state`
    pub fn evaluate(&self, state: usize) -> f64 {
        let r: f64 = self.features[state]
            .iter()
            .zip(&self.weights)
            .map(|(phi, w)| phi * w)
            .sum();
        r.clamp(-self.rmax, self.rmax)
    }
}
