use std::ops::Index;

use rand::{
    distributions::{Distribution, WeightedIndex},
    Rng,
};

use crate::{
    env::PROBABILITY_TOLERANCE,
    error::{Error, Result},
    util::log_sum_exp,
};

/// A mapping from states to actions that can be rolled out
pub trait Policy {
    /// Number of states the policy covers
    fn num_states(&self) -> usize;

    /// Draw the action taken in `state`
    fn sample_action<R: Rng + ?Sized>(&self, state: usize, rng: &mut R) -> usize;
}

/// A policy that always takes the same action in a given state
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DeterministicPolicy {
    actions: Vec<usize>,
}

impl DeterministicPolicy {
    pub fn new(actions: Vec<usize>) -> Self {
        Self { actions }
    }

    /// The action taken in `state`
    pub fn action(&self, state: usize) -> usize {
        self.actions[state]
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.actions
    }

    /// Number of states in which the two policies disagree
    ///
    /// **Panics** if the policies cover a different number of states
    pub fn mismatches(&self, other: &DeterministicPolicy) -> usize {
        assert_eq!(self.len(), other.len(), "policies cover different state sets");
        self.actions
            .iter()
            .zip(&other.actions)
            .filter(|(a, b)| a != b)
            .count()
    }
}

impl Index<usize> for DeterministicPolicy {
    type Output = usize;

    fn index(&self, state: usize) -> &Self::Output {
        &self.actions[state]
    }
}

impl From<Vec<usize>> for DeterministicPolicy {
    fn from(actions: Vec<usize>) -> Self {
        Self::new(actions)
    }
}

impl Policy for DeterministicPolicy {
    fn num_states(&self) -> usize {
        self.actions.len()
    }

    fn sample_action<R: Rng + ?Sized>(&self, state: usize, _rng: &mut R) -> usize {
        self.actions[state]
    }
}

/// A policy that draws actions from a per-state distribution
#[derive(Debug, Clone)]
pub struct StochasticPolicy {
    probs: Vec<Vec<f64>>,
    samplers: Vec<WeightedIndex<f64>>,
}

impl StochasticPolicy {
    /// Build a policy from `probs[s][a]`
    ///
    /// **Returns** [`Error::InvalidParameter`] if a row is not a probability distribution
    pub fn new(probs: Vec<Vec<f64>>) -> Result<Self> {
        let samplers = probs
            .iter()
            .enumerate()
            .map(|(state, row)| {
                let total: f64 = row.iter().sum();
                if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
                    return Err(Error::InvalidParameter(format!(
                        "action probabilities of state {state} sum to {total}"
                    )));
                }
                WeightedIndex::new(row).map_err(|e| {
                    Error::InvalidParameter(format!("state {state}: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { probs, samplers })
    }

    /// Softmax (Boltzmann) policy over Q-values, `π(a|s) ∝ exp(β·Q(s,a))`
    ///
    /// Larger `beta` concentrates the mass on the greedy action.
    ///
    /// **Panics** if `beta` is not positive
    ///
    /// **Returns** [`Error::InvalidParameter`] if a row holds non-finite values
    pub fn boltzmann(q_values: &[Vec<f64>], beta: f64) -> Result<Self> {
        assert!(beta > 0.0, "`beta` must be positive");
        let probs = q_values
            .iter()
            .map(|q| {
                let norm = log_sum_exp(q.iter().map(|x| beta * x));
                q.iter().map(|x| (beta * x - norm).exp()).collect::<Vec<_>>()
            })
            .collect();
        Self::new(probs)
    }

    /// Probability of taking `action` in `state`
    pub fn prob(&self, state: usize, action: usize) -> f64 {
        self.probs[state][action]
    }

    /// The action distribution of `state`
    pub fn distribution(&self, state: usize) -> &[f64] {
        &self.probs[state]
    }
}

impl Policy for StochasticPolicy {
    fn num_states(&self) -> usize {
        self.probs.len()
    }

    fn sample_action<R: Rng + ?Sized>(&self, state: usize, rng: &mut R) -> usize {
        self.samplers[state].sample(rng)
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn deterministic_policy_functional() {
        let pi = DeterministicPolicy::new(vec![1, 0, 1]);
        let other = DeterministicPolicy::from(vec![1, 1, 1]);
        let mut rng = StdRng::seed_from_u64(0);

        assert_eq!(pi[2], 1);
        assert_eq!(pi.sample_action(1, &mut rng), 0);
        assert_eq!(pi.mismatches(&other), 1, "one state differs");
        assert_eq!(pi.mismatches(&pi), 0);
    }

    #[test]
    fn boltzmann_is_normalized_and_ordered() {
        let q = vec![vec![1.0, 2.0, 0.0], vec![5.0, 5.0, 5.0]];
        let pi = StochasticPolicy::boltzmann(&q, 2.0).unwrap();

        for s in 0..2 {
            let total: f64 = pi.distribution(s).iter().sum();
            assert!((total - 1.0).abs() < 1e-12, "row {s} sums to 1");
        }
        assert!(pi.prob(0, 1) > pi.prob(0, 0) && pi.prob(0, 0) > pi.prob(0, 2));
        assert!((pi.prob(1, 0) - 1.0 / 3.0).abs() < 1e-12, "uniform on ties");
    }

    #[test]
    fn stochastic_policy_samples_support_only() {
        let pi = StochasticPolicy::new(vec![vec![0.0, 1.0, 0.0]]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        assert!((0..100).all(|_| pi.sample_action(0, &mut rng) == 1));
    }

    #[test]
    fn stochastic_policy_rejects_bad_rows() {
        assert!(StochasticPolicy::new(vec![vec![0.5, 0.2]]).is_err());
        assert!(StochasticPolicy::new(vec![vec![1.5, -0.5]]).is_err());
    }
}
