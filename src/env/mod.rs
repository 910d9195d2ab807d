mod reward;
mod tabular;

pub use reward::LinearReward;
pub use tabular::TabularMdp;

use std::ops::Range;

use crate::error::{Error, Result};

/// Maximum deviation from 1 tolerated in the total mass of a transition distribution
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// One possible successor of a state-action pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub next_state: usize,
    pub prob: f64,
}

impl Outcome {
    pub fn new(next_state: usize, prob: f64) -> Self {
        Self { next_state, prob }
    }
}

/// Represents a finite Markov decision process, defining the dynamics of an environment
/// in which an agent can operate.
///
/// States and actions are dense indices in `0..num_states()` and `0..num_actions()`.
/// The reward is a function of the state only.
pub trait Mdp {
    /// Number of states
    fn num_states(&self) -> usize;

    /// Number of actions available in every state
    fn num_actions(&self) -> usize;

    /// The distribution over successor states after taking `action` in `state`
    fn transition(&self, state: usize, action: usize) -> &[Outcome];

    /// The reward collected in `state`
    fn reward(&self, state: usize) -> f64;

    /// Discount factor in `[0, 1)`
    fn discount(&self) -> f64;

    /// Terminal states are absorbing: their value is their reward and the episode ends there
    fn is_terminal(&self, _state: usize) -> bool {
        false
    }

    /// Enumerate the states
    fn states(&self) -> Range<usize> {
        0..self.num_states()
    }

    /// Enumerate the actions
    fn actions(&self) -> Range<usize> {
        0..self.num_actions()
    }

    /// Check that every transition distribution is well formed
    ///
    /// **Returns** [`Error::MalformedTransition`] for the first distribution that is empty,
    /// references an unknown state, carries a negative or non-finite probability,
    /// or does not sum to 1 within [`PROBABILITY_TOLERANCE`]
    fn validate(&self) -> Result<()> {
        let n = self.num_states();
        for state in self.states() {
            for action in self.actions() {
                validate_distribution(state, action, self.transition(state, action), n)?;
            }
        }
        Ok(())
    }
}

pub(crate) fn validate_distribution(
    state: usize,
    action: usize,
    outcomes: &[Outcome],
    num_states: usize,
) -> Result<()> {
    let malformed = |reason: String| Error::MalformedTransition {
        state,
        action,
        reason,
    };

    if outcomes.is_empty() {
        return Err(malformed("empty distribution".into()));
    }

    let mut total = 0.0;
    for &Outcome { next_state, prob } in outcomes {
        if next_state >= num_states {
            return Err(malformed(format!("unknown successor state {next_state}")));
        }
        if !prob.is_finite() || prob < 0.0 {
            return Err(malformed(format!(
                "invalid probability {prob} for successor {next_state}"
            )));
        }
        total += prob;
    }

    if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
        return Err(malformed(format!("probabilities sum to {total}")));
    }

    Ok(())
}
