use std::sync::Arc;

use crate::error::{ensure_dimension, Error, Result};

use super::{validate_distribution, LinearReward, Mdp, Outcome};

/// An MDP described by explicit tables, with a [`LinearReward`]
///
/// The transition and terminal tables are immutable and shared between snapshots, so
/// [`with_weights`](TabularMdp::with_weights) only copies the reward weights. Each
/// candidate reward of an inference run gets its own snapshot and can be solved
/// independently of the others.
#[derive(Debug, Clone)]
pub struct TabularMdp {
    transitions: Arc<Vec<Vec<Vec<Outcome>>>>,
    terminals: Arc<Vec<bool>>,
    reward: LinearReward,
    discount: f64,
}

impl TabularMdp {
    /// Build and validate an MDP
    ///
    /// ### Parameters
    /// - `transitions` - `transitions[s][a]` is the successor distribution of `(s, a)`; every
    ///   state must offer the same, non-zero number of actions
    /// - `reward` - a reward with one feature vector per state
    /// - `discount` - the discount factor, in `[0, 1)`
    /// - `terminals` - one flag per state
    ///
    /// **Returns** [`Error::MalformedTransition`] for invalid distributions,
    /// [`Error::InvalidDimension`] when the reward or terminal table does not cover every state,
    /// and [`Error::InvalidParameter`] for an empty model or an out-of-range discount
    pub fn new(
        transitions: Vec<Vec<Vec<Outcome>>>,
        reward: LinearReward,
        discount: f64,
        terminals: Vec<bool>,
    ) -> Result<Self> {
        if !(0.0..1.0).contains(&discount) {
            return Err(Error::InvalidParameter(format!(
                "`discount` must be in [0, 1), got {discount}"
            )));
        }

        let num_states = transitions.len();
        let num_actions = transitions.first().map_or(0, Vec::len);
        if num_states == 0 || num_actions == 0 {
            return Err(Error::InvalidParameter(
                "an MDP needs at least one state and one action".into(),
            ));
        }
        ensure_dimension(num_states, reward.num_states())?;
        ensure_dimension(num_states, terminals.len())?;

        for (state, row) in transitions.iter().enumerate() {
            if row.len() != num_actions {
                return Err(Error::InvalidParameter(format!(
                    "state {state} offers {} actions, expected {num_actions}",
                    row.len()
                )));
            }
            for (action, outcomes) in row.iter().enumerate() {
                validate_distribution(state, action, outcomes, num_states)?;
            }
        }

        Ok(Self {
            transitions: Arc::new(transitions),
            terminals: Arc::new(terminals),
            reward,
            discount,
        })
    }

    pub fn reward_model(&self) -> &LinearReward {
        &self.reward
    }

    /// Number of reward weights
    pub fn dimension(&self) -> usize {
        self.reward.dimension()
    }

    /// Replace the reward weights in place
    ///
    /// **Returns** [`Error::InvalidDimension`] on a length mismatch, leaving the weights untouched
    pub fn update_parameters(&mut self, weights: &[f64]) -> Result<()> {
        self.reward.update_parameters(weights)
    }

    /// Snapshot of this MDP under different reward weights
    pub fn with_weights(&self, weights: &[f64]) -> Result<Self> {
        Ok(Self {
            transitions: Arc::clone(&self.transitions),
            terminals: Arc::clone(&self.terminals),
            reward: self.reward.with_weights(weights)?,
            discount: self.discount,
        })
    }
}

impl Mdp for TabularMdp {
    fn num_states(&self) -> usize {
        self.transitions.len()
    }

    fn num_actions(&self) -> usize {
        self.transitions[0].len()
    }

    fn transition(&self, state: usize, action: usize) -> &[Outcome] {
        &self.transitions[state][action]
    }

    fn reward(&self, state: usize) -> f64 {
        self.reward.evaluate(state)
    }

    fn discount(&self) -> f64 {
        self.discount
    }

    fn is_terminal(&self, state: usize) -> bool {
        self.terminals[state]
    }
}
