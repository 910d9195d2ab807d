use log::{debug, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    env::Mdp,
    error::{ensure_dimension, Error, Result},
    policy::DeterministicPolicy,
    util::argmax,
};

/// How the value of a fixed policy is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Evaluation {
    /// In-place Bellman backups until the largest change drops below the tolerance
    #[default]
    Iterative,
    /// Direct solve of `(I - γP_π)V = R` by Gaussian elimination, cubic in the number of states
    Exact,
}

/// Configuration for the [`PolicyIteration`] planner
#[derive(Debug, Clone)]
pub struct PolicyIterationConfig {
    /// Convergence threshold of iterative evaluation, also the slack under which action values tie
    ///
    /// **Default**: `1e-8`
    pub tolerance: f64,
    /// Maximum number of evaluation/improvement rounds
    ///
    /// **Default**: `200`
    pub max_iterations: usize,
    /// Maximum number of sweeps of a single iterative evaluation
    ///
    /// **Default**: `10_000`
    pub max_eval_sweeps: usize,
    /// **Default**: [`Evaluation::Iterative`]
    pub evaluation: Evaluation,
    /// Seed of the random initial policy; without a seed the initial policy takes action 0 everywhere
    ///
    /// **Default**: `None`
    pub seed: Option<u64>,
}

impl Default for PolicyIterationConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 200,
            max_eval_sweeps: 10_000,
            evaluation: Evaluation::Iterative,
            seed: None,
        }
    }
}

/// The result of solving an MDP
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// The greedy policy
    pub policy: DeterministicPolicy,
    /// Value of every state under `policy`
    pub values: Vec<f64>,
    /// `q_values[s][a]`, one Bellman backup of `values`
    pub q_values: Vec<Vec<f64>>,
    /// Number of evaluation/improvement rounds run
    pub iterations: usize,
    /// Whether the policy stabilized before the iteration cap
    pub converged: bool,
}

impl Plan {
    /// Turn an unconverged plan into [`Error::NonConvergence`]
    pub fn certified(self) -> Result<Self> {
        if self.converged {
            Ok(self)
        } else {
            Err(Error::NonConvergence {
                iterations: self.iterations,
            })
        }
    }
}

/// Policy iteration planner
///
/// Alternates policy evaluation and greedy policy improvement until no state changes its
/// action. Among actions whose values tie (within the tolerance) the lowest index wins, so
/// the returned policy does not depend on the initial one. Terminal states are absorbing:
/// their value is their reward and their policy entry is action 0.
///
/// The planner holds no state between calls and never mutates the MDP.
#[derive(Debug, Clone, Default)]
pub struct PolicyIteration {
    config: PolicyIterationConfig,
}

impl PolicyIteration {
    /// **Panics** if `tolerance` is not positive or `max_iterations` is zero
    pub fn new(config: PolicyIterationConfig) -> Self {
        assert!(config.tolerance > 0.0, "`tolerance` must be positive");
        assert!(config.max_iterations > 0, "`max_iterations` must be positive");
        Self { config }
    }

    pub fn config(&self) -> &PolicyIterationConfig {
        &self.config
    }

    /// Solve `mdp` from the configured initial policy
    ///
    /// **Returns** [`Error::MalformedTransition`] if a transition distribution is invalid
    pub fn solve<M: Mdp>(&self, mdp: &M) -> Result<Plan> {
        let initial = self.initial_policy(mdp);
        self.solve_from(mdp, &initial)
    }

    /// Solve `mdp` starting from `initial`
    ///
    /// Warm-starting from a policy close to the optimum saves most of the rounds.
    pub fn solve_from<M: Mdp>(&self, mdp: &M, initial: &DeterministicPolicy) -> Result<Plan> {
        mdp.validate()?;
        check_policy(mdp, initial)?;

        let mut policy = initial.as_slice().to_vec();
        for state in mdp.states().filter(|&s| mdp.is_terminal(s)) {
            policy[state] = 0;
        }

        let mut values = vec![0.0; mdp.num_states()];
        let mut converged = false;
        let mut iterations = 0;

        while iterations < self.config.max_iterations {
            iterations += 1;
            self.evaluate_into(mdp, &policy, &mut values);
            let changed = self.improve(mdp, &values, &mut policy);
            debug!("Policy iteration round {iterations}: {changed} states changed");
            if changed == 0 {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(
                "Policy iteration stopped after {iterations} rounds without a stable policy"
            );
            self.evaluate_into(mdp, &policy, &mut values);
        }

        Ok(Plan {
            q_values: q_values(mdp, &values),
            policy: DeterministicPolicy::new(policy),
            values,
            iterations,
            converged,
        })
    }

    /// Value of every state under a fixed `policy`
    pub fn evaluate_policy<M: Mdp>(&self, mdp: &M, policy: &DeterministicPolicy) -> Result<Vec<f64>> {
        mdp.validate()?;
        check_policy(mdp, policy)?;
        let mut values = vec![0.0; mdp.num_states()];
        self.evaluate_into(mdp, policy.as_slice(), &mut values);
        Ok(values)
    }

    fn initial_policy<M: Mdp>(&self, mdp: &M) -> DeterministicPolicy {
        let actions = match self.config.seed {
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(seed);
                mdp.states()
                    .map(|_| rng.gen_range(0..mdp.num_actions()))
                    .collect()
            }
            None => vec![0; mdp.num_states()],
        };
        DeterministicPolicy::new(actions)
    }

    fn evaluate_into<M: Mdp>(&self, mdp: &M, policy: &[usize], values: &mut [f64]) {
        match self.config.evaluation {
            Evaluation::Iterative => self.sweep_until_stable(mdp, policy, values),
            Evaluation::Exact => solve_linear(mdp, policy, values),
        }
    }

    fn sweep_until_stable<M: Mdp>(&self, mdp: &M, policy: &[usize], values: &mut [f64]) {
        for _ in 0..self.config.max_eval_sweeps {
            let mut delta: f64 = 0.0;
            for state in mdp.states() {
                let new_value = q_value(mdp, values, state, policy[state]);
                delta = delta.max((new_value - values[state]).abs());
                values[state] = new_value;
            }
            if delta < self.config.tolerance {
                return;
            }
        }
        warn!(
            "Policy evaluation hit {} sweeps before reaching tolerance {}",
            self.config.max_eval_sweeps, self.config.tolerance
        );
    }

    /// Greedy improvement, returns the number of states whose action changed
    fn improve<M: Mdp>(&self, mdp: &M, values: &[f64], policy: &mut [usize]) -> usize {
        let mut changed = 0;
        for state in mdp.states().filter(|&s| !mdp.is_terminal(s)) {
            let action_values = mdp
                .actions()
                .map(|a| q_value(mdp, values, state, a))
                .collect::<Vec<_>>();
            let best = argmax(&action_values, self.config.tolerance);
            if best != policy[state] {
                policy[state] = best;
                changed += 1;
            }
        }
        changed
    }
}

/// One Bellman backup, `R(s) + γ Σ P(s'|s,a) V(s')`; for terminal states just `R(s)`
pub fn q_value<M: Mdp>(mdp: &M, values: &[f64], state: usize, action: usize) -> f64 {
    let reward = mdp.reward(state);
    if mdp.is_terminal(state) {
        return reward;
    }
    let expected: f64 = mdp
        .transition(state, action)
        .iter()
        .map(|o| o.prob * values[o.next_state])
        .sum();
    reward + mdp.discount() * expected
}

/// The Q table of `values`, indexed `[state][action]`
pub fn q_values<M: Mdp>(mdp: &M, values: &[f64]) -> Vec<Vec<f64>> {
    mdp.states()
        .map(|s| mdp.actions().map(|a| q_value(mdp, values, s, a)).collect())
        .collect()
}

fn check_policy<M: Mdp>(mdp: &M, policy: &DeterministicPolicy) -> Result<()> {
    ensure_dimension(mdp.num_states(), policy.len())?;
    match policy.as_slice().iter().position(|&a| a >= mdp.num_actions()) {
        Some(state) => Err(Error::InvalidParameter(format!(
            "policy takes unknown action {} in state {state}",
            policy[state]
        ))),
        None => Ok(()),
    }
}

/// Gaussian elimination with partial pivoting on `(I - γP_π)V = R`
fn solve_linear<M: Mdp>(mdp: &M, policy: &[usize], values: &mut [f64]) {
    let n = mdp.num_states();
    let gamma = mdp.discount();

    // Augmented matrix, the last column holds the rewards
    let mut a = vec![vec![0.0; n + 1]; n];
    for (state, row) in a.iter_mut().enumerate() {
        row[state] = 1.0;
        row[n] = mdp.reward(state);
        if mdp.is_terminal(state) {
            continue;
        }
        for o in mdp.transition(state, policy[state]) {
            row[o.next_state] -= gamma * o.prob;
        }
    }

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        a.swap(col, pivot);

        // I - γP is strictly diagonally dominant for γ < 1, so the pivot is never zero
        let p = a[col][col];
        for row in col + 1..n {
            let factor = a[row][col] / p;
            if factor == 0.0 {
                continue;
            }
            for k in col..=n {
                a[row][k] -= factor * a[col][k];
            }
        }
    }

    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * values[k]).sum();
        values[row] = (a[row][n] - tail) / a[row][row];
    }
}
