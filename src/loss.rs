use crate::{
    algo::PolicyIteration,
    env::{Mdp, TabularMdp},
    error::{ensure_dimension, Result},
};

/// A distance between a reference reward and a candidate
pub trait Loss {
    /// Distance of `candidate` from `reference`
    fn evaluate(&self, reference: &[f64], candidate: &[f64]) -> Result<f64>;
}

/// L<sub>p</sub> norm of `a - b`; `p = ∞` gives the largest absolute difference
fn lp_norm(a: &[f64], b: &[f64], order: f64) -> f64 {
    let diffs = a.iter().zip(b).map(|(x, y)| (x - y).abs());
    if order.is_infinite() {
        diffs.fold(0.0, f64::max)
    } else {
        diffs.map(|d| d.powf(order)).sum::<f64>().powf(order.recip())
    }
}

fn check_order(order: f64) {
    assert!(order >= 1.0, "`order` must be at least 1, got {order}");
}

/// Distance between reward weight vectors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardLoss {
    order: f64,
}

impl RewardLoss {
    /// **Panics** if `order` is below 1
    pub fn new(order: f64) -> Self {
        check_order(order);
        Self { order }
    }

    pub fn order(&self) -> f64 {
        self.order
    }
}

impl Default for RewardLoss {
    /// Euclidean distance
    fn default() -> Self {
        Self { order: 2.0 }
    }
}

impl Loss for RewardLoss {
    fn evaluate(&self, reference: &[f64], candidate: &[f64]) -> Result<f64> {
        ensure_dimension(reference.len(), candidate.len())?;
        Ok(lp_norm(reference, candidate, self.order))
    }
}

/// How [`PolicyLoss`] compares the optimal policies of two rewards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyDistance {
    /// Share of states where the greedy actions differ, as `(mismatches / states)^(1/p)`
    #[default]
    Mismatch,
    /// L<sub>p</sub> distance between the values of both policies, each evaluated under the
    /// reference reward
    ValueGap,
}

/// Distance between the behavior two rewards induce on an MDP
///
/// Both weight vectors are planned on their own reward snapshot of `mdp`, so the loss can be
/// evaluated repeatedly without touching the MDP.
#[derive(Debug, Clone)]
pub struct PolicyLoss {
    mdp: TabularMdp,
    planner: PolicyIteration,
    order: f64,
    distance: PolicyDistance,
}

impl PolicyLoss {
    /// ### Parameters
    /// - `mdp` - the MDP whose reward weights are compared
    /// - `planner` - planner used for both rewards
    /// - `order` - order `p` of the norm
    /// - `distance` - what is compared
    ///
    /// **Panics** if `order` is below 1
    pub fn new(mdp: TabularMdp, planner: PolicyIteration, order: f64, distance: PolicyDistance) -> Self {
        check_order(order);
        Self {
            mdp,
            planner,
            order,
            distance,
        }
    }

    pub fn distance(&self) -> PolicyDistance {
        self.distance
    }
}

impl Loss for PolicyLoss {
    fn evaluate(&self, reference: &[f64], candidate: &[f64]) -> Result<f64> {
        ensure_dimension(reference.len(), candidate.len())?;
        ensure_dimension(self.mdp.dimension(), reference.len())?;

        let reference_mdp = self.mdp.with_weights(reference)?;
        let reference_plan = self.planner.solve(&reference_mdp)?;
        let candidate_plan = self.planner.solve(&self.mdp.with_weights(candidate)?)?;

        match self.distance {
            PolicyDistance::Mismatch => {
                let states = reference_mdp.num_states().max(1) as f64;
                let share = reference_plan.policy.mismatches(&candidate_plan.policy) as f64 / states;
                Ok(if self.order.is_infinite() {
                    share.ceil()
                } else {
                    share.powf(self.order.recip())
                })
            }
            PolicyDistance::ValueGap => {
                let values = self
                    .planner
                    .evaluate_policy(&reference_mdp, &candidate_plan.policy)?;
                Ok(lp_norm(&reference_plan.values, &values, self.order))
            }
        }
    }
}
