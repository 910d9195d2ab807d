mod likelihood;
mod proposal;
mod trace;

pub use likelihood::log_likelihood;
pub use proposal::{GaussianStep, GridStep, Inference, Propose, Proposal};
pub use trace::{Trace, TraceRecord};

use log::{debug, info, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    algo::policy_iteration::{Plan, PolicyIteration, PolicyIterationConfig},
    assert_interval,
    env::TabularMdp,
    error::{ensure_dimension, Result},
    policy::DeterministicPolicy,
    prob::RewardPrior,
    trajectory::Trajectory,
};

/// Configuration for [`Birl`]
#[derive(Debug, Clone)]
pub struct BirlConfig {
    /// Inverse temperature of the Boltzmann-rational expert
    ///
    /// **Default**: `0.8`
    pub beta: f64,
    /// Proposal step size
    ///
    /// **Default**: `0.2`
    pub delta: f64,
    /// Number of MCMC steps
    ///
    /// **Default**: `1000`
    pub max_iter: usize,
    /// Fraction of the steps excluded from the posterior mean
    ///
    /// **Default**: `0.3`
    pub burn_ratio: f64,
    /// **Default**: [`Inference::PolicyWalk`]
    pub inference: Inference,
    /// Configuration of the inner planner
    pub planner: PolicyIterationConfig,
    /// Seed of the chain; without one the chain is seeded from entropy
    ///
    /// **Default**: `None`
    pub seed: Option<u64>,
}

impl Default for BirlConfig {
    fn default() -> Self {
        Self {
            beta: 0.8,
            delta: 0.2,
            max_iter: 1000,
            burn_ratio: 0.3,
            inference: Inference::PolicyWalk,
            planner: PolicyIterationConfig::default(),
            seed: None,
        }
    }
}

/// Bayesian inverse reinforcement learning by MCMC over reward weights
///
/// Each step proposes new weights, re-solves the MDP under them with policy iteration and
/// accepts with the Metropolis rule on `log prior + log likelihood`, where the likelihood
/// models the expert as Boltzmann-rational with respect to the candidate's Q-values.
///
/// ### Type parameters
/// - `P`: The [`RewardPrior`] over the weights
pub struct Birl<P: RewardPrior> {
    prior: P,
    planner: PolicyIteration,
    config: BirlConfig,
}

impl<P: RewardPrior> Birl<P> {
    /// **Panics** if `beta` or `delta` is not positive or `burn_ratio` is not in `[0, 1]`
    pub fn new(prior: P, config: BirlConfig) -> Self {
        assert!(config.beta > 0.0, "`beta` must be positive");
        assert!(
            config.delta.is_finite() && config.delta > 0.0,
            "`delta` must be positive"
        );
        assert_interval!(config.burn_ratio, 0.0, 1.0);
        Self {
            prior,
            planner: PolicyIteration::new(config.planner.clone()),
            config,
        }
    }

    pub fn prior(&self) -> &P {
        &self.prior
    }

    pub fn config(&self) -> &BirlConfig {
        &self.config
    }

    /// Start a chain on `mdp` explaining `demos`
    ///
    /// The chain starts from `initial` if given, otherwise from a draw of the prior.
    ///
    /// **Returns** [`Error::InvalidDimension`](crate::Error::InvalidDimension) if the prior or
    /// `initial` does not match the reward dimension of `mdp`, and
    /// [`Error::InvalidParameter`](crate::Error::InvalidParameter) if a demonstration leaves the MDP
    pub fn chain<'a>(
        &'a self,
        mdp: &TabularMdp,
        demos: &'a [Trajectory],
        initial: Option<Vec<f64>>,
    ) -> Result<Chain<'a, P>> {
        ensure_dimension(mdp.dimension(), self.prior.dimension())?;

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let current = match initial {
            Some(weights) => weights,
            None => self.prior.sample(&mut rng),
        };
        ensure_dimension(mdp.dimension(), current.len())?;

        let plan = self.planner.solve(&mdp.with_weights(&current)?)?;
        let mut chain = Chain {
            birl: self,
            mdp: mdp.clone(),
            demos,
            proposal: Proposal::new(
                self.config.inference,
                self.config.delta,
                mdp.reward_model().rmax(),
            ),
            rng,
            log_posterior: f64::NEG_INFINITY,
            policy: plan.policy.clone(),
            mean_sum: vec![0.0; current.len()],
            mean_count: 0,
            current,
            burn_in: (self.config.burn_ratio * self.config.max_iter as f64).floor() as usize,
            iteration: 0,
            accepted: 0,
            unconverged: 0,
        };
        chain.note_convergence(&plan);
        chain.log_posterior = chain.score(&chain.current, &plan)?;
        Ok(chain)
    }

    /// Run a full chain from a prior draw and collect its trace
    pub fn solve(&self, mdp: &TabularMdp, demos: &[Trajectory]) -> Result<Trace> {
        self.chain(mdp, demos, None)?.run()
    }
}

/// A running MCMC chain
///
/// Call [`step`](Chain::step) to advance one iteration, or iterate over the chain. Each step
/// solves its candidate on a separate reward snapshot of the MDP, so independent chains can
/// run side by side.
pub struct Chain<'a, P: RewardPrior> {
    birl: &'a Birl<P>,
    mdp: TabularMdp,
    demos: &'a [Trajectory],
    proposal: Proposal,
    rng: StdRng,
    current: Vec<f64>,
    log_posterior: f64,
    policy: DeterministicPolicy,
    mean_sum: Vec<f64>,
    mean_count: usize,
    burn_in: usize,
    iteration: usize,
    accepted: usize,
    unconverged: usize,
}

impl<'a, P: RewardPrior> Chain<'a, P> {
    /// Advance the chain by one step
    ///
    /// **Returns** `None` once `max_iter` steps have run, or the planner's error, which ends the run
    pub fn step(&mut self) -> Result<Option<TraceRecord>> {
        if self.is_finished() {
            return Ok(None);
        }

        let candidate = self
            .proposal
            .propose(&self.current, &self.birl.prior, &mut self.rng);
        let snapshot = self.mdp.with_weights(&candidate)?;
        let plan = self.birl.planner.solve_from(&snapshot, &self.policy)?;
        self.note_convergence(&plan);
        let candidate_posterior = self.score(&candidate, &plan)?;

        let accepted = accept(self.log_posterior, candidate_posterior, &mut self.rng);
        if accepted {
            self.current = candidate;
            self.log_posterior = candidate_posterior;
            self.policy = plan.policy;
            self.accepted += 1;
        }

        let step = self.iteration;
        self.iteration += 1;
        if step >= self.burn_in {
            for (sum, w) in self.mean_sum.iter_mut().zip(&self.current) {
                *sum += w;
            }
            self.mean_count += 1;
        }

        debug!(
            "Step {step}: accepted {accepted}, log posterior {:.4}",
            self.log_posterior
        );

        Ok(Some(TraceRecord {
            step,
            r: self.current.clone(),
            r_mean: self.posterior_mean().unwrap_or_else(|| self.current.clone()),
            accepted,
            log_posterior: self.log_posterior,
        }))
    }

    /// Run the remaining steps and collect them
    pub fn run(mut self) -> Result<Trace> {
        let mut trace = Trace::new();
        while let Some(record) = self.step()? {
            trace.push(record);
        }
        info!(
            "Chain finished after {} steps: acceptance rate {:.3}, {} samples past burn-in, {} unconverged solves",
            self.iteration,
            self.acceptance_rate(),
            self.mean_count,
            self.unconverged
        );
        Ok(trace)
    }

    /// The current sample
    pub fn current(&self) -> &[f64] {
        &self.current
    }

    /// Log posterior of the current sample, `-inf` until a finite one is found
    pub fn current_log_posterior(&self) -> f64 {
        self.log_posterior
    }

    /// Greedy policy of the current sample
    pub fn policy(&self) -> &DeterministicPolicy {
        &self.policy
    }

    /// Mean of the samples past burn-in, `None` while burning in
    pub fn posterior_mean(&self) -> Option<Vec<f64>> {
        (self.mean_count > 0).then(|| {
            let n = self.mean_count as f64;
            self.mean_sum.iter().map(|s| s / n).collect()
        })
    }

    /// Number of steps run so far
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn is_burning_in(&self) -> bool {
        self.iteration < self.burn_in
    }

    pub fn is_finished(&self) -> bool {
        self.iteration >= self.birl.config.max_iter
    }

    /// Fraction of steps that accepted their proposal
    pub fn acceptance_rate(&self) -> f64 {
        if self.iteration == 0 {
            0.0
        } else {
            self.accepted as f64 / self.iteration as f64
        }
    }

    /// Number of inner solves that hit the planner's iteration cap
    pub fn unconverged_solves(&self) -> usize {
        self.unconverged
    }

    fn note_convergence(&mut self, plan: &Plan) {
        if !plan.converged {
            self.unconverged += 1;
            warn!(
                "Inner policy iteration did not converge after {} rounds at step {}",
                plan.iterations, self.iteration
            );
        }
    }

    /// `log prior + log likelihood`, with every non-finite value mapped to `-inf`
    fn score(&self, weights: &[f64], plan: &Plan) -> Result<f64> {
        let prior = self.birl.prior.log_density(weights)?;
        let likelihood = log_likelihood(&plan.q_values, self.demos, self.birl.config.beta)?;
        let posterior = prior + likelihood;
        Ok(if posterior.is_finite() {
            posterior
        } else {
            f64::NEG_INFINITY
        })
    }
}

impl<'a, P: RewardPrior> Iterator for Chain<'a, P> {
    type Item = Result<TraceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.step().transpose()
    }
}

/// Metropolis acceptance on log posteriors
///
/// A non-finite candidate is always rejected; any finite candidate replaces a non-finite current.
fn accept<R: Rng + ?Sized>(current: f64, candidate: f64, rng: &mut R) -> bool {
    if !candidate.is_finite() {
        return false;
    }
    if !current.is_finite() {
        return true;
    }
    let log_alpha = candidate - current;
    log_alpha >= 0.0 || rng.gen::<f64>().ln() < log_alpha
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::{
        env::{tests::corridor, Mdp},
        error::Error,
        gym::GridWorld,
        loss::{Loss, PolicyDistance, PolicyLoss, RewardLoss},
        policy::StochasticPolicy,
        prob::{GaussianRewardPrior, UniformRewardPrior},
        trajectory::TrajectorySampler,
    };

    const MAP: &str = "0 0 0\n0 1 0\n0 0 2";

    /// Ground truth `[-0.01, -3, 1]` rescaled by its range
    fn ground_truth() -> Vec<f64> {
        vec![-0.0025, -0.75, 0.25]
    }

    /// A 3x3 world and demonstrations of a Boltzmann expert with rationality `beta`
    fn setup(beta: f64) -> (TabularMdp, Vec<Trajectory>) {
        let world: GridWorld = MAP.parse().unwrap();
        let mdp = world.mdp(ground_truth(), 1.0, 0.9, 0.1).unwrap();
        let plan = PolicyIteration::default().solve(&mdp).unwrap();
        let expert = StochasticPolicy::boltzmann(&plan.q_values, beta).unwrap();
        let demos = TrajectorySampler::new(10, 150)
            .with_seed(42)
            .sample(&mdp, &expert)
            .unwrap();
        (mdp, demos)
    }

    fn config(seed: u64) -> BirlConfig {
        BirlConfig {
            beta: 5.0,
            delta: 0.05,
            max_iter: 600,
            burn_ratio: 0.3,
            seed: Some(seed),
            ..Default::default()
        }
    }

    #[test]
    fn posterior_mean_stays_near_ground_truth() {
        let (mdp, demos) = setup(5.0);
        let prior = GaussianRewardPrior::from_vectors(ground_truth(), vec![0.15; 3]).unwrap();
        let birl = Birl::new(prior, config(42));

        let trace = birl
            .chain(&mdp, &demos, Some(ground_truth()))
            .unwrap()
            .run()
            .unwrap();
        let r_mean = &trace.last().unwrap().r_mean;

        let loss = RewardLoss::default().evaluate(&ground_truth(), r_mean).unwrap();
        assert!(loss < 0.15, "posterior mean {r_mean:?} is {loss} away");
    }

    #[test]
    fn recovers_expert_policy_from_zero_mean_prior() {
        let (mdp, demos) = setup(5.0);
        let prior = GaussianRewardPrior::new(3, 0.0, 0.5).unwrap();
        let birl = Birl::new(prior, config(42));

        let trace = birl.solve(&mdp, &demos).unwrap();
        let r_mean = &trace.last().unwrap().r_mean;

        let reward_loss = RewardLoss::default().evaluate(&ground_truth(), r_mean).unwrap();
        assert!(reward_loss < 0.3, "posterior mean {r_mean:?} is {reward_loss} away");

        let policy_loss = PolicyLoss::new(
            mdp.clone(),
            PolicyIteration::default(),
            1.0,
            PolicyDistance::Mismatch,
        );
        let share = policy_loss.evaluate(&ground_truth(), r_mean).unwrap();
        assert!(share <= 1.0 / 9.0 + 1e-12, "{share} of the states act differently");
    }

    #[test]
    fn flat_posterior_is_visited_evenly() {
        let mdp = corridor();
        let demos: [Trajectory; 0] = [];
        let prior = UniformRewardPrior::new(1, 1.0).unwrap();
        let max_iter = 20_000;
        let birl = Birl::new(
            prior,
            BirlConfig {
                delta: 0.25,
                max_iter,
                burn_ratio: 0.0,
                seed: Some(5),
                ..Default::default()
            },
        );

        let trace = birl.chain(&mdp, &demos, Some(vec![0.0])).unwrap().run().unwrap();
        let mut visits = [0usize; 9];
        for record in trace.iter() {
            let cell = (record.r[0] / 0.25).round() as i64 + 4;
            visits[cell as usize] += 1;
        }

        let expected = max_iter as f64 / 9.0;
        for (cell, &count) in visits.iter().enumerate() {
            let ratio = count as f64 / expected;
            assert!(
                (0.7..1.3).contains(&ratio),
                "grid point {} visited {count} times: {visits:?}",
                cell as f64 * 0.25 - 1.0
            );
        }
    }

    #[test]
    fn unconverged_inner_solves_are_counted() {
        let (mdp, demos) = setup(2.0);
        let prior = GaussianRewardPrior::new(3, 0.0, 0.15).unwrap();
        let birl = Birl::new(
            prior,
            BirlConfig {
                max_iter: 8,
                burn_ratio: 0.25,
                planner: PolicyIterationConfig {
                    max_iterations: 1,
                    ..Default::default()
                },
                ..config(2)
            },
        );

        let mut chain = birl.chain(&mdp, &demos, None).unwrap();
        assert!(chain.unconverged_solves() > 0, "one round cannot settle the initial policy");
        assert!(chain.is_burning_in());

        let mut records = 0;
        while let Some(record) = chain.step().unwrap() {
            records += 1;
            assert!(record.log_posterior.is_finite());
            assert_eq!(chain.is_burning_in(), chain.iteration() < 2, "burn-in ends at step 2");
        }
        assert_eq!(records, 8, "the run still finishes");
        assert!(!chain.is_burning_in());
        assert!(chain.unconverged_solves() > 0);
    }

    #[test]
    fn chain_moves_toward_expert_reward() {
        let (mdp, demos) = setup(5.0);
        let prior = GaussianRewardPrior::new(3, 0.0, 0.5).unwrap();
        let birl = Birl::new(
            prior,
            BirlConfig {
                delta: 0.1,
                max_iter: 800,
                ..config(7)
            },
        );
        let wrong = vec![0.5, 0.5, -0.5];

        let trace = birl.chain(&mdp, &demos, Some(wrong.clone())).unwrap().run().unwrap();
        let loss = RewardLoss::default();
        let before = loss.evaluate(&ground_truth(), &wrong).unwrap();
        let after = loss
            .evaluate(&ground_truth(), &trace.last().unwrap().r_mean)
            .unwrap();
        assert!(after < 0.5 * before, "loss went from {before} to {after}");
        assert!(trace.acceptance_rate() > 0.0);
    }

    #[test]
    fn seeded_chains_are_reproducible() {
        let (mdp, demos) = setup(2.0);
        let prior = GaussianRewardPrior::new(3, 0.0, 0.15).unwrap();
        let birl = Birl::new(
            prior,
            BirlConfig {
                max_iter: 50,
                ..config(3)
            },
        );
        let a = birl.solve(&mdp, &demos).unwrap();
        let b = birl.solve(&mdp, &demos).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn burn_in_excluded_from_mean() {
        let (mdp, demos) = setup(2.0);
        let prior = GaussianRewardPrior::new(3, 0.0, 0.15).unwrap();
        let birl = Birl::new(
            prior,
            BirlConfig {
                max_iter: 40,
                burn_ratio: 0.25,
                ..config(9)
            },
        );
        let trace = birl.solve(&mdp, &demos).unwrap();

        assert_eq!(trace.len(), 40);
        assert_eq!(trace.steps(), (0..40).collect::<Vec<_>>());
        for record in &trace.records()[..10] {
            assert_eq!(record.r_mean, record.r, "placeholder mean during burn-in");
        }

        let kept = &trace.records()[10..];
        let mean = (0..3)
            .map(|i| kept.iter().map(|r| r.r[i]).sum::<f64>() / kept.len() as f64)
            .collect::<Vec<_>>();
        for (m, e) in trace.last().unwrap().r_mean.iter().zip(mean) {
            assert!((m - e).abs() < 1e-12);
        }
    }

    #[test]
    fn step_by_step() {
        let (mdp, demos) = setup(2.0);
        let prior = GaussianRewardPrior::new(3, 0.0, 0.15).unwrap();
        let birl = Birl::new(
            prior,
            BirlConfig {
                max_iter: 3,
                burn_ratio: 0.0,
                ..config(1)
            },
        );
        let mut chain = birl.chain(&mdp, &demos, None).unwrap();
        assert!(chain.posterior_mean().is_none());
        assert!(chain.current_log_posterior().is_finite());

        let first = chain.step().unwrap().unwrap();
        assert_eq!(first.step, 0);
        assert_eq!(first.r_mean, first.r, "mean of a single sample");
        assert_eq!(chain.policy().len(), mdp.num_states());

        assert_eq!(chain.by_ref().count(), 2);
        assert!(chain.is_finished());
        assert!(chain.step().unwrap().is_none());
    }

    #[test]
    fn rejects_mismatched_dimensions() {
        let (mdp, demos) = setup(2.0);
        let birl = Birl::new(GaussianRewardPrior::new(2, 0.0, 0.1).unwrap(), config(0));
        assert!(matches!(
            birl.chain(&mdp, &demos, None),
            Err(Error::InvalidDimension { .. })
        ));

        let birl = Birl::new(GaussianRewardPrior::new(3, 0.0, 0.1).unwrap(), config(0));
        assert!(matches!(
            birl.chain(&mdp, &demos, Some(vec![0.0; 4])),
            Err(Error::InvalidDimension { .. })
        ));
    }

    #[test]
    fn rejects_foreign_demonstrations() {
        let mdp = corridor();
        let demos = [Trajectory::new(vec![(0, 1), (12, 0)])];
        let birl = Birl::new(GaussianRewardPrior::new(1, 0.0, 1.0).unwrap(), config(0));
        assert!(matches!(
            birl.chain(&mdp, &demos, None),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn infinite_log_posterior_is_never_propagated() {
        let (mdp, demos) = setup(2.0);
        let prior = UniformRewardPrior::new(3, 0.3).unwrap();
        let birl = Birl::new(
            prior,
            BirlConfig {
                max_iter: 200,
                burn_ratio: 0.0,
                inference: Inference::RandomWalk,
                ..config(4)
            },
        );

        let chain = birl.chain(&mdp, &demos, Some(vec![0.9, 0.9, 0.9])).unwrap();
        assert_eq!(chain.current_log_posterior(), f64::NEG_INFINITY);

        let trace = chain.run().unwrap();
        for record in trace.iter() {
            assert!(record.r_mean.iter().all(|x| x.is_finite()));
            assert!(!record.log_posterior.is_nan());
            if record.log_posterior.is_finite() {
                assert!(record.r.iter().all(|w| w.abs() <= 0.3), "inside the support");
            }
        }
    }

    #[test]
    fn acceptance_rule() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(!accept(0.0, f64::NAN, &mut rng));
        assert!(!accept(0.0, f64::NEG_INFINITY, &mut rng));
        assert!(accept(f64::NEG_INFINITY, -1e6, &mut rng));
        assert!(accept(-5.0, -1.0, &mut rng), "uphill always accepted");
        let downhill = (0..10_000).filter(|_| accept(0.0, -1.0, &mut rng)).count();
        let rate = downhill as f64 / 10_000.0;
        assert!((rate - (-1.0f64).exp()).abs() < 0.03, "rate {rate}");
    }

    #[test]
    #[should_panic(expected = "Invalid value for `config.burn_ratio`")]
    fn burn_ratio_is_checked() {
        let prior = GaussianRewardPrior::new(1, 0.0, 1.0).unwrap();
        let _ = Birl::new(
            prior,
            BirlConfig {
                burn_ratio: 1.5,
                ..Default::default()
            },
        );
    }
}
