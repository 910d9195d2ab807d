use log::debug;
use rand::{
    distributions::{Distribution, WeightedIndex},
    rngs::StdRng,
    Rng, SeedableRng,
};
use rayon::prelude::*;

use crate::{
    env::Mdp,
    error::{ensure_dimension, Error, Result},
    policy::Policy,
};

/// A demonstration: the `(state, action)` pairs visited by a rollout, in order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Trajectory {
    steps: Vec<(usize, usize)>,
}

impl Trajectory {
    pub fn new(steps: Vec<(usize, usize)>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(usize, usize)> {
        self.steps.iter()
    }

    pub fn as_slice(&self) -> &[(usize, usize)] {
        &self.steps
    }
}

impl FromIterator<(usize, usize)> for Trajectory {
    fn from_iter<I: IntoIterator<Item = (usize, usize)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a (usize, usize);
    type IntoIter = std::slice::Iter<'a, (usize, usize)>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

/// Where rollouts begin
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StartDistribution {
    /// Uniform over every non-terminal state
    #[default]
    UniformNonTerminal,
    /// Uniform over the listed states
    Uniform(Vec<usize>),
    /// One (unnormalized) weight per state
    Weighted(Vec<f64>),
}

enum StartSampler {
    Uniform(Vec<usize>),
    Weighted(WeightedIndex<f64>),
}

impl StartSampler {
    fn new<M: Mdp>(start: &StartDistribution, mdp: &M) -> Result<Self> {
        let n = mdp.num_states();
        let sampler = match start {
            StartDistribution::UniformNonTerminal => {
                Self::Uniform(mdp.states().filter(|&s| !mdp.is_terminal(s)).collect())
            }
            StartDistribution::Uniform(states) => {
                if let Some(&s) = states.iter().find(|&&s| s >= n) {
                    return Err(Error::InvalidParameter(format!("unknown start state {s}")));
                }
                Self::Uniform(states.clone())
            }
            StartDistribution::Weighted(weights) => {
                ensure_dimension(n, weights.len())?;
                let dist = WeightedIndex::new(weights)
                    .map_err(|e| Error::InvalidParameter(format!("start weights: {e}")))?;
                Self::Weighted(dist)
            }
        };

        match &sampler {
            Self::Uniform(states) if states.is_empty() => Err(Error::InvalidParameter(
                "the start distribution has no states".into(),
            )),
            _ => Ok(sampler),
        }
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        match self {
            Self::Uniform(states) => states[rng.gen_range(0..states.len())],
            Self::Weighted(dist) => dist.sample(rng),
        }
    }
}

/// Draws demonstration rollouts from a fixed policy
///
/// Each rollout starts from a state of the start distribution and alternates drawing an
/// action from the policy and a successor from the MDP, until `horizon` pairs have been
/// recorded or a terminal state is reached. Terminal states are never recorded.
///
/// Rollouts run in parallel. Each one owns a generator seeded from the sampler's master seed,
/// so a seeded sampler reproduces its output bit for bit. Without a seed the master generator
/// is seeded from entropy.
#[derive(Debug, Clone)]
pub struct TrajectorySampler {
    horizon: usize,
    count: usize,
    start: StartDistribution,
    seed: Option<u64>,
}

impl TrajectorySampler {
    /// Sampler of `count` rollouts of at most `horizon` steps each
    ///
    /// **Panics** if `horizon` is zero
    pub fn new(horizon: usize, count: usize) -> Self {
        assert!(horizon > 0, "`horizon` must be positive");
        Self {
            horizon,
            count,
            start: StartDistribution::default(),
            seed: None,
        }
    }

    pub fn with_start(mut self, start: StartDistribution) -> Self {
        self.start = start;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Roll out `policy` in `mdp`
    ///
    /// **Returns** [`Error::InvalidDimension`] if the policy does not cover the MDP's states,
    /// [`Error::InvalidParameter`] for an unusable start distribution and
    /// [`Error::MalformedTransition`] for an invalid MDP
    pub fn sample<M, P>(&self, mdp: &M, policy: &P) -> Result<Vec<Trajectory>>
    where
        M: Mdp + Sync,
        P: Policy + Sync,
    {
        mdp.validate()?;
        ensure_dimension(mdp.num_states(), policy.num_states())?;
        let start = StartSampler::new(&self.start, mdp)?;

        let mut master = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let seeds = (0..self.count).map(|_| master.gen()).collect::<Vec<u64>>();

        let trajectories = seeds
            .into_par_iter()
            .map(|seed| self.rollout(mdp, policy, &start, seed))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "Sampled {} trajectories with {} steps in total",
            trajectories.len(),
            trajectories.iter().map(Trajectory::len).sum::<usize>()
        );
        Ok(trajectories)
    }

    fn rollout<M: Mdp, P: Policy>(
        &self,
        mdp: &M,
        policy: &P,
        start: &StartSampler,
        seed: u64,
    ) -> Result<Trajectory> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut state = start.sample(&mut rng);
        let mut steps = Vec::with_capacity(self.horizon);

        while steps.len() < self.horizon && !mdp.is_terminal(state) {
            let action = policy.sample_action(state, &mut rng);
            if action >= mdp.num_actions() {
                return Err(Error::InvalidParameter(format!(
                    "policy chose unknown action {action} in state {state}"
                )));
            }
            steps.push((state, action));

            let outcomes = mdp.transition(state, action);
            let successor = WeightedIndex::new(outcomes.iter().map(|o| o.prob)).map_err(|e| {
                Error::MalformedTransition {
                    state,
                    action,
                    reason: e.to_string(),
                }
            })?;
            state = outcomes[successor.sample(&mut rng)].next_state;
        }

        Ok(Trajectory::new(steps))
    }
}
