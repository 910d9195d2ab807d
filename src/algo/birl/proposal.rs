use rand::Rng;

use crate::prob::RewardPrior;

/// Proposal strategy of the MCMC walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Inference {
    /// Grid walk: one coordinate moves by `±delta`, confined to `[-rmax, rmax]`
    #[default]
    PolicyWalk,
    /// Continuous Gaussian perturbation of every coordinate, delegated to the prior
    RandomWalk,
}

/// Something that turns the current reward weights into a candidate
pub trait Propose {
    fn propose<P, R>(&self, current: &[f64], prior: &P, rng: &mut R) -> Vec<f64>
    where
        P: RewardPrior,
        R: Rng + ?Sized;
}

/// Slack on the box edge that absorbs rounding in repeated `±delta` steps
const EDGE_TOLERANCE: f64 = 1e-9;

/// Uniform grid step used by Policy-Walk
///
/// A step that would leave `[-rmax, rmax]` proposes the current weights unchanged, which keeps
/// the proposal symmetric so the Metropolis rule needs no Hastings correction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridStep {
    pub delta: f64,
    pub rmax: f64,
}

impl Propose for GridStep {
    fn propose<P, R>(&self, current: &[f64], _prior: &P, rng: &mut R) -> Vec<f64>
    where
        P: RewardPrior,
        R: Rng + ?Sized,
    {
        let mut candidate = current.to_vec();
        if candidate.is_empty() {
            return candidate;
        }
        let i = rng.gen_range(0..candidate.len());
        let step = if rng.gen::<bool>() { self.delta } else { -self.delta };
        let moved = candidate[i] + step;
        if moved.abs() <= self.rmax + EDGE_TOLERANCE {
            candidate[i] = moved.clamp(-self.rmax, self.rmax);
        }
        candidate
    }
}

/// Gaussian random-walk step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianStep {
    pub delta: f64,
}

impl Propose for GaussianStep {
    fn propose<P, R>(&self, current: &[f64], prior: &P, rng: &mut R) -> Vec<f64>
    where
        P: RewardPrior,
        R: Rng + ?Sized,
    {
        prior.perturb(current, self.delta, rng)
    }
}

/// The proposal selected by an [`Inference`] method
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Proposal {
    PolicyWalk(GridStep),
    RandomWalk(GaussianStep),
}

impl Proposal {
    pub fn new(inference: Inference, delta: f64, rmax: f64) -> Self {
        match inference {
            Inference::PolicyWalk => Self::PolicyWalk(GridStep { delta, rmax }),
            Inference::RandomWalk => Self::RandomWalk(GaussianStep { delta }),
        }
    }
}

impl Propose for Proposal {
    fn propose<P, R>(&self, current: &[f64], prior: &P, rng: &mut R) -> Vec<f64>
    where
        P: RewardPrior,
        R: Rng + ?Sized,
    {
        match self {
            Self::PolicyWalk(step) => step.propose(current, prior, rng),
            Self::RandomWalk(step) => step.propose(current, prior, rng),
        }
    }
}
