/// Planning and inference algorithms
pub mod algo;

/// Crate error type
pub mod error;

/// Finite MDPs with linear rewards
pub mod env;

/// Testing environments
pub mod gym;

/// Distances between rewards
pub mod loss;

/// Deterministic and stochastic policies
pub mod policy;

/// Reward priors
pub mod prob;

/// Demonstrations and their sampling
pub mod trajectory;

mod util;

pub use error::{Error, Result};
