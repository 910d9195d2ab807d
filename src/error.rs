use thiserror::Error;

/// Errors raised while building, solving or inverting an MDP
#[derive(Debug, Error)]
pub enum Error {
    /// A transition distribution is empty, references an unknown state, or does not sum to 1
    #[error("Malformed transition from state {state} under action {action}: {reason}")]
    MalformedTransition {
        state: usize,
        action: usize,
        reason: String,
    },

    /// A weight vector does not match the dimension of the reward model or prior
    #[error("Invalid dimension: expected {expected}, found {found}")]
    InvalidDimension { expected: usize, found: usize },

    /// Policy iteration hit its iteration cap before the policy stabilized
    #[error("Policy iteration did not converge within {iterations} iterations")]
    NonConvergence { iterations: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A persisted trace could not be decoded
    #[error("Invalid trace format: {0}")]
    TraceFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn ensure_dimension(expected: usize, found: usize) -> Result<()> {
    (expected == found)
        .then_some(())
        .ok_or(Error::InvalidDimension { expected, found })
}
