use crate::{
    error::{Error, Result},
    trajectory::Trajectory,
    util::log_sum_exp,
};

/// Boltzmann-rational log-likelihood of a demonstration set
///
/// Every recorded pair contributes `β·Q(s,a) − log Σ_a' exp(β·Q(s,a'))`, the log-probability
/// of the expert picking `a` under a softmax over `β`-scaled action values.
///
/// ### Parameters
/// - `q_values` - `q_values[s][a]` under the candidate reward
/// - `demos` - the demonstrations
/// - `beta` - inverse temperature; larger values model a more reliably optimal expert
///
/// **Returns** [`Error::InvalidParameter`] if a demonstration visits an unknown state or action
pub fn log_likelihood(q_values: &[Vec<f64>], demos: &[Trajectory], beta: f64) -> Result<f64> {
    let log_z = q_values
        .iter()
        .map(|q| log_sum_exp(q.iter().map(|x| beta * x)))
        .collect::<Vec<_>>();

    let mut total = 0.0;
    for &(state, action) in demos.iter().flatten() {
        let q = q_values
            .get(state)
            .and_then(|row| row.get(action))
            .ok_or_else(|| {
                Error::InvalidParameter(format!(
                    "demonstration visits unknown pair (state {state}, action {action})"
                ))
            })?;
        total += beta * q - log_z[state];
    }
    Ok(total)
}
