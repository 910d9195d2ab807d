/// Asserts that a numerical value is in the provided interval `[a,b]` and panics
/// with a helpful message if not
///
/// ### Example
/// ```
/// # use birl::assert_interval;
/// let value = 2.0;
/// assert_interval!(value, 0.0, 3.0);
/// ```
/// A value outside the interval panics with the message "Invalid value for \`value\`. Must be in the interval \[0.0, 1.0\]."
#[macro_export]
macro_rules! assert_interval {
    ($var:expr, $a:expr, $b:expr) => {
        assert!(
            $var >= $a && $var <= $b,
            "Invalid value for `{}`. Must be in the interval [{}, {}].",
            stringify!($var),
            $a,
            $b,
        );
    };
}

/// Relative tolerance under which two action values are treated as tied
const TIE_TOLERANCE: f64 = 1e-12;

/// Numerically stable `log(Σ exp(x))`
///
/// Returns `-inf` for an empty slice or when every element is `-inf`.
pub(crate) fn log_sum_exp(values: impl IntoIterator<Item = f64> + Clone) -> f64 {
    let max = values.clone().into_iter().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.into_iter().map(|x| (x - max).exp()).sum();
    max + sum.ln()
}

/// Index of the largest value, preferring the lowest index among ties
///
/// Values within `slack` of the maximum count as tied.
pub(crate) fn argmax(values: &[f64], slack: f64) -> usize {
    let best = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let slack = slack.max(TIE_TOLERANCE * best.abs().max(1.0));
    values
        .iter()
        .position(|&v| v >= best - slack)
        .unwrap_or_default()
}
