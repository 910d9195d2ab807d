pub mod birl;
pub mod policy_iteration;

pub use birl::{Birl, BirlConfig};
pub use policy_iteration::{Evaluation, Plan, PolicyIteration, PolicyIterationConfig};
