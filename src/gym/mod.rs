pub mod gridworld;

pub use gridworld::{Cell, Dir, GridWorld};
