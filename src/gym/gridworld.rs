use std::str::FromStr;

use strum::{EnumIter, FromRepr, IntoEnumIterator, VariantArray};

use crate::{
    env::{LinearReward, Outcome, TabularMdp},
    error::{Error, Result},
    trajectory::StartDistribution,
};

/// Type of a grid cell, with the numeric code used in map files
#[derive(FromRepr, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Cell {
    Free = 0,
    Obstacle = 1,
    Goal = 2,
    Start = 3,
}

impl Cell {
    /// Index of the cell's reward feature: free space (including start cells), obstacle, goal
    fn feature(self) -> usize {
        match self {
            Cell::Free | Cell::Start => 0,
            Cell::Obstacle => 1,
            Cell::Goal => 2,
        }
    }
}

/// Compass moves, also the action indices of a grid world MDP
#[derive(EnumIter, VariantArray, FromRepr, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dir {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
}

impl Dir {
    fn offset(self) -> (isize, isize) {
        match self {
            Dir::North => (-1, 0),
            Dir::East => (0, 1),
            Dir::South => (1, 0),
            Dir::West => (0, -1),
        }
    }
}

/// Number of reward features of a grid world
pub const NUM_FEATURES: usize = 3;

/// A 2D map of cells that can be turned into a [`TabularMdp`]
///
/// States are cells in row-major order. Actions are the four [`Dir`] moves. Moving off the
/// grid leaves the agent in place; obstacles can be entered but carry their own reward
/// feature. Goal cells are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridWorld {
    cells: Vec<Cell>,
    rows: usize,
    cols: usize,
}

impl GridWorld {
    /// **Returns** [`Error::InvalidParameter`] if `cells` does not hold `rows * cols` entries
    pub fn new(cells: Vec<Cell>, rows: usize, cols: usize) -> Result<Self> {
        if rows == 0 || cols == 0 || cells.len() != rows * cols {
            return Err(Error::InvalidParameter(format!(
                "a {rows}x{cols} grid needs {} cells, got {}",
                rows * cols,
                cells.len()
            )));
        }
        Ok(Self { cells, rows, cols })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn num_states(&self) -> usize {
        self.cells.len()
    }

    /// State index of a cell
    pub fn state(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    /// `(row, col)` of a state
    pub fn position(&self, state: usize) -> (usize, usize) {
        (state / self.cols, state % self.cols)
    }

    pub fn cell(&self, state: usize) -> Cell {
        self.cells[state]
    }

    /// The state reached by moving in `dir`, staying put at the border
    pub fn step(&self, state: usize, dir: Dir) -> usize {
        let (row, col) = self.position(state);
        let (dr, dc) = dir.offset();
        match (row.checked_add_signed(dr), col.checked_add_signed(dc)) {
            (Some(r), Some(c)) if r < self.rows && c < self.cols => self.state(r, c),
            _ => state,
        }
    }

    /// One-hot reward features, `[free, obstacle, goal]` per state
    pub fn features(&self) -> Vec<Vec<f64>> {
        self.cells
            .iter()
            .map(|cell| {
                let mut phi = vec![0.0; NUM_FEATURES];
                phi[cell.feature()] = 1.0;
                phi
            })
            .collect()
    }

    pub fn terminals(&self) -> Vec<bool> {
        self.cells.iter().map(|&c| c == Cell::Goal).collect()
    }

    /// Transition tables where the intended move succeeds with probability `1 - slip` and
    /// each other move happens with probability `slip / 3`
    ///
    /// **Returns** [`Error::InvalidParameter`] if `slip` is not in `[0, 1]`
    pub fn transitions(&self, slip: f64) -> Result<Vec<Vec<Vec<Outcome>>>> {
        if !(0.0..=1.0).contains(&slip) {
            return Err(Error::InvalidParameter(format!(
                "`slip` must be in [0, 1], got {slip}"
            )));
        }

        let num_dirs = Dir::VARIANTS.len();
        let transitions = (0..self.num_states())
            .map(|state| {
                Dir::iter()
                    .map(|intended| {
                        if self.cells[state] == Cell::Goal {
                            return vec![Outcome::new(state, 1.0)];
                        }
                        let mut outcomes: Vec<Outcome> = Vec::with_capacity(num_dirs);
                        for dir in Dir::iter() {
                            let prob = if dir == intended {
                                1.0 - slip
                            } else {
                                slip / (num_dirs - 1) as f64
                            };
                            if prob <= 0.0 {
                                continue;
                            }
                            let next_state = self.step(state, dir);
                            match outcomes.iter_mut().find(|o| o.next_state == next_state) {
                                Some(o) => o.prob += prob,
                                None => outcomes.push(Outcome::new(next_state, prob)),
                            }
                        }
                        outcomes
                    })
                    .collect()
            })
            .collect();
        Ok(transitions)
    }

    /// States where demonstrations start: start cells if the map has any, else free cells
    pub fn start_states(&self) -> Vec<usize> {
        let of = |kind: Cell| {
            (0..self.num_states())
                .filter(|&s| self.cells[s] == kind)
                .collect::<Vec<_>>()
        };
        let starts = of(Cell::Start);
        if starts.is_empty() {
            of(Cell::Free)
        } else {
            starts
        }
    }

    pub fn start_distribution(&self) -> StartDistribution {
        StartDistribution::Uniform(self.start_states())
    }

    /// Build the MDP of this grid
    ///
    /// ### Parameters
    /// - `weights` - reward weights for the `[free, obstacle, goal]` features
    /// - `rmax` - bound on the magnitude of the reward
    /// - `discount` - discount factor in `[0, 1)`
    /// - `slip` - probability that the agent moves in an unintended direction
    pub fn mdp(&self, weights: Vec<f64>, rmax: f64, discount: f64, slip: f64) -> Result<TabularMdp> {
        let reward = LinearReward::new(self.features(), weights, rmax)?;
        TabularMdp::new(self.transitions(slip)?, reward, discount, self.terminals())
    }
}

impl FromStr for GridWorld {
    type Err = Error;

    /// Parse a map of whitespace-separated cell codes, one row per line
    fn from_str(s: &str) -> Result<Self> {
        let mut cells = Vec::new();
        let mut rows = 0;
        let mut cols = None;

        for line in s.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let row = line
                .split_whitespace()
                .map(parse_cell)
                .collect::<Result<Vec<_>>>()?;
            if *cols.get_or_insert(row.len()) != row.len() {
                return Err(Error::InvalidParameter(format!(
                    "row {rows} has {} cells, expected {}",
                    row.len(),
                    cols.unwrap_or_default()
                )));
            }
            cells.extend(row);
            rows += 1;
        }

        Self::new(cells, rows, cols.unwrap_or_default())
    }
}

fn parse_cell(token: &str) -> Result<Cell> {
    let invalid = || Error::InvalidParameter(format!("invalid cell code `{token}`"));
    let code: f64 = token.parse().map_err(|_| invalid())?;
    if code.fract() != 0.0 || !(0.0..=u8::MAX as f64).contains(&code) {
        return Err(invalid());
    }
    Cell::from_repr(code as u8).ok_or_else(invalid)
}
