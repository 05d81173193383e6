//! The interpreter: owns the grid and the node tree, drives steps, and
//! hands out snapshots.

use markov_grid_core::Grid;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::node::{Ctx, Node, RunState};

/// One observable grid state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub state: Vec<u8>,
    /// The alphabet, in value order.
    pub legend: String,
    pub fx: usize,
    pub fy: usize,
    pub fz: usize,
}

/// What a run yields per pull: a snapshot after an applied step, or a
/// progress marker while a search is holding the step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Snapshot(Snapshot),
    Progress(usize),
}

#[derive(Debug)]
pub struct Interpreter {
    pub grid: Grid,
    pub root: Node,
    /// Seed value 1 into the center cell before running.
    pub origin: bool,
    rng: SmallRng,
    turn: usize,
    done: bool,
}

impl Interpreter {
    pub fn new(grid: Grid, root: Node, origin: bool) -> Interpreter {
        Interpreter {
            grid,
            root,
            origin,
            rng: SmallRng::seed_from_u64(0),
            turn: 0,
            done: false,
        }
    }

    /// Start a fresh run and return its lazy frame producer.
    ///
    /// `steps` caps the number of applied steps; 0 means run to completion.
    /// Dropping the producer abandons the run at any suspension point.
    pub fn run(&mut self, seed: u64, steps: usize) -> Run<'_> {
        self.rng = SmallRng::seed_from_u64(seed);
        self.grid.clear();
        if self.origin {
            let center = (self.grid.mx / 2, self.grid.my / 2, self.grid.mz / 2);
            let i = self.grid.index(center.0, center.1, center.2);
            self.grid.state[i] = 1;
            self.grid.changes.push(center);
        }
        self.root.reset();
        self.turn = 0;
        self.done = false;
        Run {
            ip: self,
            steps,
            emitted_final: false,
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.grid.state.clone(),
            legend: self.grid.characters.iter().collect(),
            fx: self.grid.mx,
            fy: self.grid.my,
            fz: self.grid.mz,
        }
    }
}

/// Lazy producer over one run. Emits at most one snapshot per applied step
/// and exactly one final snapshot when the run terminates (root exhaustion
/// or step cap).
pub struct Run<'a> {
    ip: &'a mut Interpreter,
    steps: usize,
    emitted_final: bool,
}

impl Iterator for Run<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.ip.done {
            if self.emitted_final {
                return None;
            }
            self.emitted_final = true;
            return Some(Frame::Snapshot(self.ip.snapshot()));
        }

        if self.steps > 0 && self.ip.turn >= self.steps {
            self.ip.done = true;
        } else {
            let mut ctx = Ctx {
                grid: &mut self.ip.grid,
                rng: &mut self.ip.rng,
                turn: self.ip.turn,
            };
            match self.ip.root.go(&mut ctx) {
                RunState::Success => {
                    self.ip.turn += 1;
                    self.ip.grid.mark_turn();
                    return Some(Frame::Snapshot(self.ip.snapshot()));
                }
                RunState::Halt(progress) => return Some(Frame::Progress(progress)),
                RunState::Fail => self.ip.done = true,
            }
        }

        self.emitted_final = true;
        Some(Frame::Snapshot(self.ip.snapshot()))
    }
}
