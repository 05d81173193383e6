//! Bounded best-first trajectory search.
//!
//! Given a start state and a future set, the search explores single-rule
//! applications, ranking partial trajectories by
//! `depth + depth_coefficient * heuristic` where the heuristic sums the
//! backward potential of every cell's current value. The search runs as an
//! explicit state machine: [`Search::resume`] expands a bounded slice of
//! boards per call so the engine can yield `Halt` between slices, and
//! finally yields the trajectory of snapshots from start to goal, or None
//! on exhaustion.

use std::collections::{BinaryHeap, HashSet};

use markov_grid_core::Rule;

use crate::matcher::scan_state_matches;
use crate::observation::{backward_estimate, compute_backward_potentials};

/// Boards expanded per [`Search::resume`] call; bounds the latency between
/// cooperative yields.
pub const SEARCH_SLICE: usize = 256;

pub enum SearchOutcome {
    /// Slice exhausted without a verdict; the payload counts visited states.
    Running(usize),
    /// Finished: the trajectory from the start state to a goal state
    /// inclusive, or None when the space was exhausted.
    Done(Option<Vec<Vec<u8>>>),
}

#[derive(Debug)]
struct Board {
    state: Vec<u8>,
    parent: usize,
    depth: usize,
}

/// Frontier entry; orders the max-heap so the lowest priority pops first,
/// ties broken toward the earliest insertion.
#[derive(Debug)]
struct Candidate {
    priority: f64,
    seq: usize,
    board: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug)]
pub struct Search {
    boards: Vec<Board>,
    frontier: BinaryHeap<Candidate>,
    visited: HashSet<Vec<u8>>,
    potentials: Vec<Vec<i32>>,
    mx: usize,
    my: usize,
    mz: usize,
    /// Children kept per expansion; <= 0 means unbounded.
    limit: i32,
    depth_coefficient: f64,
    seq: usize,
    /// Set when the start state already satisfies the future set.
    solved_at_root: bool,
    infeasible: bool,
}

impl Search {
    pub fn new(
        state: &[u8],
        future: &[u32],
        rules: &[Rule],
        (mx, my, mz): (usize, usize, usize),
        alphabet: u8,
        limit: i32,
        depth_coefficient: f64,
    ) -> Search {
        let mut potentials = vec![vec![0i32; state.len()]; alphabet as usize];
        compute_backward_potentials(&mut potentials, future, (mx, my, mz), rules);

        let mut search = Search {
            boards: Vec::new(),
            frontier: BinaryHeap::new(),
            visited: HashSet::new(),
            potentials,
            mx,
            my,
            mz,
            limit,
            depth_coefficient,
            seq: 0,
            solved_at_root: false,
            infeasible: false,
        };

        match backward_estimate(state, &search.potentials) {
            None => search.infeasible = true,
            Some(estimate) => {
                search.visited.insert(state.to_vec());
                search.boards.push(Board {
                    state: state.to_vec(),
                    parent: usize::MAX,
                    depth: 0,
                });
                if estimate == 0 {
                    search.solved_at_root = true;
                } else {
                    search.push_candidate(0, 0, estimate);
                }
            }
        }
        search
    }

    /// Expand up to `SEARCH_SLICE` boards, then yield.
    pub fn resume(&mut self, rules: &[Rule]) -> SearchOutcome {
        if self.infeasible {
            return SearchOutcome::Done(None);
        }
        if self.solved_at_root {
            return SearchOutcome::Done(Some(self.trajectory(0)));
        }

        for _ in 0..SEARCH_SLICE {
            let Some(candidate) = self.frontier.pop() else {
                log::debug!(
                    "search exhausted after visiting {} states",
                    self.visited.len()
                );
                return SearchOutcome::Done(None);
            };
            if let Some(goal) = self.expand(candidate.board, rules) {
                return SearchOutcome::Done(Some(self.trajectory(goal)));
            }
        }
        SearchOutcome::Running(self.visited.len())
    }

    /// Apply every rule match on the board once; returns a goal board index
    /// as soon as one appears.
    fn expand(&mut self, board: usize, rules: &[Rule]) -> Option<usize> {
        let depth = self.boards[board].depth + 1;
        let mut matches = Vec::new();
        scan_state_matches(
            rules,
            &self.boards[board].state,
            (self.mx, self.my, self.mz),
            |m| matches.push(m),
        );

        let mut kept = 0;
        for m in matches {
            let mut child = self.boards[board].state.clone();
            if !rules[m.r].apply_to(&mut child, self.mx, self.my, m.x, m.y, m.z) {
                continue;
            }
            if self.visited.contains(&child) {
                continue;
            }
            let Some(estimate) = backward_estimate(&child, &self.potentials) else {
                continue;
            };
            self.visited.insert(child.clone());
            let index = self.boards.len();
            self.boards.push(Board {
                state: child,
                parent: board,
                depth,
            });
            if estimate == 0 {
                return Some(index);
            }
            self.push_candidate(index, depth, estimate);
            kept += 1;
            if self.limit > 0 && kept >= self.limit {
                break;
            }
        }
        None
    }

    fn push_candidate(&mut self, board: usize, depth: usize, estimate: i64) {
        let priority = depth as f64 + self.depth_coefficient * estimate as f64;
        self.frontier.push(Candidate {
            priority,
            seq: self.seq,
            board,
        });
        self.seq += 1;
    }

    /// Snapshots from the start state to `board`, inclusive.
    fn trajectory(&self, board: usize) -> Vec<Vec<u8>> {
        let mut states = Vec::new();
        let mut index = board;
        loop {
            states.push(self.boards[index].state.clone());
            if self.boards[index].parent == usize::MAX {
                break;
            }
            index = self.boards[index].parent;
        }
        states.reverse();
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use markov_grid_core::{Grid, Pattern, Rule};

    fn rule(grid: &Grid, inp: &str, out: &str) -> Rule {
        Rule::from_patterns(
            &Pattern::parse(inp).unwrap(),
            &Pattern::parse(out).unwrap(),
            grid,
            1.0,
        )
        .unwrap()
    }

    fn run_to_completion(search: &mut Search, rules: &[Rule]) -> Option<Vec<Vec<u8>>> {
        loop {
            match search.resume(rules) {
                SearchOutcome::Running(_) => {}
                SearchOutcome::Done(result) => return result,
            }
        }
    }

    /// A lone R walks to the marked far end: every trajectory snapshot is a
    /// legal intermediate state and the last one satisfies the future set.
    #[test]
    fn finds_a_shifting_trajectory() {
        let grid = Grid::new(4, 1, 1, "BRTW").unwrap();
        let rules = vec![rule(&grid, "RB", "BR"), rule(&grid, "RT", "BW")];
        let state = vec![1u8, 0, 0, 2];
        // R must vanish into B, T must become W, B stays B.
        let future = vec![0b0001, 0b0001, 0b0001, 0b1000];

        let mut search = Search::new(&state, &future, &rules, (4, 1, 1), 4, 0, 0.5);
        let trajectory = run_to_completion(&mut search, &rules).unwrap();

        assert_eq!(trajectory.first().unwrap(), &state);
        assert_eq!(trajectory.last().unwrap(), &vec![0u8, 0, 0, 3]);
        // Three applications: two shifts and the absorption.
        assert_eq!(trajectory.len(), 4);
    }

    #[test]
    fn infeasible_future_returns_none() {
        let grid = Grid::new(3, 1, 1, "BRW").unwrap();
        let rules = vec![rule(&grid, "RB", "BR")];
        let state = vec![1u8, 0, 0];
        // W is demanded but nothing produces it.
        let future = vec![0b001, 0b001, 0b100];
        let mut search = Search::new(&state, &future, &rules, (3, 1, 1), 3, 0, 0.5);
        assert!(run_to_completion(&mut search, &rules).is_none());
    }

    /// Each cell's goal is reachable in isolation, but the single R is
    /// consumed by its first conversion: the space exhausts without a
    /// solution.
    #[test]
    fn exhaustion_without_goal_returns_none() {
        let grid = Grid::new(3, 1, 1, "BRW").unwrap();
        let rules = vec![rule(&grid, "RB", "BW")];
        let state = vec![1u8, 0, 0];
        let future = vec![0b001, 0b100, 0b100];
        let mut search = Search::new(&state, &future, &rules, (3, 1, 1), 3, 0, 0.5);
        assert!(run_to_completion(&mut search, &rules).is_none());
    }

    #[test]
    fn solved_start_yields_a_single_snapshot() {
        let grid = Grid::new(2, 1, 1, "BR").unwrap();
        let rules = vec![rule(&grid, "RB", "BR")];
        let state = vec![0u8, 1];
        let future = vec![0b01, 0b10];
        let mut search = Search::new(&state, &future, &rules, (2, 1, 1), 2, 0, 0.5);
        let trajectory = run_to_completion(&mut search, &rules).unwrap();
        assert_eq!(trajectory, vec![state]);
    }
}
