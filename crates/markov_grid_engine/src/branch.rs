//! Sequence and Markov branches.
//!
//! A branch holds an ordered child list and a cursor. The cursor stays on a
//! child for as long as it keeps succeeding — a child's `Fail` is its
//! completion signal, not an error. A sequence then advances to the next
//! child and fails only once the last child is exhausted; a Markov branch
//! rewinds to the first child after every successful step, so the first
//! applicable child always runs.

use crate::node::{Ctx, Node, RunState};

#[derive(Debug)]
pub struct Branch {
    pub children: Vec<Node>,
    n: usize,
}

impl Branch {
    pub fn new(children: Vec<Node>) -> Branch {
        Branch { children, n: 0 }
    }

    /// Step the branch. `markov` selects rewind-on-entry semantics.
    ///
    /// `Halt` propagates unchanged; the cursor is untouched, so the next
    /// step resumes inside the same child.
    pub fn go(&mut self, ctx: &mut Ctx, markov: bool) -> RunState {
        if markov {
            self.n = 0;
        }
        while let Some(child) = self.children.get_mut(self.n) {
            match child.go(ctx) {
                RunState::Success => return RunState::Success,
                RunState::Halt(progress) => return RunState::Halt(progress),
                RunState::Fail => self.n += 1,
            }
        }
        // Exhausted: rewind so an enclosing loop can run this branch again.
        self.reset();
        RunState::Fail
    }

    pub fn reset(&mut self) {
        self.n = 0;
        for child in &mut self.children {
            child.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use markov_grid_core::{Grid, Pattern, Rule};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use crate::rewrite::{RewriteKind, RewriteNode};

    fn one(grid: &Grid, inp: &str, out: &str) -> Node {
        let rule = Rule::from_patterns(
            &Pattern::parse(inp).unwrap(),
            &Pattern::parse(out).unwrap(),
            grid,
            1.0,
        )
        .unwrap();
        Node::Rewrite(RewriteNode::new(RewriteKind::One, vec![rule]))
    }

    /// Markov with children [A→B, B→C] on a grid holding one A: the first
    /// child that can apply runs each step, so the cell goes A→B then B→C,
    /// then the branch fails.
    #[test]
    fn markov_reconsiders_from_the_top() {
        let mut grid = Grid::new(4, 4, 1, ".ABC").unwrap();
        grid.state[0] = 1;
        let children = vec![one(&grid, "A", "B"), one(&grid, "B", "C")];
        let mut branch = Branch::new(children);
        let mut rng = SmallRng::seed_from_u64(0);

        for (turn, expected) in [(0, 2u8), (1, 3u8)] {
            let mut ctx = Ctx {
                grid: &mut grid,
                rng: &mut rng,
                turn,
            };
            assert_eq!(branch.go(&mut ctx, true), RunState::Success);
            grid.mark_turn();
            assert_eq!(grid.state[0], expected);
        }

        let mut ctx = Ctx {
            grid: &mut grid,
            rng: &mut rng,
            turn: 2,
        };
        assert_eq!(branch.go(&mut ctx, true), RunState::Fail);
    }

    /// A sequence keeps running its current child until that child fails,
    /// then moves on.
    #[test]
    fn sequence_exhausts_children_in_order() {
        let mut grid = Grid::new(2, 1, 1, "ABC").unwrap();
        let children = vec![one(&grid, "A", "B"), one(&grid, "B", "C")];
        let mut branch = Branch::new(children);
        let mut rng = SmallRng::seed_from_u64(0);

        let mut states = Vec::new();
        for turn in 0..5 {
            let mut ctx = Ctx {
                grid: &mut grid,
                rng: &mut rng,
                turn,
            };
            let result = branch.go(&mut ctx, false);
            grid.mark_turn();
            states.push((result, grid.state.clone()));
            if result == RunState::Fail {
                break;
            }
        }

        // Two A→B applications, then two B→C, then exhaustion.
        assert_eq!(states.len(), 5);
        assert_eq!(states[1].1, vec![1, 1]);
        assert_eq!(states[3].1, vec![2, 2]);
        assert_eq!(states[4].0, RunState::Fail);
    }
}
