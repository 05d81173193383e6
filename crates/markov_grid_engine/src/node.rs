//! The execution tree: node variants, run states, and the step context.

use markov_grid_core::Grid;
use rand::rngs::SmallRng;

use crate::branch::Branch;
use crate::convchain::ConvChainNode;
use crate::convolution::ConvolutionNode;
use crate::map::MapNode;
use crate::path::PathNode;
use crate::rewrite::RewriteNode;

/// Outcome of a single node step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// The node made observable progress this step.
    Success,
    /// The node has nothing left to do, or hit its step limit.
    Fail,
    /// Cooperative yield from a long-running search; the payload is the
    /// number of states visited so far. Not a failure — the next step
    /// resumes at the same cursor.
    Halt(usize),
}

/// Per-step context threaded through the tree: the shared grid, the single
/// seeded RNG, and the current turn number. Nodes borrow everything for the
/// duration of one step; nothing holds a back-reference to the interpreter.
pub struct Ctx<'a> {
    pub grid: &'a mut Grid,
    pub rng: &'a mut SmallRng,
    pub turn: usize,
}

/// A node of the execution tree.
#[derive(Debug)]
pub enum Node {
    Sequence(Branch),
    Markov(Branch),
    Rewrite(RewriteNode),
    Path(PathNode),
    Convolution(ConvolutionNode),
    ConvChain(ConvChainNode),
    Map(MapNode),
}

impl Node {
    /// Advance this node by one step.
    pub fn go(&mut self, ctx: &mut Ctx) -> RunState {
        match self {
            Node::Sequence(branch) => branch.go(ctx, false),
            Node::Markov(branch) => branch.go(ctx, true),
            Node::Rewrite(node) => node.go(ctx),
            Node::Path(node) => node.go(ctx),
            Node::Convolution(node) => node.go(ctx),
            Node::ConvChain(node) => node.go(ctx),
            Node::Map(node) => node.go(ctx),
        }
    }

    /// Return the node (and its children) to the not-yet-run state.
    pub fn reset(&mut self) {
        match self {
            Node::Sequence(branch) | Node::Markov(branch) => branch.reset(),
            Node::Rewrite(node) => node.reset(),
            Node::Path(_) => {}
            Node::Convolution(node) => node.reset(),
            Node::ConvChain(node) => node.reset(),
            Node::Map(node) => node.reset(),
        }
    }
}
