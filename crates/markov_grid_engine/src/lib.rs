//! The markov_grid rewrite engine.
//!
//! Executes a tree of nodes against a shared [`Grid`](markov_grid_core::Grid):
//! rewrite nodes (`one`/`all`/`prl`) maintain their match sets incrementally
//! over the grid's change log, fields and observations bias or direct match
//! selection, and a cooperative best-first search can plan whole
//! trajectories toward an observed goal. The [`Interpreter`] drives steps
//! and yields [`Snapshot`]s through a pull-based [`Run`] producer.
//!
//! This crate has no I/O and installs no logger; program documents are
//! loaded by `markov_grid_model`.

mod branch;
mod convchain;
mod convolution;
mod field;
mod interpreter;
mod map;
mod matcher;
mod node;
mod observation;
mod path;
mod rewrite;
mod search;

pub use branch::Branch;
pub use convchain::ConvChainNode;
pub use convolution::{kernel, ConvolutionNode, ConvolutionRule};
pub use field::Field;
pub use interpreter::{Frame, Interpreter, Run, Snapshot};
pub use map::MapNode;
pub use matcher::{scan_state_matches, Match, Matcher};
pub use node::{Ctx, Node, RunState};
pub use observation::Observation;
pub use path::PathNode;
pub use rewrite::{RewriteKind, RewriteNode, SearchParams};
pub use search::{Search, SearchOutcome, SEARCH_SLICE};
