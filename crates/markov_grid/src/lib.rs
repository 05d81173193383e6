//! Procedural grid-rewriting engine.
//!
//! A program is a tree of nodes (sequences, Markov branches, rewrite rules,
//! generators) that evolves a symbolic 1D/2D/3D grid; running it yields a
//! deterministic sequence of snapshots for an external renderer.
//!
//! This umbrella crate re-exports the three layers:
//! - [`core`] — grid, alphabet, patterns, rules, symmetry
//! - [`engine`] — matcher, node tree, fields, observations, search
//! - [`model`] — serde program documents and [`model::load_model`]
//!
//! ```rust,ignore
//! let mut ip = markov_grid::model::parse_model(json)?;
//! for frame in ip.run(seed, steps) {
//!     // render snapshots, surface search progress
//! }
//! ```

pub use markov_grid_core as core;
pub use markov_grid_engine as engine;
pub use markov_grid_model as model;

pub use markov_grid_engine::{Frame, Interpreter, Run, Snapshot};
pub use markov_grid_model::{load_model, parse_model, ModelError};
