//! Core data structures for the markov_grid rewrite engine
//!
//! This crate provides the fundamental types shared by the engine and the
//! model loader:
//! - `Grid` - The symbolic state array with alphabet, unions, and change log
//! - `Pattern` - A parsed rectangular pattern string
//! - `Rule` - A rewrite rule with bitmask input, output box, and shift tables
//! - Symmetry subgroups and rule closures under them
//!
//! Everything here is plain data plus pure algorithms; execution lives in
//! `markov_grid_engine`, document loading in `markov_grid_model`.

mod grid;
mod pattern;
mod rule;
mod symmetry;

pub use grid::{state_matches, AlphabetError, Grid, WILDCARD};
pub use pattern::{Pattern, PatternError};
pub use rule::{Rule, RuleError, NO_WRITE};
pub use symmetry::{
    cube_subgroup, cube_symmetries, default_symmetry, parse_symmetry, rule_symmetries,
    square_subgroup, square_symmetries, CubeSubgroup, SymmetryError, SymmetryGroup,
};
