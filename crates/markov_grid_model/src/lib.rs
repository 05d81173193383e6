//! Program documents for markov_grid
//!
//! This crate defines the serde schema for program documents and builds
//! executable interpreters from them.
//!
//! # Example
//!
//! ```rust,ignore
//! use markov_grid_model::parse_model;
//!
//! let mut ip = parse_model(r#"{
//!     "size": [16, 16],
//!     "alphabet": "BW",
//!     "program": { "node": "one", "rules": [{ "in": "B", "out": "W" }] }
//! }"#)?;
//!
//! for frame in ip.run(0, 100) {
//!     // hand frames to a renderer
//! }
//! ```

mod build;
mod doc;

pub use build::build_model;
pub use doc::*;

use std::path::Path;

use markov_grid_core::{AlphabetError, PatternError, RuleError, SymmetryError};
use markov_grid_engine::Interpreter;
use thiserror::Error;

/// Errors that can occur when loading or building a program document.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("parse error: {0}")]
    ParseError(String),
    #[error(transparent)]
    Alphabet(#[from] AlphabetError),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Symmetry(#[from] SymmetryError),
    #[error("unknown symbol '{symbol}' in {context}")]
    UnknownSymbol { symbol: char, context: &'static str },
    #[error("'{0}' nodes are not supported by this engine")]
    Unsupported(&'static str),
    #[error("a '{0}' node needs at least one rule")]
    EmptyRules(&'static str),
    #[error("a field takes either 'from' or 'to', exactly one")]
    FieldEndpoints,
    #[error("size needs 1 to 3 positive entries, got {0:?}")]
    BadSize(Vec<usize>),
    #[error("unknown kernel '{kernel}' for a {dims}D grid")]
    UnknownKernel { kernel: String, dims: u8 },
    #[error("bad scale '{0}': expected up to three n or n/d factors")]
    BadScale(String),
    #[error("convolution sums need a 'values' set")]
    SumsWithoutValues,
    #[error("convolution sum {sum} exceeds the kernel size {kernel}")]
    BadSum { sum: usize, kernel: usize },
    #[error("convchain window {n} must be between 2 and 4 and fit the grid")]
    BadWindow { n: usize },
    #[error("convchain sample may only contain '{black}' and '{white}'")]
    BadSample { black: char, white: char },
    #[error("'{0}' requires a 2D grid")]
    Needs2d(&'static str),
}

/// Load a program from a JSON file.
pub fn load_model(path: &Path) -> Result<Interpreter, ModelError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| ModelError::IoError(e.to_string()))?;
    parse_model(&content)
}

/// Parse a program from a JSON string.
pub fn parse_model(json: &str) -> Result<Interpreter, ModelError> {
    let doc = parse_doc(json)?;
    build_model(&doc)
}

/// Parse just the document, without building it.
pub fn parse_doc(json: &str) -> Result<ModelDoc, ModelError> {
    serde_json::from_str(json).map_err(|e| ModelError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use markov_grid_engine::Frame;

    fn final_state(ip: &mut Interpreter, seed: u64, steps: usize) -> Vec<u8> {
        let mut last = None;
        for frame in ip.run(seed, steps) {
            if let Frame::Snapshot(s) = frame {
                last = Some(s.state);
            }
        }
        last.unwrap()
    }

    #[test]
    fn builds_a_minimal_one_node_program() {
        let mut ip = parse_model(
            r#"{
                "size": [5, 5],
                "alphabet": "BW",
                "program": { "node": "one", "rules": [{ "in": "B", "out": "W" }], "steps": 3 }
            }"#,
        )
        .unwrap();
        let state = final_state(&mut ip, 0, 0);
        assert_eq!(state.iter().filter(|&&v| v == 1).count(), 3);
    }

    #[test]
    fn builds_a_markov_program_with_unions() {
        let mut ip = parse_model(
            r#"{
                "size": [4, 4],
                "alphabet": ".AB",
                "unions": { "?": "AB" },
                "origin": true,
                "program": {
                    "node": "markov",
                    "children": [
                        { "node": "one", "rules": [{ "in": "?.", "out": "*A" }], "steps": 2 },
                        { "node": "all", "rules": [{ "in": "A", "out": "B" }] }
                    ]
                }
            }"#,
        )
        .unwrap();
        let state = final_state(&mut ip, 1, 0);
        // Origin seeded an A; growth then conversion leaves only B cells.
        assert!(state.iter().any(|&v| v == 2));
        assert!(state.iter().all(|&v| v != 1));
    }

    #[test]
    fn rejects_unknown_symbols_in_rules() {
        let err = parse_model(
            r#"{
                "size": [4, 4],
                "alphabet": "BW",
                "program": { "node": "one", "rules": [{ "in": "X", "out": "W" }] }
            }"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ModelError::Rule(markov_grid_core::RuleError::UnknownSymbol('X'))
        ));
    }

    #[test]
    fn rejects_unknown_symmetry_strings() {
        let err = parse_model(
            r#"{
                "size": [4, 4],
                "alphabet": "BW",
                "program": {
                    "node": "one",
                    "symmetry": "(q)",
                    "rules": [{ "in": "B", "out": "W" }]
                }
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::Symmetry(_)));
    }

    #[test]
    fn refuses_overlap_nodes() {
        let err = parse_model(
            r#"{
                "size": [4, 4],
                "alphabet": "BW",
                "program": { "node": "overlap", "sample": "W" }
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::Unsupported("overlap")));
    }

    /// Fields and observations are independent processing steps and may
    /// share a node; their potentials sum into the same selection bias.
    #[test]
    fn fields_and_observations_share_a_node() {
        let mut ip = parse_model(
            r#"{
                "size": [4, 4],
                "alphabet": "BWR",
                "program": {
                    "node": "one",
                    "rules": [{ "in": "B", "out": "W" }],
                    "steps": 3,
                    "temperature": 1.0,
                    "fields": [{ "for": "W", "on": "BW", "to": "B" }],
                    "observe": [{ "value": "B", "to": "BW" }]
                }
            }"#,
        )
        .unwrap();
        let state = final_state(&mut ip, 0, 0);
        assert_eq!(state.iter().filter(|&&v| v == 1).count(), 3);
    }

    #[test]
    fn ragged_patterns_name_the_offender() {
        let err = parse_model(
            r#"{
                "size": [4, 4],
                "alphabet": "BW",
                "program": { "node": "one", "rules": [{ "in": "BW,B", "out": "WW,WW" }] }
            }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("BW,B"));
    }

    #[test]
    fn documents_round_trip_deterministically() {
        let json = r#"{
            "size": [8, 8],
            "alphabet": "BWR",
            "program": {
                "node": "sequence",
                "children": [
                    { "node": "one", "rules": [{ "in": "B", "out": "W" }], "steps": 10 },
                    { "node": "prl", "rules": [{ "in": "W", "out": "R", "p": 0.5 }], "steps": 4 }
                ]
            }
        }"#;
        let mut a = parse_model(json).unwrap();
        let mut b = parse_model(json).unwrap();
        assert_eq!(final_state(&mut a, 9, 0), final_state(&mut b, 9, 0));
    }

    #[test]
    fn builds_a_path_program() {
        let mut ip = parse_model(
            r#"{
                "size": [6, 1],
                "alphabet": "ERFP",
                "program": {
                    "node": "sequence",
                    "children": [
                        { "node": "one", "rules": [{ "in": "EEEEEE", "out": "R****F", "symmetry": "()" }], "steps": 1 },
                        { "node": "path", "from": "R", "to": "F", "on": "E", "color": "P" }
                    ]
                }
            }"#,
        )
        .unwrap();
        let state = final_state(&mut ip, 0, 0);
        assert_eq!(state, vec![1, 3, 3, 3, 3, 2]);
    }
}
