//! Serde document types for markov_grid programs.
//!
//! A program document is the JSON equivalent of the engine's node
//! vocabulary: a grid header (size, alphabet, unions) and a tree of tagged
//! nodes. [`build_model`](crate::build_model) turns a document into an
//! executable [`Interpreter`](markov_grid_engine::Interpreter).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A whole program document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDoc {
    /// Grid dimensions: `[mx]`, `[mx, my]`, or `[mx, my, mz]`.
    pub size: Vec<usize>,
    /// Ordered first-class symbols; position = value.
    pub alphabet: String,
    /// Union symbols and their members.
    #[serde(default)]
    pub unions: BTreeMap<char, String>,
    /// Seed value 1 into the center cell before running.
    #[serde(default)]
    pub origin: bool,
    /// Root symmetry; defaults to the full group.
    #[serde(default)]
    pub symmetry: Option<String>,
    pub program: NodeDoc,
}

/// One node of the tree, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "lowercase")]
pub enum NodeDoc {
    Sequence(BranchDoc),
    Markov(BranchDoc),
    One(RewriteDoc),
    All(RewriteDoc),
    Prl(RewriteDoc),
    Path(PathDoc),
    Convolution(ConvolutionDoc),
    Convchain(ConvChainDoc),
    Map(MapDoc),
    Overlap(OverlapDoc),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchDoc {
    #[serde(default)]
    pub symmetry: Option<String>,
    pub children: Vec<NodeDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteDoc {
    pub rules: Vec<RuleDoc>,
    /// Applications allowed before the node fails; 0 means unlimited.
    #[serde(default)]
    pub steps: usize,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default)]
    pub symmetry: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDoc>,
    #[serde(default, rename = "observe")]
    pub observations: Vec<ObserveDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDoc {
    #[serde(rename = "in")]
    pub input: String,
    pub out: String,
    /// Selection weight (one/all) or application probability (prl).
    #[serde(default = "default_p")]
    pub p: f64,
    #[serde(default)]
    pub symmetry: Option<String>,
}

pub(crate) fn default_p() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDoc {
    /// The value this field steers.
    #[serde(rename = "for")]
    pub target: char,
    /// Substrate the potential spreads through.
    pub on: String,
    /// Repelling seed set; exclusive with `to`.
    #[serde(default)]
    pub from: Option<String>,
    /// Attracting seed set; exclusive with `from`.
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub recompute: bool,
    #[serde(default)]
    pub essential: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserveDoc {
    /// The observed value.
    pub value: char,
    /// Immediate substitution applied when the goal is set up.
    #[serde(default)]
    pub from: Option<char>,
    /// Symbols the observed cells must eventually hold.
    pub to: String,
    /// Plan a whole trajectory instead of biasing selection.
    #[serde(default)]
    pub search: bool,
    /// Search branching bound; absent or <= 0 means unbounded.
    #[serde(default)]
    pub limit: Option<i32>,
    #[serde(default, rename = "depthCoefficient")]
    pub depth_coefficient: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathDoc {
    pub from: String,
    pub to: String,
    pub on: String,
    pub color: char,
    #[serde(default)]
    pub inertia: bool,
    #[serde(default)]
    pub longest: bool,
    #[serde(default)]
    pub edges: bool,
    #[serde(default)]
    pub vertices: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvolutionDoc {
    pub rules: Vec<ConvRuleDoc>,
    /// Kernel name; defaults to "Moore" in 2D and "VonNeumann" in 3D.
    #[serde(default)]
    pub kernel: Option<String>,
    #[serde(default)]
    pub periodic: bool,
    #[serde(default)]
    pub steps: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvRuleDoc {
    #[serde(rename = "in")]
    pub input: char,
    pub out: char,
    /// Symbols counted over the kernel.
    #[serde(default)]
    pub values: Option<String>,
    /// Accepted neighbor counts.
    #[serde(default)]
    pub sums: Option<Vec<usize>>,
    #[serde(default = "default_p")]
    pub p: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvChainDoc {
    /// Inline two-symbol sample in pattern grammar.
    pub sample: String,
    #[serde(default = "default_window")]
    pub n: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    pub black: char,
    pub white: char,
    pub on: String,
    #[serde(default)]
    pub steps: usize,
}

fn default_window() -> usize {
    3
}

fn default_temperature() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapDoc {
    /// Per-axis factors: `"2 2"` or `"1/2 1/2 1"`; missing axes stay 1.
    pub scale: String,
    pub rules: Vec<RuleDoc>,
    #[serde(default)]
    pub symmetry: Option<String>,
    #[serde(default)]
    pub children: Vec<NodeDoc>,
}

/// Recognized but refused at build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlapDoc {
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}
