//! Construction of the executable tree from a validated document.

use markov_grid_core::{
    default_symmetry, parse_symmetry, rule_symmetries, Grid, Pattern, Rule, SymmetryGroup,
};
use markov_grid_engine::{
    kernel, Branch, ConvChainNode, ConvolutionNode, ConvolutionRule, Field, Interpreter, MapNode,
    Node, Observation, PathNode, RewriteKind, RewriteNode, SearchParams,
};

use crate::doc::{
    ConvChainDoc, ConvolutionDoc, MapDoc, ModelDoc, NodeDoc, PathDoc, RewriteDoc, RuleDoc,
};
use crate::ModelError;

/// Build an [`Interpreter`] from a document.
pub fn build_model(doc: &ModelDoc) -> Result<Interpreter, ModelError> {
    let (mx, my, mz) = match doc.size.as_slice() {
        [mx] => (*mx, 1, 1),
        [mx, my] => (*mx, *my, 1),
        [mx, my, mz] => (*mx, *my, *mz),
        _ => return Err(ModelError::BadSize(doc.size.clone())),
    };
    if mx == 0 || my == 0 || mz == 0 {
        return Err(ModelError::BadSize(doc.size.clone()));
    }

    let mut grid = Grid::new(mx, my, mz, &doc.alphabet)?;
    for (&symbol, members) in &doc.unions {
        grid.add_union(symbol, members)?;
    }

    let d2 = mz == 1;
    let parent = parse_symmetry(d2, doc.symmetry.as_deref(), default_symmetry(d2))?;
    let root = build_node(&doc.program, &grid, d2, parent)?;
    Ok(Interpreter::new(grid, root, doc.origin))
}

fn build_node(
    doc: &NodeDoc,
    grid: &Grid,
    d2: bool,
    parent: SymmetryGroup,
) -> Result<Node, ModelError> {
    match doc {
        NodeDoc::Sequence(branch) => {
            let symmetry = parse_symmetry(d2, branch.symmetry.as_deref(), parent)?;
            Ok(Node::Sequence(build_branch(
                &branch.children,
                grid,
                d2,
                symmetry,
            )?))
        }
        NodeDoc::Markov(branch) => {
            let symmetry = parse_symmetry(d2, branch.symmetry.as_deref(), parent)?;
            Ok(Node::Markov(build_branch(
                &branch.children,
                grid,
                d2,
                symmetry,
            )?))
        }
        NodeDoc::One(rewrite) => build_rewrite(RewriteKind::One, "one", rewrite, grid, d2, parent),
        NodeDoc::All(rewrite) => build_rewrite(RewriteKind::All, "all", rewrite, grid, d2, parent),
        NodeDoc::Prl(rewrite) => build_rewrite(RewriteKind::Prl, "prl", rewrite, grid, d2, parent),
        NodeDoc::Path(path) => build_path(path, grid),
        NodeDoc::Convolution(convolution) => build_convolution(convolution, grid, d2),
        NodeDoc::Convchain(convchain) => build_convchain(convchain, grid, d2),
        NodeDoc::Map(map) => build_map(map, grid, d2, parent),
        NodeDoc::Overlap(_) => Err(ModelError::Unsupported("overlap")),
    }
}

fn build_branch(
    children: &[NodeDoc],
    grid: &Grid,
    d2: bool,
    symmetry: SymmetryGroup,
) -> Result<Branch, ModelError> {
    let nodes = children
        .iter()
        .map(|child| build_node(child, grid, d2, symmetry))
        .collect::<Result<Vec<Node>, ModelError>>()?;
    Ok(Branch::new(nodes))
}

fn build_rules(
    docs: &[RuleDoc],
    grid: &Grid,
    d2: bool,
    node_symmetry: SymmetryGroup,
) -> Result<Vec<Rule>, ModelError> {
    let mut rules = Vec::new();
    for doc in docs {
        let input = Pattern::parse(&doc.input)?;
        let output = Pattern::parse(&doc.out)?;
        let mut rule = Rule::from_patterns(&input, &output, grid, doc.p)?;
        rule.original = true;
        let symmetry = parse_symmetry(d2, doc.symmetry.as_deref(), node_symmetry)?;
        rules.extend(rule_symmetries(&rule, symmetry));
    }
    Ok(rules)
}

fn build_rewrite(
    kind: RewriteKind,
    tag: &'static str,
    doc: &RewriteDoc,
    grid: &Grid,
    d2: bool,
    parent: SymmetryGroup,
) -> Result<Node, ModelError> {
    if doc.rules.is_empty() {
        return Err(ModelError::EmptyRules(tag));
    }
    let node_symmetry = parse_symmetry(d2, doc.symmetry.as_deref(), parent)?;
    let rules = build_rules(&doc.rules, grid, d2, node_symmetry)?;

    let mut node = RewriteNode::new(kind, rules);
    node.steps = doc.steps;
    node.temperature = doc.temperature;

    if !doc.fields.is_empty() {
        let mut fields = vec![None; grid.c as usize];
        for field in &doc.fields {
            let value = grid
                .value(field.target)
                .ok_or(ModelError::UnknownSymbol {
                    symbol: field.target,
                    context: "field 'for'",
                })?;
            let (zero, inversed) = match (&field.from, &field.to) {
                (Some(from), None) => (grid.wave(from)?, true),
                (None, Some(to)) => (grid.wave(to)?, false),
                _ => return Err(ModelError::FieldEndpoints),
            };
            fields[value as usize] = Some(Field {
                recompute: field.recompute,
                essential: field.essential,
                inversed,
                substrate: grid.wave(&field.on)?,
                zero,
            });
        }
        node.fields = Some(fields);
    }

    if !doc.observations.is_empty() {
        let mut observations = vec![None; grid.c as usize];
        let mut search = None;
        for observe in &doc.observations {
            let value = grid
                .value(observe.value)
                .ok_or(ModelError::UnknownSymbol {
                    symbol: observe.value,
                    context: "observe 'value'",
                })?;
            let from = observe
                .from
                .map(|symbol| {
                    grid.value(symbol).ok_or(ModelError::UnknownSymbol {
                        symbol,
                        context: "observe 'from'",
                    })
                })
                .transpose()?;
            observations[value as usize] = Some(Observation {
                from,
                to: grid.wave(&observe.to)?,
            });
            if observe.search {
                search = Some(SearchParams {
                    limit: observe.limit.unwrap_or(-1),
                    depth_coefficient: observe.depth_coefficient.unwrap_or(0.5),
                });
            }
        }
        node.observations = Some(observations);
        node.search_params = search;
    }

    Ok(Node::Rewrite(node))
}

fn build_path(doc: &PathDoc, grid: &Grid) -> Result<Node, ModelError> {
    let value = grid.value(doc.color).ok_or(ModelError::UnknownSymbol {
        symbol: doc.color,
        context: "path 'color'",
    })?;
    Ok(Node::Path(PathNode {
        start: grid.wave(&doc.from)?,
        finish: grid.wave(&doc.to)?,
        substrate: grid.wave(&doc.on)?,
        value,
        inertia: doc.inertia,
        longest: doc.longest,
        edges: doc.edges,
        vertices: doc.vertices,
    }))
}

fn build_convolution(doc: &ConvolutionDoc, grid: &Grid, d2: bool) -> Result<Node, ModelError> {
    let name = doc
        .kernel
        .as_deref()
        .unwrap_or(if d2 { "Moore" } else { "VonNeumann" });
    let offsets = kernel(name, d2).ok_or_else(|| ModelError::UnknownKernel {
        kernel: name.to_string(),
        dims: if d2 { 2 } else { 3 },
    })?;

    let mut rules = Vec::new();
    for rule in &doc.rules {
        let input = grid.value(rule.input).ok_or(ModelError::UnknownSymbol {
            symbol: rule.input,
            context: "convolution 'in'",
        })?;
        let output = grid.value(rule.out).ok_or(ModelError::UnknownSymbol {
            symbol: rule.out,
            context: "convolution 'out'",
        })?;
        let (values, sums) = match (&rule.values, &rule.sums) {
            (Some(values), Some(sums)) => {
                let mut table = vec![false; offsets.len() + 1];
                for &sum in sums {
                    if sum > offsets.len() {
                        return Err(ModelError::BadSum {
                            sum,
                            kernel: offsets.len(),
                        });
                    }
                    table[sum] = true;
                }
                (Some(grid.wave(values)?), Some(table))
            }
            (None, None) => (None, None),
            _ => return Err(ModelError::SumsWithoutValues),
        };
        rules.push(ConvolutionRule {
            input,
            output,
            values,
            sums,
            p: rule.p,
        });
    }
    Ok(Node::Convolution(ConvolutionNode::new(
        rules,
        offsets,
        doc.periodic,
        doc.steps,
    )))
}

fn build_convchain(doc: &ConvChainDoc, grid: &Grid, d2: bool) -> Result<Node, ModelError> {
    if !d2 {
        return Err(ModelError::Needs2d("convchain"));
    }
    if doc.n < 2 || doc.n > 4 || doc.n > grid.mx || doc.n > grid.my {
        return Err(ModelError::BadWindow { n: doc.n });
    }
    let c0 = grid.value(doc.black).ok_or(ModelError::UnknownSymbol {
        symbol: doc.black,
        context: "convchain 'black'",
    })?;
    let c1 = grid.value(doc.white).ok_or(ModelError::UnknownSymbol {
        symbol: doc.white,
        context: "convchain 'white'",
    })?;

    let pattern = Pattern::parse(&doc.sample)?;
    if pattern.mz != 1 {
        return Err(ModelError::Needs2d("convchain sample"));
    }
    let sample = pattern
        .letters
        .iter()
        .map(|&ch| {
            if ch == doc.white {
                Ok(true)
            } else if ch == doc.black {
                Ok(false)
            } else {
                Err(ModelError::BadSample {
                    black: doc.black,
                    white: doc.white,
                })
            }
        })
        .collect::<Result<Vec<bool>, ModelError>>()?;

    Ok(Node::ConvChain(ConvChainNode::new(
        doc.n,
        doc.temperature,
        &sample,
        (pattern.mx, pattern.my),
        c0,
        c1,
        grid.wave(&doc.on)?,
        doc.steps,
    )))
}

fn build_map(
    doc: &MapDoc,
    grid: &Grid,
    d2: bool,
    parent: SymmetryGroup,
) -> Result<Node, ModelError> {
    let scale = parse_scale(&doc.scale)?;
    if doc.rules.is_empty() {
        return Err(ModelError::EmptyRules("map"));
    }
    let node_symmetry = parse_symmetry(d2, doc.symmetry.as_deref(), parent)?;
    let rules = build_rules(&doc.rules, grid, d2, node_symmetry)?;

    let scaled_mz = (grid.mz * scale[2].0 / scale[2].1).max(1);
    let child_d2 = scaled_mz == 1;
    let children = build_branch(&doc.children, grid, child_d2, node_symmetry)?;
    Ok(Node::Map(MapNode::new(rules, scale, children)))
}

/// Parse `"2 2 1"` / `"1/2 1/2"` into per-axis `(numerator, denominator)`
/// factors; missing axes default to 1.
fn parse_scale(s: &str) -> Result<[(usize, usize); 3], ModelError> {
    let mut scale = [(1usize, 1usize); 3];
    let terms: Vec<&str> = s.split_whitespace().collect();
    if terms.is_empty() || terms.len() > 3 {
        return Err(ModelError::BadScale(s.to_string()));
    }
    for (axis, term) in terms.iter().enumerate() {
        let (numerator, denominator) = match term.split_once('/') {
            Some((n, d)) => (n, d),
            None => (*term, "1"),
        };
        let numerator: usize = numerator
            .parse()
            .map_err(|_| ModelError::BadScale(s.to_string()))?;
        let denominator: usize = denominator
            .parse()
            .map_err(|_| ModelError::BadScale(s.to_string()))?;
        if numerator == 0 || denominator == 0 {
            return Err(ModelError::BadScale(s.to_string()));
        }
        scale[axis] = (numerator, denominator);
    }
    Ok(scale)
}
