//! Map nodes: rescale the grid through full-scan rules, then run children
//! on the result.

use markov_grid_core::{Grid, Rule, NO_WRITE};

use crate::branch::Branch;
use crate::node::{Ctx, RunState};

#[derive(Debug)]
pub struct MapNode {
    pub rules: Vec<Rule>,
    /// Rational scale factors per axis: `(numerator, denominator)`.
    pub scale: [(usize, usize); 3],
    pub children: Branch,
    mapped: bool,
}

impl MapNode {
    pub fn new(rules: Vec<Rule>, scale: [(usize, usize); 3], children: Branch) -> MapNode {
        MapNode {
            rules,
            scale,
            children,
            mapped: false,
        }
    }

    pub fn reset(&mut self) {
        self.mapped = false;
        self.children.reset();
    }

    /// First step: build the scaled grid by scanning every input cell
    /// periodically and stamping rule outputs at scaled anchors, then swap
    /// it in. Later steps run the children on the new grid.
    pub fn go(&mut self, ctx: &mut Ctx) -> RunState {
        if self.mapped {
            return self.children.go(ctx, false);
        }

        let grid = &*ctx.grid;
        let [(nx, dx), (ny, dy), (nz, dz)] = self.scale;
        let mut out = grid.resized(
            (grid.mx * nx / dx).max(1),
            (grid.my * ny / dy).max(1),
            (grid.mz * nz / dz).max(1),
        );

        for rule in &self.rules {
            for z in 0..grid.mz {
                for y in 0..grid.my {
                    for x in 0..grid.mx {
                        if matches_periodic(rule, grid, (x, y, z)) {
                            apply_periodic(
                                rule,
                                &mut out,
                                (x * nx / dx, y * ny / dy, z * nz / dz),
                            );
                        }
                    }
                }
            }
        }

        *ctx.grid = out;
        self.mapped = true;
        RunState::Success
    }
}

/// Input test with torus wrapping, so patterns act uniformly on the whole
/// grid regardless of anchor.
fn matches_periodic(rule: &Rule, grid: &Grid, (x, y, z): (usize, usize, usize)) -> bool {
    let mut index = 0;
    for dz in 0..rule.imz {
        for dy in 0..rule.imy {
            for dx in 0..rule.imx {
                let i = grid.index((x + dx) % grid.mx, (y + dy) % grid.my, (z + dz) % grid.mz);
                if rule.input[index] & (1u32 << grid.state[i]) == 0 {
                    return false;
                }
                index += 1;
            }
        }
    }
    true
}

fn apply_periodic(rule: &Rule, grid: &mut Grid, (x, y, z): (usize, usize, usize)) {
    let mut index = 0;
    for dz in 0..rule.omz {
        for dy in 0..rule.omy {
            for dx in 0..rule.omx {
                let value = rule.output[index];
                index += 1;
                if value == NO_WRITE {
                    continue;
                }
                let i = grid.index((x + dx) % grid.mx, (y + dy) % grid.my, (z + dz) % grid.mz);
                grid.state[i] = value;
            }
        }
    }
}
