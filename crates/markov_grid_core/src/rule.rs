//! Rewrite rules: input/output boxes, weights, trigger-shift tables.

use thiserror::Error;

use crate::grid::Grid;
use crate::pattern::Pattern;

/// Output sentinel: leave the cell unchanged.
pub const NO_WRITE: u8 = 0xff;

/// Symbol resolution errors raised while building a rule from patterns.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("unknown symbol '{0}' in rule pattern")]
    UnknownSymbol(char),
    #[error("union symbol '{0}' cannot appear in an output pattern")]
    NonValueOutput(char),
}

/// A rewrite rule.
///
/// The input box is a bitmask per cell (which values the cell accepts); the
/// output box is a value per cell, with [`NO_WRITE`] marking cells the rule
/// does not touch. `ishifts[v]` lists the offsets within the input box at
/// which value `v` is accepted; matchers use it to enumerate candidate
/// anchors from a changed cell without rescanning the grid. `oshifts` is the
/// same table for the output box (sentinel cells fall back to the input
/// cell's acceptance), used by backward potential propagation.
#[derive(Debug, Clone)]
pub struct Rule {
    pub imx: usize,
    pub imy: usize,
    pub imz: usize,
    pub omx: usize,
    pub omy: usize,
    pub omz: usize,
    pub input: Vec<u32>,
    pub output: Vec<u8>,
    /// Selection weight (One/All) or application probability (Prl).
    pub p: f64,
    pub ishifts: Vec<Vec<(i32, i32, i32)>>,
    pub oshifts: Vec<Vec<(i32, i32, i32)>>,
    /// True for the rule as written; false for symmetry duplicates.
    pub original: bool,
}

impl Rule {
    /// Build a rule from raw boxes, computing the shift tables.
    pub fn new(
        input: Vec<u32>,
        (imx, imy, imz): (usize, usize, usize),
        output: Vec<u8>,
        (omx, omy, omz): (usize, usize, usize),
        c: u8,
        p: f64,
    ) -> Rule {
        let c = c as usize;
        let mut ishifts: Vec<Vec<(i32, i32, i32)>> = vec![Vec::new(); c];
        let mut index = 0;
        for z in 0..imz as i32 {
            for y in 0..imy as i32 {
                for x in 0..imx as i32 {
                    let mut wave = input[index];
                    let mut v = 0;
                    while wave != 0 {
                        if wave & 1 != 0 {
                            ishifts[v].push((x, y, z));
                        }
                        wave >>= 1;
                        v += 1;
                    }
                    index += 1;
                }
            }
        }

        // Output shifts exist only when the boxes coincide; rules that grow
        // or shrink their box take no part in backward propagation.
        let mut oshifts: Vec<Vec<(i32, i32, i32)>> = vec![Vec::new(); c];
        if (imx, imy, imz) == (omx, omy, omz) {
            let mut index = 0;
            for z in 0..omz as i32 {
                for y in 0..omy as i32 {
                    for x in 0..omx as i32 {
                        let value = output[index];
                        if value != NO_WRITE {
                            oshifts[value as usize].push((x, y, z));
                        } else {
                            // Pass-through cell: the input survives.
                            let mut wave = input[index];
                            let mut v = 0;
                            while wave != 0 {
                                if wave & 1 != 0 {
                                    oshifts[v].push((x, y, z));
                                }
                                wave >>= 1;
                                v += 1;
                            }
                        }
                        index += 1;
                    }
                }
            }
        }

        Rule {
            imx,
            imy,
            imz,
            omx,
            omy,
            omz,
            input,
            output,
            p,
            ishifts,
            oshifts,
            original: false,
        }
    }

    /// Resolve a parsed input/output pattern pair against a grid alphabet.
    pub fn from_patterns(
        inp: &Pattern,
        out: &Pattern,
        grid: &Grid,
        p: f64,
    ) -> Result<Rule, RuleError> {
        let input = inp
            .letters
            .iter()
            .map(|&ch| grid.letter_wave(ch).ok_or(RuleError::UnknownSymbol(ch)))
            .collect::<Result<Vec<u32>, RuleError>>()?;

        let output = out
            .letters
            .iter()
            .map(|&ch| {
                if ch == crate::grid::WILDCARD {
                    Ok(NO_WRITE)
                } else if let Some(v) = grid.value(ch) {
                    Ok(v)
                } else if grid.letter_wave(ch).is_some() {
                    Err(RuleError::NonValueOutput(ch))
                } else {
                    Err(RuleError::UnknownSymbol(ch))
                }
            })
            .collect::<Result<Vec<u8>, RuleError>>()?;

        Ok(Rule::new(
            input,
            (inp.mx, inp.my, inp.mz),
            output,
            (out.mx, out.my, out.mz),
            grid.c,
            p,
        ))
    }

    fn c(&self) -> u8 {
        self.ishifts.len() as u8
    }

    /// The rule rotated a quarter turn in the xy plane.
    pub fn z_rotated(&self) -> Rule {
        let input = rotate_z(&self.input, self.imx, self.imy, self.imz);
        let output = rotate_z(&self.output, self.omx, self.omy, self.omz);
        Rule::new(
            input,
            (self.imy, self.imx, self.imz),
            output,
            (self.omy, self.omx, self.omz),
            self.c(),
            self.p,
        )
    }

    /// The rule rotated a quarter turn in the xz plane.
    pub fn y_rotated(&self) -> Rule {
        let input = rotate_y(&self.input, self.imx, self.imy, self.imz);
        let output = rotate_y(&self.output, self.omx, self.omy, self.omz);
        Rule::new(
            input,
            (self.imz, self.imy, self.imx),
            output,
            (self.omz, self.omy, self.omx),
            self.c(),
            self.p,
        )
    }

    /// The rule mirrored along the x axis.
    pub fn reflected(&self) -> Rule {
        let input = reflect_x(&self.input, self.imx, self.imy, self.imz);
        let output = reflect_x(&self.output, self.omx, self.omy, self.omz);
        Rule::new(
            input,
            (self.imx, self.imy, self.imz),
            output,
            (self.omx, self.omy, self.omz),
            self.c(),
            self.p,
        )
    }

    /// Structural equality, ignoring weight and provenance. Used to remove
    /// duplicates from symmetry closures.
    pub fn same(&self, other: &Rule) -> bool {
        (self.imx, self.imy, self.imz) == (other.imx, other.imy, other.imz)
            && (self.omx, self.omy, self.omz) == (other.omx, other.omy, other.omz)
            && self.input == other.input
            && self.output == other.output
    }

    /// Write the output box into `state` anchored at `(x, y, z)`, skipping
    /// sentinel cells. Returns true if any cell changed.
    pub fn apply_to(
        &self,
        state: &mut [u8],
        mx: usize,
        my: usize,
        x: usize,
        y: usize,
        z: usize,
    ) -> bool {
        let mut changed = false;
        let mut index = 0;
        for dz in 0..self.omz {
            for dy in 0..self.omy {
                for dx in 0..self.omx {
                    let value = self.output[index];
                    index += 1;
                    if value == NO_WRITE {
                        continue;
                    }
                    let i = x + dx + (y + dy) * mx + (z + dz) * mx * my;
                    if state[i] != value {
                        state[i] = value;
                        changed = true;
                    }
                }
            }
        }
        changed
    }
}

fn rotate_z<T: Copy>(data: &[T], mx: usize, my: usize, mz: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(data.len());
    for z in 0..mz {
        for y in 0..mx {
            for x in 0..my {
                out.push(data[mx - 1 - y + x * mx + z * mx * my]);
            }
        }
    }
    out
}

fn rotate_y<T: Copy>(data: &[T], mx: usize, my: usize, mz: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(data.len());
    for z in 0..mx {
        for y in 0..my {
            for x in 0..mz {
                out.push(data[mx - 1 - z + y * mx + x * mx * my]);
            }
        }
    }
    out
}

fn reflect_x<T: Copy>(data: &[T], mx: usize, my: usize, mz: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(data.len());
    for z in 0..mz {
        for y in 0..my {
            for x in 0..mx {
                out.push(data[mx - 1 - x + y * mx + z * mx * my]);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(grid: &Grid, inp: &str, out: &str) -> Rule {
        Rule::from_patterns(
            &Pattern::parse(inp).unwrap(),
            &Pattern::parse(out).unwrap(),
            grid,
            1.0,
        )
        .unwrap()
    }

    #[test]
    fn resolves_patterns_to_waves_and_values() {
        let grid = Grid::new(4, 4, 1, "BWR").unwrap();
        let r = rule(&grid, "BW", "*R");
        assert_eq!(r.input, vec![0b001, 0b010]);
        assert_eq!(r.output, vec![NO_WRITE, 2]);
        assert_eq!((r.imx, r.imy, r.imz), (2, 1, 1));
    }

    #[test]
    fn rejects_union_in_output() {
        let mut grid = Grid::new(4, 4, 1, "BWR").unwrap();
        grid.add_union('?', "WR").unwrap();
        let err = Rule::from_patterns(
            &Pattern::parse("B").unwrap(),
            &Pattern::parse("?").unwrap(),
            &grid,
            1.0,
        )
        .unwrap_err();
        assert_eq!(err, RuleError::NonValueOutput('?'));
    }

    #[test]
    fn ishifts_index_positions_by_value() {
        let mut grid = Grid::new(4, 4, 1, "BW").unwrap();
        grid.add_union('?', "BW").unwrap();
        let r = rule(&grid, "B?", "WW");
        assert_eq!(r.ishifts[0], vec![(0, 0, 0), (1, 0, 0)]);
        assert_eq!(r.ishifts[1], vec![(1, 0, 0)]);
        // Same box, so output shifts exist: both cells write W.
        assert!(r.oshifts[0].is_empty());
        assert_eq!(r.oshifts[1], vec![(0, 0, 0), (1, 0, 0)]);
    }

    #[test]
    fn z_rotation_turns_a_row_into_a_column() {
        let grid = Grid::new(4, 4, 1, "BW").unwrap();
        let r = rule(&grid, "BW", "WB").z_rotated();
        assert_eq!((r.imx, r.imy), (1, 2));
        // New (0, 0) is the old rightmost cell.
        assert_eq!(r.input, vec![0b10, 0b01]);
        assert_eq!(r.output, vec![0, 1]);
    }

    #[test]
    fn four_z_rotations_restore_the_rule() {
        let grid = Grid::new(4, 4, 1, "BWR").unwrap();
        let r = rule(&grid, "BW,RB", "WB,*R");
        let back = r.z_rotated().z_rotated().z_rotated().z_rotated();
        assert!(r.same(&back));
    }

    #[test]
    fn reflection_mirrors_x() {
        let grid = Grid::new(4, 4, 1, "BW").unwrap();
        let r = rule(&grid, "BW", "WB").reflected();
        assert_eq!(r.input, vec![0b10, 0b01]);
        assert_eq!(r.output, vec![0, 1]);
    }

    #[test]
    fn y_rotation_swaps_x_and_z() {
        let grid = Grid::new(4, 4, 4, "BW").unwrap();
        let r = rule(&grid, "BW", "WW").y_rotated();
        assert_eq!((r.imx, r.imy, r.imz), (1, 1, 2));
        // The old rightmost cell lands in the nearest plane.
        assert_eq!(r.input, vec![0b10, 0b01]);
    }

    #[test]
    fn apply_to_skips_sentinel_cells() {
        let grid = Grid::new(4, 1, 1, "BWR").unwrap();
        let r = rule(&grid, "BB", "*R");
        let mut state = vec![0u8; 4];
        assert!(r.apply_to(&mut state, 4, 1, 1, 0, 0));
        assert_eq!(state, vec![0, 0, 2, 0]);
        // A second application writes the same values: no change.
        assert!(!r.apply_to(&mut state, 4, 1, 1, 0, 0));
    }
}
