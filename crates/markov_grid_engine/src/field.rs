//! Scalar potential fields.
//!
//! A field attaches to one alphabet value and biases match selection toward
//! (or, inversed, away from) a set of seed cells: a multi-source BFS from
//! the seed mask through the substrate mask assigns every reachable cell its
//! distance, with -1 marking unreachable cells.

use std::collections::VecDeque;

use markov_grid_core::{Grid, Rule, NO_WRITE};

#[derive(Debug, Clone)]
pub struct Field {
    /// Recompute the potential on every run, not just the first.
    pub recompute: bool,
    /// A failed computation (no seed cells) fails the whole node.
    pub essential: bool,
    /// Repel instead of attract: the field's contribution flips sign.
    pub inversed: bool,
    /// Values the BFS may spread through.
    pub substrate: u32,
    /// Values seeding the BFS at distance 0.
    pub zero: u32,
}

impl Field {
    /// Fill `potential` with BFS distances from the seed set. Returns false
    /// when no cell carries a seed value.
    pub fn compute(&self, potential: &mut [i32], grid: &Grid) -> bool {
        let (mx, my, mz) = (grid.mx, grid.my, grid.mz);
        let mut front: VecDeque<(i32, usize, usize, usize)> = VecDeque::new();

        let (mut x, mut y, mut z) = (0usize, 0usize, 0usize);
        for i in 0..grid.state.len() {
            let value = grid.state[i];
            if self.zero & (1 << value) != 0 {
                potential[i] = 0;
                front.push_back((0, x, y, z));
            } else {
                potential[i] = -1;
            }
            x += 1;
            if x == mx {
                x = 0;
                y += 1;
                if y == my {
                    y = 0;
                    z += 1;
                }
            }
        }
        if front.is_empty() {
            return false;
        }

        while let Some((t, x, y, z)) = front.pop_front() {
            for (nx, ny, nz) in neighbors((x, y, z), (mx, my, mz)) {
                let i = nx + ny * mx + nz * mx * my;
                if potential[i] == -1 && self.substrate & (1 << grid.state[i]) != 0 {
                    potential[i] = t + 1;
                    front.push_back((t + 1, nx, ny, nz));
                }
            }
        }
        true
    }
}

/// Axis-aligned neighbors of a cell, clipped to the grid.
pub fn neighbors(
    (x, y, z): (usize, usize, usize),
    (mx, my, mz): (usize, usize, usize),
) -> impl Iterator<Item = (usize, usize, usize)> {
    let deltas: [(i64, i64, i64); 6] = [
        (-1, 0, 0),
        (1, 0, 0),
        (0, -1, 0),
        (0, 1, 0),
        (0, 0, -1),
        (0, 0, 1),
    ];
    deltas.into_iter().filter_map(move |(dx, dy, dz)| {
        let (nx, ny, nz) = (x as i64 + dx, y as i64 + dy, z as i64 + dz);
        if nx < 0 || ny < 0 || nz < 0 || nx >= mx as i64 || ny >= my as i64 || nz >= mz as i64 {
            None
        } else {
            Some((nx as usize, ny as usize, nz as usize))
        }
    })
}

/// Summed potential change a match would cause over its output cells.
///
/// Returns None when the match would write a value that is unreachable at
/// one of its cells — such a match can never help and is skipped. A cell
/// whose current value is unreachable contributes nothing; per-value sign
/// comes from the owning field's `inversed` flag (absent fields count as
/// attracting).
pub fn delta_pointwise(
    state: &[u8],
    rule: &Rule,
    (x, y, z): (usize, usize, usize),
    fields: Option<&[Option<Field>]>,
    potentials: &[Vec<i32>],
    mx: usize,
    my: usize,
) -> Option<i32> {
    let sign = |value: u8| -> i32 {
        match fields.and_then(|f| f[value as usize].as_ref()) {
            Some(field) if field.inversed => -1,
            _ => 1,
        }
    };

    let mut sum = 0;
    let mut index = 0;
    for dz in 0..rule.omz {
        for dy in 0..rule.omy {
            for dx in 0..rule.omx {
                let new_value = rule.output[index];
                index += 1;
                if new_value == NO_WRITE {
                    continue;
                }
                let i = x + dx + (y + dy) * mx + (z + dz) * mx * my;
                let old_value = state[i];
                if new_value == old_value {
                    continue;
                }
                let new_potential = potentials[new_value as usize][i];
                if new_potential == -1 {
                    return None;
                }
                let old_potential = potentials[old_value as usize][i];
                sum += sign(new_value) * new_potential;
                if old_potential != -1 {
                    sum -= sign(old_value) * old_potential;
                }
            }
        }
    }
    Some(sum)
}
