//! Path drawing: connect a start set to a finish set over a substrate.

use rand::Rng;

use crate::field::neighbors;
use crate::node::{Ctx, RunState};

#[derive(Debug)]
pub struct PathNode {
    /// Cells a path may begin at.
    pub start: u32,
    /// Cells a path aims for.
    pub finish: u32,
    /// Cells the path may pass through.
    pub substrate: u32,
    /// Value written along the path.
    pub value: u8,
    /// Keep the previous walking direction when possible.
    pub inertia: bool,
    /// Pick the farthest start instead of the closest.
    pub longest: bool,
    /// Allow two-axis diagonal moves.
    pub edges: bool,
    /// Allow three-axis diagonal moves (3D).
    pub vertices: bool,
}

impl PathNode {
    /// Draw one path: BFS a distance field from the finish set, pick a
    /// start (closest, or farthest with `longest`; ties resolved by the
    /// RNG), then walk downhill recoloring the cells strictly between the
    /// endpoints. Fails when no start can reach a finish, or when the
    /// chosen path has no interior cell to write.
    pub fn go(&mut self, ctx: &mut Ctx) -> RunState {
        let grid = &mut *ctx.grid;
        let dims = (grid.mx, grid.my, grid.mz);
        let mut generations = vec![-1i32; grid.state.len()];
        let mut frontier = std::collections::VecDeque::new();
        let mut starts = Vec::new();

        for i in 0..grid.state.len() {
            let wave = 1u32 << grid.state[i];
            let cell = (i % grid.mx, (i / grid.mx) % grid.my, i / (grid.mx * grid.my));
            if self.start & wave != 0 {
                starts.push(cell);
            }
            if self.finish & wave != 0 {
                generations[i] = 0;
                frontier.push_back((0i32, cell));
            }
        }
        if starts.is_empty() || frontier.is_empty() {
            return RunState::Fail;
        }

        let traversable = self.substrate | self.start;
        while let Some((t, cell)) = frontier.pop_front() {
            for next in self.moves(cell, dims) {
                let i = next.0 + next.1 * grid.mx + next.2 * grid.mx * grid.my;
                if generations[i] == -1 && traversable & (1 << grid.state[i]) != 0 {
                    generations[i] = t + 1;
                    frontier.push_back((t + 1, next));
                }
            }
        }

        // Choose the best reachable start, noise breaking ties.
        let mut best: Option<(usize, usize, usize)> = None;
        let mut best_key = f64::INFINITY;
        for &cell in &starts {
            let g = generations[cell.0 + cell.1 * grid.mx + cell.2 * grid.mx * grid.my];
            if g == -1 {
                continue;
            }
            let g = if self.longest { -(g as f64) } else { g as f64 };
            let key = g + 0.1 * ctx.rng.gen::<f64>();
            if key < best_key {
                best_key = key;
                best = Some(cell);
            }
        }
        let Some(mut current) = best else {
            return RunState::Fail;
        };

        // Walk downhill, preferring the previous direction with inertia.
        let mut direction = (0i64, 0i64, 0i64);
        let mut wrote = false;
        loop {
            let i = current.0 + current.1 * grid.mx + current.2 * grid.mx * grid.my;
            let g = generations[i];
            if g == 0 {
                break;
            }
            let candidates: Vec<(usize, usize, usize)> = self
                .moves(current, dims)
                .into_iter()
                .filter(|&(x, y, z)| {
                    generations[x + y * grid.mx + z * grid.mx * grid.my] == g - 1
                })
                .collect();

            let inertial = candidates.iter().copied().find(|&(x, y, z)| {
                self.inertia
                    && direction
                        == (
                            x as i64 - current.0 as i64,
                            y as i64 - current.1 as i64,
                            z as i64 - current.2 as i64,
                        )
            });
            let next = match inertial {
                Some(cell) => cell,
                None => candidates[ctx.rng.gen_range(0..candidates.len())],
            };

            direction = (
                next.0 as i64 - current.0 as i64,
                next.1 as i64 - current.1 as i64,
                next.2 as i64 - current.2 as i64,
            );
            current = next;
            let i = current.0 + current.1 * grid.mx + current.2 * grid.mx * grid.my;
            if generations[i] != 0 && grid.state[i] != self.value {
                grid.state[i] = self.value;
                grid.changes.push(current);
                wrote = true;
            }
        }

        if wrote {
            RunState::Success
        } else {
            RunState::Fail
        }
    }

    /// Neighbor moves: axis steps always, diagonals by option.
    fn moves(
        &self,
        cell: (usize, usize, usize),
        dims: (usize, usize, usize),
    ) -> Vec<(usize, usize, usize)> {
        let mut out: Vec<(usize, usize, usize)> = neighbors(cell, dims).collect();
        if self.edges || self.vertices {
            for dz in -1i64..=1 {
                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        let axes = (dx != 0) as u8 + (dy != 0) as u8 + (dz != 0) as u8;
                        let wanted = (axes == 2 && self.edges) || (axes == 3 && self.vertices);
                        if !wanted {
                            continue;
                        }
                        let nx = cell.0 as i64 + dx;
                        let ny = cell.1 as i64 + dy;
                        let nz = cell.2 as i64 + dz;
                        if nx >= 0
                            && ny >= 0
                            && nz >= 0
                            && nx < dims.0 as i64
                            && ny < dims.1 as i64
                            && nz < dims.2 as i64
                        {
                            out.push((nx as usize, ny as usize, nz as usize));
                        }
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use markov_grid_core::Grid;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn node(grid: &Grid) -> PathNode {
        PathNode {
            start: grid.wave("R").unwrap(),
            finish: grid.wave("F").unwrap(),
            substrate: grid.wave("E").unwrap(),
            value: grid.value('P').unwrap(),
            inertia: false,
            longest: false,
            edges: false,
            vertices: false,
        }
    }

    #[test]
    fn draws_the_interior_of_a_straight_path() {
        let mut grid = Grid::new(5, 1, 1, "ERFP").unwrap();
        grid.state[0] = 1;
        grid.state[4] = 2;
        let mut path = node(&grid);
        let mut rng = SmallRng::seed_from_u64(0);
        let mut ctx = Ctx {
            grid: &mut grid,
            rng: &mut rng,
            turn: 0,
        };
        assert_eq!(path.go(&mut ctx), RunState::Success);
        assert_eq!(grid.state, vec![1, 3, 3, 3, 2]);
        assert_eq!(grid.changes.len(), 3);
    }

    #[test]
    fn fails_when_the_finish_is_walled_off() {
        let mut grid = Grid::new(5, 1, 1, "ERFPW").unwrap();
        grid.state[0] = 1;
        grid.state[2] = 4; // wall outside the substrate
        grid.state[4] = 2;
        let mut path = node(&grid);
        let mut rng = SmallRng::seed_from_u64(0);
        let mut ctx = Ctx {
            grid: &mut grid,
            rng: &mut rng,
            turn: 0,
        };
        assert_eq!(path.go(&mut ctx), RunState::Fail);
    }
}
