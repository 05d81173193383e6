//! ConvChain: MCMC texture synthesis toward sampled N×N pattern statistics.
//!
//! The node carves a two-color texture into the substrate cells: the first
//! run seeds them with random noise, and each following run performs one
//! Metropolis-Hastings sweep, flipping cells and keeping flips according to
//! the likelihood ratio of the N×N windows they touch, measured against an
//! inline sample pattern.

use rand::Rng;

use crate::node::{Ctx, RunState};

#[derive(Debug)]
pub struct ConvChainNode {
    /// Window size.
    pub n: usize,
    pub temperature: f64,
    /// The two colors of the synthesized texture.
    pub c0: u8,
    pub c1: u8,
    /// Values the texture may overwrite.
    pub substrate: u32,
    /// Sweeps allowed before the node fails; 0 means unlimited.
    pub steps: usize,
    weights: Vec<f64>,
    cells: Vec<(usize, usize)>,
    counter: usize,
}

impl ConvChainNode {
    /// Build the node, counting N×N window statistics over the sample (a
    /// torus) under all 8 square symmetries.
    pub fn new(
        n: usize,
        temperature: f64,
        sample: &[bool],
        (smx, smy): (usize, usize),
        c0: u8,
        c1: u8,
        substrate: u32,
        steps: usize,
    ) -> ConvChainNode {
        let mut weights = vec![0.0f64; 1 << (n * n)];
        for y in 0..smy {
            for x in 0..smx {
                let mut window = vec![false; n * n];
                for dy in 0..n {
                    for dx in 0..n {
                        window[dx + dy * n] = sample[(x + dx) % smx + ((y + dy) % smy) * smx];
                    }
                }
                for variant in window_symmetries(&window, n) {
                    weights[window_index(&variant)] += 1.0;
                }
            }
        }
        for weight in &mut weights {
            if *weight <= 0.0 {
                *weight = 0.1;
            }
        }

        ConvChainNode {
            n,
            temperature,
            c0,
            c1,
            substrate,
            steps,
            weights,
            cells: Vec::new(),
            counter: 0,
        }
    }

    pub fn reset(&mut self) {
        self.counter = 0;
        self.cells.clear();
    }

    pub fn go(&mut self, ctx: &mut Ctx) -> RunState {
        if self.steps > 0 && self.counter >= self.steps {
            return RunState::Fail;
        }
        let grid = &mut *ctx.grid;

        if self.counter == 0 {
            // Seed the substrate with noise.
            self.cells.clear();
            for i in 0..grid.state.len() {
                if self.substrate & (1 << grid.state[i]) != 0 {
                    let (x, y) = (i % grid.mx, i / grid.mx);
                    self.cells.push((x, y));
                    grid.state[i] = if ctx.rng.gen::<bool>() { self.c1 } else { self.c0 };
                    grid.changes.push((x, y, 0));
                }
            }
            if self.cells.is_empty() {
                return RunState::Fail;
            }
            self.counter += 1;
            return RunState::Success;
        }

        // One Metropolis sweep: as many flip attempts as substrate cells.
        let mut any = false;
        for _ in 0..self.cells.len() {
            let &(x, y) = &self.cells[ctx.rng.gen_range(0..self.cells.len())];
            let i = x + y * grid.mx;
            let old = grid.state[i];
            let new = if old == self.c0 { self.c1 } else { self.c0 };
            grid.state[i] = new;

            let q = self.likelihood_ratio(grid.mx, grid.my, &grid.state, (x, y));
            let keep = q >= 1.0 || q.powf(1.0 / self.temperature) > ctx.rng.gen::<f64>();
            if keep {
                grid.changes.push((x, y, 0));
                any = true;
            } else {
                grid.state[i] = old;
            }
        }
        self.counter += 1;
        if any {
            RunState::Success
        } else {
            RunState::Fail
        }
    }

    /// Product over the N×N windows covering `(x, y)` of the weight of the
    /// window as it is now versus with the cell flipped back.
    fn likelihood_ratio(
        &self,
        mx: usize,
        my: usize,
        state: &[u8],
        (x, y): (usize, usize),
    ) -> f64 {
        let n = self.n;
        let mut q = 1.0;
        for sy in 0..n {
            for sx in 0..n {
                let mut index = 0usize;
                let mut difference = 0i64;
                for dy in 0..n {
                    for dx in 0..n {
                        let cx = (x + mx + dx - sx) % mx;
                        let cy = (y + my + dy - sy) % my;
                        let bit = 1usize << (dx + dy * n);
                        let value = state[cx + cy * mx] == self.c1;
                        if value {
                            index += bit;
                        }
                        if (cx, cy) == (x, y) {
                            difference = if value { bit as i64 } else { -(bit as i64) };
                        }
                    }
                }
                let old_index = (index as i64 - difference) as usize;
                q *= self.weights[index] / self.weights[old_index];
            }
        }
        q
    }
}

fn window_index(window: &[bool]) -> usize {
    window
        .iter()
        .enumerate()
        .map(|(k, &bit)| (bit as usize) << k)
        .sum()
}

/// The 8 square-symmetry variants of an N×N boolean window.
fn window_symmetries(window: &[bool], n: usize) -> Vec<Vec<bool>> {
    let rotate = |w: &[bool]| -> Vec<bool> {
        let mut out = vec![false; n * n];
        for y in 0..n {
            for x in 0..n {
                out[x + y * n] = w[n - 1 - y + x * n];
            }
        }
        out
    };
    let reflect = |w: &[bool]| -> Vec<bool> {
        let mut out = vec![false; n * n];
        for y in 0..n {
            for x in 0..n {
                out[x + y * n] = w[n - 1 - x + y * n];
            }
        }
        out
    };

    let mut variants = Vec::with_capacity(8);
    let mut current = window.to_vec();
    for _ in 0..4 {
        variants.push(current.clone());
        variants.push(reflect(&current));
        current = rotate(&current);
    }
    variants
}

#[cfg(test)]
mod tests {
    use super::*;
    use markov_grid_core::Grid;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn checkerboard_sample() -> (Vec<bool>, (usize, usize)) {
        let mut sample = vec![false; 16];
        for y in 0..4 {
            for x in 0..4 {
                sample[x + y * 4] = (x + y) % 2 == 0;
            }
        }
        (sample, (4, 4))
    }

    #[test]
    fn first_run_seeds_only_the_substrate() {
        let mut grid = Grid::new(4, 4, 1, "EBW").unwrap();
        // One cell outside the substrate.
        grid.state[5] = 2;
        let (sample, dims) = checkerboard_sample();
        let mut node = ConvChainNode::new(2, 1.0, &sample, dims, 0, 1, 0b001, 0);
        // Substrate is E only; the W cell must survive.
        let mut rng = SmallRng::seed_from_u64(0);
        let mut ctx = Ctx {
            grid: &mut grid,
            rng: &mut rng,
            turn: 0,
        };
        assert_eq!(node.go(&mut ctx), RunState::Success);
        assert_eq!(grid.state[5], 2);
        for (i, &v) in grid.state.iter().enumerate() {
            if i != 5 {
                assert!(v == 0 || v == 1);
            }
        }
    }

    #[test]
    fn sweeps_are_deterministic_for_a_seed() {
        let (sample, dims) = checkerboard_sample();
        let mut states = Vec::new();
        for _ in 0..2 {
            let mut grid = Grid::new(6, 6, 1, "EB").unwrap();
            let mut node = ConvChainNode::new(2, 0.5, &sample, dims, 0, 1, 0b01, 0);
            let mut rng = SmallRng::seed_from_u64(42);
            for turn in 0..4 {
                let mut ctx = Ctx {
                    grid: &mut grid,
                    rng: &mut rng,
                    turn,
                };
                node.go(&mut ctx);
            }
            states.push(grid.state.clone());
        }
        assert_eq!(states[0], states[1]);
    }
}
