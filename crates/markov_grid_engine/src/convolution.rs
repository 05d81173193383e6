//! Convolution nodes: cellular-automaton rules keyed on neighbor counts.

use rand::Rng;

use crate::node::{Ctx, RunState};

/// One convolution rule: a cell holding `input` becomes `output` when the
/// number of kernel neighbors holding a value from `values` falls in the
/// accepted sum set.
#[derive(Debug, Clone)]
pub struct ConvolutionRule {
    pub input: u8,
    pub output: u8,
    /// Values counted over the kernel; None skips the count entirely.
    pub values: Option<u32>,
    /// Accepted neighbor counts, indexed by count; None accepts any.
    pub sums: Option<Vec<bool>>,
    /// Per-cell application probability.
    pub p: f64,
}

#[derive(Debug)]
pub struct ConvolutionNode {
    pub rules: Vec<ConvolutionRule>,
    pub kernel: Vec<(i32, i32, i32)>,
    pub periodic: bool,
    /// Sweeps allowed before the node fails; 0 means unlimited.
    pub steps: usize,
    counter: usize,
}

/// Kernel offsets by name; 2D kernels for flat grids, 3D otherwise.
pub fn kernel(name: &str, d2: bool) -> Option<Vec<(i32, i32, i32)>> {
    let mut offsets = Vec::new();
    match (name, d2) {
        ("VonNeumann", true) => {
            offsets.extend([(-1, 0, 0), (1, 0, 0), (0, -1, 0), (0, 1, 0)]);
        }
        ("Moore", true) => {
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    if (dx, dy) != (0, 0) {
                        offsets.push((dx, dy, 0));
                    }
                }
            }
        }
        ("VonNeumann", false) => {
            offsets.extend([
                (-1, 0, 0),
                (1, 0, 0),
                (0, -1, 0),
                (0, 1, 0),
                (0, 0, -1),
                (0, 0, 1),
            ]);
        }
        ("NoCorners", false) => {
            for dz in -1i32..=1 {
                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        let axes = (dx != 0) as u8 + (dy != 0) as u8 + (dz != 0) as u8;
                        if axes == 1 || axes == 2 {
                            offsets.push((dx, dy, dz));
                        }
                    }
                }
            }
        }
        _ => return None,
    }
    Some(offsets)
}

impl ConvolutionNode {
    pub fn new(
        rules: Vec<ConvolutionRule>,
        kernel: Vec<(i32, i32, i32)>,
        periodic: bool,
        steps: usize,
    ) -> ConvolutionNode {
        ConvolutionNode {
            rules,
            kernel,
            periodic,
            steps,
            counter: 0,
        }
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }

    /// One simultaneous sweep: every write reads the pre-sweep state.
    pub fn go(&mut self, ctx: &mut Ctx) -> RunState {
        if self.steps > 0 && self.counter >= self.steps {
            return RunState::Fail;
        }

        let grid = &mut *ctx.grid;
        let (mx, my, mz) = (grid.mx, grid.my, grid.mz);
        let mut writes: Vec<(usize, u8)> = Vec::new();

        for i in 0..grid.state.len() {
            let value = grid.state[i];
            let (x, y, z) = (i % mx, (i / mx) % my, i / (mx * my));
            for rule in &self.rules {
                if rule.input != value {
                    continue;
                }
                if let (Some(values), Some(sums)) = (rule.values, &rule.sums) {
                    let mut count = 0usize;
                    for &(dx, dy, dz) in &self.kernel {
                        let Some(j) = offset_index(
                            (x, y, z),
                            (dx, dy, dz),
                            (mx, my, mz),
                            self.periodic,
                        ) else {
                            continue;
                        };
                        if values & (1 << grid.state[j]) != 0 {
                            count += 1;
                        }
                    }
                    if !sums.get(count).copied().unwrap_or(false) {
                        continue;
                    }
                }
                if rule.p < 1.0 && ctx.rng.gen::<f64>() >= rule.p {
                    continue;
                }
                writes.push((i, rule.output));
                break;
            }
        }

        let mut any = false;
        for (i, value) in writes {
            if grid.state[i] != value {
                grid.state[i] = value;
                grid.changes
                    .push((i % mx, (i / mx) % my, i / (mx * my)));
                any = true;
            }
        }
        if any {
            self.counter += 1;
            RunState::Success
        } else {
            RunState::Fail
        }
    }
}

fn offset_index(
    (x, y, z): (usize, usize, usize),
    (dx, dy, dz): (i32, i32, i32),
    (mx, my, mz): (usize, usize, usize),
    periodic: bool,
) -> Option<usize> {
    let (mut nx, mut ny, mut nz) = (x as i64 + dx as i64, y as i64 + dy as i64, z as i64 + dz as i64);
    if periodic {
        nx = nx.rem_euclid(mx as i64);
        ny = ny.rem_euclid(my as i64);
        nz = nz.rem_euclid(mz as i64);
    } else if nx < 0 || ny < 0 || nz < 0 || nx >= mx as i64 || ny >= my as i64 || nz >= mz as i64 {
        return None;
    }
    Some(nx as usize + ny as usize * mx + nz as usize * mx * my)
}
