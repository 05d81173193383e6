//! Incremental match maintenance.
//!
//! A [`Matcher`] keeps the set of `(rule, x, y, z)` anchors at which a rule's
//! input box currently fits the grid. The first scan walks the whole grid;
//! afterwards only cells from the grid's change log are probed, using each
//! rule's trigger-shift tables to enumerate candidate anchors around a
//! changed cell. Stale entries are filtered lazily: consumers re-verify a
//! match before using it and swap-remove it when it no longer holds.

use markov_grid_core::{state_matches, Grid, Rule};

/// An anchor position at which a rule's input pattern fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub r: usize,
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

#[derive(Debug)]
pub struct Matcher {
    matches: Vec<Match>,
    match_count: usize,
    /// Per-rule bit grid over anchor cells; suppresses duplicate entries.
    match_mask: Vec<Vec<bool>>,
    /// Turn of the last rescan; -1 forces a full rescan.
    last_matched_turn: i64,
    /// Grid epoch the mask was built against; a mismatch (the grid was
    /// replaced by a `map` node) also forces a full rescan.
    epoch: u64,
}

impl Matcher {
    pub fn new(rule_count: usize) -> Matcher {
        Matcher {
            matches: Vec::new(),
            match_count: 0,
            match_mask: vec![Vec::new(); rule_count],
            last_matched_turn: -1,
            epoch: 0,
        }
    }

    pub fn reset(&mut self) {
        self.last_matched_turn = -1;
        self.match_count = 0;
    }

    pub fn match_count(&self) -> usize {
        self.match_count
    }

    pub fn get(&self, k: usize) -> Match {
        self.matches[k]
    }

    /// Live matches as a slice; entries may be stale until re-verified.
    pub fn live(&self) -> &[Match] {
        &self.matches[..self.match_count]
    }

    pub fn live_mut(&mut self) -> &mut [Match] {
        &mut self.matches[..self.match_count]
    }

    /// Bring the match set up to date with the grid, scanning incrementally
    /// from the change log when possible.
    pub fn refresh(&mut self, rules: &[Rule], grid: &Grid, turn: usize) {
        let len = grid.state.len();
        let sized = self.match_mask.first().map_or(true, |m| m.len() == len);
        if self.last_matched_turn < 0 || self.epoch != grid.epoch || !sized {
            self.epoch = grid.epoch;
            self.full_rescan(rules, grid);
        } else {
            self.incremental_rescan(rules, grid);
        }
        self.last_matched_turn = turn as i64;
    }

    /// Drop the match at index `k`, clearing its occupancy bit.
    pub fn swap_remove(&mut self, k: usize, grid: &Grid) {
        let m = self.matches[k];
        self.match_mask[m.r][grid.index(m.x, m.y, m.z)] = false;
        self.match_count -= 1;
        self.matches.swap(k, self.match_count);
    }

    /// Drop every match that no longer fits the grid.
    pub fn retain_valid(&mut self, rules: &[Rule], grid: &Grid) {
        let mut k = 0;
        while k < self.match_count {
            let m = self.matches[k];
            if grid.matches(&rules[m.r], m.x, m.y, m.z) {
                k += 1;
            } else {
                self.swap_remove(k, grid);
            }
        }
    }

    fn add(&mut self, m: Match, cell: usize) {
        if self.match_mask[m.r][cell] {
            return;
        }
        self.match_mask[m.r][cell] = true;
        if self.match_count < self.matches.len() {
            self.matches[self.match_count] = m;
        } else {
            self.matches.push(m);
        }
        self.match_count += 1;
    }

    fn full_rescan(&mut self, rules: &[Rule], grid: &Grid) {
        let len = grid.state.len();
        self.match_count = 0;
        for mask in &mut self.match_mask {
            mask.clear();
            mask.resize(len, false);
        }
        scan_state_matches(rules, &grid.state, (grid.mx, grid.my, grid.mz), |m| {
            let cell = m.x + m.y * grid.mx + m.z * grid.mx * grid.my;
            self.add(m, cell);
        });
    }

    fn incremental_rescan(&mut self, rules: &[Rule], grid: &Grid) {
        let start = grid.first[self.last_matched_turn as usize];
        for n in start..grid.changes.len() {
            let (x, y, z) = grid.changes[n];
            let value = grid.state[grid.index(x, y, z)] as usize;
            for (r, rule) in rules.iter().enumerate() {
                for &(sx, sy, sz) in &rule.ishifts[value] {
                    let Some((ax, ay, az)) = anchor(
                        (x, y, z),
                        (sx, sy, sz),
                        (rule.imx, rule.imy, rule.imz),
                        (grid.mx, grid.my, grid.mz),
                    ) else {
                        continue;
                    };
                    let cell = grid.index(ax, ay, az);
                    if !self.match_mask[r][cell] && grid.matches(rule, ax, ay, az) {
                        self.add(
                            Match {
                                r,
                                x: ax,
                                y: ay,
                                z: az,
                            },
                            cell,
                        );
                    }
                }
            }
        }
    }
}

/// Candidate anchor for a trigger cell, or None when the input box would not
/// fit the grid.
fn anchor(
    (x, y, z): (usize, usize, usize),
    (sx, sy, sz): (i32, i32, i32),
    (imx, imy, imz): (usize, usize, usize),
    (mx, my, mz): (usize, usize, usize),
) -> Option<(usize, usize, usize)> {
    let ax = x as i64 - sx as i64;
    let ay = y as i64 - sy as i64;
    let az = z as i64 - sz as i64;
    if ax < 0 || ay < 0 || az < 0 {
        return None;
    }
    let (ax, ay, az) = (ax as usize, ay as usize, az as usize);
    if ax + imx > mx || ay + imy > my || az + imz > mz {
        return None;
    }
    Some((ax, ay, az))
}

/// Full scan of a raw state slice, visiting every match of every rule once.
///
/// The grid is strided by each rule's input box; the value at each visited
/// cell keys the rule's trigger-shift table to enumerate the anchors whose
/// box covers that cell.
pub fn scan_state_matches(
    rules: &[Rule],
    state: &[u8],
    (mx, my, mz): (usize, usize, usize),
    mut visit: impl FnMut(Match),
) {
    for (r, rule) in rules.iter().enumerate() {
        for z in (rule.imz - 1..mz).step_by(rule.imz) {
            for y in (rule.imy - 1..my).step_by(rule.imy) {
                for x in (rule.imx - 1..mx).step_by(rule.imx) {
                    let value = state[x + y * mx + z * mx * my] as usize;
                    for &(sx, sy, sz) in &rule.ishifts[value] {
                        let Some((ax, ay, az)) = anchor(
                            (x, y, z),
                            (sx, sy, sz),
                            (rule.imx, rule.imy, rule.imz),
                            (mx, my, mz),
                        ) else {
                            continue;
                        };
                        if state_matches(rule, state, mx, my, ax, ay, az) {
                            visit(Match {
                                r,
                                x: ax,
                                y: ay,
                                z: az,
                            });
                        }
                    }
                }
            }
        }
    }
}
