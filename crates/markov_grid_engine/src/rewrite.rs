//! Rewrite nodes: `one`, `all`, and `prl` application semantics.

use markov_grid_core::{Grid, Rule, NO_WRITE};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::field::{delta_pointwise, Field};
use crate::matcher::{Match, Matcher};
use crate::node::{Ctx, RunState};
use crate::observation::{compute_backward_potentials, compute_future_set, Observation};
use crate::search::{Search, SearchOutcome};

/// How matches are selected and applied each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteKind {
    /// Apply exactly one weighted-random match.
    One,
    /// Apply every match that does not overlap an earlier one this step.
    All,
    /// Apply every match against the pre-step state, committing in
    /// `(rule, z, y, x)` order.
    Prl,
}

/// Search knobs, carried when an observation enables trajectory search.
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    /// Children kept per expansion; <= 0 means unbounded.
    pub limit: i32,
    pub depth_coefficient: f64,
}

#[derive(Debug)]
pub struct RewriteNode {
    pub kind: RewriteKind,
    pub rules: Vec<Rule>,
    /// Applications allowed before the node fails; 0 means unlimited.
    pub steps: usize,
    pub temperature: f64,
    /// Per-value fields (index = value), when present.
    pub fields: Option<Vec<Option<Field>>>,
    /// Per-value observations (index = value), when present.
    pub observations: Option<Vec<Option<Observation>>>,
    /// Present when some observation asked for trajectory search.
    pub search_params: Option<SearchParams>,
    /// Which rules fired during the last step.
    pub last: Vec<bool>,
    counter: usize,
    matcher: Matcher,
    potentials: Vec<Vec<i32>>,
    future: Vec<u32>,
    future_computed: bool,
    future_set_computed: bool,
    search: Option<Search>,
    trajectory: Option<Vec<Vec<u8>>>,
    prl_buffer: Vec<u8>,
}

impl RewriteNode {
    pub fn new(kind: RewriteKind, rules: Vec<Rule>) -> RewriteNode {
        let rule_count = rules.len();
        RewriteNode {
            kind,
            rules,
            steps: 0,
            temperature: 0.0,
            fields: None,
            observations: None,
            search_params: None,
            last: vec![false; rule_count],
            counter: 0,
            matcher: Matcher::new(rule_count),
            potentials: Vec::new(),
            future: Vec::new(),
            future_computed: false,
            future_set_computed: false,
            search: None,
            trajectory: None,
            prl_buffer: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.counter = 0;
        self.matcher.reset();
        self.future_computed = false;
        self.future_set_computed = false;
        self.search = None;
        self.trajectory = None;
        for fired in &mut self.last {
            *fired = false;
        }
    }

    pub fn go(&mut self, ctx: &mut Ctx) -> RunState {
        for fired in &mut self.last {
            *fired = false;
        }
        if self.steps > 0 && self.counter >= self.steps {
            return RunState::Fail;
        }

        if self.observations.is_some() && !self.future_computed {
            match self.prepare_goal(ctx) {
                RunState::Success => {}
                other => return other,
            }
        }

        if let Some(trajectory) = &self.trajectory {
            // Replay one search snapshot per step.
            if self.counter >= trajectory.len() {
                return RunState::Fail;
            }
            let snapshot = trajectory[self.counter].clone();
            replay_snapshot(ctx.grid, &snapshot);
            self.counter += 1;
            return RunState::Success;
        }
        if self.search_params.is_some() && self.future_computed && self.trajectory.is_none() {
            // The search exhausted earlier; nothing to replay.
            return RunState::Fail;
        }

        self.matcher.refresh(&self.rules, ctx.grid, ctx.turn);

        if self.fields.is_some() {
            let len = ctx.grid.state.len();
            let alphabet = self.alphabet_size();
            ensure_potentials(&mut self.potentials, alphabet, len);
        }
        if let Some(fields) = &self.fields {
            let mut any_success = false;
            let mut any_computed = false;
            for (value, field) in fields.iter().enumerate() {
                let Some(field) = field else { continue };
                if self.counter == 0 || field.recompute {
                    let ok = field.compute(&mut self.potentials[value], ctx.grid);
                    if !ok && field.essential {
                        return RunState::Fail;
                    }
                    any_success |= ok;
                    any_computed = true;
                }
            }
            if any_computed && !any_success {
                return RunState::Fail;
            }
        }

        match self.kind {
            RewriteKind::One => self.go_one(ctx),
            RewriteKind::All => self.go_all(ctx),
            RewriteKind::Prl => self.go_prl(ctx),
        }
    }

    /// Compute the future set, then backward potentials (plain observation)
    /// or drive the search coroutine (search observation). Returns
    /// `Success` when the node may proceed this step.
    fn prepare_goal(&mut self, ctx: &mut Ctx) -> RunState {
        if !self.future_set_computed {
            let Some(observations) = self.observations.as_ref() else {
                return RunState::Success;
            };
            if !compute_future_set(&mut self.future, ctx.grid, observations) {
                return RunState::Fail;
            }
            self.future_set_computed = true;

            if let Some(params) = self.search_params {
                self.search = Some(Search::new(
                    &ctx.grid.state,
                    &self.future,
                    &self.rules,
                    (ctx.grid.mx, ctx.grid.my, ctx.grid.mz),
                    ctx.grid.c,
                    params.limit,
                    params.depth_coefficient,
                ));
            } else {
                let len = ctx.grid.state.len();
                let alphabet = self.alphabet_size();
                ensure_potentials(&mut self.potentials, alphabet, len);
                compute_backward_potentials(
                    &mut self.potentials,
                    &self.future,
                    (ctx.grid.mx, ctx.grid.my, ctx.grid.mz),
                    &self.rules,
                );
                self.future_computed = true;
            }
        }

        if let Some(search) = self.search.as_mut() {
            match search.resume(&self.rules) {
                SearchOutcome::Running(visited) => return RunState::Halt(visited),
                SearchOutcome::Done(result) => {
                    self.search = None;
                    self.future_computed = true;
                    match result {
                        Some(trajectory) => self.trajectory = Some(trajectory),
                        None => {
                            log::warn!("trajectory search exhausted without a solution");
                            return RunState::Fail;
                        }
                    }
                }
            }
        }
        RunState::Success
    }

    fn go_one(&mut self, ctx: &mut Ctx) -> RunState {
        let Some(m) = self.random_match(ctx) else {
            return RunState::Fail;
        };
        apply_with_log(ctx.grid, &self.rules[m.r], m.x, m.y, m.z);
        self.last[m.r] = true;
        self.counter += 1;
        RunState::Success
    }

    fn go_all(&mut self, ctx: &mut Ctx) -> RunState {
        self.matcher.retain_valid(&self.rules, ctx.grid);
        if self.matcher.match_count() == 0 {
            return RunState::Fail;
        }
        self.matcher.live_mut().shuffle(ctx.rng);

        let mut written = vec![false; ctx.grid.state.len()];
        let mut any = false;
        for k in 0..self.matcher.match_count() {
            let m = self.matcher.get(k);
            let rule = &self.rules[m.r];
            // Earlier applications this step may have broken the match.
            if ctx.grid.matches(rule, m.x, m.y, m.z)
                && footprint_free(rule, ctx.grid, m.x, m.y, m.z, &written)
            {
                mark_footprint(rule, ctx.grid, m.x, m.y, m.z, &mut written);
                apply_with_log(ctx.grid, rule, m.x, m.y, m.z);
                self.last[m.r] = true;
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

    fn go_prl(&mut self, ctx: &mut Ctx) -> RunState {
        self.matcher.retain_valid(&self.rules, ctx.grid);
        if self.matcher.match_count() == 0 {
            return RunState::Fail;
        }
        let mut ordered: Vec<Match> = self.matcher.live().to_vec();
        ordered.sort_unstable_by_key(|m| (m.r, m.z, m.y, m.x));

        // Apply against a copy so every match reads the pre-step state.
        self.prl_buffer.clear();
        self.prl_buffer.extend_from_slice(&ctx.grid.state);
        let (mx, my) = (ctx.grid.mx, ctx.grid.my);
        for m in ordered {
            let rule = &self.rules[m.r];
            if rule.p < 1.0 && ctx.rng.gen::<f64>() >= rule.p {
                continue;
            }
            rule.apply_to(&mut self.prl_buffer, mx, my, m.x, m.y, m.z);
            self.last[m.r] = true;
        }

        let mut any = false;
        for i in 0..ctx.grid.state.len() {
            if ctx.grid.state[i] != self.prl_buffer[i] {
                ctx.grid.state[i] = self.prl_buffer[i];
                let x = i % mx;
                let y = (i / mx) % my;
                let z = i / (mx * my);
                ctx.grid.changes.push((x, y, z));
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

    /// Pick one match. Without potentials: weighted by `rule.p`, lazily
    /// dropping stale entries. With potentials: weighted by the potential
    /// delta through `temperature`, or greedily when the temperature is 0.
    fn random_match(&mut self, ctx: &mut Ctx) -> Option<Match> {
        if self.potentials.is_empty() {
            loop {
                if self.matcher.match_count() == 0 {
                    return None;
                }
                let total: f64 = self
                    .matcher
                    .live()
                    .iter()
                    .map(|m| self.rules[m.r].p)
                    .sum();
                if total <= 0.0 {
                    return None;
                }
                let mut pick = ctx.rng.gen::<f64>() * total;
                let mut chosen = self.matcher.match_count() - 1;
                for (k, m) in self.matcher.live().iter().enumerate() {
                    let w = self.rules[m.r].p;
                    if pick < w {
                        chosen = k;
                        break;
                    }
                    pick -= w;
                }
                let m = self.matcher.get(chosen);
                if ctx.grid.matches(&self.rules[m.r], m.x, m.y, m.z) {
                    return Some(m);
                }
                self.matcher.swap_remove(chosen, ctx.grid);
            }
        } else {
            self.matcher.retain_valid(&self.rules, ctx.grid);
            let fields = self.fields.as_deref();
            let mut candidates: Vec<(usize, i32)> = Vec::new();
            for (k, m) in self.matcher.live().iter().enumerate() {
                let delta = delta_pointwise(
                    &ctx.grid.state,
                    &self.rules[m.r],
                    (m.x, m.y, m.z),
                    fields,
                    &self.potentials,
                    ctx.grid.mx,
                    ctx.grid.my,
                );
                if let Some(delta) = delta {
                    candidates.push((k, delta));
                }
            }
            if candidates.is_empty() {
                return None;
            }

            if self.temperature > 0.0 {
                let min_delta = candidates.iter().map(|&(_, d)| d).min().unwrap_or(0);
                let weights: Vec<f64> = candidates
                    .iter()
                    .map(|&(k, d)| {
                        self.rules[self.matcher.get(k).r].p
                            * (-((d - min_delta) as f64) / self.temperature).exp()
                    })
                    .collect();
                let total: f64 = weights.iter().sum();
                if total <= 0.0 {
                    return None;
                }
                let mut pick = ctx.rng.gen::<f64>() * total;
                let mut chosen = candidates.len() - 1;
                for (j, &w) in weights.iter().enumerate() {
                    if pick < w {
                        chosen = j;
                        break;
                    }
                    pick -= w;
                }
                Some(self.matcher.get(candidates[chosen].0))
            } else {
                // Greedy: the smallest delta wins, noise breaking ties.
                let mut best = None;
                let mut best_key = f64::INFINITY;
                for &(k, delta) in &candidates {
                    let key = delta as f64 + 0.001 * ctx.rng.gen::<f64>();
                    if key < best_key {
                        best_key = key;
                        best = Some(k);
                    }
                }
                best.map(|k| self.matcher.get(k))
            }
        }
    }

    fn alphabet_size(&self) -> usize {
        self.rules.first().map_or(0, |rule| rule.ishifts.len())
    }
}

// ─── Application helpers ─────────────────────────────────────────────────────

fn ensure_potentials(potentials: &mut Vec<Vec<i32>>, alphabet: usize, len: usize) {
    let sized = potentials.len() == alphabet && potentials.first().map_or(false, |row| row.len() == len);
    if !sized {
        *potentials = vec![vec![0; len]; alphabet];
    }
}

/// Write a rule's output into the grid, logging every actual change.
pub fn apply_with_log(grid: &mut Grid, rule: &Rule, x: usize, y: usize, z: usize) {
    let mut index = 0;
    for dz in 0..rule.omz {
        for dy in 0..rule.omy {
            for dx in 0..rule.omx {
                let value = rule.output[index];
                index += 1;
                if value == NO_WRITE {
                    continue;
                }
                let (cx, cy, cz) = (x + dx, y + dy, z + dz);
                let i = grid.index(cx, cy, cz);
                if grid.state[i] != value {
                    grid.state[i] = value;
                    grid.changes.push((cx, cy, cz));
                }
            }
        }
    }
}

/// Overwrite the whole grid state with a search snapshot, logging the diff.
fn replay_snapshot(grid: &mut Grid, snapshot: &[u8]) {
    let (mx, my) = (grid.mx, grid.my);
    for i in 0..grid.state.len() {
        if grid.state[i] != snapshot[i] {
            grid.state[i] = snapshot[i];
            let x = i % mx;
            let y = (i / mx) % my;
            let z = i / (mx * my);
            grid.changes.push((x, y, z));
        }
    }
}

fn footprint_free(
    rule: &Rule,
    grid: &Grid,
    x: usize,
    y: usize,
    z: usize,
    written: &[bool],
) -> bool {
    let mut index = 0;
    for dz in 0..rule.omz {
        for dy in 0..rule.omy {
            for dx in 0..rule.omx {
                let value = rule.output[index];
                index += 1;
                if value != NO_WRITE && written[grid.index(x + dx, y + dy, z + dz)] {
                    return false;
                }
            }
        }
    }
    true
}

fn mark_footprint(
    rule: &Rule,
    grid: &Grid,
    x: usize,
    y: usize,
    z: usize,
    written: &mut [bool],
) {
    let mut index = 0;
    for dz in 0..rule.omz {
        for dy in 0..rule.omy {
            for dx in 0..rule.omx {
                let value = rule.output[index];
                index += 1;
                if value != NO_WRITE {
                    written[grid.index(x + dx, y + dy, z + dz)] = true;
                }
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use markov_grid_core::Pattern;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn rule(grid: &Grid, inp: &str, out: &str, p: f64) -> Rule {
        Rule::from_patterns(
            &Pattern::parse(inp).unwrap(),
            &Pattern::parse(out).unwrap(),
            grid,
            p,
        )
        .unwrap()
    }

    fn step(node: &mut RewriteNode, grid: &mut Grid, rng: &mut SmallRng, turn: usize) -> RunState {
        let mut ctx = Ctx {
            grid,
            rng,
            turn,
        };
        let result = node.go(&mut ctx);
        grid.mark_turn();
        result
    }

    /// One node applies exactly one match per step.
    #[test]
    fn one_applies_a_single_match_per_step() {
        let mut grid = Grid::new(5, 5, 1, "BW").unwrap();
        let r = rule(&grid, "B", "W", 1.0);
        let mut node = RewriteNode::new(RewriteKind::One, vec![r]);
        let mut rng = SmallRng::seed_from_u64(0);

        for turn in 0..3 {
            assert_eq!(step(&mut node, &mut grid, &mut rng, turn), RunState::Success);
        }
        assert_eq!(grid.state.iter().filter(|&&v| v == 1).count(), 3);
    }

    #[test]
    fn one_respects_the_step_limit() {
        let mut grid = Grid::new(5, 5, 1, "BW").unwrap();
        let r = rule(&grid, "B", "W", 1.0);
        let mut node = RewriteNode::new(RewriteKind::One, vec![r]);
        node.steps = 2;
        let mut rng = SmallRng::seed_from_u64(0);

        assert_eq!(step(&mut node, &mut grid, &mut rng, 0), RunState::Success);
        assert_eq!(step(&mut node, &mut grid, &mut rng, 1), RunState::Success);
        assert_eq!(step(&mut node, &mut grid, &mut rng, 2), RunState::Fail);
    }

    /// Overlapping output boxes never write the same cell twice in one
    /// step: with 1x2 dominoes over a 1x5 row, at most two fit.
    #[test]
    fn all_skips_conflicting_footprints() {
        let mut grid = Grid::new(5, 1, 1, "BW").unwrap();
        let r = rule(&grid, "BB", "WW", 1.0);
        let mut node = RewriteNode::new(RewriteKind::All, vec![r]);
        let mut rng = SmallRng::seed_from_u64(3);

        assert_eq!(step(&mut node, &mut grid, &mut rng, 0), RunState::Success);
        let whites = grid.state.iter().filter(|&&v| v == 1).count();
        assert_eq!(whites % 2, 0, "dominoes always write pairs");
        assert!(whites == 2 || whites == 4);
        // No cell was logged twice.
        let mut seen = std::collections::HashSet::new();
        assert!(grid.changes.iter().all(|c| seen.insert(*c)));
    }

    /// Prl reads the pre-step state: R->G and G->B both fire, but a cell
    /// turned G this step does not advance to B until the next one.
    #[test]
    fn prl_double_buffers_within_a_step() {
        let mut grid = Grid::new(3, 3, 1, "RGB").unwrap();
        let rules = vec![rule(&grid, "R", "G", 1.0), rule(&grid, "G", "B", 1.0)];
        let mut node = RewriteNode::new(RewriteKind::Prl, rules);
        let mut rng = SmallRng::seed_from_u64(0);

        assert_eq!(step(&mut node, &mut grid, &mut rng, 0), RunState::Success);
        assert!(grid.state.iter().all(|&v| v == 1), "all G after one step");
        assert_eq!(step(&mut node, &mut grid, &mut rng, 1), RunState::Success);
        assert!(grid.state.iter().all(|&v| v == 2), "all B after two steps");
        assert_eq!(step(&mut node, &mut grid, &mut rng, 2), RunState::Fail);
    }

    /// Weighted selection: two rules with weights 1 and 3 fire roughly 1:3.
    #[test]
    fn one_weights_matches_by_rule_p() {
        let mut counts = [0u32; 2];
        for seed in 0..10_000u64 {
            let mut grid = Grid::new(1, 1, 1, "BWR").unwrap();
            let rules = vec![rule(&grid, "B", "W", 1.0), rule(&grid, "B", "R", 3.0)];
            let mut node = RewriteNode::new(RewriteKind::One, rules);
            let mut rng = SmallRng::seed_from_u64(seed);
            assert_eq!(step(&mut node, &mut grid, &mut rng, 0), RunState::Success);
            match grid.state[0] {
                1 => counts[0] += 1,
                2 => counts[1] += 1,
                other => panic!("unexpected value {other}"),
            }
        }
        let fraction = counts[1] as f64 / (counts[0] + counts[1]) as f64;
        assert!(
            (fraction - 0.75).abs() < 0.05,
            "weight-3 rule fired {fraction} of the time"
        );
    }

    /// Zero-temperature policy (see DESIGN.md): with potentials present,
    /// the lowest-delta match wins, so the lone W walks straight to the R
    /// marker.
    #[test]
    fn zero_temperature_descends_the_field_potential() {
        let mut grid = Grid::new(8, 1, 1, ".WR").unwrap();
        grid.state[0] = 1;
        grid.state[7] = 2;
        let step_rules = vec![rule(&grid, "W.", ".W", 1.0), rule(&grid, ".W", "W.", 1.0)];
        let mut node = RewriteNode::new(RewriteKind::One, step_rules);
        let mut fields = vec![None, None, None];
        fields[1] = Some(Field {
            recompute: false,
            essential: true,
            inversed: false,
            substrate: 0b111,
            zero: 0b100,
        });
        node.fields = Some(fields);
        let mut rng = SmallRng::seed_from_u64(1);

        // Every step the rightward move has the lower delta: 6 steps to
        // reach the marker.
        for turn in 0..6 {
            assert_eq!(step(&mut node, &mut grid, &mut rng, turn), RunState::Success);
        }
        assert_eq!(grid.state[6], 1);
        assert_eq!(grid.state[0], 0);
    }
}
