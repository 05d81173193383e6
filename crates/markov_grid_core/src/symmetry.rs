//! Symmetry subgroups of the square and cube, and rule closures under them.
//!
//! A rewrite rule written once is expanded at load time into its orbit under
//! the selected subgroup: the 8 planar symmetries (4 rotations × reflection)
//! or the 48 cubic ones. Duplicates collapse through structural equality, so
//! a symmetric pattern yields a smaller closure.

use thiserror::Error;

use crate::rule::Rule;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SymmetryError {
    #[error("unknown 2D symmetry '{0}'")]
    UnknownSquare(String),
    #[error("unknown 3D symmetry '{0}'")]
    UnknownCube(String),
}

/// A selected symmetry subgroup, dimensionality included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymmetryGroup {
    /// Mask over the 8 square symmetries in the order
    /// `[e, m, r, mr, r², mr², r³, mr³]` (r = quarter turn, m = x-mirror).
    Square([bool; 8]),
    Cube(CubeSubgroup),
}

/// The cubic subgroups reachable from symmetry strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CubeSubgroup {
    /// `"()"` — identity only.
    Identity,
    /// `"(x)"` — identity and the x-mirror.
    ReflectX,
    /// `"(z)"` — identity and the z-mirror.
    ReflectZ,
    /// `"(xy)"` — the 8 square symmetries acting in the xy plane.
    SquareXy,
    /// `"(xyz+)"` — the 24 rotations.
    Rotations,
    /// `"(xyz)"` — the full 48-element group.
    All,
}

/// The group used when a program specifies nothing: everything.
pub fn default_symmetry(d2: bool) -> SymmetryGroup {
    if d2 {
        SymmetryGroup::Square([true; 8])
    } else {
        SymmetryGroup::Cube(CubeSubgroup::All)
    }
}

/// Resolve an optional symmetry string, inheriting `parent` when absent.
pub fn parse_symmetry(
    d2: bool,
    s: Option<&str>,
    parent: SymmetryGroup,
) -> Result<SymmetryGroup, SymmetryError> {
    let Some(s) = s else { return Ok(parent) };
    if d2 {
        square_subgroup(s)
            .map(SymmetryGroup::Square)
            .ok_or_else(|| SymmetryError::UnknownSquare(s.to_string()))
    } else {
        cube_subgroup(s)
            .map(SymmetryGroup::Cube)
            .ok_or_else(|| SymmetryError::UnknownCube(s.to_string()))
    }
}

/// Subgroup mask for a 2D symmetry string.
pub fn square_subgroup(s: &str) -> Option<[bool; 8]> {
    let t = true;
    let f = false;
    match s {
        "()" => Some([t, f, f, f, f, f, f, f]),
        "(x)" => Some([t, t, f, f, f, f, f, f]),
        "(y)" => Some([t, f, f, f, f, t, f, f]),
        "(x)(y)" => Some([t, t, f, f, t, t, f, f]),
        "(xy+)" => Some([t, f, t, f, t, f, t, f]),
        "(xy)" => Some([t; 8]),
        _ => None,
    }
}

/// Subgroup for a 3D symmetry string.
pub fn cube_subgroup(s: &str) -> Option<CubeSubgroup> {
    match s {
        "()" => Some(CubeSubgroup::Identity),
        "(x)" => Some(CubeSubgroup::ReflectX),
        "(z)" => Some(CubeSubgroup::ReflectZ),
        "(xy)" => Some(CubeSubgroup::SquareXy),
        "(xyz+)" => Some(CubeSubgroup::Rotations),
        "(xyz)" => Some(CubeSubgroup::All),
        _ => None,
    }
}

/// Orbit of `thing` under the selected square symmetries.
///
/// The 8 group elements are generated in the fixed order
/// `[e, m, r, mr, r², mr², r³, mr³]`; elements outside the subgroup mask and
/// structural duplicates are dropped. Element 0 of the result is `thing`
/// itself.
pub fn square_symmetries<T>(
    thing: T,
    rotation: impl Fn(&T) -> T,
    reflection: impl Fn(&T) -> T,
    same: impl Fn(&T, &T) -> bool,
    subgroup: &[bool; 8],
) -> Vec<T> {
    let r1 = rotation(&thing);
    let r2 = rotation(&r1);
    let r3 = rotation(&r2);
    let things = [
        reflection(&thing),
        reflection(&r1),
        reflection(&r2),
        reflection(&r3),
    ];
    let [m, mr, mr2, mr3] = things;
    let all = [thing, m, r1, mr, r2, mr2, r3, mr3];

    let mut result: Vec<T> = Vec::new();
    for (element, &selected) in all.into_iter().zip(subgroup.iter()) {
        if selected && !result.iter().any(|kept| same(kept, &element)) {
            result.push(element);
        }
    }
    result
}

/// Orbit of `thing` under the selected cubic symmetries.
///
/// Rotations are enumerated as the closure of the two quarter-turn
/// generators (`z_rotation`, `y_rotation`) in breadth-first order, which is
/// deterministic; the full group additionally closes over the x-mirror.
pub fn cube_symmetries<T>(
    thing: T,
    z_rotation: impl Fn(&T) -> T,
    y_rotation: impl Fn(&T) -> T,
    reflection: impl Fn(&T) -> T,
    same: impl Fn(&T, &T) -> bool,
    subgroup: CubeSubgroup,
) -> Vec<T> {
    if subgroup == CubeSubgroup::SquareXy {
        return square_symmetries(thing, z_rotation, reflection, same, &[true; 8]);
    }

    let mut result: Vec<T> = vec![thing];
    let push = |result: &mut Vec<T>, candidate: T| {
        if !result.iter().any(|kept| same(kept, &candidate)) {
            result.push(candidate);
        }
    };

    match subgroup {
        CubeSubgroup::Identity | CubeSubgroup::SquareXy => {}
        CubeSubgroup::ReflectX => {
            let m = reflection(&result[0]);
            push(&mut result, m);
        }
        CubeSubgroup::ReflectZ => {
            // z-mirror = x-mirror composed with a half turn about y.
            let half = y_rotation(&y_rotation(&result[0]));
            let m = reflection(&half);
            push(&mut result, m);
        }
        CubeSubgroup::Rotations | CubeSubgroup::All => {
            let reflect = subgroup == CubeSubgroup::All;
            let mut i = 0;
            while i < result.len() {
                let a = z_rotation(&result[i]);
                push(&mut result, a);
                let b = y_rotation(&result[i]);
                push(&mut result, b);
                if reflect {
                    let m = reflection(&result[i]);
                    push(&mut result, m);
                }
                i += 1;
            }
        }
    }
    result
}

/// Expand a rule into its closure under `group`. The rule as written stays
/// at index 0 and keeps its `original` flag; generated variants are marked
/// as duplicates.
pub fn rule_symmetries(rule: &Rule, group: SymmetryGroup) -> Vec<Rule> {
    match group {
        SymmetryGroup::Square(mask) => square_symmetries(
            rule.clone(),
            |r| r.z_rotated(),
            |r| r.reflected(),
            |a, b| a.same(b),
            &mask,
        ),
        SymmetryGroup::Cube(subgroup) => cube_symmetries(
            rule.clone(),
            |r| r.z_rotated(),
            |r| r.y_rotated(),
            |r| r.reflected(),
            |a, b| a.same(b),
            subgroup,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use crate::pattern::Pattern;

    fn domino(grid: &Grid) -> Rule {
        let mut rule = Rule::from_patterns(
            &Pattern::parse("BW").unwrap(),
            &Pattern::parse("WB").unwrap(),
            grid,
            1.0,
        )
        .unwrap();
        rule.original = true;
        rule
    }

    #[test]
    fn identity_subgroup_keeps_one_rule() {
        let grid = Grid::new(4, 4, 1, "BW").unwrap();
        let rules = rule_symmetries(&domino(&grid), SymmetryGroup::Square(square_subgroup("()").unwrap()));
        assert_eq!(rules.len(), 1);
        assert!(rules[0].original);
    }

    #[test]
    fn x_reflection_subgroup_adds_the_mirror() {
        let grid = Grid::new(4, 4, 1, "BW").unwrap();
        let rules = rule_symmetries(&domino(&grid), SymmetryGroup::Square(square_subgroup("(x)").unwrap()));
        assert_eq!(rules.len(), 2);
        assert!(!rules[1].original);
        assert_eq!(rules[1].input, vec![0b10, 0b01]);
    }

    #[test]
    fn full_square_group_yields_four_domino_placements() {
        let grid = Grid::new(4, 4, 1, "BW").unwrap();
        let rules = rule_symmetries(&domino(&grid), default_symmetry(true));
        assert_eq!(rules.len(), 4);
        for i in 0..rules.len() {
            for j in i + 1..rules.len() {
                assert!(!rules[i].same(&rules[j]));
            }
        }
    }

    #[test]
    fn closure_is_stable_under_group_elements() {
        // Re-applying a group element permutes the closure set.
        let grid = Grid::new(4, 4, 1, "BW").unwrap();
        let rules = rule_symmetries(&domino(&grid), default_symmetry(true));
        for rule in &rules {
            let image = rule.z_rotated();
            assert!(rules.iter().any(|kept| kept.same(&image)));
            let image = rule.reflected();
            assert!(rules.iter().any(|kept| kept.same(&image)));
        }
    }

    #[test]
    fn cube_rotations_orient_a_domino_six_ways() {
        let grid = Grid::new(4, 4, 4, "BW").unwrap();
        let rules = rule_symmetries(&domino(&grid), SymmetryGroup::Cube(CubeSubgroup::Rotations));
        assert_eq!(rules.len(), 6);
        for rule in &rules {
            let image = rule.y_rotated();
            assert!(rules.iter().any(|kept| kept.same(&image)));
        }
    }

    #[test]
    fn z_mirror_flips_planes() {
        let grid = Grid::new(4, 4, 4, "BW").unwrap();
        let mut column = Rule::from_patterns(
            &Pattern::parse("B/W").unwrap(),
            &Pattern::parse("W/B").unwrap(),
            &grid,
            1.0,
        )
        .unwrap();
        column.original = true;
        let rules = rule_symmetries(&column, SymmetryGroup::Cube(CubeSubgroup::ReflectZ));
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].input, vec![0b10, 0b01]);
    }
}
