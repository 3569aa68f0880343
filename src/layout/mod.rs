mod branch;
pub(crate) mod types;
pub use branch::{TaskPointerPolicy, build_branches};
pub use types::*;

use crate::config::LayoutConfig;

/// Run every layout pass over a freshly built branch map.
pub fn compute_layout(map: &mut BranchMap, config: &LayoutConfig) {
    place_base(map, config);
    if map.member_count() <= 1 {
        return;
    }
    mirror_nested(map);
    align_convergence(map, config);
    remove_collisions(map, config);
    offset_task_pointers(map, config);
    recenter(map, config);
}

/// Pass 1: columns hang off their divergence one spacing to the side and one
/// pitch below it; members stack at a fixed pitch.
pub fn place_base(map: &mut BranchMap, config: &LayoutConfig) {
    for number in map.numbers() {
        let anchor = {
            let Some(branch) = map.get(number) else {
                continue;
            };
            match (branch.parent, branch.origin, branch.side()) {
                (Some(parent), Some(origin), Some(side)) => {
                    let Some(parent) = map.get(parent) else {
                        continue;
                    };
                    let origin_y = parent
                        .members
                        .get(origin)
                        .map(|m| m.y)
                        .unwrap_or(parent.y);
                    (
                        parent.x + side.sign() * config.branch_spacing,
                        origin_y + config.pitch,
                    )
                }
                _ => (config.initial_x, config.initial_y),
            }
        };
        if let Some(branch) = map.branches.get_mut(&number) {
            branch.x = anchor.0;
            branch.y = anchor.1;
            for (idx, member) in branch.members.iter_mut().enumerate() {
                member.y = anchor.1 + idx as i32 * config.pitch;
            }
        }
    }
}

/// Pass 2: branches two or more levels inside a parallel branch swap to the
/// other side of their parent.
pub fn mirror_nested(map: &mut BranchMap) {
    for number in map.numbers() {
        let ancestors = map.ancestors(number);
        let nested = ancestors
            .iter()
            .skip(1)
            .any(|a| map.get(*a).is_some_and(|b| b.kind.is_parallel()));
        if !nested {
            continue;
        }
        let Some((parent, side, dx)) = map.get(number).and_then(|branch| {
            let parent = map.get(branch.parent?)?;
            Some((parent.number, branch.side()?, branch.x - parent.x))
        }) else {
            continue;
        };
        map.translate_x(number, -2 * dx);
        let flipped = side.flip();
        if let Some(branch) = map.branches.get_mut(&number) {
            branch.kind = branch.kind.with_side(flipped);
        }
        if let Some(parent) = map.branches.get_mut(&parent) {
            parent.children_on_mut(side).retain(|n| *n != number);
            let list = parent.children_on_mut(flipped);
            list.push(number);
            list.sort_unstable();
        }
        tracing::trace!(branch = number, side = ?flipped, "mirrored nested branch");
    }
}

/// Pass 3: push a column's convergence element (and everything below it)
/// down until it sits one pitch under the longest branch rejoining there.
/// Children are settled before their parents.
pub fn align_convergence(map: &mut BranchMap, config: &LayoutConfig) {
    for number in map.numbers().into_iter().rev() {
        let Some(branch) = map.get(number) else {
            continue;
        };
        let mut rejoining: Vec<(usize, u32)> = branch
            .children()
            .filter_map(|child| map.get(child))
            .filter_map(|child| child.rejoin.map(|r| (r, child.number)))
            .collect();
        rejoining.sort_unstable();

        for (rejoin, child) in rejoining {
            let Some(needed) = map.extent_bottom(child).map(|b| b + config.pitch) else {
                continue;
            };
            let Some(current) = map
                .get(number)
                .and_then(|b| b.members.get(rejoin))
                .map(|m| m.y)
            else {
                continue;
            };
            if needed > current {
                shift_from(map, number, rejoin, needed - current);
            }
        }
    }
}

// Move members `from..` of `number` down by `dy`, along with every child
// spawned at or below `from`.
fn shift_from(map: &mut BranchMap, number: u32, from: usize, dy: i32) {
    let Some(branch) = map.get(number) else {
        return;
    };
    let below: Vec<u32> = branch
        .children()
        .filter(|child| {
            map.get(*child)
                .and_then(|c| c.origin)
                .is_some_and(|origin| origin >= from)
        })
        .collect();
    if let Some(branch) = map.branches.get_mut(&number) {
        for member in branch.members.iter_mut().skip(from) {
            member.y += dy;
        }
    }
    for child in below {
        map.translate_y(child, dy);
    }
}

/// Pass 4: keep each child subtree at least one spacing away from its
/// parent's column and from the previous sibling on the same side. Repeats
/// until a sweep moves nothing.
pub fn remove_collisions(map: &mut BranchMap, config: &LayoutConfig) {
    let spacing = config.branch_spacing;
    let limit = map.branches.len() * map.branches.len() + 1;
    for sweep in 0.. {
        let mut moved = false;
        for number in map.numbers() {
            let Some((column, sides)) = map.get(number).map(|branch| {
                (
                    branch.x,
                    [
                        (Side::Left, branch.left.clone()),
                        (Side::Right, branch.right.clone()),
                    ],
                )
            }) else {
                continue;
            };
            for (side, children) in sides {
                let mut frontier = column;
                for child in children {
                    let Some((lo, hi)) = map.extent_x(child) else {
                        continue;
                    };
                    let dx = match side {
                        Side::Right => (frontier + spacing - lo).max(0),
                        Side::Left => (frontier - spacing - hi).min(0),
                    };
                    if dx != 0 {
                        map.translate_x(child, dx);
                        moved = true;
                    }
                    frontier = match side {
                        Side::Right => hi + dx,
                        Side::Left => lo + dx,
                    };
                }
            }
        }
        if !moved {
            break;
        }
        if sweep >= limit {
            tracing::warn!(block = %map.block, sweeps = sweep, "collision removal did not settle");
            break;
        }
    }
}

/// Pass 5a: task-pointer branches step out by the extra task-pointer
/// spacing, and every sibling further out on the same side, at each level up
/// the tree, moves with them.
pub fn offset_task_pointers(map: &mut BranchMap, config: &LayoutConfig) {
    let extra = config.task_pointer_spacing - config.branch_spacing;
    if extra == 0 {
        return;
    }
    for number in map.numbers() {
        let Some(BranchKind::TaskPointer(side)) = map.get(number).map(|b| b.kind) else {
            continue;
        };
        let dx = side.sign() * extra;
        map.translate_x(number, dx);

        let mut child = number;
        while let Some(parent) = map.get(child).and_then(|b| b.parent) {
            let Some(siblings) = map.get(parent).map(|p| p.children_on(side).to_vec()) else {
                break;
            };
            if !siblings.contains(&child) {
                break;
            }
            for outer in siblings.into_iter().filter(|n| *n > child) {
                map.translate_x(outer, dx);
            }
            child = parent;
        }
    }
}

/// Pass 5b: translate the chart so its leftmost column sits on the origin.
pub fn recenter(map: &mut BranchMap, config: &LayoutConfig) {
    let Some(min_x) = map.min_x() else {
        return;
    };
    map.translate_x(BranchMap::ROOT, config.initial_x - min_x);
}
