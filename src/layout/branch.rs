use std::collections::{BTreeMap, BTreeSet};

use super::types::*;
use crate::config::LayoutConfig;
use crate::error::{Error, Result, StructuralError};
use crate::extract::initial_step;
use crate::ir::{ObjRef, ObjectSet};

/// How task-pointer branches pick their side. Resolved by the caller from the
/// block's owning command before the build starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskPointerPolicy {
    pub force_left: bool,
}

impl TaskPointerPolicy {
    pub fn for_command(command: Option<&str>, config: &LayoutConfig) -> Self {
        let force_left = command.is_some_and(|command| {
            config
                .left_task_pointer_commands
                .iter()
                .any(|c| c.eq_ignore_ascii_case(command))
        });
        Self { force_left }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Split {
    Parallel,
    Selection,
}

impl Split {
    fn kind(self, side: Side) -> BranchKind {
        match self {
            Self::Parallel => BranchKind::Parallel(side),
            Self::Selection => BranchKind::Selection(side),
        }
    }
}

#[derive(Debug)]
struct Pending {
    parent: u32,
    origin: usize,
    side: Side,
    split: Split,
    start: ObjRef,
}

struct Walk {
    members: Vec<Member>,
    stop: Option<ObjRef>,
    spawned: Vec<Pending>,
}

type Owners = BTreeMap<ObjRef, (u32, usize)>;

/// Split the step/transition chain into branches, numbering them depth-first
/// with left paths before right paths.
pub fn build_branches(set: &ObjectSet, policy: TaskPointerPolicy) -> Result<BranchMap> {
    let init = initial_step(set)?;
    let mut owners = Owners::new();
    let mut map = BranchMap {
        block: set.block.name.clone(),
        generation: set.generation,
        branches: BTreeMap::new(),
    };

    let root = walk(
        set,
        BranchMap::ROOT,
        ObjRef::Step(init.name.clone()),
        None,
        &mut owners,
    );
    map.branches.insert(
        BranchMap::ROOT,
        new_branch(BranchMap::ROOT, BranchKind::Linear, None, None, None, root.members),
    );

    let mut stack: Vec<Pending> = Vec::new();
    push_spawned(&mut stack, root.spawned);
    let mut next = BranchMap::ROOT + 1;
    while let Some(pending) = stack.pop() {
        let number = next;
        next += 1;
        let anchor = Some((pending.parent, pending.origin));
        let walked = walk(set, number, pending.start.clone(), anchor, &mut owners);
        let (kind, rejoin) = classify(set, number, &pending, walked.stop.as_ref(), &owners, policy)?;
        let side = kind.side().unwrap_or(pending.side);
        if let Some(parent) = map.branches.get_mut(&pending.parent) {
            parent.children_on_mut(side).push(number);
        }
        map.branches.insert(
            number,
            new_branch(
                number,
                kind,
                Some(pending.parent),
                Some(pending.origin),
                rejoin,
                walked.members,
            ),
        );
        tracing::trace!(branch = number, kind = %kind, "branch built");
        push_spawned(&mut stack, walked.spawned);
    }

    if let Some(orphan) = set.all_refs().find(|obj| !owners.contains_key(obj)) {
        return Err(Error::structural(
            &set.block.name,
            StructuralError::Unreachable(orphan.name().to_string()),
        ));
    }
    Ok(map)
}

fn new_branch(
    number: u32,
    kind: BranchKind,
    parent: Option<u32>,
    origin: Option<usize>,
    rejoin: Option<usize>,
    members: Vec<Member>,
) -> Branch {
    Branch {
        number,
        kind,
        parent,
        origin,
        rejoin,
        x: 0,
        y: 0,
        members,
        left: Vec::new(),
        right: Vec::new(),
    }
}

// Children must pop in the order they were spawned.
fn push_spawned(stack: &mut Vec<Pending>, spawned: Vec<Pending>) {
    stack.extend(spawned.into_iter().rev());
}

// A straight run from `start` that reaches a placed element other than the
// branch's own convergence point is a jump.
fn leads_back(
    set: &ObjectSet,
    start: &ObjRef,
    anchor: Option<(u32, usize)>,
    owners: &Owners,
) -> bool {
    let mut seen = BTreeSet::new();
    let mut current = start.clone();
    loop {
        if let Some(&(owner, index)) = owners.get(&current) {
            return !anchor.is_some_and(|(parent, origin)| owner == parent && index > origin);
        }
        if !seen.insert(current.clone()) {
            return false;
        }
        match set.next_refs(&current).as_slice() {
            [only] => current = only.clone(),
            _ => return false,
        }
    }
}

/// Walk one column from `start`. `anchor` is the parent branch and member
/// index the column was spawned from. At a selection the column continues
/// along the first path that does not jump back.
fn walk(
    set: &ObjectSet,
    number: u32,
    start: ObjRef,
    anchor: Option<(u32, usize)>,
    owners: &mut Owners,
) -> Walk {
    let mut members = Vec::new();
    let mut spawned = Vec::new();
    let mut stop = None;
    let mut current = Some(start);
    while let Some(obj) = current.take() {
        if owners.contains_key(&obj) {
            stop = Some(obj);
            break;
        }
        let index = members.len();
        owners.insert(obj.clone(), (number, index));
        let split = match obj {
            ObjRef::Transition(_) => Split::Parallel,
            ObjRef::Step(_) => Split::Selection,
        };
        let mut paths = set.next_refs(&obj);
        let forward = (split == Split::Selection && paths.len() > 1)
            .then(|| {
                paths
                    .iter()
                    .position(|path| !leads_back(set, path, anchor, owners))
            })
            .flatten();
        if let Some(pos) = forward {
            let path = paths.remove(pos);
            paths.insert(0, path);
        }
        let mut paths = paths.into_iter();
        members.push(Member { obj, y: 0 });
        current = paths.next();

        let mut extra: Vec<Pending> = paths
            .enumerate()
            .map(|(k, start)| Pending {
                parent: number,
                origin: index,
                side: if k % 2 == 0 { Side::Right } else { Side::Left },
                split,
                start,
            })
            .collect();
        extra.sort_by_key(|pending| pending.side == Side::Right);
        spawned.extend(extra);
    }
    Walk {
        members,
        stop,
        spawned,
    }
}

fn classify(
    set: &ObjectSet,
    number: u32,
    pending: &Pending,
    stop: Option<&ObjRef>,
    owners: &Owners,
    policy: TaskPointerPolicy,
) -> Result<(BranchKind, Option<usize>)> {
    let Some(target) = stop else {
        return Ok((pending.split.kind(pending.side), None));
    };
    let converges = owners
        .get(target)
        .is_some_and(|&(owner, index)| owner == pending.parent && index > pending.origin);
    if converges {
        let rejoin = owners.get(target).map(|&(_, index)| index);
        return Ok((pending.split.kind(pending.side), rejoin));
    }
    match pending.split {
        Split::Selection => {
            let side = if policy.force_left {
                Side::Left
            } else {
                pending.side
            };
            Ok((BranchKind::TaskPointer(side), None))
        }
        Split::Parallel => Err(Error::structural(
            &set.block.name,
            StructuralError::MissingConvergence {
                branch: number,
                parent: pending.parent,
                target: target.name().to_string(),
            },
        )),
    }
}
