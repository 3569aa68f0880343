use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::ir::{ObjRef, Point};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn sign(self) -> i32 {
        match self {
            Self::Left => -1,
            Self::Right => 1,
        }
    }

    pub fn flip(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BranchKind {
    Linear,
    Parallel(Side),
    Selection(Side),
    TaskPointer(Side),
}

impl BranchKind {
    pub fn side(self) -> Option<Side> {
        match self {
            Self::Linear => None,
            Self::Parallel(side) | Self::Selection(side) | Self::TaskPointer(side) => Some(side),
        }
    }

    pub fn with_side(self, side: Side) -> Self {
        match self {
            Self::Linear => Self::Linear,
            Self::Parallel(_) => Self::Parallel(side),
            Self::Selection(_) => Self::Selection(side),
            Self::TaskPointer(_) => Self::TaskPointer(side),
        }
    }

    pub fn is_parallel(self) -> bool {
        matches!(self, Self::Parallel(_))
    }

    pub fn is_task_pointer(self) -> bool {
        matches!(self, Self::TaskPointer(_))
    }
}

impl fmt::Display for BranchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self.side() {
            Some(Side::Left) => "Left ",
            Some(Side::Right) => "Right ",
            None => "",
        };
        let kind = match self {
            Self::Linear => "Linear",
            Self::Parallel(_) => "Parallel",
            Self::Selection(_) => "Selection",
            Self::TaskPointer(_) => "Task Pointer",
        };
        write!(f, "{side}{kind}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub obj: ObjRef,
    pub y: i32,
}

/// A straight run of chart elements sharing one column.
///
/// `origin` is the index of the divergence element in the parent's members,
/// `rejoin` the index of the parent member this branch converges into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Branch {
    pub number: u32,
    pub kind: BranchKind,
    pub parent: Option<u32>,
    pub origin: Option<usize>,
    pub rejoin: Option<usize>,
    pub x: i32,
    pub y: i32,
    pub members: Vec<Member>,
    pub left: Vec<u32>,
    pub right: Vec<u32>,
}

impl Branch {
    pub fn side(&self) -> Option<Side> {
        self.kind.side()
    }

    pub fn children(&self) -> impl Iterator<Item = u32> + '_ {
        self.left.iter().chain(self.right.iter()).copied()
    }

    pub fn children_on(&self, side: Side) -> &[u32] {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub(crate) fn children_on_mut(&mut self, side: Side) -> &mut Vec<u32> {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    pub fn bottom(&self) -> Option<i32> {
        self.members.iter().map(|m| m.y).max()
    }
}

/// Every branch of one function block keyed by branch number. Branch 1 is the
/// root holding the initial step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BranchMap {
    pub block: String,
    pub generation: u64,
    pub branches: BTreeMap<u32, Branch>,
}

impl BranchMap {
    pub const ROOT: u32 = 1;

    pub fn get(&self, number: u32) -> Option<&Branch> {
        self.branches.get(&number)
    }

    pub fn numbers(&self) -> Vec<u32> {
        self.branches.keys().copied().collect()
    }

    pub fn member_count(&self) -> usize {
        self.branches.values().map(|b| b.members.len()).sum()
    }

    /// `number` and every branch nested under it, parents first.
    pub fn subtree(&self, number: u32) -> Vec<u32> {
        let mut out = Vec::new();
        let mut stack = vec![number];
        while let Some(current) = stack.pop() {
            let Some(branch) = self.branches.get(&current) else {
                continue;
            };
            out.push(current);
            let mut children: Vec<u32> = branch.children().collect();
            children.sort_unstable_by(|a, b| b.cmp(a));
            stack.extend(children);
        }
        out
    }

    pub fn ancestors(&self, number: u32) -> Vec<u32> {
        let mut out = Vec::new();
        let mut current = self.branches.get(&number).and_then(|b| b.parent);
        while let Some(parent) = current {
            out.push(parent);
            current = self.branches.get(&parent).and_then(|b| b.parent);
        }
        out
    }

    pub fn translate_x(&mut self, number: u32, dx: i32) {
        if dx == 0 {
            return;
        }
        for n in self.subtree(number) {
            if let Some(branch) = self.branches.get_mut(&n) {
                branch.x += dx;
            }
        }
    }

    pub fn translate_y(&mut self, number: u32, dy: i32) {
        if dy == 0 {
            return;
        }
        for n in self.subtree(number) {
            if let Some(branch) = self.branches.get_mut(&n) {
                branch.y += dy;
                for member in &mut branch.members {
                    member.y += dy;
                }
            }
        }
    }

    /// Horizontal span of the non-empty branches under `number`.
    pub fn extent_x(&self, number: u32) -> Option<(i32, i32)> {
        self.subtree(number)
            .into_iter()
            .filter_map(|n| self.branches.get(&n))
            .filter(|b| !b.members.is_empty())
            .fold(None, |acc, b| match acc {
                None => Some((b.x, b.x)),
                Some((lo, hi)) => Some((lo.min(b.x), hi.max(b.x))),
            })
    }

    /// Lowest member y under `number`.
    pub fn extent_bottom(&self, number: u32) -> Option<i32> {
        self.subtree(number)
            .into_iter()
            .filter_map(|n| self.branches.get(&n))
            .filter_map(Branch::bottom)
            .max()
    }

    pub fn min_x(&self) -> Option<i32> {
        self.branches
            .values()
            .filter(|b| !b.members.is_empty())
            .map(|b| b.x)
            .min()
    }

    /// Members in traversal order: branch by branch, top to bottom.
    pub fn traversal(&self) -> impl Iterator<Item = (&Branch, usize, &Member)> {
        self.branches.values().flat_map(|branch| {
            branch
                .members
                .iter()
                .enumerate()
                .map(move |(idx, member)| (branch, idx, member))
        })
    }

    pub fn positions(&self) -> BTreeMap<ObjRef, Point> {
        self.traversal()
            .map(|(branch, _, member)| (member.obj.clone(), Point::new(branch.x, member.y)))
            .collect()
    }
}
