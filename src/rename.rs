use crate::config::NamingConfig;
use crate::error::{Error, Result, StructuralError};
use crate::ir::{ObjRef, ObjectSet};
use crate::layout::{Branch, BranchMap};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Regular,
    ParallelMarker,
    SelectionMarker,
    TaskPointer,
}

impl Role {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Regular => "",
            Self::ParallelMarker => "P",
            Self::SelectionMarker => "X",
            Self::TaskPointer => "J",
        }
    }
}

/// Old name to canonical name for one function block. Actions are keyed by
/// their old step name and old action name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameMap {
    pub steps: BTreeMap<String, String>,
    pub transitions: BTreeMap<String, String>,
    pub actions: BTreeMap<(String, String), String>,
}

impl RenameMap {
    pub fn step(&self, old: &str) -> Option<&str> {
        self.steps.get(old).map(String::as_str)
    }

    pub fn transition(&self, old: &str) -> Option<&str> {
        self.transitions.get(old).map(String::as_str)
    }

    pub fn action(&self, step: &str, action: &str) -> Option<&str> {
        self.actions
            .get(&(step.to_string(), action.to_string()))
            .map(String::as_str)
    }
}

/// Hands out names, appending `_2`, `_3`, ... on collision.
#[derive(Debug, Default)]
pub struct Uniquifier {
    taken: BTreeSet<String>,
    max_len: usize,
}

impl Uniquifier {
    pub fn new(max_len: usize) -> Self {
        Self {
            taken: BTreeSet::new(),
            max_len,
        }
    }

    pub fn reserve(&mut self, name: &str) {
        self.taken.insert(name.to_string());
    }

    pub fn claim(&mut self, base: &str) -> std::result::Result<String, StructuralError> {
        if base.len() > self.max_len {
            return Err(StructuralError::NameOverflow(base.to_string()));
        }
        if self.taken.insert(base.to_string()) {
            return Ok(base.to_string());
        }
        for n in 2.. {
            let candidate = format!("{base}_{n}");
            if candidate.len() > self.max_len {
                return Err(StructuralError::NameOverflow(candidate));
            }
            if self.taken.insert(candidate.clone()) {
                return Ok(candidate);
            }
        }
        unreachable!("suffix search always terminates")
    }
}

pub fn role_of(set: &ObjectSet, branch: &Branch, index: usize, obj: &ObjRef) -> Role {
    if branch.kind.is_task_pointer() && index + 1 == branch.members.len() {
        return Role::TaskPointer;
    }
    let marker = set.predecessors(obj).len() > 1 || set.successors(obj).len() > 1;
    match (obj, marker) {
        (_, false) => Role::Regular,
        (ObjRef::Transition(_), true) => Role::ParallelMarker,
        (ObjRef::Step(_), true) => Role::SelectionMarker,
    }
}

/// Canonical names from final branch topology: branch number, ordinal within
/// the branch (steps and transitions counted apart) and role tag.
pub fn build_rename_map(
    map: &BranchMap,
    set: &ObjectSet,
    config: &NamingConfig,
) -> Result<RenameMap> {
    let overflow = |kind| Error::structural(&set.block.name, kind);
    let mut names = Uniquifier::new(config.max_name_length);
    let mut out = RenameMap::default();

    for branch in map.branches.values() {
        let mut step_ordinal = 0;
        let mut transition_ordinal = 0;
        for (index, member) in branch.members.iter().enumerate() {
            let tag = role_of(set, branch, index, &member.obj).tag();
            match &member.obj {
                ObjRef::Step(old) => {
                    step_ordinal += 1;
                    let base = format!(
                        "{}{}_{}{}",
                        config.step_prefix, branch.number, step_ordinal, tag
                    );
                    let new = names.claim(&base).map_err(overflow)?;
                    out.steps.insert(old.clone(), new);
                }
                ObjRef::Transition(old) => {
                    transition_ordinal += 1;
                    let base = format!(
                        "{}{}_{}{}",
                        config.transition_prefix, branch.number, transition_ordinal, tag
                    );
                    let new = names.claim(&base).map_err(overflow)?;
                    out.transitions.insert(old.clone(), new);
                }
            }
        }
    }

    let mut action_names = Uniquifier::new(config.max_name_length);
    for (_, _, member) in map.traversal() {
        let ObjRef::Step(old_step) = &member.obj else {
            continue;
        };
        let (Some(step), Some(new_step)) = (set.step(old_step), out.steps.get(old_step)) else {
            continue;
        };
        for action in &step.actions {
            let qualifier = if action.qualifier.is_empty() {
                "N"
            } else {
                action.qualifier.as_str()
            };
            let base = format!("{new_step}_{qualifier}");
            let new = action_names.claim(&base).map_err(overflow)?;
            out.actions.insert((old_step.clone(), action.name.clone()), new);
        }
    }

    Ok(out)
}
