//! Per-block driver. Every phase re-locates the block and re-extracts its
//! objects from the buffer, so no line index outlives a length change.

use crate::buffer::{LineBuffer, LineRange};
use crate::composite::{CompositeMap, CompositeOwner, owner_label};
use crate::config::Config;
use crate::encoding::Document;
use crate::error::{Error, Result, StructuralError};
use crate::extract::extract;
use crate::inject::inject_index_actions;
use crate::ir::{FunctionBlock, ObjRef, ObjectSet};
use crate::layout::{BranchMap, TaskPointerPolicy, build_branches, compute_layout};
use crate::parser::{Token, block_at, find_blocks, tokenize};
use crate::patch::{bump_timestamp, write_geometry, write_names, write_segments};
use crate::rename::build_rename_map;
use crate::rewrite::rewrite_expressions;
use std::fmt;

/// Asks whether a block should be processed. `label` names the block, or its
/// owners for embedded blocks.
pub trait ConfirmationGate {
    fn confirm(&mut self, label: &str) -> bool;
}

/// Accepts every block.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ConfirmationGate for AcceptAll {
    fn confirm(&mut self, _label: &str) -> bool {
        true
    }
}

impl<F> ConfirmationGate for F
where
    F: FnMut(&str) -> bool,
{
    fn confirm(&mut self, label: &str) -> bool {
        self(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoAlgorithm,
    SkipList,
    Unresolved,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoAlgorithm => "no SFC algorithm",
            Self::SkipList => "on the skip list",
            Self::Unresolved => "owning composite not found",
        })
    }
}

#[derive(Debug)]
pub enum BlockOutcome {
    Processed { steps: usize, branches: usize },
    Declined,
    Skipped(SkipReason),
    Failed(Error),
}

impl BlockOutcome {
    pub fn is_processed(&self) -> bool {
        matches!(self, Self::Processed { .. })
    }
}

#[derive(Debug)]
pub struct BlockReport {
    pub name: String,
    pub outcome: BlockOutcome,
    /// Final branch map of a processed block.
    pub layout: Option<BranchMap>,
}

enum Screen<'m> {
    Skip(SkipReason),
    Candidate(&'m [CompositeOwner]),
}

#[derive(Debug, Clone, Copy)]
pub struct Pipeline<'a> {
    config: &'a Config,
    composites: &'a CompositeMap,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config, composites: &'a CompositeMap) -> Self {
        Self { config, composites }
    }

    /// Process every function block, last to first. Reports come back in the
    /// same order. Only I/O-level failures abort the run.
    pub fn run(
        &self,
        buffer: &mut LineBuffer,
        gate: &mut dyn ConfirmationGate,
    ) -> Result<Vec<BlockReport>> {
        let index = find_blocks(buffer);
        tracing::debug!(blocks = index.blocks.len(), "located function blocks");
        let mut reports = Vec::with_capacity(index.blocks.len());
        for (name, range) in index.blocks.into_iter().rev() {
            let span = tracing::debug_span!("block", name = %name, start = range.start);
            let _enter = span.enter();
            let report = match locate(buffer, index.generation, &name, range) {
                Ok(block) => self.run_block(buffer, block, gate)?,
                Err(err) if err.is_block_local() => {
                    tracing::warn!(error = %err, "block could not be read");
                    BlockReport {
                        name,
                        outcome: BlockOutcome::Failed(err),
                        layout: None,
                    }
                }
                Err(err) => return Err(err),
            };
            reports.push(report);
        }
        Ok(reports)
    }

    /// Decide from the block's name and marker alone whether it is a
    /// candidate, so skipped blocks are never extracted.
    fn screen(&self, buffer: &LineBuffer, block: &FunctionBlock) -> Screen<'a> {
        let has_algorithm = buffer
            .slice(block.range)
            .iter()
            .any(|line| tokenize(line) == Token::SfcAlgorithm);
        if !has_algorithm {
            return Screen::Skip(SkipReason::NoAlgorithm);
        }
        if self.config.skips(&block.name) {
            return Screen::Skip(SkipReason::SkipList);
        }
        if !block.is_embedded() {
            return Screen::Candidate(&[]);
        }
        match self.composites.resolve(&block.name) {
            Some(owners) => Screen::Candidate(owners),
            None => Screen::Skip(SkipReason::Unresolved),
        }
    }

    fn run_block(
        &self,
        buffer: &mut LineBuffer,
        block: FunctionBlock,
        gate: &mut dyn ConfirmationGate,
    ) -> Result<BlockReport> {
        let name = block.name.clone();
        let report = |outcome, layout| BlockReport {
            name: name.clone(),
            outcome,
            layout,
        };

        let owners = match self.screen(buffer, &block) {
            Screen::Candidate(owners) => owners,
            Screen::Skip(reason) => {
                match reason {
                    SkipReason::NoAlgorithm => tracing::debug!("skipped: {reason}"),
                    _ => tracing::info!("skipped: {reason}"),
                }
                return Ok(report(BlockOutcome::Skipped(reason), None));
            }
        };
        let label = if owners.is_empty() {
            name.clone()
        } else {
            owner_label(owners)
        };
        if !gate.confirm(&label) {
            tracing::info!(label = %label, "declined");
            return Ok(report(BlockOutcome::Declined, None));
        }

        let policy = self.policy_for(owners);
        match self.process(buffer, &block, policy) {
            Ok(map) => {
                let steps = map
                    .traversal()
                    .filter(|(_, _, member)| matches!(member.obj, ObjRef::Step(_)))
                    .count();
                let branches = map.branches.len();
                tracing::info!(steps, branches, "processed");
                Ok(report(BlockOutcome::Processed { steps, branches }, Some(map)))
            }
            Err(err) if err.is_block_local() => {
                tracing::warn!(error = %err, "block left partially updated");
                Ok(report(BlockOutcome::Failed(err), None))
            }
            Err(err) => Err(err),
        }
    }

    fn policy_for(&self, owners: &[CompositeOwner]) -> TaskPointerPolicy {
        let force_left = owners.iter().any(|owner| {
            TaskPointerPolicy::for_command(Some(&owner.command), &self.config.layout).force_left
        });
        TaskPointerPolicy { force_left }
    }

    fn layout(&self, set: &ObjectSet, policy: TaskPointerPolicy) -> Result<BranchMap> {
        let mut map = build_branches(set, policy)?;
        compute_layout(&mut map, &self.config.layout);
        Ok(map)
    }

    /// The six mutating phases for one accepted block.
    fn process(
        &self,
        buffer: &mut LineBuffer,
        block: &FunctionBlock,
        policy: TaskPointerPolicy,
    ) -> Result<BranchMap> {
        let start = block.range.start;
        let name = block.name.as_str();

        let set = relocate(buffer, name, start)?;
        let time = bump_timestamp(buffer, &set)?;
        tracing::debug!(?time, "timestamp bumped");

        let set = relocate(buffer, name, start)?;
        let map = self.layout(&set, policy)?;
        let written = write_geometry(buffer, &set, &map, &self.config.layout)?;
        tracing::debug!(lines = written, "positions written");

        let set = relocate(buffer, name, start)?;
        let written = write_segments(buffer, &set)?;
        tracing::debug!(lines = written, "segments written");

        let set = relocate(buffer, name, start)?;
        let map = self.layout(&set, policy)?;
        let names = build_rename_map(&map, &set, &self.config.naming)?;
        let written = write_names(buffer, &set, &names)?;
        tracing::debug!(lines = written, "names written");

        let set = relocate(buffer, name, start)?;
        let map = self.layout(&set, policy)?;
        let inserted = inject_index_actions(buffer, &set, &map, self.config)?;
        tracing::debug!(
            actions = inserted,
            generation = buffer.generation(),
            "index actions injected"
        );

        let set = relocate(buffer, name, start)?;
        let rewritten = rewrite_expressions(buffer, &set, &names)?;
        tracing::debug!(fields = rewritten, "expressions rewritten");

        let set = relocate(buffer, name, start)?;
        self.layout(&set, policy)
    }
}

// Edits stay inside the block being processed and blocks are visited
// bottom-up, so a block taken from a stale index still starts on the same
// line. Only its extent is read again.
fn locate(
    buffer: &LineBuffer,
    generation: u64,
    name: &str,
    range: LineRange,
) -> Result<FunctionBlock> {
    if buffer.generation() == generation {
        return Ok(FunctionBlock {
            name: name.to_string(),
            range,
        });
    }
    match block_at(buffer, range.start) {
        Some((found, range)) if found == name => Ok(FunctionBlock { name: found, range }),
        _ => Err(Error::structural(name, StructuralError::BlockLost(range.start))),
    }
}

/// Find the block again at `start` and extract it against the current
/// generation.
fn relocate(buffer: &LineBuffer, name: &str, start: usize) -> Result<ObjectSet> {
    match block_at(buffer, start) {
        Some((found, range)) if found == name => extract(buffer, &found, range),
        _ => Err(Error::structural(name, StructuralError::BlockLost(start))),
    }
}

/// Run the pipeline over a decoded export in place.
pub fn process_document(
    doc: &mut Document,
    config: &Config,
    composites: &CompositeMap,
    gate: &mut dyn ConfirmationGate,
) -> Result<Vec<BlockReport>> {
    Pipeline::new(config, composites).run(&mut doc.buffer, gate)
}
