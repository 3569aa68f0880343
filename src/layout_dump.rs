use crate::ir::ObjRef;
use crate::layout::{Branch, BranchMap};
use crate::pipeline::BlockReport;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct LayoutDump {
    pub blocks: Vec<BlockDump>,
}

#[derive(Debug, Serialize)]
pub struct BlockDump {
    pub name: String,
    pub branches: Vec<BranchDump>,
}

#[derive(Debug, Serialize)]
pub struct BranchDump {
    pub number: u32,
    pub kind: String,
    pub parent: Option<u32>,
    pub x: i32,
    pub y: i32,
    pub left: Vec<u32>,
    pub right: Vec<u32>,
    pub members: Vec<MemberDump>,
}

#[derive(Debug, Serialize)]
pub struct MemberDump {
    pub kind: &'static str,
    pub name: String,
    pub y: i32,
}

impl BranchDump {
    fn from_branch(branch: &Branch) -> Self {
        let members = branch
            .members
            .iter()
            .map(|member| MemberDump {
                kind: match member.obj {
                    ObjRef::Step(_) => "step",
                    ObjRef::Transition(_) => "transition",
                },
                name: member.obj.name().to_string(),
                y: member.y,
            })
            .collect();
        BranchDump {
            number: branch.number,
            kind: branch.kind.to_string(),
            parent: branch.parent,
            x: branch.x,
            y: branch.y,
            left: branch.left.clone(),
            right: branch.right.clone(),
            members,
        }
    }
}

impl BlockDump {
    pub fn from_map(map: &BranchMap) -> Self {
        BlockDump {
            name: map.block.clone(),
            branches: map.branches.values().map(BranchDump::from_branch).collect(),
        }
    }
}

impl LayoutDump {
    /// Processed blocks in file order.
    pub fn from_reports(reports: &[BlockReport]) -> Self {
        let mut blocks: Vec<BlockDump> = reports
            .iter()
            .filter_map(|report| report.layout.as_ref())
            .map(BlockDump::from_map)
            .collect();
        blocks.reverse();
        LayoutDump { blocks }
    }
}

pub fn write_layout_dump(path: &Path, reports: &[BlockReport]) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let dump = LayoutDump::from_reports(reports);
    serde_json::to_writer_pretty(writer, &dump)?;
    Ok(())
}
