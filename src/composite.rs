use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeOwner {
    pub name: String,
    pub command: String,
}

/// Owners of embedded function blocks, keyed by the block's anonymous name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeMap {
    owners: BTreeMap<String, Vec<CompositeOwner>>,
}

impl CompositeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, block: impl Into<String>, owner: CompositeOwner) {
        self.owners.entry(block.into()).or_default().push(owner);
    }

    /// `None` when the block is unresolved.
    pub fn resolve(&self, block: &str) -> Option<&[CompositeOwner]> {
        self.owners
            .get(block)
            .map(Vec::as_slice)
            .filter(|owners| !owners.is_empty())
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).map_err(|source| Error::Json {
            what: "composite map",
            source,
        })
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_json(&std::fs::read_to_string(path)?),
            None => Ok(Self::new()),
        }
    }
}

/// `name/command` pairs joined for the confirmation prompt.
pub fn owner_label(owners: &[CompositeOwner]) -> String {
    owners
        .iter()
        .map(|owner| format!("{}/{}", owner.name, owner.command))
        .collect::<Vec<_>>()
        .join(", ")
}
