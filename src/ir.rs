use crate::buffer::LineRange;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub height: i32,
    pub width: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub from: Point,
    pub to: Point,
}

/// A quoted string field. `value` is the raw text between the quotes with
/// continuation lines joined by `\n`; `prefix` and `suffix` are the text
/// around it on the first and last line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextValue {
    pub range: LineRange,
    pub prefix: String,
    pub value: String,
    pub suffix: String,
}

impl TextValue {
    pub fn render(&self, value: &str) -> Vec<String> {
        format!("{}{}{}", self.prefix, value, self.suffix)
            .split('\n')
            .map(str::to_string)
            .collect()
    }
}

/// One SFC algorithm instance located in the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBlock {
    pub name: String,
    pub range: LineRange,
}

impl FunctionBlock {
    /// Embedded blocks carry a generated `__...__` name and are resolved to
    /// their owners through the composite map.
    pub fn is_embedded(&self) -> bool {
        self.name.len() > 4 && self.name.starts_with("__") && self.name.ends_with("__")
    }
}

#[derive(Debug, Clone)]
pub struct Action {
    pub step: String,
    pub name: String,
    pub header: usize,
    pub qualifier: String,
    pub expression: Option<TextValue>,
    pub delay: Option<TextValue>,
}

#[derive(Debug, Clone)]
pub struct Step {
    pub name: String,
    pub header: usize,
    pub close: Option<usize>,
    pub rect_line: Option<usize>,
    pub rect: Rect,
    pub initial: bool,
    pub actions: Vec<Action>,
    pub predecessors: Vec<String>,
    pub successors: Vec<String>,
}

impl Step {
    pub(crate) fn new(name: String, header: usize) -> Self {
        Self {
            name,
            header,
            close: None,
            rect_line: None,
            rect: Rect::default(),
            initial: false,
            actions: Vec::new(),
            predecessors: Vec::new(),
            successors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub name: String,
    pub header: usize,
    pub position_line: Option<usize>,
    pub position: Point,
    pub expression: Option<TextValue>,
    pub predecessors: Vec<String>,
    pub successors: Vec<String>,
}

impl Transition {
    pub(crate) fn new(name: String, header: usize) -> Self {
        Self {
            name,
            header,
            position_line: None,
            position: Point::default(),
            expression: None,
            predecessors: Vec::new(),
            successors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    StepToTransition,
    TransitionToStep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub kind: ConnectionKind,
    pub step: String,
    pub transition: String,
    pub line: usize,
    pub segment: Option<Segment>,
}

/// Chart element identity used by branches and the rename map.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", content = "name")]
pub enum ObjRef {
    Step(String),
    Transition(String),
}

impl ObjRef {
    pub fn name(&self) -> &str {
        match self {
            Self::Step(name) | Self::Transition(name) => name,
        }
    }
}

/// Everything the extractor found in one function block, tied to the buffer
/// generation it was read from.
#[derive(Debug, Clone)]
pub struct ObjectSet {
    pub generation: u64,
    pub block: FunctionBlock,
    pub timestamp_line: Option<usize>,
    pub steps: Vec<Step>,
    pub transitions: Vec<Transition>,
    pub connections: Vec<Connection>,
    pub(crate) step_index: BTreeMap<String, usize>,
    pub(crate) transition_index: BTreeMap<String, usize>,
}

impl ObjectSet {
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.step_index.get(name).map(|&idx| &self.steps[idx])
    }

    pub fn transition(&self, name: &str) -> Option<&Transition> {
        self.transition_index.get(name).map(|&idx| &self.transitions[idx])
    }

    pub fn successors(&self, obj: &ObjRef) -> &[String] {
        match obj {
            ObjRef::Step(name) => self.step(name).map(|s| s.successors.as_slice()),
            ObjRef::Transition(name) => self.transition(name).map(|t| t.successors.as_slice()),
        }
        .unwrap_or(&[])
    }

    pub fn predecessors(&self, obj: &ObjRef) -> &[String] {
        match obj {
            ObjRef::Step(name) => self.step(name).map(|s| s.predecessors.as_slice()),
            ObjRef::Transition(name) => self.transition(name).map(|t| t.predecessors.as_slice()),
        }
        .unwrap_or(&[])
    }

    /// Successor elements as references of the opposite kind.
    pub fn next_refs(&self, obj: &ObjRef) -> Vec<ObjRef> {
        let names = self.successors(obj);
        match obj {
            ObjRef::Step(_) => names.iter().cloned().map(ObjRef::Transition).collect(),
            ObjRef::Transition(_) => names.iter().cloned().map(ObjRef::Step).collect(),
        }
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.steps.iter().flat_map(|step| step.actions.iter())
    }

    pub fn all_refs(&self) -> impl Iterator<Item = ObjRef> + '_ {
        self.steps
            .iter()
            .map(|s| ObjRef::Step(s.name.clone()))
            .chain(self.transitions.iter().map(|t| ObjRef::Transition(t.name.clone())))
    }
}
