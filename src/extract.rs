use crate::buffer::{LineBuffer, LineRange};
use crate::error::{Error, Result, StructuralError};
use crate::ir::{
    Action, Connection, ConnectionKind, FunctionBlock, ObjectSet, Step, TextValue, Transition,
};
use crate::parser::{Link, TextField, TextOpen, Token, closing_quote, tokenize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
enum Frame {
    Step(usize),
    Transition(usize),
    Action(usize, usize),
    Other,
}

/// Scan the block at `range` and collect its steps, transitions, actions and
/// connections against the buffer's current generation.
pub fn extract(buffer: &LineBuffer, name: &str, range: LineRange) -> Result<ObjectSet> {
    let lines = buffer.slice(range);
    let mut set = ObjectSet {
        generation: buffer.generation(),
        block: FunctionBlock {
            name: name.to_string(),
            range,
        },
        timestamp_line: None,
        steps: Vec::new(),
        transitions: Vec::new(),
        connections: Vec::new(),
        step_index: BTreeMap::new(),
        transition_index: BTreeMap::new(),
    };

    let mut frames: Vec<Frame> = Vec::new();
    let mut pending: Option<Frame> = None;
    let mut offset = 0;
    while offset < lines.len() {
        let line_no = range.start + offset;
        let token = tokenize(&lines[offset]);
        match token {
            Token::Timestamp { .. } => {
                set.timestamp_line.get_or_insert(line_no);
            }
            Token::Step { name } => {
                set.steps.push(Step::new(name, line_no));
                pending = Some(Frame::Step(set.steps.len() - 1));
            }
            Token::Transition { name } => {
                set.transitions.push(Transition::new(name, line_no));
                pending = Some(Frame::Transition(set.transitions.len() - 1));
            }
            Token::Action { name } => {
                pending = Some(match frames.last() {
                    Some(&Frame::Step(step_idx)) => {
                        let step = &mut set.steps[step_idx];
                        step.actions.push(Action {
                            step: step.name.clone(),
                            name,
                            header: line_no,
                            qualifier: String::new(),
                            expression: None,
                            delay: None,
                        });
                        Frame::Action(step_idx, step.actions.len() - 1)
                    }
                    _ => Frame::Other,
                });
            }
            Token::Open => frames.push(pending.take().unwrap_or(Frame::Other)),
            Token::Close => {
                if let Some(Frame::Step(step_idx)) = frames.pop() {
                    set.steps[step_idx].close = Some(line_no);
                }
            }
            Token::Rectangle(rect) => {
                if let Some(&Frame::Step(step_idx)) = frames.last() {
                    set.steps[step_idx].rect = rect;
                    set.steps[step_idx].rect_line = Some(line_no);
                }
            }
            Token::Position(point) => {
                if let Some(&Frame::Transition(idx)) = frames.last() {
                    set.transitions[idx].position = point;
                    set.transitions[idx].position_line = Some(line_no);
                }
            }
            Token::InitialStep(initial) => {
                if let Some(&Frame::Step(step_idx)) = frames.last() {
                    set.steps[step_idx].initial = initial;
                }
            }
            Token::Qualifier(qualifier) => {
                if let Some(&Frame::Action(step_idx, action_idx)) = frames.last() {
                    set.steps[step_idx].actions[action_idx].qualifier = qualifier;
                }
            }
            Token::Text(open) => {
                let field = open.field;
                let text = read_text(lines, range.start, offset, open);
                offset = text.range.end() - range.start - 1;
                match (frames.last(), field) {
                    (Some(&Frame::Transition(idx)), TextField::Expression) => {
                        set.transitions[idx].expression = Some(text);
                    }
                    (Some(&Frame::Action(step_idx, action_idx)), TextField::Expression) => {
                        set.steps[step_idx].actions[action_idx].expression = Some(text);
                    }
                    (Some(&Frame::Action(step_idx, action_idx)), TextField::DelayExpression) => {
                        set.steps[step_idx].actions[action_idx].delay = Some(text);
                    }
                    _ => {}
                }
            }
            Token::StepToTransition(link) => {
                set.connections
                    .push(connection(ConnectionKind::StepToTransition, link, line_no));
            }
            Token::TransitionToStep(link) => {
                set.connections
                    .push(connection(ConnectionKind::TransitionToStep, link, line_no));
            }
            Token::FunctionBlock { .. } | Token::SfcAlgorithm | Token::Other => {}
        }
        offset += 1;
    }

    set.step_index = set
        .steps
        .iter()
        .enumerate()
        .map(|(idx, step)| (step.name.clone(), idx))
        .collect();
    set.transition_index = set
        .transitions
        .iter()
        .enumerate()
        .map(|(idx, transition)| (transition.name.clone(), idx))
        .collect();
    wire_connections(&mut set)?;
    Ok(set)
}

fn connection(kind: ConnectionKind, link: Link, line: usize) -> Connection {
    Connection {
        kind,
        step: link.step,
        transition: link.transition,
        line,
        segment: link.segment,
    }
}

// Follow a string field across continuation lines until its closing quote.
fn read_text(lines: &[String], base: usize, offset: usize, open: TextOpen) -> TextValue {
    let mut value = open.body;
    if let Some(suffix) = open.suffix {
        return TextValue {
            range: LineRange::single(base + offset),
            prefix: open.prefix,
            value,
            suffix,
        };
    }
    let mut last = offset;
    let mut suffix = String::new();
    for (idx, line) in lines.iter().enumerate().skip(offset + 1) {
        last = idx;
        value.push('\n');
        match closing_quote(line) {
            Some(end) => {
                value.push_str(&line[..end]);
                suffix = line[end..].to_string();
                break;
            }
            None => value.push_str(line),
        }
    }
    TextValue {
        range: LineRange::new(base + offset, last - offset + 1),
        prefix: open.prefix,
        value,
        suffix,
    }
}

fn wire_connections(set: &mut ObjectSet) -> Result<()> {
    let block = set.block.name.clone();
    let dangling = |kind: &'static str, name: &str| {
        Error::structural(
            &block,
            StructuralError::DanglingReference {
                kind,
                name: name.to_string(),
            },
        )
    };
    for conn in &set.connections {
        let step_idx = *set
            .step_index
            .get(&conn.step)
            .ok_or_else(|| dangling("step", &conn.step))?;
        let transition_idx = *set
            .transition_index
            .get(&conn.transition)
            .ok_or_else(|| dangling("transition", &conn.transition))?;
        match conn.kind {
            ConnectionKind::StepToTransition => {
                set.steps[step_idx].successors.push(conn.transition.clone());
                set.transitions[transition_idx]
                    .predecessors
                    .push(conn.step.clone());
            }
            ConnectionKind::TransitionToStep => {
                set.transitions[transition_idx]
                    .successors
                    .push(conn.step.clone());
                set.steps[step_idx].predecessors.push(conn.transition.clone());
            }
        }
    }
    Ok(())
}

/// The step flagged `INITIAL_STEP=T`, or failing that the only step without
/// a predecessor.
pub fn initial_step<'a>(set: &'a ObjectSet) -> Result<&'a Step> {
    if let Some(step) = set.steps.iter().find(|step| step.initial) {
        return Ok(step);
    }
    let roots: Vec<&Step> = set
        .steps
        .iter()
        .filter(|step| step.predecessors.is_empty())
        .collect();
    match roots.as_slice() {
        [step] => Ok(step),
        [] => Err(Error::structural(
            &set.block.name,
            StructuralError::NoInitialStep,
        )),
        many => Err(Error::structural(
            &set.block.name,
            StructuralError::AmbiguousInitialStep(
                many.iter()
                    .map(|step| step.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        )),
    }
}
