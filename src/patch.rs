//! Writes computed geometry, names and expression text back into the buffer.
//!
//! Geometry and name updates rewrite single lines in place and never change
//! the line count. Text replacements go through [`LineBuffer::apply`] so a
//! string that spans a different number of lines advances the generation.

use crate::buffer::{Edit, LineBuffer};
use crate::config::LayoutConfig;
use crate::error::{Error, Result, StructuralError};
use crate::ir::{ConnectionKind, ObjRef, ObjectSet, Point, Rect, Segment, TextValue};
use crate::layout::BranchMap;
use crate::rename::RenameMap;
use once_cell::sync::Lazy;
use regex::Regex;

static TIME_VALUE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"time=(\d+)").unwrap());
static RECT_PAYLOAD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"RECTANGLE=\s*\{[^}]*\}").unwrap());
static POSITION_PAYLOAD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"POSITION=\s*\{[^}]*\}").unwrap());
static SEGMENT_PAYLOAD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"SEGMENT=\s*\{[^}]*\}").unwrap());

fn missing(set: &ObjectSet, kind: &'static str, name: &str, field: &'static str) -> Error {
    Error::structural(
        &set.block.name,
        StructuralError::MissingLine {
            kind,
            name: name.to_string(),
            field,
        },
    )
}

fn line<'a>(buffer: &'a LineBuffer, set: &ObjectSet, idx: usize) -> Result<&'a str> {
    buffer.line(idx).ok_or_else(|| {
        Error::structural(&set.block.name, StructuralError::BlockLost(set.block.range.start))
    })
}

pub fn format_rect(rect: Rect) -> String {
    format!(
        "RECTANGLE= {{ X={} Y={} H={} W={} }}",
        rect.x, rect.y, rect.height, rect.width
    )
}

pub fn format_position(point: Point) -> String {
    format!("POSITION= {{ X={} Y={} }}", point.x, point.y)
}

pub fn format_segment(segment: Segment) -> String {
    format!(
        "SEGMENT= {{ X1={} Y1={} X2={} Y2={} }}",
        segment.from.x, segment.from.y, segment.to.x, segment.to.y
    )
}

fn replace_payload(re: &Regex, line: &str, payload: &str) -> String {
    re.replace(line, regex::NoExpand(payload)).into_owned()
}

/// Rewrite the quoted value that follows ` <key>="` on `line`.
pub fn set_quoted(line: &str, key: &str, value: &str) -> Option<String> {
    let needle = format!(" {key}=\"");
    let start = line.find(&needle)? + needle.len();
    let len = line[start..].find('"')?;
    Some(format!("{}{}{}", &line[..start], value, &line[start + len..]))
}

/// Advance the block timestamp by one second. Returns the new value, or
/// `None` when the block carries no timestamp line.
pub fn bump_timestamp(buffer: &mut LineBuffer, set: &ObjectSet) -> Result<Option<u64>> {
    buffer.ensure_current(set.generation)?;
    let Some(idx) = set.timestamp_line else {
        return Ok(None);
    };
    let text = line(buffer, set, idx)?;
    let Some(caps) = TIME_VALUE_RE.captures(text) else {
        return Ok(None);
    };
    let Ok(time) = caps[1].parse::<u64>() else {
        return Ok(None);
    };
    let bumped = time + 1;
    let rewritten = TIME_VALUE_RE
        .replace(text, format!("time={bumped}").as_str())
        .into_owned();
    buffer.replace_line(idx, rewritten);
    Ok(Some(bumped))
}

/// Step rectangles and transition positions from the finished layout. Step
/// sizes are normalised to the configured height and width.
pub fn write_geometry(
    buffer: &mut LineBuffer,
    set: &ObjectSet,
    map: &BranchMap,
    config: &LayoutConfig,
) -> Result<usize> {
    buffer.ensure_current(set.generation)?;
    buffer.ensure_current(map.generation)?;
    let positions = map.positions();
    let mut rewrites = Vec::new();

    for step in &set.steps {
        let at = positions
            .get(&ObjRef::Step(step.name.clone()))
            .ok_or_else(|| {
                Error::structural(&set.block.name, StructuralError::Unreachable(step.name.clone()))
            })?;
        let idx = step
            .rect_line
            .ok_or_else(|| missing(set, "step", &step.name, "RECTANGLE"))?;
        let rect = Rect {
            x: at.x,
            y: at.y,
            height: config.step_height,
            width: config.step_width,
        };
        let text = line(buffer, set, idx)?;
        rewrites.push((idx, replace_payload(&RECT_PAYLOAD_RE, text, &format_rect(rect))));
    }

    for transition in &set.transitions {
        let at = positions
            .get(&ObjRef::Transition(transition.name.clone()))
            .ok_or_else(|| {
                Error::structural(
                    &set.block.name,
                    StructuralError::Unreachable(transition.name.clone()),
                )
            })?;
        let idx = transition
            .position_line
            .ok_or_else(|| missing(set, "transition", &transition.name, "POSITION"))?;
        let point = Point::new(at.x + config.transition_offset_x, at.y);
        let text = line(buffer, set, idx)?;
        rewrites.push((
            idx,
            replace_payload(&POSITION_PAYLOAD_RE, text, &format_position(point)),
        ));
    }

    let count = rewrites.len();
    for (idx, text) in rewrites {
        buffer.replace_line(idx, text);
    }
    Ok(count)
}

/// Connector endpoints for a link, from the geometry currently in the file.
pub fn segment_for(
    set: &ObjectSet,
    kind: ConnectionKind,
    step: &str,
    transition: &str,
) -> Option<Segment> {
    let rect = set.step(step)?.rect;
    let position = set.transition(transition)?.position;
    let centre = rect.x + rect.width / 2;
    Some(match kind {
        ConnectionKind::StepToTransition => Segment {
            from: Point::new(centre, rect.y + rect.height),
            to: position,
        },
        ConnectionKind::TransitionToStep => Segment {
            from: position,
            to: Point::new(centre, rect.y),
        },
    })
}

/// Recompute every connector that already carries a `SEGMENT` payload.
pub fn write_segments(buffer: &mut LineBuffer, set: &ObjectSet) -> Result<usize> {
    buffer.ensure_current(set.generation)?;
    let mut rewrites = Vec::new();
    for conn in set.connections.iter().filter(|c| c.segment.is_some()) {
        let Some(segment) = segment_for(set, conn.kind, &conn.step, &conn.transition) else {
            continue;
        };
        let text = line(buffer, set, conn.line)?;
        rewrites.push((
            conn.line,
            replace_payload(&SEGMENT_PAYLOAD_RE, text, &format_segment(segment)),
        ));
    }
    let count = rewrites.len();
    for (idx, text) in rewrites {
        buffer.replace_line(idx, text);
    }
    Ok(count)
}

/// Rename step, transition and action headers and the `STEP=`/`TRANSITION=`
/// references on connection lines.
pub fn write_names(buffer: &mut LineBuffer, set: &ObjectSet, names: &RenameMap) -> Result<usize> {
    buffer.ensure_current(set.generation)?;
    let mut rewrites: Vec<(usize, String)> = Vec::new();
    let mut rename = |buffer: &LineBuffer, idx: usize, key: &str, new: &str| -> Result<()> {
        let text = line(buffer, set, idx)?;
        if let Some(updated) = set_quoted(text, key, new) {
            if updated != text {
                rewrites.push((idx, updated));
            }
        }
        Ok(())
    };

    for step in &set.steps {
        if let Some(new) = names.step(&step.name) {
            rename(buffer, step.header, "NAME", new)?;
        }
        for action in &step.actions {
            if let Some(new) = names.action(&step.name, &action.name) {
                rename(buffer, action.header, "NAME", new)?;
            }
        }
    }
    for transition in &set.transitions {
        if let Some(new) = names.transition(&transition.name) {
            rename(buffer, transition.header, "NAME", new)?;
        }
    }

    // Connection lines carry two names; apply both to the same text.
    for conn in &set.connections {
        let mut text = line(buffer, set, conn.line)?.to_string();
        if let Some(new) = names.step(&conn.step) {
            text = set_quoted(&text, "STEP", new).unwrap_or(text);
        }
        if let Some(new) = names.transition(&conn.transition) {
            text = set_quoted(&text, "TRANSITION", new).unwrap_or(text);
        }
        if buffer.line(conn.line) != Some(text.as_str()) {
            rewrites.push((conn.line, text));
        }
    }

    let count = rewrites.len();
    for (idx, text) in rewrites {
        buffer.replace_line(idx, text);
    }
    Ok(count)
}

/// Replace the body of a string field, keeping the text around the quotes.
pub fn replace_text(value: &TextValue, new_value: &str) -> Edit {
    Edit::replace(value.range, value.render(new_value))
}
