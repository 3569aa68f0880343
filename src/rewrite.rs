use crate::buffer::{Edit, LineBuffer};
use crate::error::Result;
use crate::ir::{ObjectSet, TextValue};
use crate::patch::replace_text;
use crate::rename::RenameMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

// `'<step>/PENDING_CONFIRMS` or `'<step>/<action>/PENDING_CONFIRM`.
static CONFIRM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"'([^'/"\s]+)/(?:([^'/"\s]+)/PENDING_CONFIRM|PENDING_CONFIRMS)\b"#).unwrap()
});
// `'<step>/<action>/STATE`.
static STATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"'([^'/"\s]+)/([^'/"\s]+)/STATE\b"#).unwrap());

/// Rebuild one matched reference with renamed step and action names. Every
/// lookup uses the names as written, so a new name never feeds another
/// substitution.
fn renamed(caps: &Captures<'_>, names: &RenameMap) -> String {
    let whole = &caps[0];
    let old_step = &caps[1];
    let new_step = names.step(old_step).unwrap_or(old_step);
    let tail = &whole[1 + old_step.len()..];
    match caps.get(2) {
        Some(action) => {
            let old_action = action.as_str();
            let new_action = names.action(old_step, old_action).unwrap_or(old_action);
            let rest = &tail[1 + old_action.len()..];
            format!("'{new_step}/{new_action}{rest}")
        }
        None => format!("'{new_step}{tail}"),
    }
}

pub fn rewrite_condition<'a>(expression: &'a str, names: &RenameMap) -> Cow<'a, str> {
    CONFIRM_RE.replace_all(expression, |caps: &Captures<'_>| renamed(caps, names))
}

pub fn rewrite_delay<'a>(expression: &'a str, names: &RenameMap) -> Cow<'a, str> {
    STATE_RE.replace_all(expression, |caps: &Captures<'_>| renamed(caps, names))
}

fn edit_if_changed(value: &TextValue, rewritten: Cow<'_, str>) -> Option<Edit> {
    match rewritten {
        Cow::Borrowed(_) => None,
        Cow::Owned(text) if text == value.value => None,
        Cow::Owned(text) => Some(replace_text(value, &text)),
    }
}

/// Edits for every transition condition and action delay whose references
/// change under `names`.
pub fn plan_rewrites(set: &ObjectSet, names: &RenameMap) -> Vec<Edit> {
    let conditions = set
        .transitions
        .iter()
        .filter_map(|t| t.expression.as_ref())
        .filter_map(|value| edit_if_changed(value, rewrite_condition(&value.value, names)));
    let delays = set
        .actions()
        .filter_map(|a| a.delay.as_ref())
        .filter_map(|value| edit_if_changed(value, rewrite_delay(&value.value, names)));
    conditions.chain(delays).collect()
}

pub fn rewrite_expressions(
    buffer: &mut LineBuffer,
    set: &ObjectSet,
    names: &RenameMap,
) -> Result<usize> {
    buffer.ensure_current(set.generation)?;
    let edits = plan_rewrites(set, names);
    let count = edits.len();
    if count > 0 {
        buffer.apply(edits);
    }
    Ok(count)
}
