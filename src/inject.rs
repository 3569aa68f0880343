use crate::buffer::{Edit, LineBuffer};
use crate::config::Config;
use crate::error::{Error, Result, StructuralError};
use crate::ir::{ObjRef, ObjectSet, Step};
use crate::layout::BranchMap;
use crate::rename::Uniquifier;

fn indent_of(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

fn quote(text: &str) -> String {
    text.replace('"', "\"\"")
}

/// Lines of one step-index action, indented one level below `step_indent`.
pub fn index_action_lines(
    step_indent: &str,
    name: &str,
    index: usize,
    config: &Config,
) -> Vec<String> {
    let action = &config.index_action;
    let outer = format!("{step_indent}  ");
    let inner = format!("{outer}  ");
    vec![
        format!(r#"{outer}ACTION NAME="{name}""#),
        format!("{outer}{{"),
        format!(r#"{inner}DESCRIPTION="{}""#, quote(&action.description)),
        format!("{inner}ACTION_TYPE=ASSIGN"),
        format!("{inner}QUALIFIER={}", action.qualifier),
        format!(r#"{inner}EXPRESSION="{}""#, quote(&action.expression_for(index))),
        format!(r#"{inner}DELAY_EXPRESSION="""#),
        format!("{outer}}}"),
    ]
}

fn index_action_name(block: &str, step: &Step, config: &Config) -> Result<String> {
    let mut names = Uniquifier::new(config.naming.max_name_length);
    for action in &step.actions {
        names.reserve(&action.name);
    }
    names
        .claim(&format!("{}_{}", step.name, config.index_action.qualifier))
        .map_err(|kind| Error::structural(block, kind))
}

/// One insertion per step, numbered in traversal order from 1, placed just
/// before the step's closing brace.
pub fn plan_index_actions(
    buffer: &LineBuffer,
    set: &ObjectSet,
    map: &BranchMap,
    config: &Config,
) -> Result<Vec<Edit>> {
    buffer.ensure_current(set.generation)?;
    buffer.ensure_current(map.generation)?;
    let steps = map.traversal().filter_map(|(_, _, member)| match &member.obj {
        ObjRef::Step(name) => Some(name.as_str()),
        ObjRef::Transition(_) => None,
    });

    let mut edits = Vec::new();
    for (ordinal, name) in steps.enumerate() {
        let step = set.step(name).ok_or_else(|| {
            Error::structural(&set.block.name, StructuralError::Unreachable(name.to_string()))
        })?;
        let close = step.close.ok_or_else(|| {
            Error::structural(
                &set.block.name,
                StructuralError::MissingLine {
                    kind: "step",
                    name: step.name.clone(),
                    field: "closing brace",
                },
            )
        })?;
        let header = buffer.line(step.header).unwrap_or_default();
        let action = index_action_name(&set.block.name, step, config)?;
        edits.push(Edit::insert(
            close,
            index_action_lines(indent_of(header), &action, ordinal + 1, config),
        ));
    }
    Ok(edits)
}

/// Insert every index action in one batch. The buffer generation advances,
/// so any object set or branch map built before this call is stale.
pub fn inject_index_actions(
    buffer: &mut LineBuffer,
    set: &ObjectSet,
    map: &BranchMap,
    config: &Config,
) -> Result<usize> {
    let edits = plan_index_actions(buffer, set, map, config)?;
    let count = edits.len();
    if count > 0 {
        buffer.apply(edits);
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::LineRange;
    use crate::extract::extract;
    use crate::layout::{TaskPointerPolicy, build_branches, compute_layout};
    use crate::testing::Chart;

    fn injected(chart: &Chart, config: &Config) -> (LineBuffer, ObjectSet) {
        let mut buffer = chart.buffer();
        let set = extract(&buffer, "FB", LineRange::new(0, buffer.len())).unwrap();
        let mut map = build_branches(&set, TaskPointerPolicy::default()).unwrap();
        compute_layout(&mut map, &config.layout);
        inject_index_actions(&mut buffer, &set, &map, config).unwrap();
        let after = extract(&buffer, "FB", LineRange::new(0, buffer.len())).unwrap();
        (buffer, after)
    }

    #[test]
    fn every_step_gets_one_ordinal_action() {
        let chart = Chart::new("FB")
            .chain(&["S1", "T1", "S2", "T2", "S4"])
            .chain(&["T1", "S3", "T2"]);
        let config = Config::default();
        let (buffer, after) = injected(&chart, &config);
        assert_eq!(buffer.generation(), 1);

        // Traversal order: root column first, then the right branch.
        let expected = [("S1", 1), ("S2", 2), ("S4", 3), ("S3", 4)];
        for (step, index) in expected {
            let actions = &after.step(step).unwrap().actions;
            assert_eq!(actions.len(), 1, "{step}");
            let action = &actions[0];
            assert_eq!(action.name, format!("{step}_P"));
            assert_eq!(action.qualifier, "P");
            assert_eq!(
                action.expression.as_ref().unwrap().value,
                format!("'^/STEP_INDEX.CV' := {index};")
            );
        }
    }

    #[test]
    fn injected_action_is_nested_inside_step() {
        let chart = Chart::new("FB").chain(&["S1", "T1", "S2"]);
        let (buffer, after) = injected(&chart, &Config::default());
        let step = after.step("S1").unwrap();
        let header = step.actions[0].header;
        assert_eq!(buffer.lines()[header], r#"      ACTION NAME="S1_P""#);
        assert_eq!(step.close, Some(header + 8));
        assert_eq!(buffer.lines()[header + 8], "    }");
    }

    #[test]
    fn name_avoids_existing_actions() {
        let chart = Chart::new("FB")
            .chain(&["S1", "T1", "S2"])
            .action("S1", "S1_P", "P", "");
        let (_, after) = injected(&chart, &Config::default());
        let names: Vec<&str> = after
            .step("S1")
            .unwrap()
            .actions
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, ["S1_P", "S1_P_2"]);
    }

    #[test]
    fn template_quotes_are_escaped() {
        let mut config = Config::default();
        config.index_action.expression = r#"'^/MSG.CV' := "step {index}";"#.to_string();
        let lines = index_action_lines("    ", "S1_P", 7, &config);
        assert_eq!(lines[5], r#"        EXPRESSION="'^/MSG.CV' := ""step 7"";""#);
    }
}
