use std::collections::BTreeSet;
use std::path::Path;

use sfc_arrange::composite::{CompositeMap, CompositeOwner};
use sfc_arrange::encoding::encode_utf16le;
use sfc_arrange::extract::extract;
use sfc_arrange::ir::ObjectSet;
use sfc_arrange::layout::{BranchKind, Side};
use sfc_arrange::parser::find_blocks;
use sfc_arrange::{AcceptAll, BlockOutcome, BlockReport, Config, Document, Pipeline, SkipReason};

fn load_fixture(name: &str) -> Document {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    let text = std::fs::read_to_string(&path).expect("fixture read failed");
    Document::from_utf16le(&encode_utf16le(&text)).expect("fixture decode failed")
}

fn owners(command: &str) -> CompositeMap {
    let mut map = CompositeMap::new();
    map.insert(
        "__5E0A1B2C__",
        CompositeOwner {
            name: "REACTOR_1".to_string(),
            command: command.to_string(),
        },
    );
    map
}

fn run_all(doc: &mut Document, config: &Config, composites: &CompositeMap) -> Vec<BlockReport> {
    Pipeline::new(config, composites)
        .run(&mut doc.buffer, &mut AcceptAll)
        .expect("pipeline run failed")
}

fn block(doc: &Document, name: &str) -> ObjectSet {
    let index = find_blocks(&doc.buffer);
    let (found, range) = index
        .blocks
        .into_iter()
        .find(|(found, _)| found == name)
        .expect("block present");
    extract(&doc.buffer, &found, range).expect("block extracts")
}

fn report<'a>(reports: &'a [BlockReport], name: &str) -> &'a BlockReport {
    reports
        .iter()
        .find(|report| report.name == name)
        .expect("report present")
}

#[test]
fn outcomes_per_block() {
    let mut doc = load_fixture("area_a.fhx");
    let reports = run_all(&mut doc, &Config::default(), &owners("CHARGE"));
    let names: Vec<&str> = reports.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["MIX_PHASE", "__5E0A1B2C__", "SCALE_CALC"]);
    assert!(matches!(
        report(&reports, "SCALE_CALC").outcome,
        BlockOutcome::Skipped(SkipReason::NoAlgorithm)
    ));
    assert!(matches!(
        report(&reports, "MIX_PHASE").outcome,
        BlockOutcome::Processed {
            steps: 9,
            branches: 3
        }
    ));
    assert!(report(&reports, "__5E0A1B2C__").outcome.is_processed());
}

#[test]
fn scenario_layout() {
    let mut doc = load_fixture("area_a.fhx");
    let config = Config::default();
    let reports = run_all(&mut doc, &config, &owners("CHARGE"));
    let map = report(&reports, "MIX_PHASE")
        .layout
        .as_ref()
        .expect("processed block keeps its layout");

    let root = map.get(1).unwrap();
    let heat = map.get(2).unwrap();
    let retry = map.get(3).unwrap();
    assert_eq!(heat.kind, BranchKind::Parallel(Side::Right));
    assert_eq!(retry.kind, BranchKind::TaskPointer(Side::Right));

    // The short main column waits for the four-step branch before joining.
    let join = &root.members[5];
    assert_eq!(join.obj.name(), "T1_3P");
    assert_eq!(join.y, heat.bottom().unwrap() + config.layout.pitch);

    assert_eq!(map.min_x(), Some(config.layout.initial_x));
    assert_eq!(heat.x - root.x, config.layout.branch_spacing);
    assert_eq!(retry.x - heat.x, config.layout.task_pointer_spacing);

    let set = block(&doc, "MIX_PHASE");
    let last = set.step("S2_4").unwrap();
    assert_eq!((last.rect.x, last.rect.y), (360, 600));
    assert_eq!((last.rect.height, last.rect.width), (40, 100));
    let jump = set.transition("T3_1J").unwrap().position;
    assert_eq!((jump.x, jump.y), (710, 810));
}

#[test]
fn index_actions_follow_traversal_order() {
    let mut doc = load_fixture("area_a.fhx");
    run_all(&mut doc, &Config::default(), &owners("CHARGE"));
    let set = block(&doc, "MIX_PHASE");
    let expected = [
        "S1_1", "S1_2", "S1_3", "S1_4X", "S1_5", "S2_1", "S2_2", "S2_3", "S2_4",
    ];
    for (ordinal, step) in expected.iter().enumerate() {
        let values: Vec<&str> = set
            .step(step)
            .unwrap()
            .actions
            .iter()
            .filter(|a| a.qualifier == "P")
            .filter_map(|a| a.expression.as_ref())
            .map(|e| e.value.as_str())
            .filter(|v| v.starts_with("'^/STEP_INDEX.CV'"))
            .collect();
        assert_eq!(
            values,
            [format!("'^/STEP_INDEX.CV' := {};", ordinal + 1)],
            "{step}"
        );
    }
    let init: Vec<&str> = set
        .step("S1_1")
        .unwrap()
        .actions
        .iter()
        .map(|a| a.name.as_str())
        .collect();
    assert_eq!(init, ["S1_1_P", "S1_1_P_2"]);
}

#[test]
fn names_are_unique_per_kind() {
    let mut doc = load_fixture("area_a.fhx");
    run_all(&mut doc, &Config::default(), &owners("CHARGE"));
    for name in ["MIX_PHASE", "__5E0A1B2C__"] {
        let set = block(&doc, name);
        let steps: BTreeSet<&str> = set.steps.iter().map(|s| s.name.as_str()).collect();
        let transitions: BTreeSet<&str> =
            set.transitions.iter().map(|t| t.name.as_str()).collect();
        let actions: Vec<&str> = set.actions().map(|a| a.name.as_str()).collect();
        let unique_actions: BTreeSet<&str> = actions.iter().copied().collect();
        assert_eq!(steps.len(), set.steps.len(), "{name}");
        assert_eq!(transitions.len(), set.transitions.len(), "{name}");
        assert_eq!(unique_actions.len(), actions.len(), "{name}");
    }
}

#[test]
fn expressions_reference_new_names() {
    let mut doc = load_fixture("area_a.fhx");
    run_all(&mut doc, &Config::default(), &owners("CHARGE"));
    let set = block(&doc, "MIX_PHASE");
    let condition = |name: &str| {
        set.transition(name)
            .and_then(|t| t.expression.as_ref())
            .map(|e| e.value.clone())
            .unwrap()
    };
    assert_eq!(
        condition("T1_2"),
        "'S1_2/S1_2_N/PENDING_CONFIRM.CV' = FALSE"
    );
    assert_eq!(
        condition("T1_3P"),
        "'S1_3/PENDING_CONFIRMS.CV' = 0\nAND 'S2_4/PENDING_CONFIRMS.CV' = 0"
    );
    assert_eq!(condition("T1_4"), "'S1_4X/PENDING_CONFIRMS.CV' = 0");
    assert_eq!(
        condition("T2_3"),
        "'S2_3/S2_3_S/PENDING_CONFIRM.CV' = FALSE"
    );
    let vent = &set.step("S2_4").unwrap().actions[0];
    assert_eq!(vent.name, "S2_4_N");
    assert_eq!(
        vent.delay.as_ref().unwrap().value,
        "'S2_3/S2_3_S/STATE.CV' = 3"
    );
}

#[test]
fn left_task_pointer_command_flips_jump() {
    let mut doc = load_fixture("area_a.fhx");
    let mut config = Config::default();
    config.layout.left_task_pointer_commands = vec!["abort".to_string()];

    let reports = run_all(&mut doc, &config, &owners("ABORT"));
    let map = report(&reports, "__5E0A1B2C__").layout.as_ref().unwrap();
    let jump = map.get(2).unwrap();
    assert_eq!(jump.kind, BranchKind::TaskPointer(Side::Left));
    assert_eq!(jump.x, config.layout.initial_x);
    assert_eq!(map.get(1).unwrap().x, 460);

    // MIX_PHASE is named directly, so it keeps the spawn side.
    let mix = report(&reports, "MIX_PHASE").layout.as_ref().unwrap();
    assert_eq!(mix.get(3).unwrap().kind, BranchKind::TaskPointer(Side::Right));
}

#[test]
fn unresolved_embedded_block_is_left_alone() {
    let original = load_fixture("area_a.fhx");
    let mut doc = original.clone();
    let reports = run_all(&mut doc, &Config::default(), &CompositeMap::new());
    assert!(matches!(
        report(&reports, "__5E0A1B2C__").outcome,
        BlockOutcome::Skipped(SkipReason::Unresolved)
    ));
    let before = find_blocks(&original.buffer);
    let (_, range) = before
        .blocks
        .iter()
        .find(|(name, _)| name == "__5E0A1B2C__")
        .unwrap();
    // Everything up to the end of the embedded block precedes MIX_PHASE.
    assert_eq!(
        &doc.buffer.lines()[..range.end()],
        &original.buffer.lines()[..range.end()]
    );
}

#[test]
fn declined_block_round_trips() {
    let original = load_fixture("area_a.fhx");
    let mut doc = original.clone();
    let config = Config::default();
    let composites = owners("CHARGE");
    let mut gate = |label: &str| label != "MIX_PHASE";
    let reports = Pipeline::new(&config, &composites)
        .run(&mut doc.buffer, &mut gate)
        .unwrap();
    assert!(matches!(
        report(&reports, "MIX_PHASE").outcome,
        BlockOutcome::Declined
    ));
    let before = find_blocks(&original.buffer);
    let after = find_blocks(&doc.buffer);
    let slice = |doc: &Document, range: sfc_arrange::buffer::LineRange| {
        doc.buffer.lines()[range.start..range.end()].to_vec()
    };
    let (_, old) = before.blocks.iter().find(|(n, _)| n == "MIX_PHASE").unwrap();
    let (_, new) = after.blocks.iter().find(|(n, _)| n == "MIX_PHASE").unwrap();
    assert_eq!(slice(&doc, *new), slice(&original, *old));
}

#[test]
fn runs_are_deterministic_and_encoding_is_preserved() {
    let config = Config::default();
    let composites = owners("CHARGE");
    let mut first = load_fixture("area_a.fhx");
    let mut second = load_fixture("area_a.fhx");
    run_all(&mut first, &config, &composites);
    run_all(&mut second, &config, &composites);
    let bytes = first.to_utf16le();
    assert_eq!(bytes, second.to_utf16le());

    let reread = Document::from_utf16le(&bytes).unwrap();
    assert_eq!(reread.line_ending, first.line_ending);
    assert!(reread.to_text().ends_with("\r\n"));
}

#[test]
fn timestamps_advance_only_for_processed_blocks() {
    let original = load_fixture("area_a.fhx");
    let mut doc = original.clone();
    run_all(&mut doc, &Config::default(), &owners("CHARGE"));
    let time = |doc: &Document, name: &str| {
        let set = block(doc, name);
        doc.buffer.lines()[set.timestamp_line.unwrap()].clone()
    };
    assert!(time(&doc, "MIX_PHASE").contains("time=1699963201/*"));
    assert!(time(&doc, "__5E0A1B2C__").contains("time=1699963201/*"));
    assert_eq!(time(&doc, "SCALE_CALC"), time(&original, "SCALE_CALC"));
}

#[test]
fn single_step_and_linear_blocks() {
    let mut doc = load_fixture("linear.fhx");
    let config = Config::default();
    let reports = run_all(&mut doc, &config, &CompositeMap::new());
    assert!(reports.iter().all(|r| r.outcome.is_processed()));

    let idle = block(&doc, "IDLE_SEQ");
    let wait = &idle.steps[0];
    assert_eq!(wait.name, "S1_1");
    assert_eq!((wait.rect.x, wait.rect.y), (160, 40));
    assert_eq!(wait.actions.len(), 1);

    let dose = block(&doc, "DOSE_SEQ");
    let ys: Vec<i32> = dose.steps.iter().map(|s| s.rect.y).collect();
    assert_eq!(ys, [40, 180, 320]);
    assert_eq!(
        dose.transition("T1_2")
            .and_then(|t| t.expression.as_ref())
            .map(|e| e.value.as_str()),
        Some("'S1_2/S1_2_N/PENDING_CONFIRM.CV' = FALSE")
    );
    let link = dose.connections.first().and_then(|c| c.segment).unwrap();
    assert_eq!((link.from.x, link.from.y), (210, 80));
    assert_eq!((link.to.x, link.to.y), (210, 110));
}
