use crate::buffer::{LineBuffer, LineRange};
use crate::ir::{Point, Rect, Segment};
use once_cell::sync::Lazy;
use regex::Regex;

static BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^FUNCTION_BLOCK_DEFINITION\s+NAME="([^"]*)""#).unwrap());
static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*user="[^"]*"\s+time=(\d+)"#).unwrap());
static STEP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^\s*STEP\s+NAME="([^"]*)""#).unwrap());
static TRANSITION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*TRANSITION\s+NAME="([^"]*)""#).unwrap());
static ACTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*ACTION\s+NAME="([^"]*)""#).unwrap());
static RECT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*RECTANGLE=\s*\{\s*X=(-?\d+)\s+Y=(-?\d+)\s+H=(-?\d+)\s+W=(-?\d+)\s*\}").unwrap()
});
static POSITION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*POSITION=\s*\{\s*X=(-?\d+)\s+Y=(-?\d+)\s*\}").unwrap());
static INITIAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*INITIAL_STEP=([TF])\s*$").unwrap());
static QUALIFIER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*QUALIFIER=(\S+)").unwrap());
static TEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^(\s*([A-Z_]+)=")(.*)$"#).unwrap());
static STEP_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*STEP_TRANSITION_CONNECTION\s+STEP="([^"]*)"\s+TRANSITION="([^"]*)""#)
        .unwrap()
});
static TRANSITION_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*TRANSITION_STEP_CONNECTION\s+TRANSITION="([^"]*)"\s+STEP="([^"]*)""#)
        .unwrap()
});
static SEGMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"SEGMENT=\s*\{\s*X1=(-?\d+)\s+Y1=(-?\d+)\s+X2=(-?\d+)\s+Y2=(-?\d+)\s*\}").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Expression,
    DelayExpression,
    Other,
}

/// Opening line of a quoted field. `suffix` is `None` while the string
/// continues on the following lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextOpen {
    pub field: TextField,
    pub prefix: String,
    pub body: String,
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub step: String,
    pub transition: String,
    pub segment: Option<Segment>,
}

/// Typed view of one export line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    FunctionBlock { name: String },
    Timestamp { time: u64 },
    SfcAlgorithm,
    Step { name: String },
    Transition { name: String },
    Action { name: String },
    Rectangle(Rect),
    Position(Point),
    InitialStep(bool),
    Qualifier(String),
    Text(TextOpen),
    StepToTransition(Link),
    TransitionToStep(Link),
    Open,
    Close,
    Other,
}

fn int(caps: &regex::Captures<'_>, idx: usize) -> i32 {
    caps.get(idx)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or_default()
}

fn name(caps: &regex::Captures<'_>, idx: usize) -> String {
    caps.get(idx).map(|m| m.as_str().to_string()).unwrap_or_default()
}

fn segment(line: &str) -> Option<Segment> {
    SEGMENT_RE.captures(line).map(|caps| Segment {
        from: Point::new(int(&caps, 1), int(&caps, 2)),
        to: Point::new(int(&caps, 3), int(&caps, 4)),
    })
}

pub fn tokenize(line: &str) -> Token {
    let trimmed = line.trim();
    match trimmed {
        "{" => return Token::Open,
        "}" => return Token::Close,
        "SFC_ALGORITHM" => return Token::SfcAlgorithm,
        _ => {}
    }
    if let Some(caps) = BLOCK_RE.captures(line) {
        return Token::FunctionBlock { name: name(&caps, 1) };
    }
    if let Some(caps) = TIME_RE.captures(line) {
        if let Ok(time) = caps[1].parse() {
            return Token::Timestamp { time };
        }
    }
    if let Some(caps) = STEP_RE.captures(line) {
        return Token::Step { name: name(&caps, 1) };
    }
    if let Some(caps) = TRANSITION_RE.captures(line) {
        return Token::Transition { name: name(&caps, 1) };
    }
    if let Some(caps) = ACTION_RE.captures(line) {
        return Token::Action { name: name(&caps, 1) };
    }
    if let Some(caps) = RECT_RE.captures(line) {
        return Token::Rectangle(Rect {
            x: int(&caps, 1),
            y: int(&caps, 2),
            height: int(&caps, 3),
            width: int(&caps, 4),
        });
    }
    if let Some(caps) = POSITION_RE.captures(line) {
        return Token::Position(Point::new(int(&caps, 1), int(&caps, 2)));
    }
    if let Some(caps) = INITIAL_RE.captures(line) {
        return Token::InitialStep(&caps[1] == "T");
    }
    if let Some(caps) = QUALIFIER_RE.captures(line) {
        return Token::Qualifier(name(&caps, 1));
    }
    if let Some(caps) = TEXT_RE.captures(line) {
        let field = match &caps[2] {
            "EXPRESSION" => TextField::Expression,
            "DELAY_EXPRESSION" => TextField::DelayExpression,
            _ => TextField::Other,
        };
        let rest = &caps[3];
        let (body, suffix) = match closing_quote(rest) {
            Some(end) => (rest[..end].to_string(), Some(rest[end..].to_string())),
            None => (rest.to_string(), None),
        };
        return Token::Text(TextOpen {
            field,
            prefix: caps[1].to_string(),
            body,
            suffix,
        });
    }
    if let Some(caps) = STEP_LINK_RE.captures(line) {
        return Token::StepToTransition(Link {
            step: name(&caps, 1),
            transition: name(&caps, 2),
            segment: segment(line),
        });
    }
    if let Some(caps) = TRANSITION_LINK_RE.captures(line) {
        return Token::TransitionToStep(Link {
            transition: name(&caps, 1),
            step: name(&caps, 2),
            segment: segment(line),
        });
    }
    Token::Other
}

/// Byte offset of the quote that closes a string body. A doubled quote is an
/// escaped quote inside the string.
pub fn closing_quote(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'"' {
            if bytes.get(idx + 1) == Some(&b'"') {
                idx += 2;
                continue;
            }
            return Some(idx);
        }
        idx += 1;
    }
    None
}

/// Function block definitions in file order, as `(name, range)` pairs.
#[derive(Debug, Clone)]
pub struct BlockIndex {
    pub generation: u64,
    pub blocks: Vec<(String, LineRange)>,
}

pub fn find_blocks(buffer: &LineBuffer) -> BlockIndex {
    let mut blocks = Vec::new();
    let lines = buffer.lines();
    let mut idx = 0;
    while idx < lines.len() {
        if let Token::FunctionBlock { name } = tokenize(&lines[idx]) {
            let end = block_end(lines, idx);
            blocks.push((name, LineRange::new(idx, end + 1 - idx)));
            idx = end + 1;
        } else {
            idx += 1;
        }
    }
    BlockIndex {
        generation: buffer.generation(),
        blocks,
    }
}

/// Range of the block whose header sits on `start`, or `None` if that line is
/// not a block header.
pub fn block_at(buffer: &LineBuffer, start: usize) -> Option<(String, LineRange)> {
    let lines = buffer.lines();
    match tokenize(lines.get(start)?) {
        Token::FunctionBlock { name } => {
            let end = block_end(lines, start);
            Some((name, LineRange::new(start, end + 1 - start)))
        }
        _ => None,
    }
}

// The definition closes on the first unindented `}` after its header that is
// not part of a multi-line string.
fn block_end(lines: &[String], start: usize) -> usize {
    let mut idx = start + 1;
    while idx < lines.len() {
        let line = &lines[idx];
        if line.trim_end() == "}" {
            return idx;
        }
        if let Token::Text(TextOpen { suffix: None, .. }) = tokenize(line) {
            idx += 1;
            while idx < lines.len() && closing_quote(&lines[idx]).is_none() {
                idx += 1;
            }
        }
        idx += 1;
    }
    lines.len().saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_object_headers() {
        assert_eq!(
            tokenize(r#"    STEP NAME="S1" DEFINITION="""#),
            Token::Step { name: "S1".into() }
        );
        assert_eq!(
            tokenize(r#"    TRANSITION NAME="T1""#),
            Token::Transition { name: "T1".into() }
        );
        assert_eq!(
            tokenize(r#"      ACTION NAME="A1""#),
            Token::Action { name: "A1".into() }
        );
        assert_eq!(tokenize("  SFC_ALGORITHM"), Token::SfcAlgorithm);
        assert_eq!(tokenize("   {  "), Token::Open);
    }

    #[test]
    fn connection_is_not_a_step_header() {
        let token = tokenize(r#"    STEP_TRANSITION_CONNECTION STEP="S1" TRANSITION="T1" { }"#);
        assert_eq!(
            token,
            Token::StepToTransition(Link {
                step: "S1".into(),
                transition: "T1".into(),
                segment: None,
            })
        );
    }

    #[test]
    fn connection_segment_is_read() {
        let token = tokenize(
            r#"    TRANSITION_STEP_CONNECTION TRANSITION="T1" STEP="S2" { SEGMENT= { X1=1 Y1=2 X2=3 Y2=-4 } }"#,
        );
        let Token::TransitionToStep(link) = token else {
            panic!("expected a transition link");
        };
        assert_eq!(
            link.segment,
            Some(Segment {
                from: Point::new(1, 2),
                to: Point::new(3, -4)
            })
        );
    }

    #[test]
    fn geometry_lines() {
        assert_eq!(
            tokenize("      RECTANGLE= { X=340 Y=40 H=40 W=100 }"),
            Token::Rectangle(Rect {
                x: 340,
                y: 40,
                height: 40,
                width: 100
            })
        );
        assert_eq!(
            tokenize("      POSITION= { X=-5 Y=110 }"),
            Token::Position(Point::new(-5, 110))
        );
    }

    #[test]
    fn timestamp_line() {
        assert_eq!(
            tokenize(r#" user="ADMIN" time=1700000000/* "14-Nov-2023 22:13:20" */"#),
            Token::Timestamp { time: 1_700_000_000 }
        );
    }

    #[test]
    fn text_field_open_and_closed() {
        let Token::Text(open) = tokenize(r#"        EXPRESSION="'A' := ""x"";""#) else {
            panic!("expected text");
        };
        assert_eq!(open.field, TextField::Expression);
        assert_eq!(open.body, r#"'A' := ""x"";"#);
        assert_eq!(open.suffix.as_deref(), Some("\""));

        let Token::Text(open) = tokenize(r#"        DELAY_EXPRESSION="'S1/A1/STATE.CV'"#) else {
            panic!("expected text");
        };
        assert_eq!(open.field, TextField::DelayExpression);
        assert_eq!(open.suffix, None);

        let Token::Text(open) = tokenize(r#"        DESCRIPTION="multi"#) else {
            panic!("expected text");
        };
        assert_eq!(open.field, TextField::Other);
    }

    #[test]
    fn closing_quote_skips_escaped_quotes() {
        assert_eq!(closing_quote(r#"a""b" rest"#), Some(4));
        assert_eq!(closing_quote(r#"a""b"#), None);
    }

    #[test]
    fn finds_blocks_by_unindented_close() {
        let buffer = LineBuffer::new(
            [
                "HEADER",
                r#"FUNCTION_BLOCK_DEFINITION NAME="A" CATEGORY="""#,
                "{",
                "  X",
                "  {",
                "  }",
                "}",
                r#"FUNCTION_BLOCK_DEFINITION NAME="B" CATEGORY="""#,
                "{",
                "}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        );
        let index = find_blocks(&buffer);
        assert_eq!(index.blocks.len(), 2);
        assert_eq!(index.blocks[0], ("A".to_string(), LineRange::new(1, 6)));
        assert_eq!(index.blocks[1], ("B".to_string(), LineRange::new(7, 3)));
        assert_eq!(block_at(&buffer, 7).map(|b| b.1), Some(LineRange::new(7, 3)));
        assert!(block_at(&buffer, 2).is_none());
    }

    #[test]
    fn brace_inside_multiline_string_does_not_close_block() {
        let buffer = LineBuffer::new(
            [
                r#"FUNCTION_BLOCK_DEFINITION NAME="A" CATEGORY="""#,
                "{",
                r#"  DESCRIPTION="first"#,
                "}",
                r#"last""#,
                "}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        );
        assert_eq!(
            block_at(&buffer, 0).map(|b| b.1),
            Some(LineRange::new(0, 6))
        );
    }
}
