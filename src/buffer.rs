use crate::error::{Error, Result};

/// A `(start, len)` window into a [`LineBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineRange {
    pub start: usize,
    pub len: usize,
}

impl LineRange {
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    pub fn single(line: usize) -> Self {
        Self { start: line, len: 1 }
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Replace `range` with `lines`. An empty range is a pure insertion before
/// `range.start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub range: LineRange,
    pub lines: Vec<String>,
}

impl Edit {
    pub fn replace(range: LineRange, lines: Vec<String>) -> Self {
        Self { range, lines }
    }

    pub fn insert(at: usize, lines: Vec<String>) -> Self {
        Self {
            range: LineRange::new(at, 0),
            lines,
        }
    }

    fn changes_length(&self) -> bool {
        self.lines.len() != self.range.len
    }
}

/// Ordered lines of the export. Every change of the line count advances the
/// generation; anything derived from an older generation must be rebuilt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineBuffer {
    lines: Vec<String>,
    generation: u64,
}

impl LineBuffer {
    pub fn new(lines: Vec<String>) -> Self {
        Self {
            lines,
            generation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn line(&self, idx: usize) -> Option<&str> {
        self.lines.get(idx).map(String::as_str)
    }

    pub fn slice(&self, range: LineRange) -> &[String] {
        let end = range.end().min(self.lines.len());
        let start = range.start.min(end);
        &self.lines[start..end]
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    pub fn ensure_current(&self, built: u64) -> Result<()> {
        if built == self.generation {
            Ok(())
        } else {
            Err(Error::StaleGeneration {
                built,
                current: self.generation,
            })
        }
    }

    /// Same-length rewrite of a single line. Indices stay valid.
    pub fn replace_line(&mut self, idx: usize, text: String) {
        if let Some(line) = self.lines.get_mut(idx) {
            *line = text;
        }
    }

    /// Apply a batch of non-overlapping edits computed against the current
    /// generation. Edits are applied bottom-up so their ranges stay valid
    /// while the batch runs; the generation advances once if any edit changed
    /// the line count. Returns the new generation.
    pub fn apply(&mut self, mut edits: Vec<Edit>) -> u64 {
        edits.sort_by(|a, b| b.range.start.cmp(&a.range.start));
        debug_assert!(
            edits
                .windows(2)
                .all(|pair| pair[1].range.end() <= pair[0].range.start),
            "overlapping line edits"
        );
        let resized = edits.iter().any(Edit::changes_length);
        for edit in edits {
            let end = edit.range.end().min(self.lines.len());
            let start = edit.range.start.min(end);
            self.lines.splice(start..end, edit.lines);
        }
        if resized {
            self.generation += 1;
        }
        self.generation
    }
}
