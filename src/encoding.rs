use crate::buffer::LineBuffer;
use crate::error::{Error, Result};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn detect(text: &str) -> Self {
        if text.contains("\r\n") {
            Self::CrLf
        } else {
            Self::Lf
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
        }
    }
}

/// A decoded export: the line buffer plus what is needed to write it back
/// in the same form.
#[derive(Debug, Clone)]
pub struct Document {
    pub bom: bool,
    pub line_ending: LineEnding,
    pub buffer: LineBuffer,
}

impl Document {
    pub fn from_text(text: &str) -> Self {
        let (bom, body) = match text.strip_prefix('\u{feff}') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let line_ending = LineEnding::detect(body);
        let lines = body
            .split(line_ending.as_str())
            .map(str::to_string)
            .collect();
        Self {
            bom,
            line_ending,
            buffer: LineBuffer::new(lines),
        }
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        if self.bom {
            out.push('\u{feff}');
        }
        out.push_str(&self.buffer.lines().join(self.line_ending.as_str()));
        out
    }

    pub fn from_utf16le(bytes: &[u8]) -> Result<Self> {
        Ok(Self::from_text(&decode_utf16le(bytes)?))
    }

    pub fn to_utf16le(&self) -> Vec<u8> {
        encode_utf16le(&self.to_text())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_utf16le(&bytes)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_utf16le())?;
        Ok(())
    }
}

pub fn decode_utf16le(bytes: &[u8]) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(Error::Encoding(format!(
            "odd byte count {} for a 16-bit encoding",
            bytes.len()
        )));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|err| Error::Encoding(err.to_string()))
}

pub fn encode_utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect()
}
