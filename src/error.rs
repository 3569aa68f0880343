use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("export is not UTF-16LE: {0}")]
    Encoding(String),

    #[error("invalid JSON in {what}: {source}")]
    Json {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("derived from buffer generation {built}, buffer is at generation {current}")]
    StaleGeneration { built: u64, current: u64 },

    #[error("function block `{block}`: {kind}")]
    Structural { block: String, kind: StructuralError },
}

/// Anomalies that make one function block unprocessable. The run continues
/// with the next block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("no initial step")]
    NoInitialStep,

    #[error("more than one candidate initial step ({0})")]
    AmbiguousInitialStep(String),

    #[error("`{0}` is not reachable from the initial step")]
    Unreachable(String),

    #[error("connection references unknown {kind} `{name}`")]
    DanglingReference { kind: &'static str, name: String },

    #[error("branch {branch} cannot find its convergence `{target}` in branch {parent}")]
    MissingConvergence {
        branch: u32,
        parent: u32,
        target: String,
    },

    #[error("name `{0}` exceeds the maximum length and cannot be disambiguated")]
    NameOverflow(String),

    #[error("{kind} `{name}` has no {field} line")]
    MissingLine {
        kind: &'static str,
        name: String,
        field: &'static str,
    },

    #[error("function block starting at line {0} is no longer in the buffer")]
    BlockLost(usize),
}

impl Error {
    pub fn structural(block: &str, kind: StructuralError) -> Self {
        Self::Structural {
            block: block.to_string(),
            kind,
        }
    }

    /// True when the failure is local to one function block.
    pub fn is_block_local(&self) -> bool {
        matches!(self, Self::Structural { .. } | Self::StaleGeneration { .. })
    }
}
