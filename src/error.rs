//! Error types shared by the sampling, assembly and output stages.

use std::fmt;
use std::path::PathBuf;

/// What went wrong while generating an assignment or a trial sequence.
///
/// Every kind is recoverable only by re-running generation with new
/// randomness (or a relaxed configuration).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    /// No candidate sample satisfied the subject constraints within the attempt cap.
    ConstraintExhausted,
    /// At least one pair is used by more subjects than the population ceiling allows.
    PopulationCeiling,
    /// A generated row contains a repeated position or a misplaced sentinel.
    DuplicateTouch,
    /// No slot schedule with a short enough maximum run was found within the cap.
    SlotScheduleExhausted,
}

impl fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConstraintExhausted => "constraint-exhausted",
            Self::PopulationCeiling => "population-ceiling",
            Self::DuplicateTouch => "duplicate-touch",
            Self::SlotScheduleExhausted => "slot-schedule-exhausted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    pub message: String,
}

impl GenerationError {
    pub fn new(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("transition table line {line}: {message}")]
    Table { line: usize, message: String },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),
    #[error("assignment artifact: {0}")]
    Artifact(#[from] serde_json::Error),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The generation kind, if this error came out of a generation stage.
    pub fn generation_kind(&self) -> Option<GenerationErrorKind> {
        match self {
            Self::Generation(err) => Some(err.kind),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
