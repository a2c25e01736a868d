use std::io::{self, Write};

use crate::config::StimulusConfig;
use crate::core::transitions::{Position, SENTINEL};
use crate::error::{GenerationError, GenerationErrorKind};

/// One stimulus presentation: the touch sequence, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trial {
    pub positions: Vec<Position>,
}

impl Trial {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Every touch must be a real position and appear once.
    pub fn verify(&self) -> Result<(), GenerationError> {
        if self.positions.contains(&SENTINEL) {
            return Err(GenerationError::new(
                GenerationErrorKind::DuplicateTouch,
                format!("sentinel inside sequence {:?}", self.positions),
            ));
        }
        for (i, p) in self.positions.iter().enumerate() {
            if self.positions[i + 1..].contains(p) {
                return Err(GenerationError::new(
                    GenerationErrorKind::DuplicateTouch,
                    format!("position {p} repeated in sequence {:?}", self.positions),
                ));
            }
        }
        Ok(())
    }
}

/// Trials sharing one generation rule and label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrialBlock {
    pub label: String,
    pub trials: Vec<Trial>,
}

impl TrialBlock {
    pub fn verify(&self, subject: &str) -> Result<(), GenerationError> {
        for (i, trial) in self.trials.iter().enumerate() {
            trial.verify().map_err(|e| {
                GenerationError::new(
                    e.kind,
                    format!("{subject}, block {}, trial {}: {}", self.label, i + 1, e.message),
                )
            })?;
        }
        Ok(())
    }
}

/// Text layout of one trial row: `tag,flag,length,<slots>,label`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowFormat {
    pub task_tag: String,
    pub task_flag: u32,
    pub row_width: usize,
}

impl From<&StimulusConfig> for RowFormat {
    fn from(cfg: &StimulusConfig) -> Self {
        Self {
            task_tag: cfg.task_tag.clone(),
            task_flag: cfg.task_flag,
            row_width: cfg.row_width,
        }
    }
}

impl Default for RowFormat {
    fn default() -> Self {
        Self::from(&StimulusConfig::default())
    }
}

impl RowFormat {
    pub fn write_row<W: Write>(&self, w: &mut W, trial: &Trial, label: &str) -> io::Result<()> {
        if trial.len() > self.row_width {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("sequence of {} does not fit a row of {}", trial.len(), self.row_width),
            ));
        }
        write!(w, "{},{},{},", self.task_tag, self.task_flag, trial.len())?;
        let padding = std::iter::repeat(SENTINEL).take(self.row_width - trial.len());
        for p in trial.positions.iter().copied().chain(padding) {
            write!(w, "{p},")?;
        }
        writeln!(w, "{label}")
    }

    pub fn format_row(&self, trial: &Trial, label: &str) -> io::Result<String> {
        let mut buf = Vec::new();
        self.write_row(&mut buf, trial, label)?;
        String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
