//! Persisted result of a sampling run.
//!
//! `sample` writes it; `build` reads it back so trials can be regenerated
//! from exactly the accepted pairs without sampling again.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Preset;
use crate::error::{Error, Result};
use crate::sampling::BalancedPopulation;
use crate::sampling::balance::{BalanceReport, PairCount, PairKeyMode, PairUsageTally};
use crate::sampling::sampler::SubjectAssignment;

pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssignmentArtifact {
    pub version: u32,
    pub preset: Preset,
    pub seed: u64,
    pub pair_key: PairKeyMode,
    pub max_pair_uses: usize,
    /// Shuffled roster order; a subject's index here fixes its group.
    pub subjects: Vec<SubjectAssignment>,
    pub tally: Vec<PairCount>,
    pub rejected: u64,
    pub population_attempts: u32,
}

impl AssignmentArtifact {
    pub fn from_population(
        preset: Preset,
        seed: u64,
        max_pair_uses: usize,
        balanced: BalancedPopulation,
    ) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            preset,
            seed,
            pair_key: balanced.tally.mode(),
            max_pair_uses,
            tally: balanced.tally.entries(),
            subjects: balanced.population.assignments,
            rejected: balanced.rejected,
            population_attempts: balanced.attempts,
        }
    }

    /// Recount pair usage from the subjects, ignoring the stored tally.
    pub fn recount(&self, mode: PairKeyMode) -> PairUsageTally {
        PairUsageTally::from_assignments(&self.subjects, mode)
    }

    pub fn report(&self, mode: PairKeyMode, max_pair_uses: usize) -> BalanceReport {
        self.recount(mode).check(max_pair_uses)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(|e| Error::io(path, e))?;
        info!(
            target: "artifact",
            path = %path.display(),
            subjects = self.subjects.len(),
            "saved assignment"
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let artifact: Self = serde_json::from_str(&text)?;
        if artifact.version != ARTIFACT_VERSION {
            return Err(Error::Config(format!(
                "{} has artifact version {}, expected {ARTIFACT_VERSION}",
                path.display(),
                artifact.version
            )));
        }
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::sampler::Regularity;

    #[test]
    fn json_keeps_times_bit_exact() {
        let artifact = AssignmentArtifact {
            version: ARTIFACT_VERSION,
            preset: Preset::Exp2,
            seed: u64::MAX - 3,
            pair_key: PairKeyMode::Ordered,
            max_pair_uses: 3,
            subjects: vec![SubjectAssignment {
                subject: "0".into(),
                pairs: vec![
                    Regularity {
                        pos1: 4,
                        pos2: 2,
                        time_ms: 1013.333_333_333_333_4,
                    },
                    Regularity {
                        pos1: 9,
                        pos2: 6,
                        time_ms: 0.1 + 0.2,
                    },
                ],
            }],
            tally: vec![],
            rejected: 17,
            population_attempts: 1,
        };
        let text = serde_json::to_string(&artifact).expect("serialize");
        let back: AssignmentArtifact = serde_json::from_str(&text).expect("parse");
        assert_eq!(back, artifact);
        assert!(text.contains("\"preset\":\"exp2\""), "{text}");
        assert!(text.contains("\"pair_key\":\"ordered\""), "{text}");
    }
}
