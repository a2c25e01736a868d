//! Population-level pair reuse check.
//!
//! After every subject has an accepted sample, count how many subjects share
//! each pair and flag pairs above the ceiling. Flagging does not correct
//! anything; the caller decides whether to resample.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::sampler::SubjectAssignment;
use crate::core::transitions::Position;
use crate::error::{GenerationError, GenerationErrorKind};

/// Whether `a→b` and `b→a` count as the same pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PairKeyMode {
    #[default]
    Unordered,
    Ordered,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
    pub a: Position,
    pub b: Position,
}

impl PairKey {
    pub fn new(pos1: Position, pos2: Position, mode: PairKeyMode) -> Self {
        match mode {
            PairKeyMode::Ordered => Self { a: pos1, b: pos2 },
            PairKeyMode::Unordered => Self {
                a: pos1.min(pos2),
                b: pos1.max(pos2),
            },
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.a, self.b)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairCount {
    pub pair: PairKey,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairUsageTally {
    mode: PairKeyMode,
    counts: BTreeMap<PairKey, usize>,
}

impl PairUsageTally {
    pub fn from_assignments(assignments: &[SubjectAssignment], mode: PairKeyMode) -> Self {
        let mut counts: BTreeMap<PairKey, usize> = BTreeMap::new();
        for assignment in assignments {
            for p in &assignment.pairs {
                *counts.entry(PairKey::new(p.pos1, p.pos2, mode)).or_default() += 1;
            }
        }
        Self { mode, counts }
    }

    pub fn mode(&self) -> PairKeyMode {
        self.mode
    }

    pub fn count(&self, pos1: Position, pos2: Position) -> usize {
        self.counts
            .get(&PairKey::new(pos1, pos2, self.mode))
            .copied()
            .unwrap_or(0)
    }

    pub fn distinct_pairs(&self) -> usize {
        self.counts.len()
    }

    /// Counts sorted by pair key, for persistence and reports.
    pub fn entries(&self) -> Vec<PairCount> {
        self.counts
            .iter()
            .map(|(pair, count)| PairCount {
                pair: *pair,
                count: *count,
            })
            .collect()
    }

    pub fn check(&self, max_pair_uses: usize) -> BalanceReport {
        let violations: Vec<PairCount> = self
            .entries()
            .into_iter()
            .filter(|e| e.count > max_pair_uses)
            .collect();
        BalanceReport {
            max_pair_uses,
            distinct_pairs: self.distinct_pairs(),
            violations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceReport {
    pub max_pair_uses: usize,
    pub distinct_pairs: usize,
    pub violations: Vec<PairCount>,
}

impl BalanceReport {
    pub fn is_balanced(&self) -> bool {
        self.violations.is_empty()
    }

    /// Log the outcome: one warning per offending pair.
    pub fn log(&self) {
        for v in &self.violations {
            warn!(
                target: "sampling::balance",
                pair = %v.pair,
                count = v.count,
                ceiling = self.max_pair_uses,
                "pair used by too many subjects"
            );
        }
        info!(
            target: "sampling::balance",
            distinct_pairs = self.distinct_pairs,
            balanced = self.is_balanced(),
            "pair usage tallied"
        );
    }

    pub fn into_result(self) -> Result<Self, GenerationError> {
        if self.is_balanced() {
            return Ok(self);
        }
        let listed: Vec<String> = self
            .violations
            .iter()
            .map(|v| format!("{}: {}", v.pair, v.count))
            .collect();
        Err(GenerationError::new(
            GenerationErrorKind::PopulationCeiling,
            format!(
                "pairs above the ceiling of {}: {}",
                self.max_pair_uses,
                listed.join(", ")
            ),
        ))
    }
}
