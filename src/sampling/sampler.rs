//! Rejection sampler for per-subject regularity pairs.
//!
//! A candidate is `k` distinct table rows drawn uniformly without
//! replacement. It is accepted only if its positions are pairwise disjoint
//! across both roles and its response times are tight (range) and typical
//! (mean close to the table mean). Rejected candidates are redrawn from the
//! full table, independent of earlier draws, up to a per-subject cap.

use rand::Rng;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SamplerConfig;
use crate::core::stats;
use crate::core::transitions::{Position, TransitionRecord, TransitionTable};
use crate::error::{Error, GenerationError, GenerationErrorKind, Result};

/// One ordered pair assigned to a subject, with its measured transition time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Regularity {
    pub pos1: Position,
    pub pos2: Position,
    pub time_ms: f64,
}

impl From<TransitionRecord> for Regularity {
    fn from(r: TransitionRecord) -> Self {
        Self {
            pos1: r.pos1,
            pos2: r.pos2,
            time_ms: r.time_ms,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubjectAssignment {
    pub subject: String,
    pub pairs: Vec<Regularity>,
}

impl SubjectAssignment {
    pub fn times(&self) -> Vec<f64> {
        self.pairs.iter().map(|p| p.time_ms).collect()
    }

    pub fn mean_time_ms(&self) -> f64 {
        stats::mean(&self.times())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerParams {
    pub pairs_per_subject: usize,
    pub max_range_ms: f64,
    pub closeness_sd: f64,
    pub max_attempts: u64,
}

impl From<&SamplerConfig> for SamplerParams {
    fn from(cfg: &SamplerConfig) -> Self {
        Self {
            pairs_per_subject: cfg.pairs_per_subject,
            max_range_ms: cfg.max_range_ms,
            closeness_sd: cfg.closeness_sd,
            max_attempts: cfg.max_attempts,
        }
    }
}

/// Why a candidate was turned down. Only the first failing check is reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    RepeatedFirst,
    RepeatedSecond,
    CrossRole,
    RangeTooWide,
    MeanTooFar,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RejectionTally {
    pub repeated_first: u64,
    pub repeated_second: u64,
    pub cross_role: u64,
    pub range_too_wide: u64,
    pub mean_too_far: u64,
}

impl RejectionTally {
    fn record(&mut self, r: Rejection) {
        let slot = match r {
            Rejection::RepeatedFirst => &mut self.repeated_first,
            Rejection::RepeatedSecond => &mut self.repeated_second,
            Rejection::CrossRole => &mut self.cross_role,
            Rejection::RangeTooWide => &mut self.range_too_wide,
            Rejection::MeanTooFar => &mut self.mean_too_far,
        };
        *slot += 1;
    }

    /// Add another tally's counts into this one.
    pub fn absorb(&mut self, other: &RejectionTally) {
        self.repeated_first += other.repeated_first;
        self.repeated_second += other.repeated_second;
        self.cross_role += other.cross_role;
        self.range_too_wide += other.range_too_wide;
        self.mean_too_far += other.mean_too_far;
    }

    pub fn total(&self) -> u64 {
        self.repeated_first
            + self.repeated_second
            + self.cross_role
            + self.range_too_wide
            + self.mean_too_far
    }
}

/// Check one candidate against the disjointness and response-time constraints.
pub fn check_candidate(
    sample: &[TransitionRecord],
    params: &SamplerParams,
    population_mean_ms: f64,
    population_sd_ms: f64,
) -> Result<(), Rejection> {
    for (i, a) in sample.iter().enumerate() {
        for b in &sample[i + 1..] {
            if a.pos1 == b.pos1 {
                return Err(Rejection::RepeatedFirst);
            }
            if a.pos2 == b.pos2 {
                return Err(Rejection::RepeatedSecond);
            }
        }
    }
    // Includes a record whose two positions coincide.
    if sample
        .iter()
        .any(|a| sample.iter().any(|b| a.pos1 == b.pos2))
    {
        return Err(Rejection::CrossRole);
    }

    let times: Vec<f64> = sample.iter().map(|r| r.time_ms).collect();
    if stats::range(&times) > params.max_range_ms {
        return Err(Rejection::RangeTooWide);
    }
    let deviation = (stats::mean(&times) - population_mean_ms).abs();
    if deviation > params.closeness_sd * population_sd_ms {
        return Err(Rejection::MeanTooFar);
    }
    Ok(())
}

/// Sampler state for one run: the table, the limits, and the rejection
/// counters accumulated across every subject sampled so far.
pub struct ConstraintSampler<'a> {
    table: &'a TransitionTable,
    params: SamplerParams,
    rejections: RejectionTally,
}

impl<'a> ConstraintSampler<'a> {
    pub fn new(table: &'a TransitionTable, params: SamplerParams) -> Result<Self> {
        if params.pairs_per_subject == 0 {
            return Err(Error::Config("pairs_per_subject must be at least 1".into()));
        }
        if table.len() < params.pairs_per_subject {
            return Err(Error::Config(format!(
                "transition table has {} records, need at least {}",
                table.len(),
                params.pairs_per_subject
            )));
        }
        if params.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".into()));
        }
        Ok(Self {
            table,
            params,
            rejections: RejectionTally::default(),
        })
    }

    /// Rejected draws across all subjects so far.
    pub fn rejected(&self) -> u64 {
        self.rejections.total()
    }

    pub fn rejection_tally(&self) -> &RejectionTally {
        &self.rejections
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<TransitionRecord> {
        index::sample(rng, self.table.len(), self.params.pairs_per_subject)
            .iter()
            .filter_map(|i| self.table.get(i).copied())
            .collect()
    }

    pub fn sample_subject<R: Rng + ?Sized>(
        &mut self,
        subject: &str,
        rng: &mut R,
    ) -> Result<SubjectAssignment, GenerationError> {
        let mean = self.table.mean_ms();
        let sd = self.table.sd_ms();
        for attempt in 1..=self.params.max_attempts {
            let candidate = self.draw(rng);
            match check_candidate(&candidate, &self.params, mean, sd) {
                Ok(()) => {
                    debug!(
                        target: "sampling::sampler",
                        subject,
                        attempt,
                        "accepted candidate"
                    );
                    return Ok(SubjectAssignment {
                        subject: subject.to_string(),
                        pairs: candidate.into_iter().map(Regularity::from).collect(),
                    });
                }
                Err(reason) => self.rejections.record(reason),
            }
        }
        Err(GenerationError::new(
            GenerationErrorKind::ConstraintExhausted,
            format!(
                "no acceptable {} pairs for subject {subject} after {} attempts \
                 (range <= {} ms, mean within {} sd)",
                self.params.pairs_per_subject,
                self.params.max_attempts,
                self.params.max_range_ms,
                self.params.closeness_sd
            ),
        ))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SampledPopulation {
    pub assignments: Vec<SubjectAssignment>,
    pub rejected: u64,
    pub rejections: RejectionTally,
}

/// Sample every subject in roster order.
pub fn sample_population<R: Rng + ?Sized>(
    table: &TransitionTable,
    roster: &[String],
    params: SamplerParams,
    rng: &mut R,
) -> Result<SampledPopulation> {
    let mut sampler = ConstraintSampler::new(table, params)?;
    let mut assignments = Vec::with_capacity(roster.len());
    for subject in roster {
        assignments.push(sampler.sample_subject(subject, rng)?);
    }
    let rejections = *sampler.rejection_tally();
    info!(
        target: "sampling::sampler",
        subjects = assignments.len(),
        rejected = rejections.total(),
        repeated_first = rejections.repeated_first,
        repeated_second = rejections.repeated_second,
        cross_role = rejections.cross_role,
        range_too_wide = rejections.range_too_wide,
        mean_too_far = rejections.mean_too_far,
        "sampled population"
    );
    Ok(SampledPopulation {
        assignments,
        rejected: rejections.total(),
        rejections,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rec(pos1: Position, pos2: Position, time_ms: f64) -> TransitionRecord {
        TransitionRecord {
            pos1,
            pos2,
            time_ms,
        }
    }

    fn params(k: usize, max_range_ms: f64) -> SamplerParams {
        SamplerParams {
            pairs_per_subject: k,
            max_range_ms,
            closeness_sd: 1.5,
            max_attempts: 10_000,
        }
    }

    #[test]
    fn each_constraint_has_its_own_reason() {
        let p = params(2, 10.0);
        let check = |s: &[TransitionRecord]| check_candidate(s, &p, 1000.0, 100.0);
        assert_eq!(check(&[rec(1, 2, 1000.0), rec(1, 3, 1000.0)]), Err(Rejection::RepeatedFirst));
        assert_eq!(check(&[rec(1, 2, 1000.0), rec(3, 2, 1000.0)]), Err(Rejection::RepeatedSecond));
        assert_eq!(check(&[rec(1, 2, 1000.0), rec(2, 3, 1000.0)]), Err(Rejection::CrossRole));
        assert_eq!(check(&[rec(4, 4, 1000.0), rec(1, 2, 1000.0)]), Err(Rejection::CrossRole));
        assert_eq!(check(&[rec(1, 2, 1000.0), rec(3, 4, 1010.5)]), Err(Rejection::RangeTooWide));
        assert_eq!(check(&[rec(1, 2, 1200.0), rec(3, 4, 1201.0)]), Err(Rejection::MeanTooFar));
        assert_eq!(check(&[rec(1, 2, 1000.0), rec(3, 4, 1010.0)]), Ok(()));
    }

    #[test]
    fn range_limit_is_inclusive() {
        let p = params(3, 10.0);
        let s = [rec(1, 2, 900.0), rec(3, 4, 905.0), rec(5, 6, 910.0)];
        assert_eq!(check_candidate(&s, &p, 905.0, 1.0), Ok(()));
    }

    #[test]
    fn unsatisfiable_table_exhausts_attempts() {
        // Every record reuses position 1, so no two of them can be combined.
        let table = TransitionTable::new(vec![
            rec(1, 2, 900.0),
            rec(1, 3, 900.0),
            rec(4, 1, 900.0),
            rec(1, 5, 900.0),
        ]);
        let mut sampler = ConstraintSampler::new(
            &table,
            SamplerParams {
                max_attempts: 50,
                ..params(2, 10.0)
            },
        )
        .expect("sampler");
        let mut rng = StdRng::seed_from_u64(1);
        let err = sampler.sample_subject("KALI", &mut rng).unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::ConstraintExhausted);
        assert!(err.message.contains("KALI"));
        assert_eq!(sampler.rejected(), 50);
    }

    #[test]
    fn table_smaller_than_k_is_a_config_error() {
        let table = TransitionTable::new(vec![rec(1, 2, 900.0)]);
        assert!(matches!(
            ConstraintSampler::new(&table, params(2, 10.0)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn same_seed_same_population() {
        let records: Vec<_> = (1..=8u8)
            .flat_map(|a| (1..=8u8).filter(move |b| *b != a).map(move |b| (a, b)))
            .enumerate()
            .map(|(i, (a, b))| rec(a, b, 1000.0 + (i % 7) as f64))
            .collect();
        let table = TransitionTable::new(records);
        let roster: Vec<String> = (0..6).map(|i| format!("S{i}")).collect();
        let a = sample_population(&table, &roster, params(3, 10.0), &mut StdRng::seed_from_u64(9))
            .expect("sample");
        let b = sample_population(&table, &roster, params(3, 10.0), &mut StdRng::seed_from_u64(9))
            .expect("sample");
        assert_eq!(a, b);
        assert_eq!(a.assignments.len(), 6);
        assert_eq!(a.rejected, a.rejections.total());
    }
}
