use nadstim::core::transitions::{TransitionRecord, TransitionTable};
use nadstim::sampling::balance::{PairKeyMode, PairUsageTally};
use nadstim::sampling::sampler::{SamplerParams, sample_population};
use nadstim::sampling::{BalanceParams, balanced_population};
use nadstim::GenerationErrorKind;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Six copies of 1→2 and nothing else: every subject must draw 1→2.
fn identical_records() -> TransitionTable {
    TransitionTable::new(
        (0..6)
            .map(|_| TransitionRecord {
                pos1: 1,
                pos2: 2,
                time_ms: 1000.0,
            })
            .collect(),
    )
}

#[test]
fn crafted_overuse_is_flagged() {
    let table = identical_records();
    let roster: Vec<String> = (0..8).map(|i| format!("S{i}")).collect();
    let params = SamplerParams {
        pairs_per_subject: 1,
        max_range_ms: 10.0,
        closeness_sd: 1.5,
        max_attempts: 100,
    };
    let mut rng = StdRng::seed_from_u64(2);
    let pop = sample_population(&table, &roster, params, &mut rng).expect("sample");
    let tally = PairUsageTally::from_assignments(&pop.assignments, PairKeyMode::Unordered);
    assert_eq!(tally.count(1, 2), 8);

    let report = tally.check(5);
    assert!(!report.is_balanced());
    assert_eq!(report.distinct_pairs, 1);
    let err = report.into_result().unwrap_err();
    assert_eq!(err.kind, GenerationErrorKind::PopulationCeiling);
}

#[test]
fn balanced_population_reports_without_failing() {
    let table = identical_records();
    let roster: Vec<String> = (0..4).map(|i| format!("S{i}")).collect();
    let sampler = SamplerParams {
        pairs_per_subject: 1,
        max_range_ms: 10.0,
        closeness_sd: 1.5,
        max_attempts: 100,
    };
    let balance = BalanceParams {
        max_pair_uses: 3,
        pair_key: PairKeyMode::Ordered,
        max_population_attempts: 2,
    };
    let mut rng = StdRng::seed_from_u64(2);
    let out = balanced_population(&table, &roster, sampler, balance, &mut rng).expect("sample");
    assert_eq!(out.attempts, 2);
    assert_eq!(out.report.violations.len(), 1);
    assert_eq!(out.report.violations[0].count, 4);
}

#[test]
fn within_ceiling_is_balanced_on_first_attempt() {
    let mut records = Vec::new();
    for a in 1..=9u8 {
        for b in 1..=9u8 {
            if a != b {
                records.push(TransitionRecord {
                    pos1: a,
                    pos2: b,
                    time_ms: 1000.0,
                });
            }
        }
    }
    let table = TransitionTable::new(records);
    let roster = vec!["ONLY".to_string()];
    let sampler = SamplerParams {
        pairs_per_subject: 3,
        max_range_ms: 10.0,
        closeness_sd: 1.5,
        max_attempts: 10_000,
    };
    let balance = BalanceParams {
        max_pair_uses: 1,
        pair_key: PairKeyMode::Unordered,
        max_population_attempts: 5,
    };
    let mut rng = StdRng::seed_from_u64(0);
    let out = balanced_population(&table, &roster, sampler, balance, &mut rng).expect("sample");
    assert_eq!(out.attempts, 1);
    assert!(out.report.is_balanced());
    assert_eq!(out.report.distinct_pairs, 3);
}
