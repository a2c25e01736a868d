use std::collections::HashSet;

use nadstim::core::stats;
use nadstim::core::transitions::{Position, TransitionRecord, TransitionTable};
use nadstim::sampling::sampler::{ConstraintSampler, SamplerParams, sample_population};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Twenty transitions over positions 1..=9, times spread across 800..1200 ms
/// with one tight cluster of disjoint pairs around 1000 ms.
fn twenty_record_table() -> TransitionTable {
    let pairs: [(Position, Position); 20] = [
        (1, 2),
        (3, 4),
        (5, 6),
        (7, 8),
        (9, 1),
        (2, 3),
        (4, 5),
        (6, 7),
        (8, 9),
        (1, 3),
        (2, 4),
        (3, 5),
        (4, 6),
        (5, 7),
        (6, 8),
        (7, 9),
        (8, 1),
        (9, 2),
        (1, 4),
        (2, 5),
    ];
    let records = pairs
        .iter()
        .enumerate()
        .map(|(i, &(pos1, pos2))| {
            let time_ms = match i {
                0 => 995.0,
                1 => 1000.0,
                2 => 1005.0,
                _ => 800.0 + 21.0 * i as f64,
            };
            TransitionRecord {
                pos1,
                pos2,
                time_ms,
            }
        })
        .collect();
    TransitionTable::new(records)
}

/// Every ordered pair of 1..=9 with times between 900 and 939 ms.
fn full_table() -> TransitionTable {
    let mut records = Vec::new();
    for a in 1..=9u8 {
        for b in 1..=9u8 {
            if a != b {
                records.push(TransitionRecord {
                    pos1: a,
                    pos2: b,
                    time_ms: 900.0 + ((a as u32 * 7 + b as u32 * 3) % 40) as f64,
                });
            }
        }
    }
    TransitionTable::new(records)
}

fn params(k: usize, max_range_ms: f64) -> SamplerParams {
    SamplerParams {
        pairs_per_subject: k,
        max_range_ms,
        closeness_sd: 1.5,
        max_attempts: 1_000_000,
    }
}

fn assert_disjoint(positions: &[(Position, Position)]) {
    let mut seen = HashSet::new();
    for &(a, b) in positions {
        assert!(seen.insert(a), "position {a} reused in {positions:?}");
        assert!(seen.insert(b), "position {b} reused in {positions:?}");
    }
}

#[test]
fn twenty_record_table_yields_a_tight_disjoint_triple() {
    let table = twenty_record_table();
    for seed in 0..5 {
        let mut sampler = ConstraintSampler::new(&table, params(3, 10.0)).expect("sampler");
        let mut rng = StdRng::seed_from_u64(seed);
        let got = sampler.sample_subject("ANGELE", &mut rng).expect("terminates");
        assert_eq!(got.pairs.len(), 3);
        let times = got.times();
        assert!(stats::range(&times) <= 10.0, "times {times:?}");
        let positions: Vec<_> = got.pairs.iter().map(|p| (p.pos1, p.pos2)).collect();
        assert_disjoint(&positions);
    }
}

#[test]
fn accepted_samples_meet_every_constraint() {
    let table = full_table();
    let roster: Vec<String> = (0..28).map(|i| format!("S{i:02}")).collect();
    for (k, max_range) in [(3, 10.0), (2, 5.0)] {
        for seed in [1u64, 2, 3] {
            let mut rng = StdRng::seed_from_u64(seed);
            let pop = sample_population(&table, &roster, params(k, max_range), &mut rng)
                .expect("sample");
            assert_eq!(pop.assignments.len(), roster.len());
            for a in &pop.assignments {
                assert_eq!(a.pairs.len(), k);
                let positions: Vec<_> = a.pairs.iter().map(|p| (p.pos1, p.pos2)).collect();
                assert_disjoint(&positions);
                let times = a.times();
                assert!(stats::range(&times) <= max_range);
                let deviation = (stats::mean(&times) - table.mean_ms()).abs();
                assert!(deviation <= 1.5 * table.sd_ms());
            }
        }
    }
}

#[test]
fn each_subject_keeps_its_roster_name_in_order() {
    let table = full_table();
    let roster: Vec<String> = ["PIPO", "BOBO", "KALI"].iter().map(|s| s.to_string()).collect();
    let mut rng = StdRng::seed_from_u64(21);
    let pop = sample_population(&table, &roster, params(3, 10.0), &mut rng).expect("sample");
    let names: Vec<&str> = pop.assignments.iter().map(|a| a.subject.as_str()).collect();
    assert_eq!(names, ["PIPO", "BOBO", "KALI"]);
}
