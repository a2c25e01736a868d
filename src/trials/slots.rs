//! Where the pair sits in each trial of a random-slot regularity block.

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::error::{GenerationError, GenerationErrorKind};

/// Longest run of equal consecutive values.
pub fn max_run_length(values: &[usize]) -> usize {
    let mut best = 0;
    let mut run = 0;
    let mut prev = None;
    for &v in values {
        run = if prev == Some(v) { run + 1 } else { 1 };
        best = best.max(run);
        prev = Some(v);
    }
    best
}

/// Start slots for `n_trials` trials: the cyclic sequence `0, 1, .., n_slots - 1, 0, ..`
/// reshuffled until no slot repeats more than `max_run` times in a row.
pub fn slot_schedule<R: Rng + ?Sized>(
    rng: &mut R,
    n_trials: usize,
    n_slots: usize,
    max_run: usize,
    max_attempts: u64,
) -> Result<Vec<usize>, GenerationError> {
    if n_slots == 0 {
        return Err(GenerationError::new(
            GenerationErrorKind::SlotScheduleExhausted,
            "no slot available for the pair",
        ));
    }
    let mut schedule: Vec<usize> = (0..n_trials).map(|i| i % n_slots).collect();
    if n_slots == 1 && n_trials > max_run {
        return Err(GenerationError::new(
            GenerationErrorKind::SlotScheduleExhausted,
            format!("a single slot cannot serve {n_trials} trials with runs of at most {max_run}"),
        ));
    }
    for attempt in 1..=max_attempts {
        schedule.shuffle(rng);
        if max_run_length(&schedule) <= max_run {
            debug!(target: "trials::slots", attempt, n_trials, n_slots, "slot schedule accepted");
            return Ok(schedule);
        }
    }
    Err(GenerationError::new(
        GenerationErrorKind::SlotScheduleExhausted,
        format!(
            "no schedule of {n_trials} trials over {n_slots} slots with runs <= {max_run} \
             after {max_attempts} shuffles"
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn run_length_counts_consecutive_equal_values() {
        assert_eq!(max_run_length(&[]), 0);
        assert_eq!(max_run_length(&[2]), 1);
        assert_eq!(max_run_length(&[0, 0, 1, 1, 1, 0]), 3);
    }

    #[test]
    fn schedule_is_balanced_and_run_limited() {
        let mut rng = StdRng::seed_from_u64(11);
        for n_slots in [3, 4] {
            let s = slot_schedule(&mut rng, 500, n_slots, 4, 10_000).expect("schedule");
            assert_eq!(s.len(), 500);
            assert!(max_run_length(&s) <= 4);
            let counts: Vec<usize> = (0..n_slots)
                .map(|slot| s.iter().filter(|v| **v == slot).count())
                .collect();
            let lo = *counts.iter().min().unwrap_or(&0);
            let hi = *counts.iter().max().unwrap_or(&0);
            assert!(hi - lo <= 1, "counts {counts:?}");
        }
    }

    #[test]
    fn single_slot_cannot_meet_a_short_run_limit() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = slot_schedule(&mut rng, 10, 1, 4, 100).unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::SlotScheduleExhausted);
        assert_eq!(slot_schedule(&mut rng, 3, 1, 4, 100).expect("short block"), vec![0, 0, 0]);
    }
}
