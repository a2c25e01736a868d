//! Subject roster and contiguous group cuts.

use rand::Rng;
use rand::seq::SliceRandom;

/// Shuffled once per sampling run so group membership is anonymous.
pub fn shuffled<R: Rng + ?Sized>(subjects: &[String], rng: &mut R) -> Vec<String> {
    let mut out = subjects.to_vec();
    out.shuffle(rng);
    out
}

/// Group index (0-based) of the subject at roster position `idx`.
///
/// Groups are contiguous runs of `sizes[g]` subjects; everyone past the
/// listed sizes lands in one final group. The result is clamped to
/// `group_count - 1` so a short size list can never name a missing group.
pub fn group_of(idx: usize, sizes: &[usize], group_count: usize) -> usize {
    let mut upper = 0usize;
    let mut group = sizes.len();
    for (g, &size) in sizes.iter().enumerate() {
        upper += size;
        if idx < upper {
            group = g;
            break;
        }
    }
    group.min(group_count.saturating_sub(1))
}
