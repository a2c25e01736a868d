//! Builds each subject's block sequence from its accepted pairs.
//!
//! Random blocks draw every trial's positions without replacement from the
//! whole alphabet. Regularity blocks draw the background from the alphabet
//! minus that block's pair, then overwrite two adjacent slots with the pair,
//! so a row never repeats a position.

use rand::Rng;
use rand::seq::{SliceRandom, index};
use tracing::debug;

use super::slots;
use super::trial::{Trial, TrialBlock};
use crate::config::{AppConfig, DesignConfig, GroupOrderDesign, RandomSlotDesign};
use crate::core::transitions::Position;
use crate::error::{Error, GenerationError, Result};
use crate::sampling::roster;
use crate::sampling::sampler::{Regularity, SubjectAssignment};

/// Everything generated for one subject.
#[derive(Clone, Debug, PartialEq)]
pub struct SubjectTrials {
    pub subject: String,
    /// 1-based group number.
    pub group: usize,
    /// Slot order (group-order design) or length order (random-slot design).
    pub order: Vec<usize>,
    /// Pairs in the order their regularity blocks appear.
    pub pairs: Vec<Regularity>,
    pub blocks: Vec<TrialBlock>,
}

impl SubjectTrials {
    pub fn rows(&self) -> usize {
        self.blocks.iter().map(|b| b.trials.len()).sum()
    }
}

pub struct Assembler<'a> {
    design: &'a DesignConfig,
    alphabet: &'a [Position],
}

impl<'a> Assembler<'a> {
    pub fn new(cfg: &'a AppConfig) -> Self {
        Self {
            design: &cfg.design,
            alphabet: &cfg.stimulus.positions,
        }
    }

    /// Build the blocks for the subject at roster position `idx`.
    pub fn assemble<R: Rng + ?Sized>(
        &self,
        idx: usize,
        assignment: &SubjectAssignment,
        rng: &mut R,
    ) -> Result<SubjectTrials> {
        for p in &assignment.pairs {
            if !self.alphabet.contains(&p.pos1) || !self.alphabet.contains(&p.pos2) {
                return Err(Error::Config(format!(
                    "pair [{}, {}] of {} lies outside the position alphabet {:?}",
                    p.pos1, p.pos2, assignment.subject, self.alphabet
                )));
            }
        }
        let out = match self.design {
            DesignConfig::GroupOrder(d) => self.group_order(d, idx, assignment, rng)?,
            DesignConfig::RandomSlot(d) => self.random_slot(d, idx, assignment, rng)?,
        };
        for block in &out.blocks {
            block.verify(&out.subject)?;
        }
        debug!(
            target: "trials::assembler",
            subject = %out.subject,
            group = out.group,
            order = ?out.order,
            rows = out.rows(),
            "assembled subject"
        );
        Ok(out)
    }

    fn group_order<R: Rng + ?Sized>(
        &self,
        d: &GroupOrderDesign,
        idx: usize,
        assignment: &SubjectAssignment,
        rng: &mut R,
    ) -> Result<SubjectTrials> {
        let group = roster::group_of(idx, &d.group_sizes, self.design.group_count());
        let order = d.slot_orders[group].clone();
        check_pair_count(assignment, order.len())?;

        let mut blocks = vec![random_block(
            rng,
            self.alphabet,
            d.sequence_len,
            d.random_trials,
            "random".to_string(),
        )];
        for (pair, &slot) in assignment.pairs.iter().zip(&order) {
            blocks.push(regularity_block(
                rng,
                self.alphabet,
                d.sequence_len,
                pair,
                &vec![slot - 1; d.regularity_trials],
                format!("Pos{slot}Test"),
            ));
        }
        Ok(SubjectTrials {
            subject: assignment.subject.clone(),
            group: group + 1,
            order,
            pairs: assignment.pairs.clone(),
            blocks,
        })
    }

    fn random_slot<R: Rng + ?Sized>(
        &self,
        d: &RandomSlotDesign,
        idx: usize,
        assignment: &SubjectAssignment,
        rng: &mut R,
    ) -> Result<SubjectTrials> {
        let group = roster::group_of(idx, &d.group_sizes, self.design.group_count());
        let order = d.length_orders[group].clone();
        check_pair_count(assignment, order.len())?;

        // Which pair meets which length is drawn per subject; times travel with their pair.
        let mut pairs = assignment.pairs.clone();
        pairs.shuffle(rng);

        let mut blocks = Vec::with_capacity(2 * order.len());
        for (pair, &len) in pairs.iter().zip(&order) {
            blocks.push(random_block(
                rng,
                self.alphabet,
                len,
                d.random_trials,
                format!("random{len}"),
            ));
            let starts = slots::slot_schedule(
                rng,
                d.regularity_trials,
                len - 1,
                d.max_slot_run,
                d.max_schedule_attempts,
            )
            .map_err(|e| {
                Error::from(GenerationError::new(
                    e.kind,
                    format!("{} (length {len}): {}", assignment.subject, e.message),
                ))
            })?;
            blocks.push(regularity_block(
                rng,
                self.alphabet,
                len,
                pair,
                &starts,
                format!("RegLen{len}"),
            ));
        }
        Ok(SubjectTrials {
            subject: assignment.subject.clone(),
            group: group + 1,
            order,
            pairs,
            blocks,
        })
    }
}

fn check_pair_count(assignment: &SubjectAssignment, expected: usize) -> Result<()> {
    if assignment.pairs.len() != expected {
        return Err(Error::Config(format!(
            "{} has {} pairs but the design expects {expected}",
            assignment.subject,
            assignment.pairs.len()
        )));
    }
    Ok(())
}

/// `len` distinct positions from `pool`, in random order.
fn draw_sequence<R: Rng + ?Sized>(rng: &mut R, pool: &[Position], len: usize) -> Vec<Position> {
    index::sample(rng, pool.len(), len)
        .iter()
        .map(|i| pool[i])
        .collect()
}

pub fn random_block<R: Rng + ?Sized>(
    rng: &mut R,
    alphabet: &[Position],
    len: usize,
    n_trials: usize,
    label: String,
) -> TrialBlock {
    let trials = (0..n_trials)
        .map(|_| Trial {
            positions: draw_sequence(rng, alphabet, len),
        })
        .collect();
    TrialBlock { label, trials }
}

/// One trial per entry of `starts`; trial `i` carries the pair at
/// indices `starts[i]` and `starts[i] + 1`.
pub fn regularity_block<R: Rng + ?Sized>(
    rng: &mut R,
    alphabet: &[Position],
    len: usize,
    pair: &Regularity,
    starts: &[usize],
    label: String,
) -> TrialBlock {
    let background: Vec<Position> = alphabet
        .iter()
        .copied()
        .filter(|p| *p != pair.pos1 && *p != pair.pos2)
        .collect();
    let trials = starts
        .iter()
        .map(|&start| {
            let mut positions = draw_sequence(rng, &background, len);
            positions[start] = pair.pos1;
            positions[start + 1] = pair.pos2;
            Trial { positions }
        })
        .collect();
    TrialBlock { label, trials }
}
