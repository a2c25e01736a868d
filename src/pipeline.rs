//! The two stages of a generation run and their composition.
//!
//! `sample` turns a transition table into an [`AssignmentArtifact`];
//! `build` turns an artifact into master files, chunk files and metadata.
//! Each stage draws from its own RNG stream derived from the run seed, so a
//! build from a saved artifact repeats exactly.

use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::artifact::AssignmentArtifact;
use crate::config::AppConfig;
use crate::core::transitions::TransitionTable;
use crate::error::{Error, Result};
use crate::sampling::sampler::SamplerParams;
use crate::sampling::{self, BalanceParams, roster};
use crate::trials::assembler::Assembler;
use crate::trials::trial::RowFormat;
use crate::trials::{chunker, writer};

const SAMPLING_STREAM: u64 = 0x5A3F_0000_0000_0001;
const BUILD_STREAM: u64 = 0xB01D_0000_0000_0002;

/// Explicit seed if given, else the config's, else fresh entropy.
pub fn resolve_seed(explicit: Option<u64>, config: Option<u64>) -> u64 {
    explicit
        .or(config)
        .unwrap_or_else(|| rand::rng().random::<u64>())
}

fn stream(seed: u64, tag: u64) -> StdRng {
    StdRng::seed_from_u64(seed ^ tag)
}

/// Shuffle the roster, sample every subject and tally pair reuse.
pub fn sample(cfg: &AppConfig, table: &TransitionTable, seed: u64) -> Result<AssignmentArtifact> {
    cfg.validate()?;
    let mut rng = stream(seed, SAMPLING_STREAM);
    let subjects = if cfg.roster.shuffle {
        roster::shuffled(&cfg.roster.subjects, &mut rng)
    } else {
        cfg.roster.subjects.clone()
    };
    info!(
        target: "pipeline",
        seed,
        preset = cfg.preset.name(),
        subjects = subjects.len(),
        records = table.len(),
        table_mean_ms = table.mean_ms(),
        table_sd_ms = table.sd_ms(),
        "sampling regularities"
    );
    let balanced = sampling::balanced_population(
        table,
        &subjects,
        SamplerParams::from(&cfg.sampler),
        BalanceParams {
            max_pair_uses: cfg.balance.max_pair_uses,
            pair_key: cfg.balance.pair_key,
            max_population_attempts: cfg.balance.max_population_attempts,
        },
        &mut rng,
    )?;
    Ok(AssignmentArtifact::from_population(
        cfg.preset,
        seed,
        cfg.balance.max_pair_uses,
        balanced,
    ))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildSummary {
    pub subjects: usize,
    pub rows: usize,
    pub chunks: usize,
    pub meta_path: PathBuf,
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))
}

/// Generate and write every subject's trials from `artifact` into `out_dir`.
///
/// A flagged artifact (some pair above the ceiling it was sampled with) is
/// refused unless `allow_flagged` is set. `seed` defaults to the artifact's
/// own seed.
pub fn build(
    cfg: &AppConfig,
    artifact: &AssignmentArtifact,
    out_dir: &Path,
    seed: Option<u64>,
    allow_flagged: bool,
) -> Result<BuildSummary> {
    cfg.validate()?;
    if artifact.preset != cfg.preset {
        warn!(
            target: "pipeline",
            artifact = artifact.preset.name(),
            config = cfg.preset.name(),
            "assignment was sampled under a different preset"
        );
    }
    if artifact.pair_key != cfg.balance.pair_key
        || artifact.max_pair_uses != cfg.balance.max_pair_uses
    {
        warn!(
            target: "pipeline",
            artifact_pair_key = ?artifact.pair_key,
            artifact_max_pair_uses = artifact.max_pair_uses,
            config_pair_key = ?cfg.balance.pair_key,
            config_max_pair_uses = cfg.balance.max_pair_uses,
            "checking reuse with the settings the assignment was sampled under"
        );
    }
    let report = artifact.report(artifact.pair_key, artifact.max_pair_uses);
    if !report.is_balanced() {
        if allow_flagged {
            warn!(
                target: "pipeline",
                violations = report.violations.len(),
                "building from a flagged assignment"
            );
        } else {
            report.into_result()?;
        }
    }

    let seed = seed.unwrap_or(artifact.seed);
    let mut rng = stream(seed, BUILD_STREAM);
    let master_dir = out_dir.join(&cfg.output.master_dir);
    let chunk_dir = out_dir.join(cfg.output.chunk_dir());
    ensure_dir(&master_dir)?;
    ensure_dir(&chunk_dir)?;
    let meta_path = out_dir.join(&cfg.output.meta_file);

    let fmt = RowFormat::from(&cfg.stimulus);
    let assembler = Assembler::new(cfg);
    let mut meta = writer::MetaWriter::create(&meta_path, cfg.sampler.pairs_per_subject)?;
    let mut summary = BuildSummary {
        subjects: 0,
        rows: 0,
        chunks: 0,
        meta_path: meta_path.clone(),
    };
    for (idx, assignment) in artifact.subjects.iter().enumerate() {
        let trials = assembler.assemble(idx, assignment, &mut rng)?;
        let master = master_dir.join(format!("{}.txt", trials.subject));
        summary.rows += writer::write_master(&master, &trials, &fmt)?;
        summary.chunks +=
            chunker::chunk_master(&master, &chunk_dir, &trials.subject, cfg.output.chunk_rows)?
                .len();
        meta.write_subject(&trials)?;
        summary.subjects += 1;
    }
    meta.finish()?;
    info!(
        target: "pipeline",
        seed,
        subjects = summary.subjects,
        rows = summary.rows,
        chunks = summary.chunks,
        out = %out_dir.display(),
        "build complete"
    );
    Ok(summary)
}

/// Sample, save the artifact under `out_dir`, then build from it.
pub fn run(
    cfg: &AppConfig,
    table: &TransitionTable,
    out_dir: &Path,
    seed: u64,
    allow_flagged: bool,
) -> Result<(AssignmentArtifact, BuildSummary)> {
    let artifact = sample(cfg, table, seed)?;
    ensure_dir(out_dir)?;
    artifact.save(&out_dir.join(&cfg.output.assignment_file))?;
    let summary = build(cfg, &artifact, out_dir, None, allow_flagged)?;
    Ok((artifact, summary))
}

/// Sample and save the artifact only.
pub fn sample_to(
    cfg: &AppConfig,
    table: &TransitionTable,
    out_dir: &Path,
    seed: u64,
) -> Result<(AssignmentArtifact, PathBuf)> {
    let artifact = sample(cfg, table, seed)?;
    ensure_dir(out_dir)?;
    let path = out_dir.join(&cfg.output.assignment_file);
    artifact.save(&path)?;
    Ok((artifact, path))
}
