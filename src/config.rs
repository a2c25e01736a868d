use crate::core::transitions::{Position, SENTINEL};
use crate::error::{Error, Result};
use crate::sampling::balance::PairKeyMode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::info;

/// Built-in experiment layouts. A config file names one as its base and
/// overrides individual keys on top of it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    /// Three pairs per subject, one block per pair at a group-ordered slot.
    #[default]
    Exp1,
    /// Two pairs per subject, embedded at shuffled slots in length-4 and length-5 rows.
    Exp2,
}

impl Preset {
    pub fn name(self) -> &'static str {
        match self {
            Self::Exp1 => "exp1",
            Self::Exp2 => "exp2",
        }
    }

    pub fn config(self) -> AppConfig {
        match self {
            Self::Exp1 => AppConfig::exp1(),
            Self::Exp2 => AppConfig::exp2(),
        }
    }
}

const EXP1_SUBJECTS: [&str; 28] = [
    "ANGELE", "ARIELLE", "ARTICHO", "ATMOSPHERE", "CAUET", "DORA", "DREAM", "EWINE", "FANA",
    "FELIPE", "FEYA", "FLUTE", "HARLEM", "HERMINE", "KALI", "LIPS", "LOME", "MAKO", "MALI", "MUSE",
    "NEKKE", "VIOLETTE", "0", "B06", "PIPO", "BOBO", "PETOULETTE", "BRIGITTE",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RosterConfig {
    pub subjects: Vec<String>,
    /// Shuffle the roster once per sampling run before groups are cut.
    #[serde(default = "RosterConfig::default_shuffle")]
    pub shuffle: bool,
}

impl RosterConfig {
    fn default_shuffle() -> bool {
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SamplerConfig {
    pub pairs_per_subject: usize,
    pub max_range_ms: f64,
    #[serde(default = "SamplerConfig::default_closeness_sd")]
    pub closeness_sd: f64,
    #[serde(default = "SamplerConfig::default_max_attempts")]
    pub max_attempts: u64,
}

impl SamplerConfig {
    fn default_closeness_sd() -> f64 {
        1.5
    }
    fn default_max_attempts() -> u64 {
        1_000_000
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceConfig {
    pub max_pair_uses: usize,
    #[serde(default)]
    pub pair_key: PairKeyMode,
    /// Whole-population resampling rounds while the ceiling is violated; 1 only reports.
    #[serde(default = "BalanceConfig::default_max_population_attempts")]
    pub max_population_attempts: u32,
}

impl BalanceConfig {
    fn default_max_population_attempts() -> u32 {
        1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StimulusConfig {
    #[serde(default = "StimulusConfig::default_positions")]
    pub positions: Vec<Position>,
    #[serde(default = "StimulusConfig::default_row_width")]
    pub row_width: usize,
    #[serde(default = "StimulusConfig::default_task_tag")]
    pub task_tag: String,
    #[serde(default = "StimulusConfig::default_task_flag")]
    pub task_flag: u32,
}

impl StimulusConfig {
    fn default_positions() -> Vec<Position> {
        (1..=9).collect()
    }
    fn default_row_width() -> usize {
        16
    }
    fn default_task_tag() -> String {
        "test".to_string()
    }
    fn default_task_flag() -> u32 {
        1
    }
}

impl Default for StimulusConfig {
    fn default() -> Self {
        Self {
            positions: Self::default_positions(),
            row_width: Self::default_row_width(),
            task_tag: Self::default_task_tag(),
            task_flag: Self::default_task_flag(),
        }
    }
}

/// Configuration A: every pair gets its own block at a slot fixed by the
/// subject's group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupOrderDesign {
    #[serde(default = "GroupOrderDesign::default_random_trials")]
    pub random_trials: usize,
    #[serde(default = "GroupOrderDesign::default_regularity_trials")]
    pub regularity_trials: usize,
    #[serde(default = "GroupOrderDesign::default_sequence_len")]
    pub sequence_len: usize,
    /// Sizes of the contiguous roster groups; the last group absorbs any remainder.
    #[serde(default = "GroupOrderDesign::default_group_sizes")]
    pub group_sizes: Vec<usize>,
    /// Per group, the 1-based slot used by each pair's block. Slot `s` covers
    /// sequence indices `s - 1` and `s`.
    #[serde(default = "GroupOrderDesign::default_slot_orders")]
    pub slot_orders: Vec<Vec<usize>>,
}

impl GroupOrderDesign {
    fn default_random_trials() -> usize {
        500
    }
    fn default_regularity_trials() -> usize {
        500
    }
    fn default_sequence_len() -> usize {
        4
    }
    fn default_group_sizes() -> Vec<usize> {
        vec![5, 5, 5, 5, 4]
    }
    fn default_slot_orders() -> Vec<Vec<usize>> {
        vec![
            vec![1, 2, 3],
            vec![1, 3, 2],
            vec![2, 3, 1],
            vec![2, 1, 3],
            vec![3, 1, 2],
            vec![3, 2, 1],
        ]
    }
}

impl Default for GroupOrderDesign {
    fn default() -> Self {
        Self {
            random_trials: Self::default_random_trials(),
            regularity_trials: Self::default_regularity_trials(),
            sequence_len: Self::default_sequence_len(),
            group_sizes: Self::default_group_sizes(),
            slot_orders: Self::default_slot_orders(),
        }
    }
}

/// Configuration B: pairs are embedded at a shuffled slot per trial, one
/// sequence length per pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RandomSlotDesign {
    #[serde(default = "RandomSlotDesign::default_random_trials")]
    pub random_trials: usize,
    #[serde(default = "RandomSlotDesign::default_regularity_trials")]
    pub regularity_trials: usize,
    #[serde(default = "RandomSlotDesign::default_group_sizes")]
    pub group_sizes: Vec<usize>,
    /// Per group, the sequence length used for each pair in block order.
    #[serde(default = "RandomSlotDesign::default_length_orders")]
    pub length_orders: Vec<Vec<usize>>,
    #[serde(default = "RandomSlotDesign::default_max_slot_run")]
    pub max_slot_run: usize,
    #[serde(default = "RandomSlotDesign::default_max_schedule_attempts")]
    pub max_schedule_attempts: u64,
}

impl RandomSlotDesign {
    fn default_random_trials() -> usize {
        200
    }
    fn default_regularity_trials() -> usize {
        500
    }
    fn default_group_sizes() -> Vec<usize> {
        vec![14]
    }
    fn default_length_orders() -> Vec<Vec<usize>> {
        vec![vec![4, 5], vec![5, 4]]
    }
    fn default_max_slot_run() -> usize {
        4
    }
    fn default_max_schedule_attempts() -> u64 {
        10_000
    }
}

impl Default for RandomSlotDesign {
    fn default() -> Self {
        Self {
            random_trials: Self::default_random_trials(),
            regularity_trials: Self::default_regularity_trials(),
            group_sizes: Self::default_group_sizes(),
            length_orders: Self::default_length_orders(),
            max_slot_run: Self::default_max_slot_run(),
            max_schedule_attempts: Self::default_max_schedule_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DesignConfig {
    GroupOrder(GroupOrderDesign),
    RandomSlot(RandomSlotDesign),
}

impl DesignConfig {
    fn kind(&self) -> &'static str {
        match self {
            Self::GroupOrder(_) => "group-order",
            Self::RandomSlot(_) => "random-slot",
        }
    }

    /// Number of subjects in each group before the remainder group.
    pub fn group_sizes(&self) -> &[usize] {
        match self {
            Self::GroupOrder(d) => &d.group_sizes,
            Self::RandomSlot(d) => &d.group_sizes,
        }
    }

    /// Number of groups the design distinguishes.
    pub fn group_count(&self) -> usize {
        match self {
            Self::GroupOrder(d) => d.slot_orders.len(),
            Self::RandomSlot(d) => d.length_orders.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    #[serde(default = "OutputConfig::default_chunk_rows")]
    pub chunk_rows: usize,
    #[serde(default = "OutputConfig::default_master_dir")]
    pub master_dir: String,
    #[serde(default = "OutputConfig::default_meta_file")]
    pub meta_file: String,
    #[serde(default = "OutputConfig::default_assignment_file")]
    pub assignment_file: String,
}

impl OutputConfig {
    fn default_chunk_rows() -> usize {
        100
    }
    fn default_master_dir() -> String {
        "master".to_string()
    }
    fn default_meta_file() -> String {
        "meta.tsv".to_string()
    }
    fn default_assignment_file() -> String {
        "assignment.json".to_string()
    }

    /// Directory holding the chunk files, e.g. `blocks100`.
    pub fn chunk_dir(&self) -> String {
        format!("blocks{}", self.chunk_rows)
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            chunk_rows: Self::default_chunk_rows(),
            master_dir: Self::default_master_dir(),
            meta_file: Self::default_meta_file(),
            assignment_file: Self::default_assignment_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub preset: Preset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub roster: RosterConfig,
    pub sampler: SamplerConfig,
    pub balance: BalanceConfig,
    #[serde(default)]
    pub stimulus: StimulusConfig,
    pub design: DesignConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::exp1()
    }
}

impl AppConfig {
    pub fn exp1() -> Self {
        Self {
            preset: Preset::Exp1,
            seed: None,
            roster: RosterConfig {
                subjects: EXP1_SUBJECTS.iter().map(|s| s.to_string()).collect(),
                shuffle: true,
            },
            sampler: SamplerConfig {
                pairs_per_subject: 3,
                max_range_ms: 10.0,
                closeness_sd: SamplerConfig::default_closeness_sd(),
                max_attempts: SamplerConfig::default_max_attempts(),
            },
            balance: BalanceConfig {
                max_pair_uses: 5,
                pair_key: PairKeyMode::default(),
                max_population_attempts: BalanceConfig::default_max_population_attempts(),
            },
            stimulus: StimulusConfig::default(),
            design: DesignConfig::GroupOrder(GroupOrderDesign::default()),
            output: OutputConfig::default(),
        }
    }

    pub fn exp2() -> Self {
        // B06 and BRIGITTE left the colony between the two experiments.
        let subjects = EXP1_SUBJECTS
            .iter()
            .filter(|s| !matches!(**s, "B06" | "BRIGITTE"))
            .map(|s| s.to_string())
            .collect();
        Self {
            preset: Preset::Exp2,
            seed: None,
            roster: RosterConfig {
                subjects,
                shuffle: true,
            },
            sampler: SamplerConfig {
                pairs_per_subject: 2,
                max_range_ms: 5.0,
                closeness_sd: SamplerConfig::default_closeness_sd(),
                max_attempts: SamplerConfig::default_max_attempts(),
            },
            balance: BalanceConfig {
                max_pair_uses: 3,
                pair_key: PairKeyMode::default(),
                max_population_attempts: BalanceConfig::default_max_population_attempts(),
            },
            stimulus: StimulusConfig::default(),
            design: DesignConfig::RandomSlot(RandomSlotDesign::default()),
            output: OutputConfig::default(),
        }
    }

    /// Parse a config file body. Keys absent from the file fall back to the
    /// preset named by its top-level `preset` key (default `exp1`).
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let overrides: toml::Table = toml::from_str(text)?;
        let preset = match overrides.get("preset") {
            Some(v) => v.clone().try_into::<Preset>()?,
            None => Preset::default(),
        };
        let mut merged = match toml::Value::try_from(preset.config())? {
            toml::Value::Table(t) => t,
            _ => return Err(Error::Config("preset did not serialize to a table".into())),
        };
        merge_tables(&mut merged, overrides);
        let cfg: AppConfig = toml::Value::Table(merged).try_into()?;
        Ok(cfg)
    }

    /// Load `path`, or write `preset` there as a commented template and use it.
    pub fn load_or_preset(path: &Path, preset: Preset) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
            let cfg = Self::from_toml_str(&contents)?;
            info!(
                path = %path.display(),
                preset = cfg.preset.name(),
                design = cfg.design.kind(),
                "loaded config"
            );
            return Ok(cfg);
        }

        let cfg = preset.config();
        let text = toml::to_string_pretty(&cfg)?;
        let mut commented = String::new();
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                commented.push('\n');
            } else if (line.starts_with('[') && trimmed.ends_with(']'))
                || line.starts_with("preset =")
            {
                commented.push_str(line);
                commented.push('\n');
            } else {
                commented.push_str("# ");
                commented.push_str(line);
                commented.push('\n');
            }
        }
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        }
        fs::write(path, commented).map_err(|e| Error::io(path, e))?;
        info!(
            path = %path.display(),
            preset = preset.name(),
            design = cfg.design.kind(),
            "wrote config template"
        );
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let k = self.sampler.pairs_per_subject;
        if k == 0 {
            return invalid("sampler.pairs_per_subject must be at least 1");
        }
        if !(self.sampler.max_range_ms >= 0.0) {
            return invalid("sampler.max_range_ms must be a non-negative number");
        }
        if !(self.sampler.closeness_sd >= 0.0) {
            return invalid("sampler.closeness_sd must be a non-negative number");
        }
        if self.sampler.max_attempts == 0 {
            return invalid("sampler.max_attempts must be at least 1");
        }
        if self.balance.max_pair_uses == 0 {
            return invalid("balance.max_pair_uses must be at least 1");
        }
        if self.balance.max_population_attempts == 0 {
            return invalid("balance.max_population_attempts must be at least 1");
        }
        if self.output.chunk_rows == 0 {
            return invalid("output.chunk_rows must be at least 1");
        }

        let mut seen = HashSet::new();
        for name in &self.roster.subjects {
            if name.trim().is_empty() {
                return invalid("roster.subjects contains an empty name");
            }
            if !seen.insert(name.as_str()) {
                return invalid(&format!("roster.subjects lists `{name}` twice"));
            }
        }

        let positions = &self.stimulus.positions;
        let distinct: HashSet<_> = positions.iter().collect();
        if distinct.len() != positions.len() || positions.contains(&SENTINEL) {
            return invalid("stimulus.positions must be distinct and non-zero");
        }
        if 2 * k > positions.len() {
            return invalid(&format!(
                "{k} disjoint pairs need {} positions, alphabet has {}",
                2 * k,
                positions.len()
            ));
        }
        let max_len = positions
            .len()
            .saturating_sub(2)
            .min(self.stimulus.row_width);

        let check_len = |len: usize| -> Result<()> {
            if len < 2 || len > max_len {
                return invalid(&format!(
                    "sequence length {len} must be within 2..={max_len} for this alphabet and row width"
                ));
            }
            Ok(())
        };

        match &self.design {
            DesignConfig::GroupOrder(d) => {
                check_len(d.sequence_len)?;
                if d.slot_orders.is_empty() {
                    return invalid("design.slot_orders is empty");
                }
                for order in &d.slot_orders {
                    if order.len() != k {
                        return invalid(&format!("slot order {order:?} must list {k} slots"));
                    }
                    if let Some(s) = order.iter().find(|s| **s == 0 || **s >= d.sequence_len) {
                        return invalid(&format!(
                            "slot {s} is outside 1..{} for length-{} rows",
                            d.sequence_len, d.sequence_len
                        ));
                    }
                }
            }
            DesignConfig::RandomSlot(d) => {
                if d.length_orders.is_empty() {
                    return invalid("design.length_orders is empty");
                }
                for order in &d.length_orders {
                    if order.len() != k {
                        return invalid(&format!("length order {order:?} must list {k} lengths"));
                    }
                    for &len in order {
                        check_len(len)?;
                    }
                }
                if d.max_slot_run == 0 || d.max_schedule_attempts == 0 {
                    return invalid("design.max_slot_run and max_schedule_attempts must be at least 1");
                }
            }
        }
        if self.design.group_sizes().contains(&0) {
            return invalid("design.group_sizes entries must be positive");
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> Result<()> {
    Err(Error::Config(msg.to_string()))
}

/// Overlay `over` onto `base`, descending into nested tables. A design table
/// that switches `kind` replaces the base design wholesale.
fn merge_tables(base: &mut toml::Table, over: toml::Table) {
    for (key, value) in over {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(b)), toml::Value::Table(o)) if !switches_kind(b, &o) => {
                merge_tables(b, o);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn switches_kind(base: &toml::Table, over: &toml::Table) -> bool {
    matches!(
        (base.get("kind"), over.get("kind")),
        (Some(old), Some(new)) if old != new
    )
}
