//! Transition-time table: one row per measured transition between two
//! touch positions, with the observed response time.

use std::collections::HashMap;
use std::fs::read_to_string;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::stats;
use crate::error::{Error, Result};

/// Touch-target label. `0` is reserved for row padding.
pub type Position = u8;

/// Row padding value; never a valid position.
pub const SENTINEL: Position = 0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub pos1: Position,
    pub pos2: Position,
    pub time_ms: f64,
}

#[derive(Clone, Debug)]
pub struct TransitionTable {
    records: Vec<TransitionRecord>,
    mean_ms: f64,
    sd_ms: f64,
}

const COL_POS1: &str = "Pos1";
const COL_POS2: &str = "Pos2";
const COL_TIME: &str = "time";

impl TransitionTable {
    pub fn new(records: Vec<TransitionRecord>) -> Self {
        let times: Vec<f64> = records.iter().map(|r| r.time_ms).collect();
        let (mean_ms, sd_ms) = stats::mean_std(&times);
        Self {
            records,
            mean_ms,
            sd_ms,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = read_to_string(path).map_err(|e| Error::io(path, e))?;
        let table = Self::parse_csv(&text)?;
        debug!(
            target: "core::transitions",
            path = %path.display(),
            records = table.len(),
            mean_ms = table.mean_ms,
            sd_ms = table.sd_ms,
            "loaded transition table"
        );
        Ok(table)
    }

    /// Parse CSV text with a header naming at least `Pos1`, `Pos2` and `time`.
    /// Other columns (such as an exported row index) are ignored.
    pub fn parse_csv(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty());
        let (_, header) = lines.next().ok_or_else(|| Error::Table {
            line: 1,
            message: "empty CSV".to_string(),
        })?;
        let mut col_idx = HashMap::new();
        for (i, c) in header.split(',').enumerate() {
            col_idx.insert(unquote(c).to_string(), i);
        }
        let find = |name: &str| {
            col_idx.get(name).copied().ok_or_else(|| Error::Table {
                line: 1,
                message: format!("missing required column `{name}`"),
            })
        };
        let pos1_i = find(COL_POS1)?;
        let pos2_i = find(COL_POS2)?;
        let time_i = find(COL_TIME)?;

        let mut records = Vec::new();
        for (line_idx, line) in lines {
            let line_no = line_idx + 1;
            let cols: Vec<&str> = line.split(',').collect();
            let pos1 = parse_position(&cols, pos1_i, COL_POS1, line_no)?;
            let pos2 = parse_position(&cols, pos2_i, COL_POS2, line_no)?;
            let time_ms = parse_field::<f64>(&cols, time_i, COL_TIME, line_no)?;
            if !time_ms.is_finite() {
                return Err(Error::Table {
                    line: line_no,
                    message: format!("non-finite time {time_ms}"),
                });
            }
            records.push(TransitionRecord {
                pos1,
                pos2,
                time_ms,
            });
        }
        Ok(Self::new(records))
    }

    pub fn records(&self) -> &[TransitionRecord] {
        &self.records
    }

    pub fn get(&self, idx: usize) -> Option<&TransitionRecord> {
        self.records.get(idx)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Mean response time over the whole table.
    pub fn mean_ms(&self) -> f64 {
        self.mean_ms
    }

    /// Population standard deviation of response times over the whole table.
    pub fn sd_ms(&self) -> f64 {
        self.sd_ms
    }
}

fn unquote(s: &str) -> &str {
    s.trim().trim_matches('"')
}

fn parse_field<T>(cols: &[&str], idx: usize, name: &str, line: usize) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = cols.get(idx).ok_or_else(|| Error::Table {
        line,
        message: format!("missing value for `{name}`"),
    })?;
    unquote(raw).parse::<T>().map_err(|e| Error::Table {
        line,
        message: format!("invalid {name} `{}`: {e}", unquote(raw)),
    })
}

fn parse_position(cols: &[&str], idx: usize, name: &str, line: usize) -> Result<Position> {
    // Exported tables sometimes carry positions as floats ("3.0").
    let value = parse_field::<f64>(cols, idx, name, line)?;
    if value.fract() != 0.0 || value < 1.0 || value > Position::MAX as f64 {
        return Err(Error::Table {
            line,
            message: format!("{name} must be a positive integer, got {value}"),
        });
    }
    Ok(value as Position)
}
