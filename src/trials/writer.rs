//! Master trial files and the per-subject metadata table.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::assembler::SubjectTrials;
use super::trial::RowFormat;
use crate::core::stats;
use crate::error::{Error, Result};

/// Write every block of one subject, in order, to `path`. The file is
/// closed before returning. Returns the number of rows written.
pub fn write_master(path: &Path, trials: &SubjectTrials, fmt: &RowFormat) -> Result<usize> {
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut w = BufWriter::new(file);
    let mut rows = 0;
    for block in &trials.blocks {
        for trial in &block.trials {
            fmt.write_row(&mut w, trial, &block.label)
                .map_err(|e| Error::io(path, e))?;
            rows += 1;
        }
    }
    w.flush().map_err(|e| Error::io(path, e))?;
    Ok(rows)
}

fn bracketed<T: std::fmt::Display>(items: impl IntoIterator<Item = T>) -> String {
    let parts: Vec<String> = items.into_iter().map(|x| x.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

/// Tab-separated summary: one row per subject with group, order, pairs,
/// pair times and mean time.
pub struct MetaWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl MetaWriter {
    pub fn create(path: &Path, pairs_per_subject: usize) -> Result<Self> {
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut out = BufWriter::new(file);
        let mut header = vec!["subject".to_string(), "group".into(), "order".into()];
        for i in 1..=pairs_per_subject {
            header.push(format!("reg{i}"));
            header.push(format!("reg{i}_rt"));
        }
        header.push("mean_rt".into());
        writeln!(out, "{}", header.join("\t")).map_err(|e| Error::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            out,
        })
    }

    pub fn write_subject(&mut self, trials: &SubjectTrials) -> Result<()> {
        let mut cols = vec![
            trials.subject.clone(),
            trials.group.to_string(),
            bracketed(&trials.order),
        ];
        for p in &trials.pairs {
            cols.push(bracketed([p.pos1, p.pos2]));
            cols.push(format!("{:.2}", stats::round_to(p.time_ms, 2)));
        }
        let times: Vec<f64> = trials.pairs.iter().map(|p| p.time_ms).collect();
        cols.push(format!("{:.2}", stats::round_to(stats::mean(&times), 2)));
        writeln!(self.out, "{}", cols.join("\t")).map_err(|e| Error::io(&self.path, e))
    }

    pub fn finish(mut self) -> Result<()> {
        self.out.flush().map_err(|e| Error::io(&self.path, e))
    }
}
