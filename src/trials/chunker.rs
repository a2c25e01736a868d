//! Splits master files into fixed-size delivery chunks.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Split `text` after every `rows_per_chunk` newline-terminated rows. The
/// last chunk holds whatever is left, including an unterminated final row.
/// Concatenating the chunks gives back `text` exactly.
pub fn split_rows(text: &str, rows_per_chunk: usize) -> Vec<&str> {
    let rows_per_chunk = rows_per_chunk.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut rows = 0;
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            rows += 1;
            if rows == rows_per_chunk {
                chunks.push(&text[start..=i]);
                start = i + 1;
                rows = 0;
            }
        }
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

/// `{subject}_{n}.txt`, `n` starting at 1.
pub fn chunk_file_name(subject: &str, index: usize) -> String {
    format!("{subject}_{}.txt", index + 1)
}

/// Write the chunks of `master` into `out_dir`, returning their paths in order.
pub fn chunk_master(
    master: &Path,
    out_dir: &Path,
    subject: &str,
    rows_per_chunk: usize,
) -> Result<Vec<PathBuf>> {
    let text = fs::read_to_string(master).map_err(|e| Error::io(master, e))?;
    let mut paths = Vec::new();
    for (i, chunk) in split_rows(&text, rows_per_chunk).into_iter().enumerate() {
        let path = out_dir.join(chunk_file_name(subject, i));
        fs::write(&path, chunk).map_err(|e| Error::io(&path, e))?;
        paths.push(path);
    }
    debug!(target: "trials::chunker", subject, chunks = paths.len(), "chunked master file");
    Ok(paths)
}
