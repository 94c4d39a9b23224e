//! Hand a materialized result to disk: JSONL (one object per row), a JSON array, or TSV.
//! Each writer goes through a temp file that is promoted atomically.

use crate::result::ResultSet;
use crate::util::{create_with_backoff, replace_file_atomic_backoff};
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const WRITE_BUF: usize = 256 * 1024;

/// Buffered writer over `<dest>.tmp`, promoted to `dest` by `finish`.
struct AtomicWriter {
    tmp: PathBuf,
    dest: PathBuf,
    w: BufWriter<File>,
}

impl AtomicWriter {
    fn create(dest: &Path) -> Result<Self> {
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
            }
        }
        let mut tmp = dest.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let f = create_with_backoff(&tmp, 16, 50).with_context(|| format!("create {}", tmp.display()))?;
        Ok(Self { tmp, dest: dest.to_path_buf(), w: BufWriter::with_capacity(WRITE_BUF, f) })
    }

    fn finish(mut self) -> Result<()> {
        self.w.flush().with_context(|| format!("flush {}", self.tmp.display()))?;
        drop(self.w);
        replace_file_atomic_backoff(&self.tmp, &self.dest)
    }
}

/// One JSON object per line, keys in column order.
pub fn write_jsonl(rs: &ResultSet, out_path: &Path) -> Result<u64> {
    let mut aw = AtomicWriter::create(out_path)?;
    let mut n = 0u64;
    for rec in rs.records() {
        serde_json::to_writer(&mut aw.w, &rec)?;
        aw.w.write_all(b"\n")?;
        n += 1;
    }
    aw.finish()?;
    tracing::info!(path=%out_path.display(), rows=n, "wrote JSONL");
    Ok(n)
}

pub fn write_json_array(rs: &ResultSet, out_path: &Path, pretty: bool) -> Result<u64> {
    let mut aw = AtomicWriter::create(out_path)?;
    let mut n = 0u64;
    aw.w.write_all(if pretty { b"[\n" } else { b"[" })?;
    for rec in rs.records() {
        if n > 0 {
            aw.w.write_all(if pretty { b",\n" } else { b"," })?;
        }
        if pretty {
            serde_json::to_writer_pretty(&mut aw.w, &rec)?;
        } else {
            serde_json::to_writer(&mut aw.w, &rec)?;
        }
        n += 1;
    }
    aw.w.write_all(if pretty { b"\n]" } else { b"]" })?;
    aw.finish()?;
    tracing::info!(path=%out_path.display(), rows=n, "wrote JSON array");
    Ok(n)
}

/// Header line of column names, then one line per row. Backslash, tab, CR and LF inside
/// values are escaped as `\\`, `\t`, `\r` and `\n`.
pub fn write_tsv(rs: &ResultSet, out_path: &Path) -> Result<u64> {
    let mut aw = AtomicWriter::create(out_path)?;
    writeln!(aw.w, "{}", rs.columns().iter().map(|c| tsv_field(c)).collect::<Vec<_>>().join("\t"))?;
    let mut n = 0u64;
    for row in rs.rows() {
        let line: Vec<String> = row.iter().map(|v| tsv_field(&v.to_string())).collect();
        writeln!(aw.w, "{}", line.join("\t"))?;
        n += 1;
    }
    aw.finish()?;
    tracing::info!(path=%out_path.display(), rows=n, "wrote TSV");
    Ok(n)
}

fn tsv_field(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}
