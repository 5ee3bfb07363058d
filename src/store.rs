use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;

use crate::sample::{SampleRecord, TIMESTAMP_FORMAT};

/// Column header, emitted exactly once per target file.
pub const HEADER: &str = "timestamp,first_token_latency_ms,total_latency_ms,\
tokens_per_second,completion_tokens,prompt_tokens,error,model";

// ─── Replay types ────────────────────────────────────────────────

/// One line of replayed history: either a fully-parsed record or a
/// malformed-line marker with whatever was recoverable.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayRow {
    Record(SampleRecord),
    Malformed(MalformedLine),
}

/// A row that failed structural parsing — truncated by a crash, or an
/// error message with embedded commas. Still counts toward totals and,
/// when a timestamp is recoverable, toward the rolling error series.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedLine {
    pub raw: String,
    /// First field, when it parses as a full instant.
    pub timestamp: Option<NaiveDateTime>,
    /// Raw-text scan for the API-error marker.
    pub api_error: bool,
}

/// Best-effort recovery from a structurally unparsable line.
fn recover_malformed(line: &str) -> MalformedLine {
    let first_field = line.split(',').next().unwrap_or("");
    MalformedLine {
        raw: line.to_string(),
        timestamp: NaiveDateTime::parse_from_str(first_field, TIMESTAMP_FORMAT).ok(),
        api_error: line.contains("APIError"),
    }
}

// ─── Append side ─────────────────────────────────────────────────

/// Append-only durable log of sample records. Single writer; each
/// append is flushed before the call returns so a sample survives an
/// immediate process crash.
pub struct SampleStore {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl SampleStore {
    /// Open (or create) the target for appending. The header goes out
    /// on the first write to a fresh target; reopening an existing
    /// target never re-emits it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open store at {}", path.display()))?;

        let fresh = file
            .metadata()
            .with_context(|| format!("failed to stat store at {}", path.display()))?
            .len()
            == 0;

        let mut store = Self {
            path,
            writer: BufWriter::new(file),
        };

        if fresh {
            store
                .write_line(HEADER)
                .context("failed to write store header")?;
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush. This is the durability point: once
    /// this returns, the sample is on disk.
    pub fn append(&mut self, record: &SampleRecord) -> Result<()> {
        self.write_line(&record.to_row())
            .with_context(|| format!("failed to append to {}", self.path.display()))
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        Ok(())
    }
}

// ─── Replay side ─────────────────────────────────────────────────

/// Replay the full history at `path`. Malformed lines never abort the
/// scan; each is surfaced as a marker. Header lines (one per file, but
/// tolerated anywhere — concatenated stores exist) are skipped.
pub fn replay(path: &Path) -> Result<Vec<ReplayRow>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open store at {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut rows = Vec::new();
    for line in reader.lines() {
        let line = line
            .with_context(|| format!("failed to read store at {}", path.display()))?;

        if line.is_empty() || line.starts_with("timestamp,") {
            continue;
        }

        match SampleRecord::parse_row(&line) {
            Some(record) => rows.push(ReplayRow::Record(record)),
            None => {
                tracing::warn!(line = %line, "unparsable store row, keeping as marker");
                rows.push(ReplayRow::Malformed(recover_malformed(&line)));
            }
        }
    }

    Ok(rows)
}

// ─── Tests ───────────────────────────────────────────────────────
