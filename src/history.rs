//! Append-only command history with incremental file persistence.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// In-memory ordered record of submitted lines.
///
/// The persisted offset counts entries already written to a backing file and
/// changes only through [`load`](Self::load), [`write_all`](Self::write_all)
/// and [`append_new`](Self::append_new), never through plain appends.
#[derive(Debug, Default, Clone)]
pub struct HistoryLog {
    entries: Vec<String>,
    persisted: usize,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one submitted line.
    pub fn append(&mut self, line: impl Into<String>) {
        self.entries.push(line.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    #[cfg(test)]
    pub(crate) fn persisted(&self) -> usize {
        self.persisted
    }

    /// Render entries with their 1-based sequence numbers. With a limit only
    /// the last `limit` entries are shown, original numbering preserved.
    pub fn list(&self, limit: Option<usize>) -> String {
        let start = match limit {
            Some(n) => self.entries.len().saturating_sub(n),
            None => 0,
        };
        let mut out = String::new();
        for (i, entry) in self.entries.iter().enumerate().skip(start) {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("{:5}  {}", i + 1, entry));
        }
        out
    }

    /// Replace the in-memory log with the file contents and mark everything
    /// as persisted.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path)
            .with_context(|| format!("history: cannot read {}", path.display()))?;
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line =
                line.with_context(|| format!("history: cannot read {}", path.display()))?;
            if !line.is_empty() {
                entries.push(line);
            }
        }
        self.entries = entries;
        self.persisted = self.entries.len();
        Ok(())
    }

    /// Overwrite the file with the entire log.
    pub fn write_all(&mut self, path: &Path) -> Result<()> {
        let mut file = File::create(path)
            .with_context(|| format!("history: cannot write {}", path.display()))?;
        file.write_all(render(&self.entries).as_bytes())
            .with_context(|| format!("history: cannot write {}", path.display()))?;
        self.persisted = self.entries.len();
        Ok(())
    }

    /// Append only the entries added since the last persistence operation.
    pub fn append_new(&mut self, path: &Path) -> Result<()> {
        let fresh = &self.entries[self.persisted.min(self.entries.len())..];
        if !fresh.is_empty() {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("history: cannot write {}", path.display()))?;
            file.write_all(render(fresh).as_bytes())
                .with_context(|| format!("history: cannot write {}", path.display()))?;
        }
        self.persisted = self.entries.len();
        Ok(())
    }
}

fn render(entries: &[String]) -> String {
    let mut buf = String::new();
    for entry in entries {
        buf.push_str(entry);
        buf.push('\n');
    }
    buf
}
