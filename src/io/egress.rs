//! Summary egress - day summaries as a JSONL file
//!
//! One JSON object per line, directory fields merged in, so downstream
//! dashboards can tail the file. A batch replaces any lines already in the
//! file for the batch's dates: re-running a day leaves one line per student
//! per date, and other days stay as they were.

use crate::domain::summary::StudentDaySummary;
use crate::services::directory::StudentDirectory;
use anyhow::Context;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;
use tracing::{debug, error, info};

/// Egress writer for day summaries
pub struct Egress {
    file_path: String,
}

impl Egress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write a batch of summaries, returning how many lines were written.
    ///
    /// Any I/O failure fails the whole batch.
    pub fn write_summaries<'a, I>(
        &self,
        summaries: I,
        directory: &StudentDirectory,
    ) -> anyhow::Result<usize>
    where
        I: IntoIterator<Item = &'a StudentDaySummary>,
    {
        let summaries: Vec<&StudentDaySummary> = summaries.into_iter().collect();

        match self.rewrite(&summaries, directory) {
            Ok(kept) => {
                info!(
                    file = %self.file_path,
                    kept = kept,
                    written = summaries.len(),
                    "egress_batch_complete"
                );
                Ok(summaries.len())
            }
            Err(e) => {
                error!(file = %self.file_path, error = %format!("{:#}", e), "egress_batch_failed");
                Err(e)
            }
        }
    }

    /// Rewrite the file with foreign-date lines first, then the batch. Returns the kept count.
    fn rewrite(
        &self,
        summaries: &[&StudentDaySummary],
        directory: &StudentDirectory,
    ) -> anyhow::Result<usize> {
        let path = Path::new(&self.file_path);
        let dates: BTreeSet<String> = summaries.iter().map(|s| s.date.to_string()).collect();

        let kept: Vec<String> = match fs::read_to_string(path) {
            Ok(content) => content
                .lines()
                .filter(|line| !line.trim().is_empty() && !line_has_date(line, &dates))
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {}", parent.display()))?;
            }
        }

        let file = File::create(path)
            .with_context(|| format!("Failed to create egress file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        let write_failed = || format!("Failed to write egress file {}", path.display());

        for line in &kept {
            writeln!(writer, "{}", line).with_context(write_failed)?;
        }
        for summary in summaries {
            let json = summary.to_json_with_entry(directory.get(&summary.student));
            writeln!(writer, "{}", json).with_context(write_failed)?;
            debug!(
                student = %summary.student,
                date = %summary.date,
                marks = %summary.late_marks.len(),
                "summary_egressed"
            );
        }
        writer.flush().with_context(write_failed)?;

        Ok(kept.len())
    }
}

/// Whether a JSONL line is a summary for one of `dates`. Lines that are not
/// summaries never match.
fn line_has_date(line: &str, dates: &BTreeSet<String>) -> bool {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|value| value.get("date").and_then(|d| d.as_str()).map(|d| dates.contains(d)))
        .unwrap_or(false)
}
