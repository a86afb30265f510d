//! Tabular report export (CSV)
//!
//! Daily table: one row per late mark. Students without marks get a single
//! row so that "no missed lessons" and "absent" stay visible in the table.
//!
//! Rollup table: one row per student over a reporting window.

use crate::domain::summary::{DayOutcome, StudentDaySummary};
use crate::services::directory::StudentDirectory;
use crate::services::rollup::StudentRollup;
use anyhow::Context;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::info;

pub const STATUS_LATE: &str = "Late";
pub const STATUS_NO_MISSED: &str = "No missed lessons";
pub const STATUS_ABSENT: &str = "Absent";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    #[serde(rename = "Student ID")]
    pub student_id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Class")]
    pub class_name: String,
    #[serde(rename = "Curator")]
    pub curator: String,
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "Lesson")]
    pub lesson: Option<u8>,
    #[serde(rename = "Status")]
    pub status: &'static str,
    #[serde(rename = "Date")]
    pub date: String,
}

/// Flatten summaries into report rows, merging directory fields.
///
/// With `class_filter`, students from other classes (or missing from the
/// directory) are skipped.
pub fn report_rows<'a, I>(
    summaries: I,
    directory: &StudentDirectory,
    class_filter: Option<&str>,
) -> Vec<ReportRow>
where
    I: IntoIterator<Item = &'a StudentDaySummary>,
{
    let mut rows = Vec::new();

    for summary in summaries {
        let entry = directory.get(&summary.student);
        if let Some(class) = class_filter {
            if entry.map(|e| e.class_name.as_str()) != Some(class) {
                continue;
            }
        }

        let row = |time: String, lesson: Option<u8>, status: &'static str| ReportRow {
            student_id: entry.map(|e| e.id.clone()).unwrap_or_default(),
            name: entry
                .map(|e| e.display_name.clone())
                .unwrap_or_else(|| summary.student.to_string()),
            class_name: entry.map(|e| e.class_name.clone()).unwrap_or_default(),
            curator: entry.map(|e| e.curator_name.clone()).unwrap_or_default(),
            time,
            lesson,
            status,
            date: summary.date.to_string(),
        };

        match summary.outcome() {
            DayOutcome::Late => {
                for mark in &summary.late_marks {
                    rows.push(row(mark.arrival.to_string(), Some(mark.lesson), STATUS_LATE));
                }
            }
            DayOutcome::OnTime => rows.push(row(String::new(), None, STATUS_NO_MISSED)),
            DayOutcome::Absent => rows.push(row(String::new(), None, STATUS_ABSENT)),
        }
    }

    rows
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupRow {
    #[serde(rename = "Student ID")]
    pub student_id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Class")]
    pub class_name: String,
    #[serde(rename = "Curator")]
    pub curator: String,
    #[serde(rename = "School Days")]
    pub expected_days: usize,
    #[serde(rename = "On Time")]
    pub on_time_days: usize,
    #[serde(rename = "Late")]
    pub late_days: usize,
    #[serde(rename = "Absent")]
    pub absent_days: usize,
    #[serde(rename = "Late Lessons")]
    pub late_marks: usize,
    #[serde(rename = "Streak")]
    pub current_streak: u32,
    #[serde(rename = "Longest Streak")]
    pub longest_streak: u32,
    #[serde(rename = "Attendance Rate")]
    pub attendance_rate: String,
    #[serde(rename = "Last Attendance")]
    pub last_attendance: String,
}

/// One row per rollup, directory fields merged in. Rate is a percentage with one decimal.
pub fn rollup_rows(rollups: &[StudentRollup], directory: &StudentDirectory) -> Vec<RollupRow> {
    rollups
        .iter()
        .map(|rollup| {
            let entry = directory.get(&rollup.student);
            RollupRow {
                student_id: entry.map(|e| e.id.clone()).unwrap_or_default(),
                name: entry
                    .map(|e| e.display_name.clone())
                    .unwrap_or_else(|| rollup.student.to_string()),
                class_name: entry.map(|e| e.class_name.clone()).unwrap_or_default(),
                curator: entry.map(|e| e.curator_name.clone()).unwrap_or_default(),
                expected_days: rollup.expected_days,
                on_time_days: rollup.on_time_days,
                late_days: rollup.late_days,
                absent_days: rollup.absent_days,
                late_marks: rollup.late_marks,
                current_streak: rollup.current_streak,
                longest_streak: rollup.longest_streak,
                attendance_rate: format!("{:.1}%", rollup.attendance_rate * 100.0),
                last_attendance: rollup.last_attended.map(|d| d.to_string()).unwrap_or_default(),
            }
        })
        .collect()
}

/// Write rows as CSV with a header line
pub fn write_csv<W: Write, T: Serialize>(writer: W, rows: &[T]) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write rows to a CSV file, creating parent directories. Returns the row count.
pub fn write_csv_file<P: AsRef<Path>, T: Serialize>(path: P, rows: &[T]) -> anyhow::Result<usize> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }

    let file = File::create(path)
        .with_context(|| format!("Failed to create report file {}", path.display()))?;
    write_csv(file, rows).with_context(|| format!("Failed to write report {}", path.display()))?;

    info!(file = %path.display(), rows = rows.len(), "report_written");
    Ok(rows.len())
}
