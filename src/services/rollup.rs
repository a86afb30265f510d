//! Multi-day rollups over per-day summaries
//!
//! Folds a student's day summaries across a reporting window into rate and
//! streak figures. Summaries are passed in by the caller; nothing is cached.

use crate::domain::summary::{DayOutcome, StudentDaySummary};
use crate::domain::types::StudentKey;
use crate::services::directory::StudentDirectory;
use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;
use std::collections::BTreeMap;

/// Monday to Friday dates in `from..=to`
pub fn school_days(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    from.iter_days()
        .take_while(|d| *d <= to)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

/// Outcome per expected day, in date order. Days without a summary are absences.
pub fn day_outcomes(
    student: &StudentKey,
    days: &[NaiveDate],
    history: &[StudentDaySummary],
) -> Vec<DayOutcome> {
    let by_date: BTreeMap<NaiveDate, &StudentDaySummary> =
        history.iter().filter(|s| &s.student == student).map(|s| (s.date, s)).collect();

    let mut days = days.to_vec();
    days.sort_unstable();
    days.dedup();

    days.iter()
        .map(|d| by_date.get(d).map_or(DayOutcome::Absent, |s| s.outcome()))
        .collect()
}

/// present / expected, 0.0 for an empty window
pub fn attendance_rate(outcomes: &[DayOutcome]) -> f64 {
    if outcomes.is_empty() {
        return 0.0;
    }
    let present = outcomes.iter().filter(|o| **o != DayOutcome::Absent).count();
    present as f64 / outcomes.len() as f64
}

/// Most recent run of on-time days, ending at the last expected day
pub fn current_streak(outcomes: &[DayOutcome]) -> u32 {
    outcomes.iter().rev().take_while(|o| **o == DayOutcome::OnTime).count() as u32
}

pub fn longest_streak(outcomes: &[DayOutcome]) -> u32 {
    let mut longest = 0;
    let mut run = 0;
    for outcome in outcomes {
        if *outcome == DayOutcome::OnTime {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    longest
}

/// Figures for one student over a reporting window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRollup {
    pub student: StudentKey,
    pub expected_days: usize,
    pub on_time_days: usize,
    pub late_days: usize,
    pub absent_days: usize,
    pub late_marks: usize,
    pub attendance_rate: f64,
    pub current_streak: u32,
    pub longest_streak: u32,
    /// Latest day in the window with at least one detection
    pub last_attended: Option<NaiveDate>,
}

impl StudentRollup {
    pub fn compute(student: &StudentKey, days: &[NaiveDate], history: &[StudentDaySummary]) -> Self {
        let outcomes = day_outcomes(student, days, history);
        let count = |wanted: DayOutcome| outcomes.iter().filter(|o| **o == wanted).count();

        let in_window: Vec<&StudentDaySummary> = history
            .iter()
            .filter(|s| &s.student == student && days.contains(&s.date))
            .collect();
        let late_marks = in_window.iter().map(|s| s.late_marks.len()).sum();
        let last_attended = in_window.iter().filter(|s| s.is_present()).map(|s| s.date).max();

        Self {
            student: student.clone(),
            expected_days: outcomes.len(),
            on_time_days: count(DayOutcome::OnTime),
            late_days: count(DayOutcome::Late),
            absent_days: count(DayOutcome::Absent),
            late_marks,
            attendance_rate: attendance_rate(&outcomes),
            current_streak: current_streak(&outcomes),
            longest_streak: longest_streak(&outcomes),
            last_attended,
        }
    }

    pub fn present_days(&self) -> usize {
        self.on_time_days + self.late_days
    }
}

/// One rollup per directory student, optionally limited to one class, in key order
pub fn roster_rollups(
    directory: &StudentDirectory,
    days: &[NaiveDate],
    history: &[StudentDaySummary],
    class_filter: Option<&str>,
) -> Vec<StudentRollup> {
    directory
        .iter()
        .filter(|(_, entry)| class_filter.map_or(true, |class| entry.class_name == class))
        .map(|(key, _)| StudentRollup::compute(key, days, history))
        .collect()
}

/// Share of student-days on time / late / absent, as percentages
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AttendanceBreakdown {
    pub on_time_pct: f64,
    pub late_pct: f64,
    pub absent_pct: f64,
    pub student_days: usize,
}

impl AttendanceBreakdown {
    pub fn from_rollups<'a, I>(rollups: I) -> Self
    where
        I: IntoIterator<Item = &'a StudentRollup>,
    {
        let (mut on_time, mut late, mut absent) = (0usize, 0usize, 0usize);
        for r in rollups {
            on_time += r.on_time_days;
            late += r.late_days;
            absent += r.absent_days;
        }

        let total = on_time + late + absent;
        if total == 0 {
            return Self::default();
        }

        let pct = |n: usize| n as f64 * 100.0 / total as f64;
        Self {
            on_time_pct: pct(on_time),
            late_pct: pct(late),
            absent_pct: pct(absent),
            student_days: total,
        }
    }
}

/// Attendance rate per class (present student-days / expected student-days)
pub fn class_breakdown(
    directory: &StudentDirectory,
    rollups: &[StudentRollup],
) -> BTreeMap<String, f64> {
    let mut totals: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for rollup in rollups {
        let Some(entry) = directory.get(&rollup.student) else {
            continue;
        };
        let slot = totals.entry(entry.class_name.clone()).or_default();
        slot.0 += rollup.present_days();
        slot.1 += rollup.expected_days;
    }

    totals
        .into_iter()
        .map(|(class, (present, expected))| {
            let rate = if expected == 0 { 0.0 } else { present as f64 / expected as f64 };
            (class, rate)
        })
        .collect()
}
