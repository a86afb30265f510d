//! Attendance aggregation - raw entrance detections to per-student late marks
//!
//! One run covers one reporting date:
//! 1. Drop events for students missing from the directory (or for other dates)
//! 2. Group by student, order by time of day
//! 3. Classify each event into at most one candidate late mark
//! 4. Coalesce candidates that fall within the dedup window of the last kept mark
//! 5. Emit a summary for every student seen, even when no mark survives
//!
//! Each run owns its grouping structures; nothing is carried between runs.

use crate::domain::summary::{LateLessonMark, StudentDaySummary};
use crate::domain::types::{ArrivalStatus, AttendanceEvent, StudentKey, TimeOfDay};
use crate::services::directory::StudentDirectory;
use crate::services::schedule::ScheduleResolver;
use chrono::NaiveDate;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

/// Default coalescing window for repeated scans (minutes)
pub const DEFAULT_DEDUP_WINDOW_MINUTES: u16 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("event for {student} at {time} refers to lesson {lesson}, which is not in the schedule")]
    UnknownLesson { student: StudentKey, time: TimeOfDay, lesson: u8 },
}

/// Tunables for one aggregator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorSettings {
    /// Candidates this close (inclusive) to the last kept mark are coalesced
    pub dedup_window_minutes: u16,
    /// Upstream statuses that never produce a late mark
    pub boundary_statuses: Vec<ArrivalStatus>,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            dedup_window_minutes: DEFAULT_DEDUP_WINDOW_MINUTES,
            boundary_statuses: vec![ArrivalStatus::BeforeSchool, ArrivalStatus::AfterSchool],
        }
    }
}

/// Counters for one aggregation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationStats {
    pub events_in: usize,
    pub dropped_unknown_student: usize,
    pub dropped_other_date: usize,
    pub candidate_marks: usize,
    pub coalesced: usize,
    pub marks_kept: usize,
    pub students: usize,
}

impl AggregationStats {
    pub fn log(&self) {
        info!(
            events_in = %self.events_in,
            dropped_unknown = %self.dropped_unknown_student,
            dropped_other_date = %self.dropped_other_date,
            candidates = %self.candidate_marks,
            coalesced = %self.coalesced,
            marks = %self.marks_kept,
            students = %self.students,
            "aggregation_complete"
        );
    }
}

/// Result of one run: summaries in student-key order plus run counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationOutcome {
    pub summaries: BTreeMap<StudentKey, StudentDaySummary>,
    pub stats: AggregationStats,
}

/// Keep the first mark, then only marks more than `window_minutes` after the last kept one.
/// Input must be ordered by arrival. Returns the kept marks and the number coalesced.
pub fn coalesce_marks<I>(candidates: I, window_minutes: u16) -> (Vec<LateLessonMark>, usize)
where
    I: IntoIterator<Item = LateLessonMark>,
{
    let mut kept: Vec<LateLessonMark> = Vec::new();
    let mut coalesced = 0;

    for mark in candidates {
        match kept.last() {
            Some(last) if mark.arrival.minutes_between(last.arrival) <= window_minutes => {
                coalesced += 1;
            }
            _ => kept.push(mark),
        }
    }

    (kept, coalesced)
}

/// Turns a day's attendance events into per-student lateness summaries
pub struct Aggregator<'a> {
    schedule: &'a ScheduleResolver,
    directory: &'a StudentDirectory,
    settings: AggregatorSettings,
}

impl<'a> Aggregator<'a> {
    pub fn new(
        schedule: &'a ScheduleResolver,
        directory: &'a StudentDirectory,
        settings: AggregatorSettings,
    ) -> Self {
        Self { schedule, directory, settings }
    }

    pub fn settings(&self) -> &AggregatorSettings {
        &self.settings
    }

    /// Candidate late mark for a single event.
    ///
    /// Upstream-classified events are trusted for the lesson and skipped when
    /// on time or carrying a boundary status. Time-only events are marked
    /// against the most recently started lesson.
    pub fn classify(&self, event: &AttendanceEvent) -> Result<Option<LateLessonMark>, AggregateError> {
        let Some(classified) = &event.classified else {
            return Ok(self
                .schedule
                .latest_started_before(event.time)
                .map(|lesson| LateLessonMark::new(lesson, event.time)));
        };

        if classified.status == ArrivalStatus::OnTime
            || self.settings.boundary_statuses.contains(&classified.status)
        {
            return Ok(None);
        }

        if !self.schedule.contains(classified.lesson) {
            return Err(AggregateError::UnknownLesson {
                student: event.student.clone(),
                time: event.time,
                lesson: classified.lesson,
            });
        }

        Ok(Some(LateLessonMark::new(classified.lesson, event.time)))
    }

    /// Aggregate one reporting date. Only students with at least one event appear.
    pub fn aggregate(
        &self,
        events: &[AttendanceEvent],
        date: NaiveDate,
    ) -> Result<AggregationOutcome, AggregateError> {
        let mut stats = AggregationStats { events_in: events.len(), ..Default::default() };

        let mut groups: FxHashMap<&StudentKey, Vec<&AttendanceEvent>> = FxHashMap::default();
        for event in events {
            if !self.directory.contains(&event.student) {
                stats.dropped_unknown_student += 1;
                debug!(student = %event.student, time = %event.time, "event_dropped_unknown_student");
                continue;
            }
            if event.date != date {
                stats.dropped_other_date += 1;
                debug!(
                    student = %event.student,
                    event_date = %event.date,
                    report_date = %date,
                    "event_dropped_other_date"
                );
                continue;
            }
            groups.entry(&event.student).or_default().push(event);
        }

        let mut summaries = BTreeMap::new();
        for (student, mut group) in groups {
            // Stable: equal minutes keep input order
            group.sort_by_key(|e| e.time);

            let mut candidates = Vec::with_capacity(group.len());
            for event in &group {
                if let Some(mark) = self.classify(event)? {
                    candidates.push(mark);
                }
            }
            stats.candidate_marks += candidates.len();

            let (late_marks, coalesced) =
                coalesce_marks(candidates, self.settings.dedup_window_minutes);
            stats.coalesced += coalesced;
            stats.marks_kept += late_marks.len();

            debug!(
                student = %student,
                detections = group.len(),
                marks = late_marks.len(),
                coalesced = coalesced,
                "student_aggregated"
            );

            summaries.insert(
                student.clone(),
                StudentDaySummary {
                    student: student.clone(),
                    date,
                    late_marks,
                    detections: group.len(),
                },
            );
        }

        stats.students = summaries.len();
        Ok(AggregationOutcome { summaries, stats })
    }

    /// Like `aggregate`, plus an empty summary for every directory student with no events
    pub fn aggregate_roster(
        &self,
        events: &[AttendanceEvent],
        date: NaiveDate,
    ) -> Result<AggregationOutcome, AggregateError> {
        let mut outcome = self.aggregate(events, date)?;
        for (key, _) in self.directory.iter() {
            outcome
                .summaries
                .entry(key.clone())
                .or_insert_with(|| StudentDaySummary::new(key.clone(), date));
        }
        outcome.stats.students = outcome.summaries.len();
        Ok(outcome)
    }

    /// Roster summaries for every day in `days`, in date then student order.
    ///
    /// Feeds the multi-day rollups: one `aggregate_roster` run per day, so
    /// directory students without detections show up as absent.
    pub fn aggregate_days(
        &self,
        events: &[AttendanceEvent],
        days: &[NaiveDate],
    ) -> Result<Vec<StudentDaySummary>, AggregateError> {
        let mut history = Vec::with_capacity(days.len() * self.directory.len());
        for date in days {
            let outcome = self.aggregate_roster(events, *date)?;
            debug!(
                date = %date,
                students = %outcome.stats.students,
                marks = %outcome.stats.marks_kept,
                "day_aggregated"
            );
            history.extend(outcome.summaries.into_values());
        }
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::summary::DayOutcome;
    use crate::services::directory::sample_directory;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn ev(student: &str, time: &str) -> AttendanceEvent {
        AttendanceEvent::new(student, date(), t(time))
    }

    fn run(events: &[AttendanceEvent]) -> AggregationOutcome {
        let schedule = ScheduleResolver::reference();
        let directory = sample_directory();
        let aggregator = Aggregator::new(&schedule, &directory, AggregatorSettings::default());
        aggregator.aggregate(events, date()).unwrap()
    }

    fn marks(outcome: &AggregationOutcome, student: &str) -> Vec<(u8, String)> {
        outcome.summaries[&StudentKey::from(student)]
            .late_marks
            .iter()
            .map(|m| (m.lesson, m.arrival.to_string()))
            .collect()
    }

    #[test]
    fn test_duplicate_scans_coalesce() {
        let outcome = run(&[ev("JAFAR", "09:12"), ev("JAFAR", "09:14")]);
        assert_eq!(marks(&outcome, "JAFAR"), vec![(2, "09:12".to_string())]);
        assert_eq!(outcome.stats.coalesced, 1);
        assert_eq!(outcome.summaries[&StudentKey::from("JAFAR")].detections, 2);
    }

    #[test]
    fn test_separate_late_arrivals_kept() {
        let outcome = run(&[ev("JAFAR", "09:12"), ev("JAFAR", "13:25")]);
        assert_eq!(
            marks(&outcome, "JAFAR"),
            vec![(2, "09:12".to_string()), (7, "13:25".to_string())]
        );
    }

    #[test]
    fn test_exactly_window_apart_is_coalesced() {
        let outcome = run(&[ev("JAFAR", "09:12"), ev("JAFAR", "09:17"), ev("JAFAR", "09:18")]);
        // 09:17 is 5 minutes after the kept 09:12; 09:18 is 6
        assert_eq!(
            marks(&outcome, "JAFAR"),
            vec![(2, "09:12".to_string()), (2, "09:18".to_string())]
        );
    }

    #[test]
    fn test_compares_against_last_kept_not_last_raw() {
        // Chain of scans every 3 minutes: each is within 5 of its raw neighbour,
        // but only within 5 of the last kept mark every other step
        let outcome = run(&[
            ev("AZIZ", "10:01"),
            ev("AZIZ", "10:04"),
            ev("AZIZ", "10:07"),
            ev("AZIZ", "10:10"),
        ]);
        assert_eq!(
            marks(&outcome, "AZIZ"),
            vec![(3, "10:01".to_string()), (3, "10:07".to_string())]
        );
    }

    #[test]
    fn test_unsorted_input_is_ordered() {
        let outcome = run(&[ev("JAFAR", "13:25"), ev("JAFAR", "09:12"), ev("JAFAR", "09:14")]);
        assert_eq!(
            marks(&outcome, "JAFAR"),
            vec![(2, "09:12".to_string()), (7, "13:25".to_string())]
        );
    }

    #[test]
    fn test_unknown_student_dropped() {
        let outcome = run(&[ev("UNKNOWN", "09:30"), ev("KEREY", "09:30")]);
        assert!(!outcome.summaries.contains_key(&StudentKey::from("UNKNOWN")));
        assert_eq!(outcome.summaries.len(), 1);
        assert_eq!(outcome.stats.dropped_unknown_student, 1);
    }

    #[test]
    fn test_on_time_student_still_emitted() {
        let outcome = run(&[ev("KEREY", "07:55"), ev("KEREY", "08:20")]);
        let summary = &outcome.summaries[&StudentKey::from("KEREY")];
        assert!(summary.late_marks.is_empty());
        assert_eq!(summary.detections, 2);
    }

    #[test]
    fn test_empty_input() {
        let outcome = run(&[]);
        assert!(outcome.summaries.is_empty());
        assert_eq!(outcome.stats, AggregationStats::default());
    }

    #[test]
    fn test_other_date_dropped() {
        let other = AttendanceEvent::new("JAFAR", date().succ_opt().unwrap(), t("09:30"));
        let outcome = run(&[other]);
        assert!(outcome.summaries.is_empty());
        assert_eq!(outcome.stats.dropped_other_date, 1);
    }

    #[test]
    fn test_roster_includes_absent_students() {
        let schedule = ScheduleResolver::reference();
        let directory = sample_directory();
        let aggregator = Aggregator::new(&schedule, &directory, AggregatorSettings::default());

        let outcome = aggregator.aggregate_roster(&[ev("JAFAR", "09:12")], date()).unwrap();
        assert_eq!(outcome.summaries.len(), 3);
        let aziz = &outcome.summaries[&StudentKey::from("AZIZ")];
        assert!(aziz.late_marks.is_empty());
        assert_eq!(aziz.detections, 0);
        assert_eq!(outcome.stats.students, 3);
    }

    #[test]
    fn test_preclassified_events() {
        let outcome = run(&[
            ev("JAFAR", "08:10").with_classification(1, ArrivalStatus::BeforeSchool),
            ev("JAFAR", "08:40").with_classification(1, ArrivalStatus::Late),
            ev("JAFAR", "11:00").with_classification(4, ArrivalStatus::OnTime),
            ev("JAFAR", "15:00").with_classification(8, ArrivalStatus::AfterSchool),
        ]);
        assert_eq!(marks(&outcome, "JAFAR"), vec![(1, "08:40".to_string())]);
    }

    #[test]
    fn test_preclassified_unknown_lesson_fails() {
        let schedule = ScheduleResolver::reference();
        let directory = sample_directory();
        let aggregator = Aggregator::new(&schedule, &directory, AggregatorSettings::default());

        let events = [ev("JAFAR", "09:30").with_classification(12, ArrivalStatus::Late)];
        assert_eq!(
            aggregator.aggregate(&events, date()).unwrap_err(),
            AggregateError::UnknownLesson {
                student: StudentKey::from("JAFAR"),
                time: t("09:30"),
                lesson: 12,
            }
        );
    }

    #[test]
    fn test_custom_window() {
        let schedule = ScheduleResolver::reference();
        let directory = sample_directory();
        let settings = AggregatorSettings { dedup_window_minutes: 1, ..Default::default() };
        let aggregator = Aggregator::new(&schedule, &directory, settings);

        let outcome = aggregator
            .aggregate(&[ev("JAFAR", "09:12"), ev("JAFAR", "09:14")], date())
            .unwrap();
        assert_eq!(outcome.summaries[&StudentKey::from("JAFAR")].late_marks.len(), 2);
    }

    #[test]
    fn test_deterministic() {
        let events = [
            ev("JAFAR", "09:12"),
            ev("AZIZ", "10:02"),
            ev("UNKNOWN", "10:02"),
            ev("KEREY", "08:00"),
            ev("JAFAR", "13:25"),
        ];
        assert_eq!(run(&events), run(&events));
    }

    #[test]
    fn test_aggregate_days_covers_roster_per_day() {
        let schedule = ScheduleResolver::reference();
        let directory = sample_directory();
        let aggregator = Aggregator::new(&schedule, &directory, AggregatorSettings::default());

        let other_day = NaiveDate::from_ymd_opt(2025, 3, 13).unwrap();
        let events = [
            AttendanceEvent::new("JAFAR", other_day, t("09:12")),
            ev("JAFAR", "08:00"),
            ev("UNKNOWN", "08:00"),
        ];

        let history = aggregator.aggregate_days(&events, &[other_day, date()]).unwrap();
        assert_eq!(history.len(), 6);
        assert!(history[..3].iter().all(|s| s.date == other_day));
        assert!(history[3..].iter().all(|s| s.date == date()));

        let jafar: Vec<_> =
            history.iter().filter(|s| s.student.as_str() == "JAFAR").map(|s| s.outcome()).collect();
        assert_eq!(jafar, vec![DayOutcome::Late, DayOutcome::OnTime]);
        assert!(aggregator.aggregate_days(&events, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_coalesce_marks_keeps_first() {
        let (kept, coalesced) = coalesce_marks([LateLessonMark::new(1, t("08:30"))], 5);
        assert_eq!(kept, vec![LateLessonMark::new(1, t("08:30"))]);
        assert_eq!(coalesced, 0);

        let (kept, coalesced) = coalesce_marks(Vec::new(), 5);
        assert!(kept.is_empty());
        assert_eq!(coalesced, 0);
    }
}
