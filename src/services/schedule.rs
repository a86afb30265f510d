//! Lesson schedule lookup
//!
//! Answers "which lessons had already started by this time" against an
//! immutable timetable. Comparison is time-of-day only at minute resolution;
//! a lesson counts as started when its start is strictly before the query.

use crate::domain::types::{LessonWindow, TimeOfDay};
use smallvec::SmallVec;
use thiserror::Error;
use tracing::debug;

/// Ordinals of started lessons; a school day fits inline
pub type LessonSet = SmallVec<[u8; 8]>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("schedule has no lessons")]
    Empty,
    #[error("schedule has {count} lessons, at most 255 are supported")]
    TooManyLessons { count: usize },
    #[error("lesson ordinals must run 1, 2, 3, ...: expected {expected}, found {found}")]
    OrdinalOutOfSequence { expected: u8, found: u8 },
    #[error("lesson {ordinal} starts at {start}, before the previous lesson's start {previous}")]
    StartDecreasing { ordinal: u8, start: TimeOfDay, previous: TimeOfDay },
    #[error("lesson {ordinal} ends at {end}, before it starts at {start}")]
    EndBeforeStart { ordinal: u8, start: TimeOfDay, end: TimeOfDay },
}

/// Reference timetable: (start, end) per lesson, last lesson runs to end of day
const REFERENCE_TIMETABLE: [((u8, u8), (u8, u8)); 8] = [
    ((8, 20), (9, 5)),
    ((9, 10), (9, 55)),
    ((10, 0), (10, 45)),
    ((10, 50), (11, 35)),
    ((11, 40), (12, 25)),
    ((12, 30), (13, 15)),
    ((13, 20), (14, 5)),
    ((14, 10), (23, 59)),
];

/// Read-only lesson timetable
#[derive(Debug, Clone)]
pub struct ScheduleResolver {
    windows: Vec<LessonWindow>,
}

impl ScheduleResolver {
    /// Build a resolver, validating ordinals and start ordering
    pub fn new(windows: Vec<LessonWindow>) -> Result<Self, ScheduleError> {
        if windows.is_empty() {
            return Err(ScheduleError::Empty);
        }
        if windows.len() > usize::from(u8::MAX) {
            return Err(ScheduleError::TooManyLessons { count: windows.len() });
        }

        let mut previous: Option<&LessonWindow> = None;
        for (i, window) in windows.iter().enumerate() {
            let expected = (i + 1) as u8;
            if window.ordinal != expected {
                return Err(ScheduleError::OrdinalOutOfSequence {
                    expected,
                    found: window.ordinal,
                });
            }
            if window.end < window.start {
                return Err(ScheduleError::EndBeforeStart {
                    ordinal: window.ordinal,
                    start: window.start,
                    end: window.end,
                });
            }
            if let Some(prev) = previous {
                if window.start < prev.start {
                    return Err(ScheduleError::StartDecreasing {
                        ordinal: window.ordinal,
                        start: window.start,
                        previous: prev.start,
                    });
                }
            }
            previous = Some(window);
        }

        debug!(lessons = windows.len(), "schedule_loaded");
        Ok(Self { windows })
    }

    /// The eight-lesson reference timetable (08:20 to end of day)
    pub fn reference() -> Self {
        let windows = REFERENCE_TIMETABLE
            .iter()
            .zip(1u8..)
            .filter_map(|(&((sh, sm), (eh, em)), ordinal)| {
                Some(LessonWindow::new(
                    ordinal,
                    TimeOfDay::from_hm(sh, sm)?,
                    TimeOfDay::from_hm(eh, em)?,
                ))
            })
            .collect();
        Self { windows }
    }

    /// Ordinals of every lesson whose start is strictly before `time`, ascending
    pub fn lessons_started_before(&self, time: TimeOfDay) -> LessonSet {
        self.windows.iter().take_while(|w| w.start < time).map(|w| w.ordinal).collect()
    }

    /// Most recently started lesson at `time`, if any
    pub fn latest_started_before(&self, time: TimeOfDay) -> Option<u8> {
        let started = self.windows.partition_point(|w| w.start < time);
        started.checked_sub(1).map(|idx| self.windows[idx].ordinal)
    }

    pub fn window(&self, ordinal: u8) -> Option<&LessonWindow> {
        self.windows.get(usize::from(ordinal).checked_sub(1)?)
    }

    pub fn contains(&self, ordinal: u8) -> bool {
        self.window(ordinal).is_some()
    }

    pub fn windows(&self) -> &[LessonWindow] {
        &self.windows
    }

    pub fn first_start(&self) -> TimeOfDay {
        // Non-empty by construction
        self.windows.first().map_or(TimeOfDay::END_OF_DAY, |w| w.start)
    }
}

impl Default for ScheduleResolver {
    fn default() -> Self {
        Self::reference()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    #[test]
    fn test_reference_schedule_shape() {
        let schedule = ScheduleResolver::reference();
        assert_eq!(schedule.windows().len(), 8);
        assert_eq!(schedule.first_start(), t("08:20"));
        assert_eq!(schedule.window(8).unwrap().end, TimeOfDay::END_OF_DAY);
        // Reference table passes its own validation
        assert!(ScheduleResolver::new(schedule.windows().to_vec()).is_ok());
    }

    #[test]
    fn test_before_first_lesson() {
        let schedule = ScheduleResolver::reference();
        assert!(schedule.lessons_started_before(t("08:05")).is_empty());
        assert!(schedule.lessons_started_before(t("00:00")).is_empty());
        assert_eq!(schedule.latest_started_before(t("08:05")), None);
    }

    #[test]
    fn test_start_boundary_is_exclusive() {
        let schedule = ScheduleResolver::reference();
        assert!(schedule.lessons_started_before(t("08:20")).is_empty());
        assert_eq!(schedule.lessons_started_before(t("08:21")).as_slice(), &[1]);
    }

    #[test]
    fn test_mid_morning() {
        let schedule = ScheduleResolver::reference();
        assert_eq!(schedule.lessons_started_before(t("09:15")).as_slice(), &[1, 2]);
        assert_eq!(schedule.latest_started_before(t("09:15")), Some(2));
        assert_eq!(schedule.latest_started_before(t("13:25")), Some(7));
    }

    #[test]
    fn test_after_last_lesson() {
        let schedule = ScheduleResolver::reference();
        let all = schedule.lessons_started_before(TimeOfDay::END_OF_DAY);
        assert_eq!(all.as_slice(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(!all.spilled());
        assert_eq!(schedule.latest_started_before(t("18:00")), Some(8));
    }

    #[test]
    fn test_window_lookup() {
        let schedule = ScheduleResolver::reference();
        assert_eq!(schedule.window(2).unwrap().start, t("09:10"));
        assert!(schedule.window(0).is_none());
        assert!(schedule.window(9).is_none());
        assert!(schedule.contains(1));
        assert!(!schedule.contains(9));
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(ScheduleResolver::new(Vec::new()).unwrap_err(), ScheduleError::Empty);
    }

    #[test]
    fn test_rejects_bad_ordinals() {
        let windows = vec![
            LessonWindow::new(1, t("08:00"), t("08:45")),
            LessonWindow::new(3, t("09:00"), t("09:45")),
        ];
        assert_eq!(
            ScheduleResolver::new(windows).unwrap_err(),
            ScheduleError::OrdinalOutOfSequence { expected: 2, found: 3 }
        );
    }

    #[test]
    fn test_rejects_more_lessons_than_ordinals() {
        let windows: Vec<LessonWindow> =
            (0..256).map(|_| LessonWindow::new(1, t("08:00"), t("08:00"))).collect();
        assert_eq!(
            ScheduleResolver::new(windows).unwrap_err(),
            ScheduleError::TooManyLessons { count: 256 }
        );
    }

    #[test]
    fn test_rejects_decreasing_start() {
        let windows = vec![
            LessonWindow::new(1, t("09:00"), t("09:45")),
            LessonWindow::new(2, t("08:00"), t("08:45")),
        ];
        assert!(matches!(
            ScheduleResolver::new(windows),
            Err(ScheduleError::StartDecreasing { ordinal: 2, .. })
        ));
    }

    #[test]
    fn test_rejects_end_before_start() {
        let windows = vec![LessonWindow::new(1, t("09:00"), t("08:45"))];
        assert!(matches!(
            ScheduleResolver::new(windows),
            Err(ScheduleError::EndBeforeStart { ordinal: 1, .. })
        ));
    }

    #[test]
    fn test_equal_starts_allowed() {
        let windows = vec![
            LessonWindow::new(1, t("08:00"), t("08:45")),
            LessonWindow::new(2, t("08:00"), t("09:30")),
        ];
        let schedule = ScheduleResolver::new(windows).unwrap();
        assert_eq!(schedule.lessons_started_before(t("08:01")).as_slice(), &[1, 2]);
    }
}
