//! Domain models - core attendance types
//!
//! This module contains the canonical data types used throughout the system:
//! - `TimeOfDay` - minute-resolution wall-clock time
//! - `LessonWindow` - one period of the daily timetable
//! - `AttendanceEvent` - a normalized entrance detection
//! - `StudentDirectoryEntry` - read-only identity data
//! - `StudentDaySummary` - deduplicated late marks for one student/day

pub mod summary;
pub mod types;

pub use summary::{DayOutcome, LateLessonMark, StudentDaySummary};
pub use types::{
    ArrivalStatus, AttendanceEvent, Classification, LessonWindow, ParseError,
    StudentDirectoryEntry, StudentKey, TimeOfDay,
};
