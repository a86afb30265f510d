//! Services - business logic
//!
//! This module contains the core lateness computation:
//! - `schedule` - lesson timetable lookup
//! - `directory` - student identity lookup
//! - `aggregator` - per-day classification, grouping and dedup
//! - `rollup` - multi-day rates and streaks

pub mod aggregator;
pub mod directory;
pub mod rollup;
pub mod schedule;

// Re-export commonly used types
pub use aggregator::{AggregationOutcome, AggregationStats, Aggregator, AggregatorSettings};
pub use directory::StudentDirectory;
pub use rollup::{roster_rollups, AttendanceBreakdown, StudentRollup};
pub use schedule::ScheduleResolver;
