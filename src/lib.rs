//! Attendance engine library
//!
//! Turns timestamped entrance detections into lesson-level lateness facts
//! and multi-day attendance figures. Exposes modules for integration
//! testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
