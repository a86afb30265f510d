//! IO modules - external system interfaces
//!
//! This module contains all file-facing operations:
//! - `source` - scanner/backend event payloads (both record shapes)
//! - `export` - CSV report tables (daily and rollup)
//! - `egress` - day summaries to file (JSONL format)

pub mod egress;
pub mod export;
pub mod source;

// Re-export commonly used types
pub use egress::Egress;
pub use export::{report_rows, rollup_rows, write_csv_file, ReportRow, RollupRow};
pub use source::{load_events_from_file, parse_events, SourceError};
