//! Attendance report - lateness tables from entrance scans
//!
//! Reads a scanner/backend event export and aggregates it against the
//! configured lesson schedule and student directory. Two modes:
//! - daily (`--date`): the late-lesson table for one reporting date
//! - rollup (`--from`/`--to`): per-student streak, rate and last attendance
//!   over the school days of a window
//!
//! Module structure:
//! - `domain/` - Core types (TimeOfDay, AttendanceEvent, StudentDaySummary)
//! - `io/` - Event ingestion, CSV export, JSONL egress
//! - `services/` - Schedule, Directory, Aggregator, Rollup
//! - `infra/` - Config, Logging

use anyhow::{bail, Context};
use attendance_engine::domain::types::{parse_date, AttendanceEvent};
use attendance_engine::infra::logging::{self, LogFormat};
use attendance_engine::infra::Config;
use attendance_engine::io::{
    load_events_from_file, report_rows, rollup_rows, write_csv_file, Egress,
};
use attendance_engine::services::rollup::{class_breakdown, school_days};
use attendance_engine::services::{roster_rollups, AttendanceBreakdown, Aggregator};
use clap::Parser;
use tracing::{info, warn};

/// Attendance report - late-lesson table for one school day, or rollups over a window
#[derive(Parser, Debug)]
#[command(name = "attendance-report", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,

    /// Event export (JSON, flat or nested records, optionally wrapped in a response envelope)
    #[arg(short, long)]
    events: String,

    /// Reporting date (YYYY-MM-DD), defaults to today
    #[arg(short, long, conflicts_with_all = ["from", "to"])]
    date: Option<String>,

    /// First day of a rollup window (YYYY-MM-DD)
    #[arg(long, requires = "to")]
    from: Option<String>,

    /// Last day of a rollup window (YYYY-MM-DD), inclusive
    #[arg(long, requires = "from")]
    to: Option<String>,

    /// Only report students of this class
    #[arg(long)]
    class: Option<String>,

    /// CSV output path, defaults to export.file from config
    #[arg(short, long)]
    out: Option<String>,

    /// Also write summaries as JSONL to this path (lines for the reported dates are replaced)
    #[arg(long)]
    jsonl: Option<String>,

    /// Include directory students with no detections as absent (daily mode)
    #[arg(long)]
    roster: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.log_format);

    info!(version = env!("CARGO_PKG_VERSION"), git = env!("GIT_HASH"), "attendance_report_starting");

    let config = Config::load_from_path(&args.config);
    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        lessons = %config.schedule().windows().len(),
        first_lesson = %config.schedule().first_start(),
        students = %config.directory().len(),
        dedup_window_minutes = %config.dedup_window_minutes(),
        "config_loaded"
    );
    if config.directory().is_empty() {
        warn!("directory_empty_all_events_will_be_dropped");
    }

    let events = load_events_from_file(&args.events)
        .with_context(|| format!("Failed to load events from {}", args.events))?;

    match (&args.from, &args.to) {
        (Some(from), Some(to)) => run_rollup(&args, &config, &events, from, to),
        _ => run_daily(&args, &config, &events),
    }
}

fn run_daily(args: &Args, config: &Config, events: &[AttendanceEvent]) -> anyhow::Result<()> {
    let date = match &args.date {
        Some(raw) => parse_date(raw)?,
        None => chrono::Local::now().date_naive(),
    };

    let aggregator =
        Aggregator::new(config.schedule(), config.directory(), config.aggregator_settings());
    let outcome = if args.roster {
        aggregator.aggregate_roster(events, date)?
    } else {
        aggregator.aggregate(events, date)?
    };
    outcome.stats.log();

    let rows = report_rows(outcome.summaries.values(), config.directory(), args.class.as_deref());
    let out = args.out.as_deref().unwrap_or(config.export_file());
    write_csv_file(out, &rows)?;

    if let Some(jsonl) = args.jsonl.as_deref().or(config.jsonl_file()) {
        Egress::new(jsonl).write_summaries(outcome.summaries.values(), config.directory())?;
    }

    info!(date = %date, rows = rows.len(), out = %out, "attendance_report_complete");
    Ok(())
}

fn run_rollup(
    args: &Args,
    config: &Config,
    events: &[AttendanceEvent],
    from: &str,
    to: &str,
) -> anyhow::Result<()> {
    let (from, to) = (parse_date(from)?, parse_date(to)?);
    if from > to {
        bail!("rollup window starts {} after it ends {}", from, to);
    }
    let days = school_days(from, to);
    if days.is_empty() {
        warn!(from = %from, to = %to, "rollup_window_has_no_school_days");
    }

    let aggregator =
        Aggregator::new(config.schedule(), config.directory(), config.aggregator_settings());
    let history = aggregator.aggregate_days(events, &days)?;

    let rollups = roster_rollups(config.directory(), &days, &history, args.class.as_deref());
    let breakdown = AttendanceBreakdown::from_rollups(&rollups);
    info!(
        from = %from,
        to = %to,
        school_days = days.len(),
        students = rollups.len(),
        on_time_pct = %format!("{:.1}", breakdown.on_time_pct),
        late_pct = %format!("{:.1}", breakdown.late_pct),
        absent_pct = %format!("{:.1}", breakdown.absent_pct),
        "rollup_breakdown"
    );
    for (class, rate) in class_breakdown(config.directory(), &rollups) {
        info!(class = %class, attendance_rate = %format!("{:.3}", rate), "class_attendance");
    }

    let rows = rollup_rows(&rollups, config.directory());
    let out = args.out.as_deref().unwrap_or(config.export_file());
    write_csv_file(out, &rows)?;

    if let Some(jsonl) = args.jsonl.as_deref().or(config.jsonl_file()) {
        Egress::new(jsonl).write_summaries(&history, config.directory())?;
    }

    info!(from = %from, to = %to, rows = rows.len(), out = %out, "attendance_rollup_complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_config_path_resolution() {
        // Only test in this binary touching CONFIG_FILE
        std::env::remove_var("CONFIG_FILE");
        let args = Args::try_parse_from(["attendance-report", "--events", "e.json"]).unwrap();
        assert_eq!(args.config, "config/dev.toml");

        std::env::set_var("CONFIG_FILE", "config/lyceum.toml");
        let args = Args::try_parse_from(["attendance-report", "--events", "e.json"]).unwrap();
        assert_eq!(args.config, "config/lyceum.toml");

        let args = Args::try_parse_from([
            "attendance-report",
            "--events",
            "e.json",
            "--config",
            "config/evening.toml",
        ])
        .unwrap();
        assert_eq!(args.config, "config/evening.toml");
        std::env::remove_var("CONFIG_FILE");
    }

    #[test]
    fn test_rollup_window_flags() {
        let args = Args::try_parse_from([
            "attendance-report",
            "-e",
            "e.json",
            "--from",
            "2025-03-10",
            "--to",
            "2025-03-14",
        ])
        .unwrap();
        assert_eq!(args.from.as_deref(), Some("2025-03-10"));
        assert_eq!(args.to.as_deref(), Some("2025-03-14"));

        assert!(Args::try_parse_from(["attendance-report", "-e", "e.json", "--from", "2025-03-10"])
            .is_err());
        assert!(Args::try_parse_from([
            "attendance-report",
            "-e",
            "e.json",
            "--date",
            "2025-03-14",
            "--from",
            "2025-03-10",
            "--to",
            "2025-03-14",
        ])
        .is_err());
    }
}
