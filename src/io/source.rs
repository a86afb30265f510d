//! Attendance event ingestion
//!
//! Upstream sources have shipped two record shapes over time:
//! - flat:   `{ "name", "date", "time" }`
//! - nested: `{ "name", "date", "attendance_info": [{ "time", "class", "status" }] }`
//!
//! Either may arrive bare (a JSON array) or wrapped in the
//! `{ "status": "success", "attendance_data": [...] }` response envelope.
//! Everything is normalized into `AttendanceEvent` here so the aggregator
//! never has to look at the wire shape.

use crate::domain::types::{parse_date, ArrivalStatus, AttendanceEvent, ParseError, StudentKey};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read events from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid event payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("upstream reported status {status:?}: {message}")]
    UpstreamStatus { status: String, message: String },
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Lesson number as sent upstream: a number or a numeric string.
///
/// Signed and fractional numbers are captured too, so that they fail in
/// `to_ordinal` as a malformed lesson rather than failing the whole record.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LessonValue {
    Number(u64),
    Signed(i64),
    Fractional(f64),
    Text(String),
}

impl LessonValue {
    fn to_ordinal(&self) -> Result<u8, ParseError> {
        let parsed = match self {
            LessonValue::Number(n) => u8::try_from(*n).ok(),
            LessonValue::Signed(_) | LessonValue::Fractional(_) => None,
            LessonValue::Text(s) => {
                let s = s.trim();
                s.bytes().all(|b| b.is_ascii_digit()).then(|| s.parse::<u8>().ok()).flatten()
            }
        };
        match parsed {
            Some(n) if n > 0 => Ok(n),
            _ => Err(ParseError::MalformedLesson(match self {
                LessonValue::Number(n) => n.to_string(),
                LessonValue::Signed(n) => n.to_string(),
                LessonValue::Fractional(n) => format!("{n:?}"),
                LessonValue::Text(s) => s.clone(),
            })),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAttendanceInfo {
    pub time: String,
    #[serde(rename = "class")]
    pub lesson: LessonValue,
    pub status: String,
}

/// One upstream record, in either known shape
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawRecord {
    Nested {
        #[serde(alias = "student")]
        name: String,
        date: String,
        attendance_info: Vec<RawAttendanceInfo>,
    },
    Flat {
        #[serde(alias = "student")]
        name: String,
        date: String,
        time: String,
    },
}

impl RawRecord {
    /// Normalize into canonical events; nested records yield one event per entry
    pub fn into_events(self) -> Result<Vec<AttendanceEvent>, ParseError> {
        match self {
            RawRecord::Flat { name, date, time } => {
                let date = parse_date(&date)?;
                Ok(vec![AttendanceEvent::new(StudentKey(name), date, time.parse()?)])
            }
            RawRecord::Nested { name, date, attendance_info } => {
                let date = parse_date(&date)?;
                let student = StudentKey(name);
                attendance_info
                    .into_iter()
                    .map(|info| -> Result<AttendanceEvent, ParseError> {
                        let status = parse_status(&info.status);
                        Ok(AttendanceEvent::new(student.clone(), date, info.time.parse()?)
                            .with_classification(info.lesson.to_ordinal()?, status))
                    })
                    .collect()
            }
        }
    }
}

fn parse_status(raw: &str) -> ArrivalStatus {
    match raw.parse::<ArrivalStatus>() {
        Ok(status) => status,
        Err(never) => match never {},
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawPayload {
    Envelope {
        status: String,
        #[serde(default)]
        message: String,
        #[serde(default)]
        attendance_data: Vec<RawRecord>,
    },
    Records(Vec<RawRecord>),
}

/// Decode and normalize an event payload
pub fn parse_events(json: &str) -> Result<Vec<AttendanceEvent>, SourceError> {
    let records = match serde_json::from_str::<RawPayload>(json)? {
        RawPayload::Envelope { status, message, attendance_data } => {
            if !status.eq_ignore_ascii_case("success") {
                return Err(SourceError::UpstreamStatus { status, message });
            }
            attendance_data
        }
        RawPayload::Records(records) => records,
    };

    let record_count = records.len();
    let mut events = Vec::with_capacity(record_count);
    for record in records {
        events.extend(record.into_events()?);
    }

    debug!(records = record_count, events = events.len(), "events_parsed");
    Ok(events)
}

/// Read and normalize an event file
pub fn load_events_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<AttendanceEvent>, SourceError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|source| SourceError::Io { path: path.display().to_string(), source })?;

    let events = parse_events(&content)?;
    info!(file = %path.display(), events = events.len(), "events_loaded");
    Ok(events)
}
