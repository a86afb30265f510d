//! Shared types for the attendance engine

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Minutes in a day; `TimeOfDay` values are always below this
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Errors raised when upstream fields do not match the `HH:MM` / `YYYY-MM-DD` contract
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed time {0:?}, expected HH:MM")]
    MalformedTime(String),
    #[error("malformed date {0:?}, expected YYYY-MM-DD")]
    MalformedDate(String),
    #[error("malformed lesson {0:?}, expected a positive lesson number")]
    MalformedLesson(String),
}

/// Wall-clock time of day at minute resolution (hour * 60 + minute)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    /// Last representable minute, used as the end-of-day sentinel
    pub const END_OF_DAY: TimeOfDay = TimeOfDay(MINUTES_PER_DAY - 1);

    /// Build from hour and minute, `None` when out of range
    pub const fn from_hm(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self(hour as u16 * 60 + minute as u16))
        } else {
            None
        }
    }

    #[inline]
    pub fn minutes(self) -> u16 {
        self.0
    }

    #[inline]
    pub fn hour(self) -> u8 {
        (self.0 / 60) as u8
    }

    #[inline]
    pub fn minute(self) -> u8 {
        (self.0 % 60) as u8
    }

    /// Absolute distance in minutes between two times of day
    #[inline]
    pub fn minutes_between(self, other: TimeOfDay) -> u16 {
        self.0.abs_diff(other.0)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for TimeOfDay {
    type Err = ParseError;

    /// Accepts `HH:MM`, `H:MM` and `HH:MM:SS` (seconds are dropped)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ParseError::MalformedTime(s.to_string());
        let trimmed = s.trim();

        let mut parts = trimmed.split(':');
        let hour = parts.next().ok_or_else(malformed)?;
        let minute = parts.next().ok_or_else(malformed)?;
        let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());

        if let Some(seconds) = parts.next() {
            if seconds.len() != 2 || !digits(seconds) || seconds.parse::<u8>().map_or(true, |s| s >= 60) {
                return Err(malformed());
            }
        }
        if parts.next().is_some()
            || hour.is_empty()
            || hour.len() > 2
            || minute.len() != 2
            || !digits(hour)
            || !digits(minute)
        {
            return Err(malformed());
        }

        let hour: u8 = hour.parse().map_err(|_| malformed())?;
        let minute: u8 = minute.parse().map_err(|_| malformed())?;
        Self::from_hm(hour, minute).ok_or_else(malformed)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse a `YYYY-MM-DD` reporting date
pub fn parse_date(s: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| ParseError::MalformedDate(s.to_string()))
}

/// Opaque student identifier as reported by the scanner (name or ID)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentKey(pub String);

impl StudentKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StudentKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// One scheduled class period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonWindow {
    pub ordinal: u8,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl LessonWindow {
    pub fn new(ordinal: u8, start: TimeOfDay, end: TimeOfDay) -> Self {
        Self { ordinal, start, end }
    }
}

/// Arrival classification as reported by an upstream scanner
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArrivalStatus {
    OnTime,
    Late,
    BeforeSchool,
    AfterSchool,
    Other(String),
}

impl FromStr for ArrivalStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        Ok(match normalized.as_str() {
            "on time" | "ontime" | "present" => ArrivalStatus::OnTime,
            "late" => ArrivalStatus::Late,
            "before school" => ArrivalStatus::BeforeSchool,
            "after school" => ArrivalStatus::AfterSchool,
            _ => ArrivalStatus::Other(s.trim().to_string()),
        })
    }
}

impl ArrivalStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ArrivalStatus::OnTime => "on_time",
            ArrivalStatus::Late => "late",
            ArrivalStatus::BeforeSchool => "before_school",
            ArrivalStatus::AfterSchool => "after_school",
            ArrivalStatus::Other(s) => s,
        }
    }
}

impl Serialize for ArrivalStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ArrivalStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.parse::<ArrivalStatus>() {
            Ok(status) => Ok(status),
            Err(never) => match never {},
        }
    }
}

/// Lesson/status pair attached by an upstream source that classifies on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub lesson: u8,
    pub status: ArrivalStatus,
}

/// One raw detection of a student at the entrance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceEvent {
    pub student: StudentKey,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub classified: Option<Classification>,
}

impl AttendanceEvent {
    pub fn new(student: impl Into<StudentKey>, date: NaiveDate, time: TimeOfDay) -> Self {
        Self { student: student.into(), date, time, classified: None }
    }

    pub fn with_classification(mut self, lesson: u8, status: ArrivalStatus) -> Self {
        self.classified = Some(Classification { lesson, status });
        self
    }
}

/// Static identity data for a student, owned by the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentDirectoryEntry {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "class")]
    pub class_name: String,
    #[serde(rename = "curator")]
    pub curator_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    #[test]
    fn test_time_of_day_parse() {
        assert_eq!(t("08:20").minutes(), 500);
        assert_eq!(t("8:05").minutes(), 485);
        assert_eq!(t("00:00").minutes(), 0);
        assert_eq!(t("23:59"), TimeOfDay::END_OF_DAY);
        assert_eq!(t("13:25:41").minutes(), 13 * 60 + 25);
    }

    #[test]
    fn test_time_of_day_rejects_malformed() {
        let cases = [
            "", "8", "24:00", "12:60", "12:5", "ab:cd", "12:30:99", "1:2:3:4", "123:00",
            // sign prefixes that u8::from_str would otherwise accept
            "08:+5", "+8:05", "08:05:+1",
        ];
        for bad in cases {
            assert_eq!(
                bad.parse::<TimeOfDay>(),
                Err(ParseError::MalformedTime(bad.to_string())),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_time_of_day_display() {
        assert_eq!(t("8:05").to_string(), "08:05");
        assert_eq!(TimeOfDay::END_OF_DAY.to_string(), "23:59");
    }

    #[test]
    fn test_minutes_between() {
        assert_eq!(t("09:12").minutes_between(t("09:14")), 2);
        assert_eq!(t("13:25").minutes_between(t("09:12")), 253);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2025-03-14").unwrap(), NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
        assert!(matches!(parse_date("14.03.2025"), Err(ParseError::MalformedDate(_))));
        assert!(matches!(parse_date("2025-02-30"), Err(ParseError::MalformedDate(_))));
    }

    #[test]
    fn test_arrival_status_from_str() {
        assert_eq!("Late".parse::<ArrivalStatus>().unwrap(), ArrivalStatus::Late);
        assert_eq!("on time".parse::<ArrivalStatus>().unwrap(), ArrivalStatus::OnTime);
        assert_eq!("before_school".parse::<ArrivalStatus>().unwrap(), ArrivalStatus::BeforeSchool);
        assert_eq!("After School".parse::<ArrivalStatus>().unwrap(), ArrivalStatus::AfterSchool);
        assert!(matches!("excused".parse::<ArrivalStatus>().unwrap(), ArrivalStatus::Other(_)));
    }

    #[test]
    fn test_time_of_day_serde() {
        let json = serde_json::to_string(&t("9:12")).unwrap();
        assert_eq!(json, "\"09:12\"");
        let back: TimeOfDay = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t("09:12"));
        assert!(serde_json::from_str::<TimeOfDay>("\"25:00\"").is_err());
    }
}
