//! Per-student, per-day lateness summary produced by the aggregator

use crate::domain::types::{StudentDirectoryEntry, StudentKey, TimeOfDay};
use chrono::NaiveDate;
use serde::Serialize;

/// "Student arrived after lesson N had already started"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LateLessonMark {
    pub lesson: u8,
    pub arrival: TimeOfDay,
}

impl LateLessonMark {
    pub fn new(lesson: u8, arrival: TimeOfDay) -> Self {
        Self { lesson, arrival }
    }
}

/// Day outcome as seen by the rollup pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayOutcome {
    OnTime,
    Late,
    Absent,
}

impl DayOutcome {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            DayOutcome::OnTime => "on_time",
            DayOutcome::Late => "late",
            DayOutcome::Absent => "absent",
        }
    }
}

/// Aggregation root for one student on one date
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentDaySummary {
    pub student: StudentKey,
    pub date: NaiveDate,
    /// Ascending by arrival, at most one mark per dedup window
    pub late_marks: Vec<LateLessonMark>,
    /// Raw detections for the student that day, before dedup
    pub detections: usize,
}

impl StudentDaySummary {
    pub fn new(student: StudentKey, date: NaiveDate) -> Self {
        Self { student, date, late_marks: Vec::new(), detections: 0 }
    }

    pub fn is_present(&self) -> bool {
        self.detections > 0
    }

    pub fn outcome(&self) -> DayOutcome {
        if !self.is_present() {
            DayOutcome::Absent
        } else if self.late_marks.is_empty() {
            DayOutcome::OnTime
        } else {
            DayOutcome::Late
        }
    }

    /// First arrival that produced a late mark
    pub fn first_late_arrival(&self) -> Option<TimeOfDay> {
        self.late_marks.first().map(|m| m.arrival)
    }

    /// Convert to a JSON line, merging directory fields when available
    pub fn to_json_with_entry(&self, entry: Option<&StudentDirectoryEntry>) -> String {
        let mut obj = serde_json::Map::new();

        obj.insert("student".to_string(), serde_json::Value::String(self.student.0.clone()));
        if let Some(entry) = entry {
            obj.insert("id".to_string(), serde_json::Value::String(entry.id.clone()));
            obj.insert("name".to_string(), serde_json::Value::String(entry.display_name.clone()));
            obj.insert("class".to_string(), serde_json::Value::String(entry.class_name.clone()));
            obj.insert(
                "curator".to_string(),
                serde_json::Value::String(entry.curator_name.clone()),
            );
        }
        obj.insert("date".to_string(), serde_json::Value::String(self.date.to_string()));
        obj.insert(
            "outcome".to_string(),
            serde_json::Value::String(self.outcome().as_str().to_string()),
        );
        obj.insert("detections".to_string(), serde_json::Value::Number(self.detections.into()));

        let marks: Vec<serde_json::Value> = self
            .late_marks
            .iter()
            .map(|m| serde_json::json!({ "lesson": m.lesson, "time": m.arrival.to_string() }))
            .collect();
        obj.insert("late".to_string(), serde_json::Value::Array(marks));

        serde_json::Value::Object(obj).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    #[test]
    fn test_outcome() {
        let mut summary = StudentDaySummary::new(StudentKey::from("JAFAR"), date());
        assert_eq!(summary.outcome(), DayOutcome::Absent);

        summary.detections = 1;
        assert_eq!(summary.outcome(), DayOutcome::OnTime);

        summary.late_marks.push(LateLessonMark::new(2, t("09:12")));
        assert_eq!(summary.outcome(), DayOutcome::Late);
        assert_eq!(summary.first_late_arrival(), Some(t("09:12")));
    }

    #[test]
    fn test_to_json_with_entry() {
        let mut summary = StudentDaySummary::new(StudentKey::from("JAFAR"), date());
        summary.detections = 3;
        summary.late_marks.push(LateLessonMark::new(2, t("09:12")));
        summary.late_marks.push(LateLessonMark::new(7, t("13:25")));

        let entry = StudentDirectoryEntry {
            id: "070708551158".to_string(),
            display_name: "Jafar M.".to_string(),
            class_name: "11D".to_string(),
            curator_name: "B. Baurzhanovna".to_string(),
        };

        let parsed: serde_json::Value =
            serde_json::from_str(&summary.to_json_with_entry(Some(&entry))).unwrap();

        assert_eq!(parsed["student"], "JAFAR");
        assert_eq!(parsed["class"], "11D");
        assert_eq!(parsed["date"], "2025-03-14");
        assert_eq!(parsed["outcome"], "late");
        assert_eq!(parsed["detections"], 3);
        assert_eq!(parsed["late"], serde_json::json!([
            { "lesson": 2, "time": "09:12" },
            { "lesson": 7, "time": "13:25" }
        ]));
    }

    #[test]
    fn test_to_json_without_entry() {
        let summary = StudentDaySummary::new(StudentKey::from("AZIZ"), date());
        let parsed: serde_json::Value =
            serde_json::from_str(&summary.to_json_with_entry(None)).unwrap();

        assert_eq!(parsed["outcome"], "absent");
        assert!(parsed.get("class").is_none());
        assert_eq!(parsed["late"], serde_json::json!([]));
    }
}
