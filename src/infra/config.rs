//! Configuration loading from TOML files
//!
//! The binary selects the file (`--config`, then `CONFIG_FILE`, then
//! `config/dev.toml`) and hands the path to `Config::load_from_path`.

use crate::domain::types::{ArrivalStatus, LessonWindow, StudentDirectoryEntry, StudentKey, TimeOfDay};
use crate::services::aggregator::{AggregatorSettings, DEFAULT_DEDUP_WINDOW_MINUTES};
use crate::services::directory::StudentDirectory;
use crate::services::schedule::{ScheduleError, ScheduleResolver};
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct LessonConfig {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ScheduleConfig {
    /// Lessons in order; ordinals follow list position. Empty means the reference timetable.
    #[serde(default)]
    pub lessons: Vec<LessonConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    #[serde(default = "default_dedup_window_minutes")]
    pub dedup_window_minutes: u16,
    /// Upstream statuses that never count as late
    #[serde(default = "default_boundary_statuses")]
    pub boundary_statuses: Vec<String>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            dedup_window_minutes: default_dedup_window_minutes(),
            boundary_statuses: default_boundary_statuses(),
        }
    }
}

fn default_dedup_window_minutes() -> u16 {
    DEFAULT_DEDUP_WINDOW_MINUTES
}

fn default_boundary_statuses() -> Vec<String> {
    vec!["before_school".to_string(), "after_school".to_string()]
}

/// Directory record as written in TOML or the JSON directory file
#[derive(Debug, Clone, Deserialize)]
pub struct StudentRecord {
    pub key: String,
    pub id: String,
    pub name: String,
    pub class: String,
    #[serde(default)]
    pub curator: String,
}

impl StudentRecord {
    fn into_entry(self) -> (StudentKey, StudentDirectoryEntry) {
        (
            StudentKey(self.key),
            StudentDirectoryEntry {
                id: self.id,
                display_name: self.name,
                class_name: self.class,
                curator_name: self.curator,
            },
        )
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DirectoryConfig {
    /// Optional JSON file with an array of student records, relative to the config file
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub students: Vec<StudentRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// CSV report path
    #[serde(default = "default_export_file")]
    pub file: String,
    /// JSONL summary path (disabled when absent)
    #[serde(default)]
    pub jsonl_file: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { file: default_export_file(), jsonl_file: None }
    }
}

fn default_export_file() -> String {
    "attendance_report.csv".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// School identifier included in logs
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "school".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    schedule: ScheduleResolver,
    directory: StudentDirectory,
    dedup_window_minutes: u16,
    boundary_statuses: Vec<ArrivalStatus>,
    export_file: String,
    jsonl_file: Option<String>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            schedule: ScheduleResolver::reference(),
            directory: StudentDirectory::new(),
            dedup_window_minutes: DEFAULT_DEDUP_WINDOW_MINUTES,
            boundary_statuses: vec![ArrivalStatus::BeforeSchool, ArrivalStatus::AfterSchool],
            export_file: default_export_file(),
            jsonl_file: None,
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_toml(toml_config, &base_dir, path.display().to_string())
    }

    /// Build from already-parsed TOML; `base_dir` anchors relative directory files
    pub fn from_toml(
        toml_config: TomlConfig,
        base_dir: &Path,
        config_file: String,
    ) -> anyhow::Result<Self> {
        let schedule = if toml_config.schedule.lessons.is_empty() {
            ScheduleResolver::reference()
        } else {
            let lessons = &toml_config.schedule.lessons;
            lessons
                .iter()
                .enumerate()
                .map(|(i, lesson)| -> Result<LessonWindow, ScheduleError> {
                    let ordinal = u8::try_from(i + 1)
                        .map_err(|_| ScheduleError::TooManyLessons { count: lessons.len() })?;
                    Ok(LessonWindow::new(ordinal, lesson.start, lesson.end))
                })
                .collect::<Result<Vec<_>, _>>()
                .and_then(ScheduleResolver::new)
                .with_context(|| format!("Invalid [schedule] in {}", config_file))?
        };

        let mut records = toml_config.directory.students;
        if let Some(file) = &toml_config.directory.file {
            records.extend(load_directory_file(&base_dir.join(file))?);
        }
        let directory = StudentDirectory::from_entries(records.into_iter().map(StudentRecord::into_entry));

        let boundary_statuses = toml_config
            .aggregation
            .boundary_statuses
            .iter()
            .map(|s| match s.parse::<ArrivalStatus>() {
                Ok(status) => status,
                Err(never) => match never {},
            })
            .collect();

        Ok(Self {
            site_id: toml_config.site.id,
            schedule,
            directory,
            dedup_window_minutes: toml_config.aggregation.dedup_window_minutes,
            boundary_statuses,
            export_file: toml_config.export.file,
            jsonl_file: toml_config.export.jsonl_file,
            config_file,
        })
    }

    /// Load configuration - tries the TOML file, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn aggregator_settings(&self) -> AggregatorSettings {
        AggregatorSettings {
            dedup_window_minutes: self.dedup_window_minutes,
            boundary_statuses: self.boundary_statuses.clone(),
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn schedule(&self) -> &ScheduleResolver {
        &self.schedule
    }

    pub fn directory(&self) -> &StudentDirectory {
        &self.directory
    }

    pub fn dedup_window_minutes(&self) -> u16 {
        self.dedup_window_minutes
    }

    pub fn boundary_statuses(&self) -> &[ArrivalStatus] {
        &self.boundary_statuses
    }

    pub fn export_file(&self) -> &str {
        &self.export_file
    }

    pub fn jsonl_file(&self) -> Option<&str> {
        self.jsonl_file.as_deref()
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to swap in a directory
    #[cfg(test)]
    pub fn with_directory(mut self, directory: StudentDirectory) -> Self {
        self.directory = directory;
        self
    }
}

fn load_directory_file(path: &Path) -> anyhow::Result<Vec<StudentRecord>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read directory file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse directory file {}", path.display()))
}
