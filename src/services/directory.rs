//! Student directory lookup
//!
//! Maps scanner keys to identity data. Built once from configuration and
//! only read afterwards.

use crate::domain::types::{StudentDirectoryEntry, StudentKey};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct StudentDirectory {
    entries: BTreeMap<StudentKey, StudentDirectoryEntry>,
}

impl StudentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (StudentKey, StudentDirectoryEntry)>,
    {
        let entries: BTreeMap<_, _> = entries.into_iter().collect();
        debug!(students = entries.len(), "directory_loaded");
        Self { entries }
    }

    /// Add or replace an entry, returning the previous one
    pub fn insert(
        &mut self,
        key: StudentKey,
        entry: StudentDirectoryEntry,
    ) -> Option<StudentDirectoryEntry> {
        self.entries.insert(key, entry)
    }

    pub fn get(&self, key: &StudentKey) -> Option<&StudentDirectoryEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &StudentKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&StudentKey, &StudentDirectoryEntry)> {
        self.entries.iter()
    }

    /// Keys of students in the given class
    pub fn students_in_class<'a>(&'a self, class_name: &'a str) -> impl Iterator<Item = &'a StudentKey> {
        self.entries.iter().filter(move |(_, e)| e.class_name == class_name).map(|(k, _)| k)
    }

    /// Distinct class names, sorted
    pub fn classes(&self) -> Vec<&str> {
        let mut classes: Vec<&str> = self.entries.values().map(|e| e.class_name.as_str()).collect();
        classes.sort_unstable();
        classes.dedup();
        classes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn sample_directory() -> StudentDirectory {
    let entry = |id: &str, name: &str, class: &str, curator: &str| StudentDirectoryEntry {
        id: id.to_string(),
        display_name: name.to_string(),
        class_name: class.to_string(),
        curator_name: curator.to_string(),
    };

    StudentDirectory::from_entries([
        (StudentKey::from("KEREY"), entry("071004553794", "Kerey B.", "11H", "Samal T.")),
        (StudentKey::from("JAFAR"), entry("070708551158", "Jafar M.", "11D", "Botagoz B.")),
        (StudentKey::from("AZIZ"), entry("080424552629", "Abdulaziz G.", "11H", "Samal T.")),
    ])
}
