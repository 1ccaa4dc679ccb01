//! Class rosters as handed over by the aggregation step.
//!
//! A roster is immutable once it enters the rendering pipeline; every render
//! job carries its own copy.

use serde::{Deserialize, Serialize};

/// One enrolled student.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Student {
    pub name: String,
    /// Only consumed by the master list.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub phone: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub instructor: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub level: String,
}

impl Student {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Metadata and ordered students for one class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Roster {
    /// Unique class identifier (event id).
    pub code: String,
    pub level: String,
    pub service_name: String,
    pub time: String,
    pub instructor: String,
    pub location: String,
    pub schedule: String,
    pub students: Vec<Student>,
}

impl Roster {
    /// Start-time label printed on attendance sheets.
    ///
    /// Schedules are exported as "<days> <start date> ..." so the second
    /// whitespace token is taken as the start date. This is a format
    /// assumption about the upstream export, not a validated field: a schedule
    /// with a single token simply contributes nothing.
    pub fn start_time_display(&self) -> String {
        let start_date = self.schedule.split_whitespace().nth(1).unwrap_or("");
        [start_date, self.time.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    }
}
