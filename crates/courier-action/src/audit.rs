//! Append-only daily audit log.
//!
//! One JSON array per local calendar day at `<dir>/YYYY-MM-DD.json`. Other
//! tools write to the same files, so appends preserve entries this crate
//! cannot interpret. Appends are read-modify-write and assume a single
//! writer process.

use std::path::{Path, PathBuf};

use chrono::{Days, Local, NaiveDate};
use courier_core::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::Timestamp;

/// One audit record. Fields beyond the fixed four are kept in `details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(with = "timestamp_format")]
    pub timestamp: Timestamp,
    pub action: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<Uuid>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl LogEntry {
    pub fn new(action: impl Into<String>, file: impl Into<String>, success: bool) -> Self {
        Self {
            timestamp: Local::now(),
            action: action.into(),
            file: file.into(),
            success,
            entry_id: Some(Uuid::new_v4()),
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(Value::as_str)
    }
}

/// Accepts RFC 3339 and the offset-less local form other writers emit.
mod timestamp_format {
    use chrono::{DateTime, Local, NaiveDateTime};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Local>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Local>, D::Error> {
        let raw = String::deserialize(d)?;
        if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(ts.with_timezone(&Local));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .and_then(|naive| naive.and_local_timezone(Local).earliest())
            .ok_or_else(|| de::Error::custom(format!("unrecognized timestamp: {}", raw)))
    }
}

/// Handle on the audit directory.
#[derive(Debug, Clone)]
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    /// Append `entry` to the file for its local day.
    ///
    /// A file that is not a JSON array is replaced, with a warning.
    pub fn append(&self, entry: &LogEntry) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(entry.timestamp.date_naive());
        let mut entries = read_raw(&path);
        entries.push(serde_json::to_value(entry)?);
        std::fs::write(&path, serde_json::to_string_pretty(&entries)?)?;
        debug!(action = %entry.action, file = %entry.file, "Audit entry appended");
        Ok(())
    }

    /// Append, logging instead of failing. Audit problems never stop the
    /// pipeline.
    pub fn record(&self, entry: LogEntry) {
        if let Err(e) = self.append(&entry) {
            warn!(action = %entry.action, error = %e, "Failed to write audit entry");
        }
    }

    /// Entries of one day that this crate can interpret.
    pub fn entries_on(&self, date: NaiveDate) -> Vec<LogEntry> {
        read_raw(&self.path_for(date))
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect()
    }

    /// Entries from the `days` most recent day files, `today` included.
    pub fn recent(&self, days: u32, today: NaiveDate) -> Vec<LogEntry> {
        (0..days)
            .filter_map(|offset| today.checked_sub_days(Days::new(offset as u64)))
            .flat_map(|date| self.entries_on(date))
            .collect()
    }
}

fn read_raw(path: &Path) -> Vec<Value> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return Vec::new(),
    };
    match serde_json::from_str::<Vec<Value>>(&content) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Audit file is not a JSON array, starting over");
            Vec::new()
        }
    }
}
