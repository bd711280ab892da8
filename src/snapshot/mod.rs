//! Persisted last-known state of every monitored task.
//!
//! One pretty-printed JSON document maps task id → snapshot, kept
//! human-diffable for operational debugging. Mutations rewrite the whole
//! file (full-record replace); reads always reflect the last write within
//! the process. A snapshot always holds the field values the core last
//! observed as committed — the post-revert state when a change was reverted.

use crate::error::SnapshotError;
use crate::policy::MonitoredField;
use crate::tracker::{FieldValue, fields};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Per-task record of monitored-field values at capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub captured_at: String,
    pub last_edited_time: Option<String>,
    pub task_name: String,
    pub values: BTreeMap<String, FieldValue>,
}

impl Snapshot {
    /// Capture a task's current monitored-field values.
    pub fn capture(task: &Value) -> Self {
        let mut values = BTreeMap::new();
        for field in MonitoredField::ALL {
            values.insert(
                field.property().to_string(),
                fields::field_value(task, field.property()),
            );
        }

        Self {
            captured_at: Utc::now().to_rfc3339(),
            last_edited_time: fields::last_edited_time(task).map(String::from),
            task_name: fields::task_name(task).unwrap_or_else(|| "unnamed".into()),
            values,
        }
    }

    pub fn value(&self, field: MonitoredField) -> FieldValue {
        self.values
            .get(field.property())
            .cloned()
            .unwrap_or(FieldValue::Absent)
    }

    pub fn priority_label(&self) -> Option<String> {
        self.value(MonitoredField::Priority)
            .as_label()
            .map(String::from)
    }
}

/// File-backed keyed-document store, one snapshot per task id.
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_all(&self) -> Result<BTreeMap<String, Snapshot>, SnapshotError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(&self.path).await?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    async fn save_all(&self, all: &BTreeMap<String, Snapshot>) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string_pretty(all)?;
        fs::write(&self.path, raw).await?;
        Ok(())
    }

    pub async fn get(&self, task_id: &str) -> Result<Option<Snapshot>, SnapshotError> {
        Ok(self.load_all().await?.remove(task_id))
    }

    /// Full replace — never a merge.
    pub async fn put(&self, task_id: &str, snapshot: Snapshot) -> Result<(), SnapshotError> {
        let mut all = self.load_all().await?;
        all.insert(task_id.to_string(), snapshot);
        self.save_all(&all).await
    }

    pub async fn delete(&self, task_id: &str) -> Result<bool, SnapshotError> {
        let mut all = self.load_all().await?;
        let removed = all.remove(task_id).is_some();
        if removed {
            self.save_all(&all).await?;
        }
        Ok(removed)
    }

    /// Seed snapshots for every given task, replacing the whole document.
    /// Run at policy-activation time; runtime evaluation treats a missing
    /// snapshot as a distinct loggable condition, so this must have run at
    /// least once.
    pub async fn bulk_init(&self, tasks: &[Value]) -> Result<usize, SnapshotError> {
        let mut all = BTreeMap::new();
        for task in tasks {
            let Some(id) = task.get("id").and_then(Value::as_str) else {
                continue;
            };
            all.insert(id.to_string(), Snapshot::capture(task));
        }
        self.save_all(&all).await?;
        Ok(all.len())
    }

    pub async fn len(&self) -> Result<usize, SnapshotError> {
        Ok(self.load_all().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, SnapshotError> {
        Ok(self.load_all().await?.is_empty())
    }
}
