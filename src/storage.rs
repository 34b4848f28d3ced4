use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::models::{Task, Timestamp};

const SNAPSHOT_FILE: &str = "taskflow-todos.json";

#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(err) => write!(f, "io error: {err}"),
            StorageError::Json(err) => write!(f, "json error: {err}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        StorageError::Io(value)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        StorageError::Json(value)
    }
}

/// Conventional per-user snapshot location: `<platform data dir>/taskflow`.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("taskflow"))
}

/// File-backed persistence for the task collection. One fixed-name slot under
/// a caller-chosen root; the whole collection is rewritten on every save.
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.root.join(SNAPSHOT_FILE)
    }

    /// Reads the snapshot back. `Ok(None)` means "no saved data": the slot is
    /// absent, or its contents are not a JSON array of records. Individual
    /// records are revived leniently; unusable ones are dropped with a
    /// warning rather than failing the load.
    pub fn load_snapshot(&self) -> Result<Option<Vec<Task>>, StorageError> {
        let path = self.snapshot_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::Io(err)),
        };
        let records: Vec<Value> = match serde_json::from_str(&text) {
            Ok(records) => records,
            Err(err) => {
                log::warn!(
                    "snapshot at {} is not a task array ({err}); treating as no data",
                    path.display()
                );
                return Ok(None);
            }
        };
        let mut tasks = Vec::with_capacity(records.len());
        for record in records {
            if let Some(task) = revive_record(record) {
                tasks.push(task);
            }
        }
        Ok(Some(tasks))
    }

    /// Serializes the collection into the slot, atomically: the new snapshot
    /// is written to a temp file, synced, and renamed over the old one.
    pub fn save_snapshot(&self, tasks: &[Task]) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;
        let path = self.snapshot_path();
        let temp_path = path.with_extension("tmp");
        let json = serde_json::to_vec_pretty(tasks)?;
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(temp_path, path)?;
        Ok(())
    }
}

/// Loosely typed on-disk record; fields are validated individually during
/// revival.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    completed: Option<bool>,
    #[serde(default)]
    priority: Option<Value>,
    #[serde(default)]
    category: Option<Value>,
    #[serde(default)]
    created_at: Option<Value>,
    #[serde(default)]
    completed_at: Option<Value>,
    #[serde(default)]
    due_date: Option<Value>,
}

fn revive_record(record: Value) -> Option<Task> {
    let raw: RawRecord = match serde_json::from_value(record) {
        Ok(raw) => raw,
        Err(err) => {
            log::warn!("dropping unreadable task record: {err}");
            return None;
        }
    };
    let id = match raw.id.filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => {
            log::warn!("dropping task record without a usable id");
            return None;
        }
    };
    let title = match raw.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => title.to_string(),
        None => {
            log::warn!("dropping task record {id}: missing or empty title");
            return None;
        }
    };
    let created_at: Timestamp = match raw
        .created_at
        .and_then(|value| serde_json::from_value(value).ok())
    {
        Some(at) => at,
        None => {
            log::warn!("dropping task record {id}: missing or unreadable createdAt");
            return None;
        }
    };

    let mut completed = raw.completed.unwrap_or(false);
    let mut completed_at = revive_optional_timestamp(&id, "completedAt", raw.completed_at);
    // The completion stamp travels with the flag: clear a stray stamp, and
    // revive a completion that lost its stamp as active again.
    if !completed {
        completed_at = None;
    } else if completed_at.is_none() {
        log::warn!("task record {id}: completed without a usable completedAt; reviving as active");
        completed = false;
    }

    Some(Task {
        id: id.clone(),
        title,
        description: raw
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()),
        completed,
        priority: revive_enum(raw.priority),
        category: revive_enum(raw.category),
        created_at,
        completed_at,
        due_date: revive_optional_timestamp(&id, "dueDate", raw.due_date),
    })
}

fn revive_optional_timestamp(id: &str, field: &str, value: Option<Value>) -> Option<Timestamp> {
    let value = value?;
    if value.is_null() {
        return None;
    }
    match serde_json::from_value(value) {
        Ok(at) => Some(at),
        Err(_) => {
            log::warn!("task record {id}: unreadable {field}; treating as absent");
            None
        }
    }
}

fn revive_enum<T>(value: Option<Value>) -> T
where
    T: Default + DeserializeOwned,
{
    value
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default()
}
