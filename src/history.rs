//! Per-session transcripts stored as one JSON document each.

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }
}

/// What gets written to `history/<file>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: NaiveDateTime,
}

impl SessionRecord {
    pub fn new(messages: Vec<Message>) -> Self {
        let now = Local::now().naive_local();
        Self {
            title: format!("Interview_{}", now.format("%Y-%m-%d %H:%M")),
            messages,
            created_at: now,
        }
    }
}

/// Sidebar entry: file name plus a display title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub file: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{yyyyMMdd_HHmmss}_{8 hex}.json`
    pub fn generate_file_name() -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{}_{}.json", Local::now().format("%Y%m%d_%H%M%S"), &suffix[..8])
    }

    fn resolve(&self, file_name: &str) -> Result<PathBuf, StoreError> {
        let valid = !file_name.is_empty()
            && file_name.ends_with(".json")
            && !file_name.starts_with('.')
            && !file_name.contains(['/', '\\'])
            && !file_name.contains("..");
        if !valid {
            return Err(StoreError::InvalidFileName(file_name.to_string()));
        }
        Ok(self.dir.join(file_name))
    }

    /// File names, most recently modified first.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        let mut files: Vec<(SystemTime, String)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".json") {
                continue;
            }
            let meta = entry.metadata().map_err(|e| StoreError::io(entry.path(), e))?;
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((modified, name));
        }

        files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        Ok(files.into_iter().map(|(_, name)| name).collect())
    }

    pub fn load(&self, file_name: &str) -> Result<Option<SessionRecord>, StoreError> {
        let path = self.resolve(file_name)?;
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        let record = serde_json::from_str(&text).map_err(|e| StoreError::json(&path, e))?;
        Ok(Some(record))
    }

    /// Writes the whole record, generating a file name when `file_name` is
    /// `None`. Returns the name written.
    pub fn save(&self, record: &SessionRecord, file_name: Option<&str>) -> Result<String, StoreError> {
        let file_name = match file_name {
            Some(name) => name.to_string(),
            None => Self::generate_file_name(),
        };
        let path = self.resolve(&file_name)?;
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;

        let json = serde_json::to_string_pretty(record).map_err(|e| StoreError::json(&path, e))?;
        fs::write(&path, json).map_err(|e| StoreError::io(&path, e))?;
        debug!(file = %file_name, messages = record.messages.len(), "Session saved");
        Ok(file_name)
    }

    pub fn delete(&self, file_name: &str) -> Result<(), StoreError> {
        let path = self.resolve(file_name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(file = %file_name, "Session deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    /// `list()` joined with each record's title. Files that fail to load are
    /// skipped.
    pub fn summaries(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        let mut entries = Vec::new();
        for file in self.list()? {
            match self.load(&file) {
                Ok(Some(record)) => {
                    let title = if record.title.is_empty() {
                        file.trim_end_matches(".json").to_string()
                    } else {
                        record.title
                    };
                    entries.push(HistoryEntry { file, title });
                }
                Ok(None) => {}
                Err(e) => warn!(file = %file, error = %e, "Skipping unreadable history file"),
            }
        }
        Ok(entries)
    }
}
