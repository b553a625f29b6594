use crate::reading::PostureRecord;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Reading store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reading could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Durable key-value storage for posture readings.
pub trait ReadingStore: Send {
    fn append(&mut self, record: &PostureRecord) -> Result<(), PersistenceError>;
    fn load(&self) -> Result<Vec<PostureRecord>, PersistenceError>;
}

/// Append-only file with one JSON record per line.
pub struct JsonLinesStore {
    path: PathBuf,
}

impl JsonLinesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReadingStore for JsonLinesStore {
    fn append(&mut self, record: &PostureRecord) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Missing file means no history yet. Unparseable lines are skipped.
    fn load(&self) -> Result<Vec<PostureRecord>, PersistenceError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        let mut records = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(?e, line = line_no + 1, path = ?self.path, "Skipping malformed reading")
                }
            }
        }
        tracing::debug!(count = records.len(), path = ?self.path, "Loaded stored readings");
        Ok(records)
    }
}

/// In-memory store for tests and sessions without persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Vec<PostureRecord>,
}

impl MemoryStore {
    pub fn records(&self) -> &[PostureRecord] {
        &self.records
    }
}

impl ReadingStore for MemoryStore {
    fn append(&mut self, record: &PostureRecord) -> Result<(), PersistenceError> {
        self.records.push(record.clone());
        Ok(())
    }

    fn load(&self) -> Result<Vec<PostureRecord>, PersistenceError> {
        Ok(self.records.clone())
    }
}
