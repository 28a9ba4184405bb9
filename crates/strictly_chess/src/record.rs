//! Game records and their persistence.

use crate::config::ChessConfig;
use crate::types::Move;
use chrono::Local;
use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// A played (or to-be-replayed) game.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    /// Notation of the position the game started from.
    pub start_position: String,
    /// Notation of the final position; empty while the game is running.
    #[serde(default)]
    pub end_position: String,
    /// Moves in the order they were played.
    #[serde(default)]
    pub moves: Vec<Move>,
}

impl GameRecord {
    /// Creates an empty record starting at `start_position`.
    pub fn new(start_position: impl Into<String>) -> Self {
        Self {
            start_position: start_position.into(),
            end_position: String::new(),
            moves: Vec::new(),
        }
    }

    /// Whether the record holds a finished game's final position.
    pub fn is_finalized(&self) -> bool {
        !self.end_position.is_empty()
    }

    /// Moves as space-separated coordinate notation.
    pub fn move_text(&self) -> String {
        self.moves
            .iter()
            .map(Move::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Persistence collaborator for finished records.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Persists `record` and returns where it was stored.
    async fn save(&self, record: &GameRecord) -> Result<String, RecordError>;
}

/// Record persistence error.
#[derive(Debug, Clone, Display, Error)]
#[display("Record error: {} at {}:{}", message, file, line)]
pub struct RecordError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl RecordError {
    /// Creates a new record error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// Stores records as pretty-printed JSON files named by local timestamp.
#[derive(Debug, Clone, Getters)]
pub struct JsonRecordStore {
    /// Directory records are written to.
    dir: PathBuf,
    /// File extension, without the dot.
    extension: String,
}

impl JsonRecordStore {
    /// Creates a store writing `<timestamp>.<extension>` files into `dir`.
    #[instrument(skip(dir, extension), fields(dir = %dir.as_ref().display()))]
    pub fn new(dir: impl AsRef<Path>, extension: impl Into<String>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let extension = extension.into();
        debug!(extension = %extension, "Creating JSON record store");
        Self { dir, extension }
    }

    /// Creates a store from the configured directory and extension.
    pub fn from_config(config: &ChessConfig) -> Self {
        Self::new(config.record_dir(), config.record_extension().clone())
    }

    /// Reads a record from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] if the file cannot be read or is not a record.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<GameRecord, RecordError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            RecordError::new(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        let record: GameRecord = serde_json::from_str(&content).map_err(|e| {
            RecordError::new(format!("Failed to parse '{}': {}", path.display(), e))
        })?;
        info!(moves = record.moves.len(), "Record loaded");
        Ok(record)
    }

    /// Lists stored record files, oldest first.
    ///
    /// A missing directory holds no records.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] if the directory cannot be read.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub async fn list(&self) -> Result<Vec<PathBuf>, RecordError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(RecordError::new(format!(
                    "Failed to read '{}': {}",
                    self.dir.display(),
                    e
                )));
            }
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RecordError::new(format!("Failed to list records: {}", e)))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(self.extension.as_str()) {
                records.push(path);
            }
        }
        records.sort();
        debug!(count = records.len(), "Listed records");
        Ok(records)
    }

    async fn free_path(&self) -> Result<PathBuf, RecordError> {
        let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S%.3f").to_string();
        let mut path = self.dir.join(format!("{}.{}", stamp, self.extension));
        let mut attempt = 1;
        while tokio::fs::try_exists(&path)
            .await
            .map_err(|e| RecordError::new(format!("Failed to probe '{}': {}", path.display(), e)))?
        {
            path = self
                .dir
                .join(format!("{}-{}.{}", stamp, attempt, self.extension));
            attempt += 1;
        }
        Ok(path)
    }
}

#[async_trait::async_trait]
impl RecordStore for JsonRecordStore {
    #[instrument(skip(self, record), fields(dir = %self.dir.display(), moves = record.moves.len()))]
    async fn save(&self, record: &GameRecord) -> Result<String, RecordError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            RecordError::new(format!("Failed to create '{}': {}", self.dir.display(), e))
        })?;

        let json = serde_json::to_string_pretty(record)
            .map_err(|e| RecordError::new(format!("Failed to encode record: {}", e)))?;
        let path = self.free_path().await?;
        tokio::fs::write(&path, json).await.map_err(|e| {
            RecordError::new(format!("Failed to write '{}': {}", path.display(), e))
        })?;

        info!(path = %path.display(), "Game record saved");
        Ok(path.display().to_string())
    }
}
