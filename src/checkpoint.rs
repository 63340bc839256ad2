//! Checkpoint Module
//!
//! Remembers where the last successful poll window ended so consecutive
//! polls tile time without gaps or overlaps. Poll windows are half-open, so
//! reusing the previous `end` as the next `start` attributes each card
//! modification to exactly one poll.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::error::{IngestionError, Result};
use crate::time_window::SecondsSinceUnixEpoch;

/// Checkpoint data for a single source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCheckpoint {
    /// Source identifier
    pub source_id: String,
    /// Exclusive end of the last successful poll window
    pub last_poll_end: SecondsSinceUnixEpoch,
    /// Wall-clock time the last poll finished
    pub last_poll_at: DateTime<Utc>,
    /// Batches emitted by the last poll
    pub last_batch_count: u32,
    /// Documents emitted since the checkpoint was created
    pub total_documents: u64,
}

impl SourceCheckpoint {
    pub fn new(source_id: &str, last_poll_end: SecondsSinceUnixEpoch) -> Self {
        Self {
            source_id: source_id.to_string(),
            last_poll_end,
            last_poll_at: Utc::now(),
            last_batch_count: 0,
            total_documents: 0,
        }
    }

    /// Records a completed poll window
    pub fn record_poll(&mut self, window_end: SecondsSinceUnixEpoch, batches: u32, documents: u64) {
        self.last_poll_end = window_end;
        self.last_poll_at = Utc::now();
        self.last_batch_count = batches;
        self.total_documents += documents;
    }
}

/// Global checkpoint state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointState {
    /// Schema version for forward compatibility
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Per-source checkpoints
    pub sources: HashMap<String, SourceCheckpoint>,
}

impl Default for CheckpointState {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            sources: HashMap::new(),
        }
    }
}

/// Checkpoint manager handles persistence
pub struct CheckpointManager {
    /// Path to checkpoint file
    file_path: PathBuf,
    state: CheckpointState,
    /// Unsaved changes
    dirty: bool,
}

impl CheckpointManager {
    /// Opens (or starts) the checkpoint file in `checkpoint_dir`
    pub async fn new(checkpoint_dir: &Path) -> Result<Self> {
        fs::create_dir_all(checkpoint_dir).await?;

        let file_path = checkpoint_dir.join("checkpoint.json");

        let state = if fs::try_exists(&file_path).await? {
            match Self::load_from_file(&file_path).await {
                Ok(state) => {
                    info!(sources = state.sources.len(), "Loaded existing checkpoint");
                    state
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load checkpoint, starting fresh");
                    CheckpointState::default()
                }
            }
        } else {
            info!("No existing checkpoint, starting fresh");
            CheckpointState::default()
        };

        Ok(Self {
            file_path,
            state,
            dirty: false,
        })
    }

    async fn load_from_file(path: &Path) -> Result<CheckpointState> {
        let contents = fs::read_to_string(path).await?;
        let state: CheckpointState = serde_json::from_str(&contents)?;
        Ok(state)
    }

    async fn save_to_file(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.state)?;

        // Write to temp file first, then rename
        let temp_path = self.file_path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &self.file_path).await?;

        debug!(path = %self.file_path.display(), "Checkpoint saved");
        Ok(())
    }

    /// Start of the next poll window for a source: the previous window's
    /// end, or `now - default_window` when the source has never been polled
    pub fn next_window_start(&self, source_id: &str, default_window: Duration) -> Result<SecondsSinceUnixEpoch> {
        match self.state.sources.get(source_id) {
            Some(checkpoint) => Ok(checkpoint.last_poll_end),
            None => lookback_start(default_window),
        }
    }

    /// Records a completed poll for a source
    pub fn record_poll(
        &mut self,
        source_id: &str,
        window_end: SecondsSinceUnixEpoch,
        batches: u32,
        documents: u64,
    ) {
        self.state
            .sources
            .entry(source_id.to_string())
            .or_insert_with(|| SourceCheckpoint::new(source_id, window_end))
            .record_poll(window_end, batches, documents);
        self.state.updated_at = Utc::now();
        self.dirty = true;
    }

    pub fn get_checkpoint(&self, source_id: &str) -> Option<&SourceCheckpoint> {
        self.state.sources.get(source_id)
    }

    pub fn all_checkpoints(&self) -> &HashMap<String, SourceCheckpoint> {
        &self.state.sources
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Forces a save
    pub async fn save(&mut self) -> Result<()> {
        if let Err(e) = self.save_to_file().await {
            error!(error = %e, "Failed to save checkpoint");
            return Err(IngestionError::CheckpointError(e.to_string()));
        }
        self.dirty = false;
        Ok(())
    }

    /// Resets checkpoint for a specific source
    pub fn reset_source(&mut self, source_id: &str) {
        self.state.sources.remove(source_id);
        self.dirty = true;
    }

    /// Resets all checkpoints
    pub fn reset_all(&mut self) {
        self.state = CheckpointState::default();
        self.dirty = true;
    }
}

/// Converts a UTC instant to fractional epoch seconds
pub fn epoch_seconds(at: DateTime<Utc>) -> SecondsSinceUnixEpoch {
    at.timestamp_millis() as f64 / 1000.0
}

/// Epoch seconds `window` before now
pub fn lookback_start(window: Duration) -> Result<SecondsSinceUnixEpoch> {
    Utc::now()
        .checked_sub_signed(window)
        .map(epoch_seconds)
        .ok_or_else(|| IngestionError::InvalidConfig(format!("Lookback window out of range: {}", window)))
}

/// Parses a human-readable duration string (e.g., "1h", "30m", "2d")
pub fn parse_since(since_str: &str) -> Result<Duration> {
    let since_str = since_str.trim().to_lowercase();

    if since_str.is_empty() {
        return Err(IngestionError::InvalidConfig("Empty duration string".to_string()));
    }

    // Try humantime first for complex formats
    if let Ok(std_duration) = humantime::parse_duration(&since_str) {
        return Duration::from_std(std_duration)
            .map_err(|e| IngestionError::InvalidConfig(format!("Duration out of range: {}", e)));
    }

    // Parse simple formats like "1h", "30m", "2d"
    let split = since_str.char_indices().last().map_or(0, |(i, _)| i);
    let (value_str, unit) = since_str.split_at(split);
    let value: i64 = value_str
        .parse()
        .map_err(|_| IngestionError::InvalidConfig(format!("Invalid duration: {}", since_str)))?;

    let duration = match unit {
        "s" => Duration::try_seconds(value),
        "m" => Duration::try_minutes(value),
        "h" => Duration::try_hours(value),
        "d" => Duration::try_days(value),
        "w" => Duration::try_weeks(value),
        _ => return Err(IngestionError::InvalidConfig(format!("Unknown duration unit: {}", unit))),
    };

    duration.ok_or_else(|| IngestionError::InvalidConfig(format!("Duration out of range: {}", since_str)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_since() {
        assert_eq!(parse_since("1h").unwrap(), Duration::hours(1));
        assert_eq!(parse_since("30m").unwrap(), Duration::minutes(30));
        assert_eq!(parse_since("2d").unwrap(), Duration::days(2));
        assert_eq!(parse_since("1w").unwrap(), Duration::weeks(1));
        assert_eq!(parse_since("60s").unwrap(), Duration::seconds(60));
        assert_eq!(parse_since("1h 30m").unwrap(), Duration::minutes(90));
        assert!(parse_since("").is_err());
        assert!(parse_since("soon").is_err());
    }

    #[test]
    fn test_parse_since_out_of_range() {
        for input in ["999999999999999999d", "999999999999999999w", "9223372036854775807s"] {
            let err = parse_since(input).unwrap_err();
            assert!(matches!(err, IngestionError::InvalidConfig(_)), "{}: {}", input, err);
        }
    }

    #[test]
    fn test_lookback_start_out_of_range() {
        let huge = parse_since("1000000000d").unwrap();
        assert!(matches!(lookback_start(huge), Err(IngestionError::InvalidConfig(_))));

        let start = lookback_start(Duration::hours(1)).unwrap();
        let expected = epoch_seconds(Utc::now() - Duration::hours(1));
        assert!((expected - start).abs() < 5.0);
    }

    #[test]
    fn test_epoch_seconds() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_250).unwrap();
        assert_eq!(epoch_seconds(at), 1_700_000_000.25);
    }

    #[test]
    fn test_source_checkpoint() {
        let mut checkpoint = SourceCheckpoint::new("guru", 100.0);

        checkpoint.record_poll(200.0, 2, 20);
        assert_eq!(checkpoint.last_poll_end, 200.0);
        assert_eq!(checkpoint.last_batch_count, 2);
        assert_eq!(checkpoint.total_documents, 20);

        checkpoint.record_poll(300.0, 1, 5);
        assert_eq!(checkpoint.total_documents, 25);
    }

    #[tokio::test]
    async fn test_checkpoint_manager_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut manager = CheckpointManager::new(temp_dir.path()).await.unwrap();

        manager.record_poll("guru", 1_700_000_000.0, 3, 40);
        assert!(manager.is_dirty());
        manager.save().await.unwrap();
        assert!(!manager.is_dirty());

        let loaded = CheckpointManager::new(temp_dir.path()).await.unwrap();
        let checkpoint = loaded.get_checkpoint("guru").unwrap();
        assert_eq!(checkpoint.total_documents, 40);
        assert_eq!(
            loaded.next_window_start("guru", Duration::days(1)).unwrap(),
            1_700_000_000.0
        );
    }

    #[tokio::test]
    async fn test_next_window_start_defaults_to_lookback() {
        let temp_dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(temp_dir.path()).await.unwrap();

        let start = manager.next_window_start("guru", Duration::hours(1)).unwrap();
        let expected = epoch_seconds(Utc::now() - Duration::hours(1));
        assert!((expected - start).abs() < 5.0);
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_starts_fresh() {
        let temp_dir = tempfile::tempdir().unwrap();
        tokio::fs::write(temp_dir.path().join("checkpoint.json"), "{not json")
            .await
            .unwrap();

        let manager = CheckpointManager::new(temp_dir.path()).await.unwrap();
        assert!(manager.all_checkpoints().is_empty());
    }

    #[tokio::test]
    async fn test_reset() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut manager = CheckpointManager::new(temp_dir.path()).await.unwrap();
        manager.record_poll("guru", 10.0, 1, 1);
        manager.record_poll("other", 10.0, 1, 1);

        manager.reset_source("guru");
        assert!(manager.get_checkpoint("guru").is_none());
        assert!(manager.get_checkpoint("other").is_some());

        manager.reset_all();
        assert!(manager.all_checkpoints().is_empty());
    }
}
