use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_CHECKPOINT_FILE: &str = "logs/backfill_checkpoint.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTicker {
    pub ticker: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub completed_tickers: Vec<String>,
    pub failed_tickers: Vec<FailedTicker>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl CheckpointState {
    pub fn is_completed(&self, ticker: &str) -> bool {
        self.completed_tickers.iter().any(|t| t == ticker)
    }
}

/// Resumable progress of a backfill, persisted as pretty JSON after every
/// ticker so an interrupted run loses at most the ticker in flight
pub struct BackfillCheckpoint {
    path: PathBuf,
}

impl BackfillCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Empty state when the file doesn't exist yet
    pub fn load(&self) -> Result<CheckpointState> {
        if !self.path.exists() {
            return Ok(CheckpointState::default());
        }

        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, state: &mut CheckpointState) -> Result<()> {
        state.last_updated = Some(Utc::now());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(&self.path, serde_json::to_string_pretty(state)?)?;
        debug!("Checkpoint saved to {}", self.path.display());
        Ok(())
    }

    /// Discard any previous progress
    pub fn reset(&self) -> Result<CheckpointState> {
        let mut state = CheckpointState::default();
        self.save(&mut state)?;
        Ok(state)
    }

    pub fn mark_completed(&self, ticker: &str) -> Result<()> {
        let mut state = self.load()?;
        if !state.is_completed(ticker) {
            state.completed_tickers.push(ticker.to_string());
        }
        self.save(&mut state)
    }

    pub fn mark_failed(&self, ticker: &str, error: &str) -> Result<()> {
        let mut state = self.load()?;
        state.failed_tickers.push(FailedTicker {
            ticker: ticker.to_string(),
            error: error.to_string(),
        });
        self.save(&mut state)
    }
}
