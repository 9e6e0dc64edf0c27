//! Recording state and the session state file
//!
//! The state file lets external tools (status bars, toggle scripts) see
//! whether a recorder is running and signal it by PID.

use crate::recorder::channel::{RecordingError, RecordingResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default location of the state file
pub const DEFAULT_STATE_FILE: &str = "/tmp/wsr_state.json";

/// Current recording state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    #[default]
    Idle,
    Countdown,
    Recording,
    Stopping,
}

/// Contents of the state file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub pid: u32,
    pub state: RecordingState,
    pub started_at: DateTime<Utc>,
    /// Seconds left in the countdown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
}

impl SessionStatus {
    pub fn current(state: RecordingState, started_at: DateTime<Utc>) -> Self {
        Self {
            pid: std::process::id(),
            state,
            started_at,
            remaining: None,
        }
    }

    pub fn with_remaining(mut self, remaining: u32) -> Self {
        self.remaining = Some(remaining);
        self
    }
}

#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the state file atomically.
    pub fn write(&self, status: &SessionStatus) -> RecordingResult<()> {
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(status)?)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!("State file {:?} -> {:?}", self.path, status.state);
        Ok(())
    }

    /// Read the state file; `None` when it does not exist.
    pub fn read(&self) -> RecordingResult<Option<SessionStatus>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RecordingError::Io(e)),
        }
    }

    /// Remove the state file, ignoring a missing file.
    pub fn remove(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed state file {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove state file {:?}: {}", self.path, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_file_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let file = StateFile::new(dir.path().join("state.json"));
        assert_eq!(file.read().unwrap(), None);

        let status = SessionStatus::current(RecordingState::Countdown, Utc::now()).with_remaining(3);
        file.write(&status).unwrap();
        assert_eq!(file.read().unwrap(), Some(status.clone()));

        let recording = SessionStatus::current(RecordingState::Recording, status.started_at);
        file.write(&recording).unwrap();
        let read = file.read().unwrap().unwrap();
        assert_eq!(read.state, RecordingState::Recording);
        assert_eq!(read.remaining, None);

        file.remove();
        assert_eq!(file.read().unwrap(), None);
        file.remove();
    }

    #[test]
    fn test_status_format() {
        let status = SessionStatus::current(RecordingState::Countdown, Utc::now()).with_remaining(2);
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["state"], "countdown");
        assert_eq!(value["remaining"], 2);
        assert_eq!(value["pid"], std::process::id());

        let value = serde_json::to_value(SessionStatus::current(RecordingState::Recording, Utc::now())).unwrap();
        assert!(value.get("remaining").is_none());
    }
}
