//! Recording channel trait
//!
//! Defines the error taxonomy shared by every component of the pipeline and
//! the interface for long-running capture sources (currently the input reader).

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during recording
///
/// Only `NoDevicesFound` is fatal. Everything else is absorbed at the
/// component boundary and surfaces as a log line plus degraded data.
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Cannot open input device {path}: {source}")]
    DeviceAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No usable input devices found (run as root or as a member of the 'input' group)")]
    NoDevicesFound,

    #[error("Read from input device {device} failed: {source}")]
    TransientRead {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Compositor unavailable: {0}")]
    CompositorUnavailable(String),

    #[error("Capture error: {0}")]
    CaptureFailed(String),

    #[error("Capture timed out")]
    CaptureTimeout,

    #[error("Already recording")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,

    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for recording operations
pub type RecordingResult<T> = Result<T, RecordingError>;

/// Trait for recording channels
///
/// A channel owns a background capture source. The coordinator starts it
/// before entering its loop and stops it before draining screenshots.
#[async_trait]
pub trait RecordingChannel: Send {
    /// Get the channel identifier (e.g. "input")
    fn id(&self) -> &str;

    /// Start recording
    async fn start(&mut self) -> RecordingResult<()>;

    /// Stop recording
    async fn stop(&mut self) -> RecordingResult<()>;

    /// Check if the channel is currently recording
    fn is_recording(&self) -> bool;
}
