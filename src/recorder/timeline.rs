//! Session timeline
//!
//! Events are appended in arrival order and never reordered. Clicks carry a
//! write-once slot that a capture worker fills once the screenshot is ready.

use crate::capture::input::MouseButton;
use crate::capture::screenshot::{ImageFormat, Screenshot};
use crate::recorder::channel::RecordingResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// Single-assignment cell for a click's screenshot
///
/// Cloning shares the cell. Only the first `fill` wins.
#[derive(Clone, Default)]
pub struct ScreenshotSlot(Arc<OnceLock<Screenshot>>);

impl ScreenshotSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the screenshot. Returns `false` if the slot was already filled.
    pub fn fill(&self, screenshot: Screenshot) -> bool {
        self.0.set(screenshot).is_ok()
    }

    pub fn get(&self) -> Option<&Screenshot> {
        self.0.get()
    }

    pub fn is_filled(&self) -> bool {
        self.0.get().is_some()
    }
}

impl std::fmt::Debug for ScreenshotSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.get() {
            Some(shot) => write!(f, "ScreenshotSlot({:?})", shot),
            None => f.write_str("ScreenshotSlot(empty)"),
        }
    }
}

/// A click resolved against the monitor topology
#[derive(Debug, Clone, Serialize)]
pub struct ClickEvent {
    pub button: MouseButton,
    /// Absolute desktop position
    pub x: i32,
    pub y: i32,
    /// Position relative to `monitor`'s origin (absolute when unresolved)
    pub rel_x: i32,
    pub rel_y: i32,
    pub monitor: Option<String>,
    pub time: DateTime<Utc>,
    #[serde(skip)]
    pub screenshot: ScreenshotSlot,
}

/// Timeline unit
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Click(ClickEvent),
    KeyGroup { text: String, time: DateTime<Utc> },
    Raw { kind: String, time: DateTime<Utc> },
}

impl SessionEvent {
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            SessionEvent::Click(click) => click.time,
            SessionEvent::KeyGroup { time, .. } | SessionEvent::Raw { time, .. } => *time,
        }
    }

    pub fn as_click(&self) -> Option<&ClickEvent> {
        match self {
            SessionEvent::Click(click) => Some(click),
            _ => None,
        }
    }
}

/// Ordered list of session events
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    events: Vec<SessionEvent>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: SessionEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[SessionEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clicks(&self) -> impl Iterator<Item = &ClickEvent> {
        self.events.iter().filter_map(SessionEvent::as_click)
    }

    /// Clicks that ended up with a screenshot
    pub fn screenshot_count(&self) -> usize {
        self.clicks().filter(|click| click.screenshot.is_filled()).count()
    }
}

/// Consumer of a finished session
#[async_trait]
pub trait TimelineSink: Send + Sync {
    /// Render the timeline, returning the path of the main artifact.
    async fn render(&self, timeline: &Timeline, started_at: DateTime<Utc>) -> RecordingResult<PathBuf>;
}

#[derive(Serialize)]
struct EventRecord<'a> {
    #[serde(flatten)]
    event: &'a SessionEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    screenshot: Option<String>,
}

#[derive(Serialize)]
struct TimelineDocument<'a> {
    session_id: String,
    started_at: DateTime<Utc>,
    event_count: usize,
    events: Vec<EventRecord<'a>>,
}

/// Writes `timeline.json` plus one image per screenshot into a session directory
#[derive(Debug, Clone)]
pub struct JsonTimelineWriter {
    output_dir: PathBuf,
}

impl JsonTimelineWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn session_dir(&self, started_at: DateTime<Utc>) -> PathBuf {
        self.output_dir
            .join(format!("session-{}", started_at.format("%Y%m%d-%H%M%S")))
    }
}

#[async_trait]
impl TimelineSink for JsonTimelineWriter {
    async fn render(&self, timeline: &Timeline, started_at: DateTime<Utc>) -> RecordingResult<PathBuf> {
        let dir = self.session_dir(started_at);
        tokio::fs::create_dir_all(&dir).await?;

        let mut records = Vec::with_capacity(timeline.len());
        for (index, event) in timeline.events().iter().enumerate() {
            let mut screenshot = None;
            if let Some(shot) = event.as_click().and_then(|click| click.screenshot.get()) {
                let extension = ImageFormat::from_mime(&shot.mime)
                    .map(|format| format.extension())
                    .unwrap_or("bin");
                let file_name = format!("click-{:04}.{}", index, extension);
                tokio::fs::write(dir.join(&file_name), &shot.bytes).await?;
                screenshot = Some(file_name);
            }
            records.push(EventRecord { event, screenshot });
        }

        let document = TimelineDocument {
            session_id: uuid::Uuid::new_v4().to_string(),
            started_at,
            event_count: records.len(),
            events: records,
        };

        let path = dir.join("timeline.json");
        tokio::fs::write(&path, serde_json::to_vec_pretty(&document)?).await?;

        tracing::info!(
            "Timeline written to {:?} ({} events, {} screenshots)",
            path,
            timeline.len(),
            timeline.screenshot_count()
        );
        Ok(path)
    }
}
