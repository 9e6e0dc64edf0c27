//! Session coordinator
//!
//! Drains the input queue, groups keystrokes, resolves clicks against the
//! monitor topology and dispatches screenshot captures. Events are appended
//! to the timeline in arrival order; screenshots attach later via slots.

use crate::capture::input::InputEvent;
use crate::capture::monitor::MonitorResolver;
use crate::capture::screenshot::{CaptureRequest, ImageFormat};
use crate::config::RecorderConfig;
use crate::recorder::channel::{RecordingChannel, RecordingError, RecordingResult};
use crate::recorder::keybuffer::KeyBuffer;
use crate::recorder::screenshot_pool::ScreenshotPool;
use crate::recorder::state::RecordingState;
use crate::recorder::timeline::{ClickEvent, ScreenshotSlot, SessionEvent, Timeline};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;

/// Outcome of draining the screenshot pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainSummary {
    pub clicks: usize,
    pub screenshots: usize,
    /// Captures that finished during the drain itself
    pub completed_during_drain: usize,
}

impl DrainSummary {
    /// Clicks left without a screenshot (failed or timed out)
    pub fn missing(&self) -> usize {
        self.clicks.saturating_sub(self.screenshots)
    }
}

pub struct SessionCoordinator {
    input: Box<dyn RecordingChannel>,
    events: UnboundedReceiver<InputEvent>,
    keys: KeyBuffer,
    /// Wall-clock time of the last key in the buffer
    last_key_time: Option<DateTime<Utc>>,
    /// Maps event wall-clock times onto the monotonic clock
    clock_anchor: (Instant, DateTime<Utc>),
    resolver: MonitorResolver,
    pool: ScreenshotPool,
    timeline: Timeline,
    image_format: ImageFormat,
    image_quality: u8,
    loop_interval: Duration,
    state: RecordingState,
    started_at: Option<DateTime<Utc>>,
}

impl SessionCoordinator {
    pub fn new(
        config: &RecorderConfig,
        input: Box<dyn RecordingChannel>,
        events: UnboundedReceiver<InputEvent>,
        resolver: MonitorResolver,
        pool: ScreenshotPool,
    ) -> RecordingResult<Self> {
        Ok(Self {
            input,
            events,
            keys: KeyBuffer::new(config.key_interval_ms)?,
            last_key_time: None,
            clock_anchor: (Instant::now(), Utc::now()),
            resolver,
            pool,
            timeline: Timeline::new(),
            image_format: config.image_format,
            image_quality: config.image_quality,
            loop_interval: config.loop_interval(),
            state: RecordingState::Idle,
            started_at: None,
        })
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn pending_screenshots(&self) -> usize {
        self.pool.pending_count()
    }

    /// Start the input channel and begin a session.
    pub async fn start(&mut self) -> RecordingResult<()> {
        if self.state == RecordingState::Recording {
            return Err(RecordingError::AlreadyRecording);
        }

        tracing::info!("Starting {} channel", self.input.id());
        self.input.start().await?;

        self.state = RecordingState::Recording;
        self.started_at = Some(Utc::now());
        tracing::info!("Recording started");
        Ok(())
    }

    /// Stop the input channel, process what it queued and flush the last
    /// key run.
    pub async fn stop(&mut self) -> RecordingResult<()> {
        if self.state != RecordingState::Recording {
            return Err(RecordingError::NotRecording);
        }
        self.state = RecordingState::Stopping;

        if let Err(e) = self.input.stop().await {
            tracing::error!("Failed to stop {} channel: {}", self.input.id(), e);
        }

        self.process_pending().await;
        self.flush_keys(None);

        tracing::info!("Recording stopped with {} events", self.timeline.len());
        Ok(())
    }

    /// Wait for outstanding screenshots, then close the pool.
    pub async fn drain_and_shutdown(&mut self, timeout: Duration) -> DrainSummary {
        let completed_during_drain = self.pool.wait_for_pending(timeout).await;
        self.pool.shutdown(false).await;
        self.state = RecordingState::Idle;

        let summary = DrainSummary {
            clicks: self.timeline.clicks().count(),
            screenshots: self.timeline.screenshot_count(),
            completed_during_drain,
        };
        if summary.missing() > 0 {
            tracing::warn!("{} of {} clicks have no screenshot", summary.missing(), summary.clicks);
        }
        summary
    }

    /// Run the control loop until `shutdown` resolves.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            self.process_pending().await;
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.loop_interval) => {}
            }
        }
        tracing::debug!("Coordinator loop finished");
    }

    /// One loop iteration without sleeping. Returns the number of queue
    /// events handled.
    pub async fn process_pending(&mut self) -> usize {
        if self.keys.is_timed_out() {
            self.flush_keys(None);
        }

        let mut handled = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.handle(event).await;
                    handled += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::debug!("Input queue closed");
                    break;
                }
            }
        }
        handled
    }

    async fn handle(&mut self, event: InputEvent) {
        match event {
            InputEvent::Key { key, time } => self.handle_key(&key, time),
            InputEvent::Click { button, x, y, time } => {
                self.flush_keys(Some(time));

                let monitor = self.resolver.get_monitor_at(x, y).await;
                let (rel_x, rel_y) = self.resolver.get_relative_coordinates(x, y, monitor.as_deref());
                tracing::info!(
                    "Click {} at ({}, {}) on {} ({}, {})",
                    button,
                    x,
                    y,
                    monitor.as_deref().unwrap_or("unknown monitor"),
                    rel_x,
                    rel_y
                );

                let slot = ScreenshotSlot::new();
                self.timeline.push(SessionEvent::Click(ClickEvent {
                    button,
                    x,
                    y,
                    rel_x,
                    rel_y,
                    monitor: monitor.clone(),
                    time,
                    screenshot: slot.clone(),
                }));
                self.pool.submit(
                    slot,
                    CaptureRequest {
                        monitor,
                        x,
                        y,
                        rel_x,
                        rel_y,
                        format: self.image_format,
                        quality: self.image_quality,
                    },
                );
            }
            InputEvent::Other { kind, time } => {
                tracing::debug!("Event {}", kind);
                self.timeline.push(SessionEvent::Raw { kind, time });
            }
        }
    }

    fn handle_key(&mut self, key: &str, time: DateTime<Utc>) {
        let at = self.instant_for(time);
        if !self.keys.add_at(key, at) {
            self.flush_keys(Some(time));
            self.keys.add_at(key, at);
        }
        self.last_key_time = Some(time);
    }

    /// Append the buffered key run, stamped with `time` or, when absent,
    /// with the time of its last key.
    fn flush_keys(&mut self, time: Option<DateTime<Utc>>) {
        let stamp = time.or(self.last_key_time);
        self.last_key_time = None;

        if let Some(text) = self.keys.flush() {
            tracing::debug!("Key group {:?}", text);
            self.timeline.push(SessionEvent::KeyGroup {
                text,
                time: stamp.unwrap_or_else(Utc::now),
            });
        }
    }

    fn instant_for(&self, time: DateTime<Utc>) -> Instant {
        let (anchor, anchor_time) = self.clock_anchor;
        let offset = (time - anchor_time).to_std().unwrap_or(Duration::ZERO);
        anchor + offset
    }
}
