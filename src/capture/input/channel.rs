use crate::capture::input::cursor::CursorState;
use crate::capture::input::device::{is_device_gone, wait_readable, InputBackend, InputDevice};
use crate::capture::input::keycodes;
use crate::capture::input::types::{InputEvent, MouseButton, RawEvent};
use crate::recorder::channel::{RecordingChannel, RecordingError, RecordingResult};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Authoritative absolute cursor lookup (e.g. the compositor)
pub type CursorQuery = Arc<dyn Fn() -> Option<(i32, i32)> + Send + Sync>;

const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(500);
const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(1);
const READ_BACKOFF: Duration = Duration::from_secs(1);
const BACKOFF_STEP: Duration = Duration::from_millis(50);

/// Device event reader
///
/// Owns the open input devices and a background thread that multiplexes
/// reads across them, integrates pointer motion into a virtual cursor and
/// pushes resolved clicks and keys onto a FIFO queue.
pub struct InputTrackingChannel {
    id: String,
    backend: Arc<dyn InputBackend>,
    devices: Vec<Box<dyn InputDevice>>,
    is_recording: Arc<AtomicBool>,
    log_keys: Arc<AtomicBool>,
    screen_size: (i32, i32),
    cursor_query: Option<CursorQuery>,
    poll_timeout: Duration,
    join_timeout: Duration,
    sender: UnboundedSender<InputEvent>,
    receiver: Option<UnboundedReceiver<InputEvent>>,
    thread_handle: Option<JoinHandle<Vec<Box<dyn InputDevice>>>>,
}

impl InputTrackingChannel {
    pub fn new(backend: Arc<dyn InputBackend>, screen_size: (i32, i32)) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            id: "input".to_string(),
            backend,
            devices: Vec::new(),
            is_recording: Arc::new(AtomicBool::new(false)),
            log_keys: Arc::new(AtomicBool::new(true)),
            screen_size,
            cursor_query: None,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            sender,
            receiver: Some(receiver),
            thread_handle: None,
        }
    }

    pub fn with_cursor_query(mut self, query: CursorQuery) -> Self {
        self.cursor_query = Some(query);
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Hand the consuming end of the event queue to the coordinator.
    /// Returns `None` once taken.
    pub fn take_events(&mut self) -> Option<UnboundedReceiver<InputEvent>> {
        self.receiver.take()
    }

    /// Enable or disable keystroke capture; takes effect immediately, even
    /// while the reader thread is running.
    pub fn set_log_keys(&self, enabled: bool) {
        self.log_keys.store(enabled, Ordering::SeqCst);
    }

    pub fn log_keys(&self) -> bool {
        self.log_keys.load(Ordering::SeqCst)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Enumerate and open candidate devices, keeping pointer- and
    /// key-capable ones. Returns the number of usable devices.
    pub fn open(&mut self) -> usize {
        self.devices.clear();

        let paths = match self.backend.list() {
            Ok(paths) => paths,
            Err(e) => {
                tracing::error!("Cannot enumerate input devices: {}", e);
                return 0;
            }
        };

        let mut pointers = 0;
        let mut keyboards = 0;
        for path in paths {
            let device = match self.backend.open(&path) {
                Ok(device) => device,
                Err(source) => {
                    let err = RecordingError::DeviceAccess { path, source };
                    tracing::warn!("{}", err);
                    continue;
                }
            };

            let caps = device.capabilities();
            if !caps.is_usable() {
                tracing::trace!("Skipping {} ({})", device.name(), device.path().display());
                continue;
            }
            if caps.pointer {
                pointers += 1;
                tracing::debug!("Pointer found: {} ({})", device.name(), device.path().display());
            }
            if caps.keys {
                keyboards += 1;
                tracing::debug!("Keyboard found: {} ({})", device.name(), device.path().display());
            }
            self.devices.push(device);
        }

        tracing::info!(
            "Input devices found: {} pointers, {} keyboards",
            pointers,
            keyboards
        );
        self.devices.len()
    }
}

#[async_trait]
impl RecordingChannel for InputTrackingChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&mut self) -> RecordingResult<()> {
        if self.is_recording.load(Ordering::SeqCst) {
            return Err(RecordingError::AlreadyRecording);
        }

        if self.devices.is_empty() {
            self.open();
        }
        if self.devices.is_empty() {
            tracing::error!("No input devices available, reader not started");
            return Err(RecordingError::NoDevicesFound);
        }

        let translator = EventTranslator {
            cursor: CursorState::new(self.screen_size.0, self.screen_size.1),
            log_keys: self.log_keys.clone(),
            cursor_query: self.cursor_query.clone(),
            sender: self.sender.clone(),
        };
        let devices = std::mem::take(&mut self.devices);
        let is_recording = self.is_recording.clone();
        let poll_timeout = self.poll_timeout;

        is_recording.store(true, Ordering::SeqCst);
        let spawned = std::thread::Builder::new()
            .name("wsr-input".to_string())
            .spawn(move || read_loop(devices, translator, is_recording, poll_timeout));

        match spawned {
            Ok(handle) => self.thread_handle = Some(handle),
            Err(e) => {
                self.is_recording.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        }

        tracing::info!(
            "Input tracking started (poll_timeout={:?}, log_keys={})",
            self.poll_timeout,
            self.log_keys()
        );
        Ok(())
    }

    async fn stop(&mut self) -> RecordingResult<()> {
        if !self.is_recording.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(handle) = self.thread_handle.take() {
            let deadline = Instant::now() + self.join_timeout;
            while !handle.is_finished() && Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            if handle.is_finished() {
                match handle.join() {
                    // Dropping the devices closes their descriptors
                    Ok(devices) => drop(devices),
                    Err(_) => tracing::warn!("Input thread panicked"),
                }
            } else {
                tracing::warn!(
                    "Input thread did not exit within {:?}, detaching",
                    self.join_timeout
                );
            }
        }

        tracing::info!("Input tracking stopped");
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.is_recording.load(Ordering::SeqCst)
    }
}

fn read_loop(
    mut devices: Vec<Box<dyn InputDevice>>,
    mut translator: EventTranslator,
    is_recording: Arc<AtomicBool>,
    poll_timeout: Duration,
) -> Vec<Box<dyn InputDevice>> {
    tracing::debug!("Input thread running over {} devices", devices.len());

    while is_recording.load(Ordering::SeqCst) {
        let ready = match wait_readable(&devices, poll_timeout) {
            Ok(ready) => ready,
            Err(e) => {
                if is_recording.load(Ordering::SeqCst) {
                    tracing::error!("Input wait failed: {}", e);
                    back_off(&is_recording);
                }
                continue;
            }
        };

        let mut failed = false;
        let mut gone = Vec::new();
        for index in ready {
            let device = &mut devices[index];
            match device.read() {
                Ok(events) => {
                    for event in events {
                        translator.handle(device.name(), event);
                    }
                }
                Err(source) if is_device_gone(&source) => gone.push(index),
                Err(source) => {
                    failed = true;
                    if is_recording.load(Ordering::SeqCst) {
                        let err = RecordingError::TransientRead {
                            device: device.name().to_string(),
                            source,
                        };
                        tracing::warn!("{}", err);
                    }
                }
            }
        }

        // `ready` is ascending, so removing from the back keeps indices valid
        for index in gone.into_iter().rev() {
            let device = devices.remove(index);
            tracing::warn!("Input device {} ({}) removed", device.name(), device.path().display());
            if devices.is_empty() {
                tracing::warn!("No input devices left");
            }
        }

        if failed {
            back_off(&is_recording);
        }
    }

    tracing::debug!("Input thread exiting");
    devices
}

/// Sleep for the read backoff, waking early once recording stops.
fn back_off(is_recording: &AtomicBool) {
    let until = Instant::now() + READ_BACKOFF;
    while is_recording.load(Ordering::SeqCst) && Instant::now() < until {
        std::thread::sleep(BACKOFF_STEP);
    }
}

/// Turns raw device signals into queue events. Lives on the reader thread.
struct EventTranslator {
    cursor: CursorState,
    log_keys: Arc<AtomicBool>,
    cursor_query: Option<CursorQuery>,
    sender: UnboundedSender<InputEvent>,
}

impl EventTranslator {
    fn handle(&mut self, device: &str, event: RawEvent) {
        match event {
            RawEvent::PointerDelta { dx, dy } => self.cursor.apply_delta(dx, dy),
            RawEvent::ButtonTransition { down: false, .. } => {}
            RawEvent::ButtonTransition { code, down: true } => match MouseButton::from_code(code) {
                Some(button) => {
                    let (x, y) = self.click_position();
                    tracing::info!("Mouse click: {} at {},{}", button, x, y);
                    self.emit(InputEvent::Click {
                        button,
                        x,
                        y,
                        time: Utc::now(),
                    });
                }
                None => self.emit(InputEvent::Other {
                    kind: keycodes::button_name(code),
                    time: Utc::now(),
                }),
            },
            RawEvent::KeyTransition { code, down } => {
                if !down || !self.log_keys.load(Ordering::Relaxed) {
                    return;
                }
                let key = keycodes::key_name(code);
                tracing::info!("Key pressed: {} (on {})", key, device);
                self.emit(InputEvent::Key {
                    key,
                    time: Utc::now(),
                });
            }
        }
    }

    /// The compositor's answer wins when available; the integrated cursor is
    /// re-anchored on it so later fallbacks stay consistent.
    fn click_position(&mut self) -> (i32, i32) {
        if let Some(query) = &self.cursor_query {
            if let Some((x, y)) = query() {
                self.cursor.warp(x, y);
                return (x, y);
            }
            tracing::debug!("Cursor query unavailable, using integrated position");
        }
        self.cursor.position()
    }

    fn emit(&self, event: InputEvent) {
        if self.sender.send(event).is_err() {
            tracing::debug!("Event queue closed, dropping event");
        }
    }
}
