//! Asynchronous screenshot capture
//!
//! Capture requests run on blocking workers bounded by a semaphore. A unit
//! fills its click's slot only when it finishes; units cancelled at the
//! drain deadline never touch the slot.

use crate::capture::screenshot::{CaptureBackend, CaptureRequest, ImageFormat};
use crate::recorder::channel::RecordingError;
use crate::recorder::timeline::ScreenshotSlot;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Default number of concurrent captures
pub const DEFAULT_WORKERS: usize = 2;

pub struct ScreenshotPool {
    backend: Arc<dyn CaptureBackend>,
    workers: Arc<Semaphore>,
    /// Tracked units; each resolves to `true` when it filled its slot
    pending: Mutex<Vec<JoinHandle<bool>>>,
    accepting: AtomicBool,
}

impl ScreenshotPool {
    /// Create a pool running at most `workers` captures at once (0 means 1).
    pub fn new(backend: Arc<dyn CaptureBackend>, workers: usize) -> Self {
        let workers = workers.max(1);
        tracing::debug!("Screenshot pool using {} with {} workers", backend.name(), workers);
        Self {
            backend,
            workers: Arc::new(Semaphore::new(workers)),
            pending: Mutex::new(Vec::new()),
            accepting: AtomicBool::new(true),
        }
    }

    /// Queue a capture of `monitor` with the cursor at a monitor-relative
    /// position that is also its desktop position.
    pub fn request(
        &self,
        slot: ScreenshotSlot,
        monitor: Option<String>,
        rel_x: i32,
        rel_y: i32,
        format: ImageFormat,
        quality: u8,
    ) {
        self.submit(
            slot,
            CaptureRequest {
                monitor,
                x: rel_x,
                y: rel_y,
                rel_x,
                rel_y,
                format,
                quality,
            },
        );
    }

    /// Queue `request` for `slot`. Returns immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, slot: ScreenshotSlot, request: CaptureRequest) {
        if !self.accepting.load(Ordering::SeqCst) {
            tracing::warn!("Screenshot pool is shut down, dropping capture request");
            return;
        }

        let backend = self.backend.clone();
        let workers = self.workers.clone();

        let unit = tokio::spawn(async move {
            let _permit = match workers.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return false,
            };

            let target = request.monitor.clone();
            let result =
                tokio::task::spawn_blocking(move || backend.capture_and_compress(&request)).await;

            match result {
                Ok(Ok(screenshot)) => {
                    tracing::debug!(
                        "Captured {} ({} bytes) for {:?}",
                        screenshot.mime,
                        screenshot.bytes.len(),
                        target
                    );
                    slot.fill(screenshot)
                }
                Ok(Err(e)) => {
                    tracing::warn!("Screenshot for {:?} failed: {}", target, e);
                    false
                }
                Err(e) => {
                    tracing::error!("Screenshot worker panicked: {}", e);
                    false
                }
            }
        });

        self.pending.lock().push(unit);
    }

    /// Units queued or running
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .iter()
            .filter(|unit| !unit.is_finished())
            .count()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Wait for every tracked unit against one shared deadline.
    ///
    /// Returns how many filled their slot. Units still running at the
    /// deadline are cancelled and their clicks stay without a screenshot.
    pub async fn wait_for_pending(&self, timeout: Duration) -> usize {
        let units = std::mem::take(&mut *self.pending.lock());
        if units.is_empty() {
            return 0;
        }

        let deadline = tokio::time::Instant::now() + timeout;
        let mut completed = 0;
        let mut timed_out = 0;

        for mut unit in units {
            match tokio::time::timeout_at(deadline, &mut unit).await {
                Ok(Ok(true)) => completed += 1,
                Ok(Ok(false)) => {}
                Ok(Err(e)) => tracing::error!("Screenshot unit failed to join: {}", e),
                Err(_) => {
                    unit.abort();
                    timed_out += 1;
                }
            }
        }

        if timed_out > 0 {
            tracing::warn!(
                "{}: {} screenshot(s) still running after {:?}",
                RecordingError::CaptureTimeout,
                timed_out,
                timeout
            );
        }
        completed
    }

    /// Stop accepting requests; with `wait`, let in-flight units finish.
    pub async fn shutdown(&self, wait: bool) {
        self.accepting.store(false, Ordering::SeqCst);
        if !wait {
            return;
        }

        let units = std::mem::take(&mut *self.pending.lock());
        for unit in units {
            if let Err(e) = unit.await {
                tracing::error!("Screenshot unit failed to join: {}", e);
            }
        }
    }
}

impl Drop for ScreenshotPool {
    fn drop(&mut self) {
        for unit in self.pending.get_mut().drain(..) {
            unit.abort();
        }
    }
}
