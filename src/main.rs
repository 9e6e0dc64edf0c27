// wsr - record a Wayland session into an annotated timeline
// Stop with Ctrl+C (or SIGINT from a status-bar toggle).

use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use wsr_lib::capture::input::{CursorQuery, EvdevBackend, InputTrackingChannel};
use wsr_lib::capture::{detect_backend, Compositor, HyprlandCompositor, MonitorResolver};
use wsr_lib::config::RecorderConfig;
use wsr_lib::recorder::{
    JsonTimelineWriter, RecordingState, ScreenshotPool, SessionCoordinator, SessionStatus,
    StateFile, TimelineSink,
};

/// Removes the state file however the process exits
struct StateFileGuard(StateFile);

impl StateFileGuard {
    fn set(&self, status: &SessionStatus) {
        if let Err(e) = self.0.write(status) {
            tracing::warn!("Cannot write state file {:?}: {}", self.0.path(), e);
        }
    }
}

impl Drop for StateFileGuard {
    fn drop(&mut self) {
        self.0.remove();
    }
}

/// Count down before recording. Returns `false` if interrupted.
async fn countdown(seconds: u32, state: &StateFileGuard) -> bool {
    let started_at = Utc::now();
    for remaining in (1..=seconds).rev() {
        state.set(&SessionStatus::current(RecordingState::Countdown, started_at).with_remaining(remaining));
        tracing::info!("Starting in {}...", remaining);

        tokio::select! {
            _ = tokio::signal::ctrl_c() => return false,
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
    }
    true
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wsr_lib::init_tracing(std::env::var_os("WSR_VERBOSE").is_some());
    tracing::info!("Starting wsr v{}", env!("CARGO_PKG_VERSION"));

    let config = RecorderConfig::load().context("invalid configuration")?;
    let state = StateFileGuard(StateFile::new(&config.state_file));

    if !countdown(config.countdown_secs, &state).await {
        tracing::info!("Cancelled during countdown");
        return Ok(());
    }

    let compositor: Arc<dyn Compositor> = Arc::new(HyprlandCompositor);
    let resolver = MonitorResolver::new(compositor.clone(), config.topology_cooldown()).await;
    let screen = resolver.bounding_box().unwrap_or_else(|| {
        tracing::warn!(
            "No monitors reported, assuming {}x{}",
            config.fallback_screen.width,
            config.fallback_screen.height
        );
        (config.fallback_screen.width, config.fallback_screen.height)
    });

    let query_compositor = compositor.clone();
    let cursor_query: CursorQuery = Arc::new(move || query_compositor.cursor_position().ok());

    let mut input = InputTrackingChannel::new(Arc::new(EvdevBackend), screen)
        .with_cursor_query(cursor_query)
        .with_poll_timeout(config.poll_timeout());
    input.set_log_keys(config.log_keys);
    let events = input
        .take_events()
        .context("input event queue already taken")?;

    let pool = ScreenshotPool::new(detect_backend(), config.capture_workers);
    let mut coordinator = SessionCoordinator::new(&config, Box::new(input), events, resolver, pool)?;

    coordinator
        .start()
        .await
        .context("cannot start recording")?;
    let started_at = coordinator.started_at().unwrap_or_else(Utc::now);
    state.set(&SessionStatus::current(RecordingState::Recording, started_at));
    tracing::info!("Recording, press Ctrl+C to stop");

    coordinator
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Cannot listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    coordinator.stop().await?;
    state.set(&SessionStatus::current(RecordingState::Stopping, started_at));

    let pending = coordinator.pending_screenshots();
    if pending > 0 {
        tracing::info!("Waiting for {} screenshots...", pending);
    }
    let summary = coordinator.drain_and_shutdown(config.drain_timeout()).await;
    tracing::info!(
        "{} clicks, {} screenshots ({} missing)",
        summary.clicks,
        summary.screenshots,
        summary.missing()
    );

    let writer = JsonTimelineWriter::new(&config.output_dir);
    let path = writer
        .render(coordinator.timeline(), started_at)
        .await
        .context("cannot write timeline")?;
    tracing::info!("Session saved to {}", path.display());

    Ok(())
}
