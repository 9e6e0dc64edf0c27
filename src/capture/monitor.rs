//! Monitor topology and coordinate mapping
//!
//! Keeps a snapshot of the compositor's monitor layout, maps absolute cursor
//! coordinates to a monitor and to monitor-relative coordinates, and
//! refreshes the snapshot lazily when a point falls outside every known
//! monitor (hot-plug, layout changes).

use crate::recorder::channel::{RecordingError, RecordingResult};
use serde::{Deserialize, Serialize};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_REFRESH_COOLDOWN: Duration = Duration::from_secs(5);
/// Upper bound for one compositor query issued by the resolver
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(2);
const HYPRCTL_TIMEOUT: Duration = Duration::from_secs(1);

/// One monitor in global compositor coordinates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorRect {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl MonitorRect {
    pub fn new(name: impl Into<String>, x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            width,
            height,
        }
    }

    /// Half-open on both axes
    pub fn contains(&self, x: i32, y: i32) -> bool {
        let (x, y) = (i64::from(x), i64::from(y));
        let (left, top) = (i64::from(self.x), i64::from(self.y));
        left <= x && x < self.right() && top <= y && y < self.bottom()
    }

    fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }
}

/// Compositor queries
pub trait Compositor: Send + Sync {
    fn monitors(&self) -> RecordingResult<Vec<MonitorRect>>;

    fn cursor_position(&self) -> RecordingResult<(i32, i32)>;
}

/// Hyprland, queried through `hyprctl`
#[derive(Debug, Default)]
pub struct HyprlandCompositor;

impl HyprlandCompositor {
    /// Run `hyprctl`, killing it if it does not answer within `HYPRCTL_TIMEOUT`.
    fn hyprctl(args: &[&str]) -> RecordingResult<String> {
        let unavailable = |e: std::io::Error| RecordingError::CompositorUnavailable(format!("hyprctl: {}", e));
        let mut child = Command::new("hyprctl")
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(unavailable)?;

        let deadline = Instant::now() + HYPRCTL_TIMEOUT;
        while child.try_wait().map_err(unavailable)?.is_none() {
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RecordingError::CompositorUnavailable(format!(
                    "hyprctl {} timed out",
                    args.join(" ")
                )));
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let output = child.wait_with_output().map_err(unavailable)?;

        if !output.status.success() {
            return Err(RecordingError::CompositorUnavailable(format!(
                "hyprctl {} exited with {}",
                args.join(" "),
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Compositor for HyprlandCompositor {
    fn monitors(&self) -> RecordingResult<Vec<MonitorRect>> {
        parse_hyprctl_monitors(&Self::hyprctl(&["monitors", "-j"])?)
    }

    fn cursor_position(&self) -> RecordingResult<(i32, i32)> {
        parse_cursor_position(&Self::hyprctl(&["cursorpos"])?)
    }
}

/// Parse `hyprctl monitors -j`. Unknown fields are ignored.
pub fn parse_hyprctl_monitors(json: &str) -> RecordingResult<Vec<MonitorRect>> {
    Ok(serde_json::from_str(json)?)
}

/// Parse `hyprctl cursorpos` output, e.g. `"1905, 492\n"`.
pub fn parse_cursor_position(text: &str) -> RecordingResult<(i32, i32)> {
    let invalid = || RecordingError::CompositorUnavailable(format!("unexpected cursorpos output {:?}", text));
    let (x, y) = text.trim().split_once(',').ok_or_else(invalid)?;
    let x = x.trim().parse().map_err(|_| invalid())?;
    let y = y.trim().parse().map_err(|_| invalid())?;
    Ok((x, y))
}

/// Monitor topology resolver
///
/// Compositor queries run on the blocking pool under `query_timeout`, so a
/// hung compositor only costs the caller that timeout.
pub struct MonitorResolver {
    compositor: Arc<dyn Compositor>,
    monitors: Vec<MonitorRect>,
    cooldown: Duration,
    query_timeout: Duration,
    last_refresh: Option<Instant>,
}

impl MonitorResolver {
    /// Create a resolver and load the initial topology.
    pub async fn new(compositor: Arc<dyn Compositor>, cooldown: Duration) -> Self {
        Self::with_query_timeout(compositor, cooldown, DEFAULT_QUERY_TIMEOUT).await
    }

    pub async fn with_query_timeout(
        compositor: Arc<dyn Compositor>,
        cooldown: Duration,
        query_timeout: Duration,
    ) -> Self {
        let mut resolver = Self {
            compositor,
            monitors: Vec::new(),
            cooldown,
            query_timeout,
            last_refresh: None,
        };
        resolver.refresh().await;
        resolver
    }

    async fn query<T, F>(&self, what: &str, f: F) -> RecordingResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Compositor) -> RecordingResult<T> + Send + 'static,
    {
        let compositor = self.compositor.clone();
        let task = tokio::task::spawn_blocking(move || f(compositor.as_ref()));
        match tokio::time::timeout(self.query_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(RecordingError::CompositorUnavailable(format!(
                "{} query failed: {}",
                what, e
            ))),
            Err(_) => Err(RecordingError::CompositorUnavailable(format!(
                "{} query timed out after {:?}",
                what, self.query_timeout
            ))),
        }
    }

    pub fn monitors(&self) -> &[MonitorRect] {
        &self.monitors
    }

    /// Replace the topology with the compositor's current layout. On failure
    /// the previous snapshot stays in place.
    pub async fn refresh(&mut self) {
        self.last_refresh = Some(Instant::now());
        match self.query("monitor", |compositor| compositor.monitors()).await {
            Ok(monitors) if monitors.is_empty() => {
                tracing::warn!("Compositor reported no monitors, keeping previous layout");
            }
            Ok(monitors) => {
                tracing::debug!("Monitors detected: {}", monitors.len());
                self.monitors = monitors;
            }
            Err(e) => {
                tracing::warn!("No monitor data ({}), keeping previous layout", e);
            }
        }
    }

    fn refresh_due(&self) -> bool {
        self.last_refresh
            .map_or(true, |last| last.elapsed() >= self.cooldown)
    }

    fn find(&self, x: i32, y: i32) -> Option<&MonitorRect> {
        self.monitors.iter().find(|monitor| monitor.contains(x, y))
    }

    /// Name of the monitor containing `(x, y)`. A miss triggers at most one
    /// refresh per cooldown window before giving up.
    pub async fn get_monitor_at(&mut self, x: i32, y: i32) -> Option<String> {
        if let Some(monitor) = self.find(x, y) {
            return Some(monitor.name.clone());
        }
        if !self.refresh_due() {
            return None;
        }

        tracing::debug!("Point {},{} outside known monitors, refreshing layout", x, y);
        self.refresh().await;
        self.find(x, y).map(|monitor| monitor.name.clone())
    }

    /// Convert global coordinates to coordinates relative to `monitor`.
    /// Unknown or missing names map to the input unchanged.
    pub fn get_relative_coordinates(&self, x: i32, y: i32, monitor: Option<&str>) -> (i32, i32) {
        monitor
            .and_then(|name| self.monitors.iter().find(|m| m.name == name))
            .map_or((x, y), |m| (x.saturating_sub(m.x), y.saturating_sub(m.y)))
    }

    pub async fn get_cursor_position(&self) -> Option<(i32, i32)> {
        match self.query("cursor", |compositor| compositor.cursor_position()).await {
            Ok(pos) => Some(pos),
            Err(e) => {
                tracing::debug!("Cursor position unavailable: {}", e);
                None
            }
        }
    }

    /// Size of the virtual desktop spanned by all monitors
    pub fn bounding_box(&self) -> Option<(i32, i32)> {
        if self.monitors.is_empty() {
            return None;
        }
        let width = self.monitors.iter().map(MonitorRect::right).max()?;
        let height = self.monitors.iter().map(MonitorRect::bottom).max()?;
        let clamp = |v: i64| i32::try_from(v).unwrap_or(if v < 0 { i32::MIN } else { i32::MAX });
        Some((clamp(width), clamp(height)))
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scriptable compositor that counts layout queries
    #[derive(Default)]
    pub struct FakeCompositor {
        pub monitors: Mutex<Option<Vec<MonitorRect>>>,
        pub cursor: Mutex<Option<(i32, i32)>>,
        pub monitor_calls: AtomicUsize,
        /// Stall applied to every layout query
        pub delay: Mutex<Duration>,
    }

    impl FakeCompositor {
        pub fn with_monitors(monitors: Vec<MonitorRect>) -> Self {
            let fake = Self::default();
            *fake.monitors.lock() = Some(monitors);
            fake
        }

        pub fn calls(&self) -> usize {
            self.monitor_calls.load(Ordering::SeqCst)
        }
    }

    impl Compositor for FakeCompositor {
        fn monitors(&self) -> RecordingResult<Vec<MonitorRect>> {
            self.monitor_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock();
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            self.monitors
                .lock()
                .clone()
                .ok_or_else(|| RecordingError::CompositorUnavailable("fake".to_string()))
        }

        fn cursor_position(&self) -> RecordingResult<(i32, i32)> {
            (*self.cursor.lock())
                .ok_or_else(|| RecordingError::CompositorUnavailable("fake".to_string()))
        }
    }

    pub fn dual_head() -> Vec<MonitorRect> {
        vec![
            MonitorRect::new("eDP-1", 0, 0, 1920, 1080),
            MonitorRect::new("DP-1", 1920, 0, 2560, 1440),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{dual_head, FakeCompositor};
    use super::*;

    #[tokio::test]
    async fn test_get_monitor_at() {
        let compositor = Arc::new(FakeCompositor::with_monitors(dual_head()));
        let mut resolver = MonitorResolver::new(compositor.clone(), DEFAULT_REFRESH_COOLDOWN).await;
        assert_eq!(compositor.calls(), 1);

        assert_eq!(resolver.get_monitor_at(500, 500).await.as_deref(), Some("eDP-1"));
        assert_eq!(resolver.get_monitor_at(2000, 500).await.as_deref(), Some("DP-1"));
        assert_eq!(resolver.get_monitor_at(1920, 0).await.as_deref(), Some("DP-1"));
        assert_eq!(resolver.get_monitor_at(5000, 500).await, None);
        // Inside the cooldown: no extra query
        assert_eq!(compositor.calls(), 1);
    }

    #[tokio::test]
    async fn test_get_relative_coordinates() {
        let compositor = Arc::new(FakeCompositor::with_monitors(dual_head()));
        let resolver = MonitorResolver::new(compositor, DEFAULT_REFRESH_COOLDOWN).await;

        assert_eq!(resolver.get_relative_coordinates(2000, 500, Some("DP-1")), (80, 500));
        assert_eq!(resolver.get_relative_coordinates(500, 500, Some("eDP-1")), (500, 500));
        assert_eq!(resolver.get_relative_coordinates(2000, 500, Some("HDMI-A-1")), (2000, 500));
        assert_eq!(resolver.get_relative_coordinates(2000, 500, None), (2000, 500));
    }

    #[tokio::test]
    async fn test_lazy_refresh_picks_up_hotplug() {
        let compositor = Arc::new(FakeCompositor::with_monitors(dual_head()));
        let mut resolver = MonitorResolver::new(compositor.clone(), Duration::ZERO).await;

        let mut layout = dual_head();
        layout.push(MonitorRect::new("HDMI-A-1", 4480, 0, 1920, 1080));
        *compositor.monitors.lock() = Some(layout);

        assert_eq!(resolver.get_monitor_at(5000, 500).await.as_deref(), Some("HDMI-A-1"));
        assert_eq!(compositor.calls(), 2);
        assert_eq!(resolver.bounding_box(), Some((6400, 1440)));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_stale_topology() {
        let compositor = Arc::new(FakeCompositor::with_monitors(dual_head()));
        let mut resolver = MonitorResolver::new(compositor.clone(), Duration::ZERO).await;

        *compositor.monitors.lock() = None;
        assert_eq!(resolver.get_monitor_at(9000, 9000).await, None);
        assert_eq!(compositor.calls(), 2);
        assert_eq!(resolver.monitors().len(), 2);
        assert_eq!(resolver.get_monitor_at(10, 10).await.as_deref(), Some("eDP-1"));
    }

    #[tokio::test]
    async fn test_empty_topology() {
        let compositor = Arc::new(FakeCompositor::default());
        let mut resolver = MonitorResolver::new(compositor, DEFAULT_REFRESH_COOLDOWN).await;

        assert!(resolver.monitors().is_empty());
        assert_eq!(resolver.get_monitor_at(10, 10).await, None);
        assert_eq!(resolver.get_relative_coordinates(10, 20, None), (10, 20));
        assert_eq!(resolver.bounding_box(), None);
    }

    #[tokio::test]
    async fn test_cursor_position() {
        let compositor = Arc::new(FakeCompositor::default());
        let resolver = MonitorResolver::new(compositor.clone(), DEFAULT_REFRESH_COOLDOWN).await;
        assert_eq!(resolver.get_cursor_position().await, None);

        *compositor.cursor.lock() = Some((1905, 492));
        assert_eq!(resolver.get_cursor_position().await, Some((1905, 492)));
    }

    #[tokio::test]
    async fn test_stalled_compositor_keeps_stale_topology() {
        let compositor = Arc::new(FakeCompositor::with_monitors(dual_head()));
        let mut resolver = MonitorResolver::with_query_timeout(
            compositor.clone(),
            Duration::ZERO,
            Duration::from_millis(50),
        )
        .await;

        *compositor.delay.lock() = Duration::from_millis(300);
        let started = Instant::now();
        assert_eq!(resolver.get_monitor_at(9000, 9000).await, None);
        assert!(started.elapsed() < Duration::from_millis(250));
        assert_eq!(resolver.monitors(), dual_head().as_slice());
        assert_eq!(resolver.get_monitor_at(10, 10).await.as_deref(), Some("eDP-1"));
    }

    #[test]
    fn test_extreme_geometry_does_not_overflow() {
        let edge = MonitorRect::new("X", i32::MAX - 10, i32::MAX - 10, 100, 100);
        assert!(edge.contains(i32::MAX - 5, i32::MAX - 5));
        assert!(edge.contains(i32::MAX, i32::MAX));
        assert!(!edge.contains(i32::MAX - 11, 0));

        let negative = MonitorRect::new("Y", i32::MIN, i32::MIN, 10, 10);
        assert!(negative.contains(i32::MIN, i32::MIN + 9));
        assert!(!negative.contains(i32::MIN + 10, i32::MIN));
    }

    #[tokio::test]
    async fn test_bounding_box_clamps_huge_layouts() {
        let compositor = Arc::new(FakeCompositor::with_monitors(vec![
            MonitorRect::new("eDP-1", 0, 0, 1920, 1080),
            MonitorRect::new("X", i32::MAX - 10, 0, 100, 100),
        ]));
        let resolver = MonitorResolver::new(compositor, DEFAULT_REFRESH_COOLDOWN).await;
        assert_eq!(resolver.bounding_box(), Some((i32::MAX, 1080)));
        assert_eq!(
            resolver.get_relative_coordinates(i32::MIN, 0, Some("X")),
            (i32::MIN, 0)
        );
    }

    #[test]
    fn test_parse_hyprctl_output() {
        let json = r#"[
            {"id": 0, "name": "eDP-1", "description": "panel", "width": 1920, "height": 1080,
             "refreshRate": 60.0, "x": 0, "y": 0, "scale": 1.0, "focused": true},
            {"id": 1, "name": "DP-1", "width": 2560, "height": 1440, "x": 1920, "y": 0}
        ]"#;
        assert_eq!(parse_hyprctl_monitors(json).unwrap(), dual_head());

        assert_eq!(parse_cursor_position("1905, 492\n").unwrap(), (1905, 492));
        assert!(parse_cursor_position("garbage").is_err());
        assert!(parse_cursor_position("1, two").is_err());
    }
}
