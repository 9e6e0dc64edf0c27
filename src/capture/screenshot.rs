//! Screenshot capture backends
//!
//! Captures a monitor with an external tool, stamps a cursor arrow at the
//! click position and compresses the result to the configured format.

use crate::recorder::channel::{RecordingError, RecordingResult};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::process::Command;
use std::sync::{Arc, OnceLock};

const CURSOR_SIZE: u32 = 24;
/// Arrow outline in sprite coordinates
const CURSOR_POLYGON: [(f32, f32); 4] = [(0.0, 0.0), (0.0, 20.0), (5.0, 15.0), (15.0, 15.0)];

static CURSOR_SPRITE: OnceLock<RgbaImage> = OnceLock::new();

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
}

impl ImageFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/png" => Some(ImageFormat::Png),
            "image/jpeg" => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }
}

/// Compressed screenshot attached to a click
#[derive(Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl std::fmt::Debug for Screenshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Screenshot")
            .field("bytes", &format_args!("{} bytes", self.bytes.len()))
            .field("mime", &self.mime)
            .finish()
    }
}

/// What to capture and how to compress it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    /// Target monitor; `None` captures the whole desktop
    pub monitor: Option<String>,
    /// Cursor position on the virtual desktop
    pub x: i32,
    pub y: i32,
    /// Cursor position relative to `monitor`
    pub rel_x: i32,
    pub rel_y: i32,
    pub format: ImageFormat,
    /// 1-100, only used by lossy formats
    pub quality: u8,
}

/// Area covered by a raw capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureScope {
    Monitor,
    Desktop,
}

impl CaptureRequest {
    /// Where the cursor sits inside an image covering `scope`.
    pub fn cursor_in(&self, scope: CaptureScope) -> (i32, i32) {
        match scope {
            CaptureScope::Monitor => (self.rel_x, self.rel_y),
            CaptureScope::Desktop => (self.x, self.y),
        }
    }
}

/// External screenshot facility
///
/// Calls block until the tool finishes, so they run on the screenshot pool's
/// blocking workers, never on the coordinator.
pub trait CaptureBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Capture, overlay the cursor, compress.
    fn capture_and_compress(&self, request: &CaptureRequest) -> RecordingResult<Screenshot>;
}

/// wlroots compositors (Hyprland, Sway, ...)
#[derive(Debug, Default)]
pub struct GrimBackend;

impl GrimBackend {
    /// `grim -o` captures one output, plain `grim` the whole layout.
    pub fn scope(request: &CaptureRequest) -> CaptureScope {
        if request.monitor.is_some() {
            CaptureScope::Monitor
        } else {
            CaptureScope::Desktop
        }
    }
}

impl CaptureBackend for GrimBackend {
    fn name(&self) -> &str {
        "grim"
    }

    fn capture_and_compress(&self, request: &CaptureRequest) -> RecordingResult<Screenshot> {
        let mut command = Command::new("grim");
        if let Some(monitor) = &request.monitor {
            command.args(["-o", monitor]);
        }
        let output = command
            .arg("-")
            .output()
            .map_err(|e| RecordingError::CaptureFailed(format!("grim: {}", e)))?;

        if !output.status.success() {
            return Err(RecordingError::CaptureFailed(format!(
                "grim exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        compose(&output.stdout, request, Self::scope(request))
    }
}

/// GNOME fallback. Always captures the whole desktop.
#[derive(Debug, Default)]
pub struct GnomeScreenshotBackend;

impl CaptureBackend for GnomeScreenshotBackend {
    fn name(&self) -> &str {
        "gnome-screenshot"
    }

    fn capture_and_compress(&self, request: &CaptureRequest) -> RecordingResult<Screenshot> {
        let file = tempfile::Builder::new()
            .prefix("wsr-shot-")
            .suffix(".png")
            .tempfile()?;

        let status = Command::new("gnome-screenshot")
            .arg("-f")
            .arg(file.path())
            .status()
            .map_err(|e| RecordingError::CaptureFailed(format!("gnome-screenshot: {}", e)))?;
        if !status.success() {
            return Err(RecordingError::CaptureFailed(format!(
                "gnome-screenshot exited with {}",
                status
            )));
        }

        let raw = std::fs::read(file.path())?;
        compose(&raw, request, CaptureScope::Desktop)
    }
}

/// Used when no screenshot tool exists; every capture fails softly.
#[derive(Debug, Default)]
pub struct UnavailableBackend;

impl CaptureBackend for UnavailableBackend {
    fn name(&self) -> &str {
        "none"
    }

    fn capture_and_compress(&self, _request: &CaptureRequest) -> RecordingResult<Screenshot> {
        Err(RecordingError::CaptureFailed(
            "no screenshot backend available".to_string(),
        ))
    }
}

fn tool_available(program: &str, arg: &str) -> bool {
    Command::new(program)
        .arg(arg)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Pick the first screenshot tool installed on this system.
pub fn detect_backend() -> Arc<dyn CaptureBackend> {
    if tool_available("grim", "-h") {
        if std::env::var_os("WAYLAND_DISPLAY").is_none() {
            tracing::warn!(
                "grim found but WAYLAND_DISPLAY is not set, screenshots may fail (try sudo -E)"
            );
        }
        tracing::info!("Screenshot backend: grim");
        return Arc::new(GrimBackend);
    }

    if tool_available("gnome-screenshot", "--version") {
        tracing::info!("Screenshot backend: gnome-screenshot");
        return Arc::new(GnomeScreenshotBackend);
    }

    tracing::warn!("No screenshot backend (grim, gnome-screenshot) found, clicks will have no screenshots");
    Arc::new(UnavailableBackend)
}

/// Decode a raw capture covering `scope`, stamp the cursor and compress it.
pub fn compose(raw: &[u8], request: &CaptureRequest, scope: CaptureScope) -> RecordingResult<Screenshot> {
    let mut img = image::load_from_memory(raw)
        .map_err(|e| RecordingError::CaptureFailed(format!("cannot decode capture: {}", e)))?
        .to_rgba8();
    let (x, y) = request.cursor_in(scope);
    overlay_cursor(&mut img, x, y);
    encode(img, request.format, request.quality)
}

/// Paint the cursor arrow with its tip at `(x, y)`; parts off-image are clipped.
pub fn overlay_cursor(img: &mut RgbaImage, x: i32, y: i32) {
    let sprite = CURSOR_SPRITE.get_or_init(render_cursor_sprite);
    let (width, height) = img.dimensions();

    for (sx, sy, pixel) in sprite.enumerate_pixels() {
        if pixel[3] == 0 {
            continue;
        }
        let tx = i64::from(x) + i64::from(sx);
        let ty = i64::from(y) + i64::from(sy);
        if tx < 0 || ty < 0 || tx >= i64::from(width) || ty >= i64::from(height) {
            continue;
        }
        img.put_pixel(tx as u32, ty as u32, *pixel);
    }
}

fn render_cursor_sprite() -> RgbaImage {
    let fill = Rgba([255u8, 255, 255, 255]);
    let outline = Rgba([0u8, 0, 0, 255]);
    let inside = |x: i64, y: i64| {
        x >= 0
            && y >= 0
            && point_in_polygon(x as f32 + 0.5, y as f32 + 0.5, &CURSOR_POLYGON)
    };

    let mut sprite = RgbaImage::new(CURSOR_SIZE, CURSOR_SIZE);
    for y in 0..CURSOR_SIZE as i64 {
        for x in 0..CURSOR_SIZE as i64 {
            if !inside(x, y) {
                continue;
            }
            let edge = !inside(x - 1, y) || !inside(x + 1, y) || !inside(x, y - 1) || !inside(x, y + 1);
            sprite.put_pixel(x as u32, y as u32, if edge { outline } else { fill });
        }
    }
    sprite
}

fn point_in_polygon(px: f32, py: f32, polygon: &[(f32, f32)]) -> bool {
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (xi, yi) = polygon[i];
        let (xj, yj) = polygon[j];
        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn encode(img: RgbaImage, format: ImageFormat, quality: u8) -> RecordingResult<Screenshot> {
    let mut bytes = Vec::new();
    let result = match format {
        ImageFormat::Png => img.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png),
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(img).to_rgb8();
            JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100)).encode(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ColorType::Rgb8,
            )
        }
    };
    result.map_err(|e| RecordingError::CaptureFailed(format!("{} encoding failed: {}", format.extension(), e)))?;

    Ok(Screenshot {
        bytes,
        mime: format.mime().to_string(),
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    fn png_of(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    fn request(format: ImageFormat, x: i32, y: i32) -> CaptureRequest {
        CaptureRequest {
            monitor: Some("eDP-1".to_string()),
            x,
            y,
            rel_x: x,
            rel_y: y,
            format,
            quality: 90,
        }
    }

    #[test]
    fn test_cursor_sprite_shape() {
        let sprite = render_cursor_sprite();
        assert_eq!(sprite.dimensions(), (24, 24));
        // Interior is white, far corner is transparent
        assert_eq!(*sprite.get_pixel(2, 8), Rgba([255, 255, 255, 255]));
        assert_eq!(sprite.get_pixel(23, 23)[3], 0);
    }

    #[test]
    fn test_compose_png_stamps_cursor() {
        let raw = png_of(100, 100, [0, 0, 255, 255]);
        let shot = compose(&raw, &request(ImageFormat::Png, 50, 50), CaptureScope::Monitor).unwrap();
        assert_eq!(shot.mime, "image/png");

        let decoded = image::load_from_memory(&shot.bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (100, 100));
        assert_eq!(*decoded.get_pixel(52, 58), Rgba([255, 255, 255, 255]));
        assert_eq!(*decoded.get_pixel(10, 10), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_desktop_capture_uses_absolute_cursor() {
        // Click at (30, 20) on a monitor placed at (40, 0) of an 80x40 desktop
        let click = CaptureRequest {
            monitor: Some("DP-1".to_string()),
            x: 70,
            y: 20,
            rel_x: 30,
            rel_y: 20,
            format: ImageFormat::Png,
            quality: 90,
        };
        assert_eq!(click.cursor_in(CaptureScope::Monitor), (30, 20));
        assert_eq!(click.cursor_in(CaptureScope::Desktop), (70, 20));

        let raw = png_of(80, 40, [0, 0, 255, 255]);
        let shot = compose(&raw, &click, CaptureScope::Desktop).unwrap();
        let decoded = image::load_from_memory(&shot.bytes).unwrap().to_rgba8();
        assert_eq!(*decoded.get_pixel(72, 28), Rgba([255, 255, 255, 255]));
        assert_eq!(*decoded.get_pixel(32, 28), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_grim_scope_follows_target() {
        let mut click = request(ImageFormat::Png, 0, 0);
        assert_eq!(GrimBackend::scope(&click), CaptureScope::Monitor);
        click.monitor = None;
        assert_eq!(GrimBackend::scope(&click), CaptureScope::Desktop);
    }

    #[test]
    fn test_compose_jpeg() {
        let raw = png_of(64, 48, [200, 10, 10, 255]);
        let shot = compose(&raw, &request(ImageFormat::Jpeg, 0, 0), CaptureScope::Monitor).unwrap();
        assert_eq!(shot.mime, "image/jpeg");
        assert_eq!(&shot.bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_overlay_clips_at_edges() {
        let mut img = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        overlay_cursor(&mut img, 8, 8);
        overlay_cursor(&mut img, -30, -30);
        assert_eq!(img.dimensions(), (10, 10));
    }

    #[test]
    fn test_compose_rejects_garbage() {
        let err = compose(b"not an image", &request(ImageFormat::Png, 0, 0), CaptureScope::Desktop).unwrap_err();
        assert!(matches!(err, RecordingError::CaptureFailed(_)));
    }

    #[test]
    fn test_format_parsing() {
        let format: ImageFormat = serde_json::from_str("\"jpg\"").unwrap();
        assert_eq!(format, ImageFormat::Jpeg);
        assert_eq!(ImageFormat::from_mime("image/png"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::Png.extension(), "png");
    }

    #[test]
    fn test_unavailable_backend_fails_softly() {
        let err = UnavailableBackend
            .capture_and_compress(&request(ImageFormat::Png, 0, 0))
            .unwrap_err();
        assert!(matches!(err, RecordingError::CaptureFailed(_)));
    }
}
