//! Linux/Wayland capture sources
//!
//! This module provides input, monitor topology and screenshot capture.

pub mod input;
pub mod monitor;
pub mod screenshot;

// Re-export input channel
pub use input::InputTrackingChannel;

pub use monitor::{Compositor, HyprlandCompositor, MonitorRect, MonitorResolver};
pub use screenshot::{
    detect_backend, CaptureBackend, CaptureRequest, CaptureScope, ImageFormat, Screenshot,
};
