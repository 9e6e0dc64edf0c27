use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized signal read from a device, before any cursor resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEvent {
    PointerDelta { dx: i32, dy: i32 },
    KeyTransition { code: u16, down: bool },
    ButtonTransition { code: u16, down: bool },
}

/// Which classes of signals a device reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Reports relative motion (mice, touchpads)
    pub pointer: bool,
    /// Reports alphabetic keys (real keyboards, not power buttons)
    pub keys: bool,
}

impl DeviceCapabilities {
    pub fn is_usable(&self) -> bool {
        self.pointer || self.keys
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            super::keycodes::BTN_LEFT => Some(Self::Left),
            super::keycodes::BTN_RIGHT => Some(Self::Right),
            super::keycodes::BTN_MIDDLE => Some(Self::Middle),
            _ => None,
        }
    }
}

impl std::fmt::Display for MouseButton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MouseButton::Left => write!(f, "left"),
            MouseButton::Middle => write!(f, "middle"),
            MouseButton::Right => write!(f, "right"),
        }
    }
}

/// Fully resolved event pushed from the reader thread to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Click {
        button: MouseButton,
        x: i32,
        y: i32,
        time: DateTime<Utc>,
    },
    Key {
        key: String,
        time: DateTime<Utc>,
    },
    /// Anything the coordinator passes straight through (e.g. side buttons)
    Other {
        kind: String,
        time: DateTime<Utc>,
    },
}

impl InputEvent {
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            InputEvent::Click { time, .. }
            | InputEvent::Key { time, .. }
            | InputEvent::Other { time, .. } => *time,
        }
    }
}
