//! Input tracking (pointer, keyboard) capture
//!
//! Reads `/dev/input/event*` devices on a dedicated thread, keeps a virtual
//! cursor from relative motion, and queues resolved clicks and keystrokes
//! for the session coordinator.

pub mod channel;
pub mod cursor;
pub mod device;
pub mod keycodes;
pub mod types;

pub use channel::{CursorQuery, InputTrackingChannel};
pub use cursor::CursorState;
pub use device::{EvdevBackend, InputBackend, InputDevice};
pub use types::{DeviceCapabilities, InputEvent, MouseButton, RawEvent};
