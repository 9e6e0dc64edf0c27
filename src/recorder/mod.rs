//! Session recording pipeline
//!
//! Ties the input reader, keystroke grouping, monitor resolution and the
//! screenshot pool together into a single ordered timeline.

pub mod channel;
pub mod coordinator;
pub mod keybuffer;
pub mod screenshot_pool;
pub mod state;
pub mod timeline;

pub use channel::{RecordingChannel, RecordingError, RecordingResult};
pub use coordinator::{DrainSummary, SessionCoordinator};
pub use keybuffer::KeyBuffer;
pub use screenshot_pool::ScreenshotPool;
pub use state::{RecordingState, SessionStatus, StateFile};
pub use timeline::{ClickEvent, JsonTimelineWriter, ScreenshotSlot, SessionEvent, Timeline, TimelineSink};
