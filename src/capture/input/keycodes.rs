//! evdev key and button codes
//!
//! Names come from `evdev::Key`; only codes evdev has no name for get a
//! synthetic `UNK_<code>` / `BTN_<code>` name.

use evdev::Key;

pub const KEY_A: u16 = Key::KEY_A.code();

/// First code of the button block (BTN_MISC)
pub const BTN_MISC: u16 = Key::BTN_0.code();
pub const BTN_LEFT: u16 = Key::BTN_LEFT.code();
pub const BTN_RIGHT: u16 = Key::BTN_RIGHT.code();
pub const BTN_MIDDLE: u16 = Key::BTN_MIDDLE.code();
pub const BTN_SIDE: u16 = Key::BTN_SIDE.code();

/// One past the last code of the button block (BTN_GEAR_UP + 1, rounded)
const BTN_BLOCK_END: u16 = 0x160;
const BTN_TRIGGER_HAPPY: u16 = Key::BTN_TRIGGER_HAPPY1.code();

/// Whether an EV_KEY code belongs to a button rather than a keyboard key.
pub fn is_button(code: u16) -> bool {
    (BTN_MISC..BTN_BLOCK_END).contains(&code) || code >= BTN_TRIGGER_HAPPY
}

/// evdev's symbolic name for `code`, `None` when evdev does not know it.
fn evdev_name(code: u16) -> Option<String> {
    let name = format!("{:?}", Key::new(code));
    if name.starts_with("unknown") {
        None
    } else {
        Some(name)
    }
}

/// Symbolic name of a button code (`BTN_LEFT`, ...), `BTN_<code>` if unknown.
pub fn button_name(code: u16) -> String {
    evdev_name(code).unwrap_or_else(|| format!("BTN_{}", code))
}

/// Symbolic name of a keyboard key code (`KEY_A`, ...), `UNK_<code>` if unknown.
pub fn key_name(code: u16) -> String {
    evdev_name(code).unwrap_or_else(|| format!("UNK_{}", code))
}
