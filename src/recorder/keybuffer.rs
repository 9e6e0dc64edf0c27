//! Keystroke aggregation
//!
//! Groups consecutive key presses arriving within an idle window into a
//! single text run, so the timeline shows "hello" instead of five events.

use crate::recorder::channel::{RecordingError, RecordingResult};
use std::time::{Duration, Instant};

/// Map a symbolic key name to the glyph shown in the timeline.
pub fn glyph_for(key: &str) -> String {
    let name = match key.strip_prefix("KEY_") {
        Some(name) => name,
        None => return key.to_string(),
    };

    match name {
        "SPACE" => " ".to_string(),
        "ENTER" => "\n".to_string(),
        "BACKSPACE" => "⌫".to_string(),
        _ if name.chars().count() == 1 => name.to_string(),
        _ => format!("[{}]", name),
    }
}

/// Pending keystrokes of the current run
#[derive(Debug)]
pub struct KeyBuffer {
    interval: Duration,
    glyphs: String,
    last_key: Option<Instant>,
}

impl KeyBuffer {
    /// Create a buffer grouping keys no more than `interval_ms` apart.
    pub fn new(interval_ms: i64) -> RecordingResult<Self> {
        let interval_ms = u64::try_from(interval_ms).map_err(|_| {
            RecordingError::InvalidConfig(format!(
                "key grouping interval must be >= 0, got {}",
                interval_ms
            ))
        })?;

        Ok(Self {
            interval: Duration::from_millis(interval_ms),
            glyphs: String::new(),
            last_key: None,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Glyphs currently buffered
    pub fn pending(&self) -> &str {
        &self.glyphs
    }

    /// Instant of the last accepted key, if the buffer is non-empty
    pub fn last_key_at(&self) -> Option<Instant> {
        self.last_key
    }

    pub fn add(&mut self, key: &str) -> bool {
        self.add_at(key, Instant::now())
    }

    /// Append `key` if it continues the current run.
    ///
    /// Returns `false` without touching the buffer when the run has gone
    /// idle; the caller flushes and retries.
    pub fn add_at(&mut self, key: &str, now: Instant) -> bool {
        if !self.accepts_at(now) {
            return false;
        }
        self.glyphs.push_str(&glyph_for(key));
        self.last_key = Some(now);
        true
    }

    fn accepts_at(&self, now: Instant) -> bool {
        match self.last_key {
            Some(last) if !self.glyphs.is_empty() => now.saturating_duration_since(last) <= self.interval,
            _ => true,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        self.is_timed_out_at(Instant::now())
    }

    pub fn is_timed_out_at(&self, now: Instant) -> bool {
        match self.last_key {
            Some(last) if !self.glyphs.is_empty() => now.saturating_duration_since(last) > self.interval,
            _ => false,
        }
    }

    /// Take the buffered text, leaving the buffer empty.
    pub fn flush(&mut self) -> Option<String> {
        self.last_key = None;
        if self.glyphs.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.glyphs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glyph_mapping() {
        assert_eq!(glyph_for("KEY_A"), "A");
        assert_eq!(glyph_for("KEY_1"), "1");
        assert_eq!(glyph_for("KEY_SPACE"), " ");
        assert_eq!(glyph_for("KEY_ENTER"), "\n");
        assert_eq!(glyph_for("KEY_BACKSPACE"), "⌫");
        assert_eq!(glyph_for("KEY_LEFTSHIFT"), "[LEFTSHIFT]");
        assert_eq!(glyph_for("UNK_700"), "UNK_700");
        assert_eq!(glyph_for("x"), "x");
    }

    #[test]
    fn test_negative_interval_rejected() {
        assert!(matches!(
            KeyBuffer::new(-1),
            Err(RecordingError::InvalidConfig(_))
        ));
        assert!(KeyBuffer::new(0).is_ok());
    }

    #[test]
    fn test_add_within_interval() {
        let mut buffer = KeyBuffer::new(500).unwrap();
        let t0 = Instant::now();

        assert!(buffer.add_at("KEY_A", t0));
        assert_eq!(buffer.pending().chars().count(), 1);
        assert!(buffer.add_at("KEY_B", t0 + Duration::from_millis(200)));
        assert_eq!(buffer.pending().chars().count(), 2);
    }

    #[test]
    fn test_add_after_interval_rejected() {
        let mut buffer = KeyBuffer::new(500).unwrap();
        let t0 = Instant::now();

        assert!(buffer.add_at("KEY_A", t0));
        assert!(!buffer.add_at("KEY_B", t0 + Duration::from_millis(501)));
        assert_eq!(buffer.pending(), "A");
        assert_eq!(buffer.last_key_at(), Some(t0));
    }

    #[test]
    fn test_timeout() {
        let mut buffer = KeyBuffer::new(100).unwrap();
        let t0 = Instant::now();
        assert!(!buffer.is_timed_out_at(t0 + Duration::from_secs(10)));

        buffer.add_at("KEY_A", t0);
        assert!(!buffer.is_timed_out_at(t0 + Duration::from_millis(100)));
        assert!(buffer.is_timed_out_at(t0 + Duration::from_millis(101)));
    }

    #[test]
    fn test_zero_interval() {
        let mut buffer = KeyBuffer::new(0).unwrap();
        let t0 = Instant::now();
        assert!(buffer.add_at("KEY_A", t0));
        assert!(buffer.add_at("KEY_B", t0));
        assert!(!buffer.add_at("KEY_C", t0 + Duration::from_millis(1)));
    }

    #[test]
    fn test_flush() {
        let mut buffer = KeyBuffer::new(500).unwrap();
        assert_eq!(buffer.flush(), None);

        buffer.add("KEY_A");
        assert_eq!(buffer.flush(), Some("A".to_string()));
        assert_eq!(buffer.flush(), None);
        assert!(buffer.is_empty());
        assert_eq!(buffer.last_key_at(), None);
    }

    #[test]
    fn test_hello() {
        let mut buffer = KeyBuffer::new(500).unwrap();
        let t0 = Instant::now();
        for key in ["KEY_H", "KEY_E", "KEY_L", "KEY_L", "KEY_O"] {
            assert!(buffer.add_at(key, t0));
        }
        assert_eq!(buffer.flush(), Some("HELLO".to_string()));
    }

    #[test]
    fn test_whitespace_glyphs() {
        let mut buffer = KeyBuffer::new(500).unwrap();
        let t0 = Instant::now();
        for key in ["KEY_SPACE", "KEY_ENTER", "KEY_B"] {
            assert!(buffer.add_at(key, t0));
        }
        assert_eq!(buffer.flush(), Some(" \nB".to_string()));
    }
}
