//! Virtual cursor integrated from relative pointer motion

/// Cursor position clamped to `[0, width] x [0, height]`.
///
/// Owned by the reader thread; only pointer deltas and authoritative
/// compositor positions move it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorState {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

impl CursorState {
    /// Start in the centre of the given desktop
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(0);
        let height = height.max(0);
        Self {
            x: width / 2,
            y: height / 2,
            width,
            height,
        }
    }

    pub fn apply_delta(&mut self, dx: i32, dy: i32) {
        self.x = self.x.saturating_add(dx).clamp(0, self.width);
        self.y = self.y.saturating_add(dy).clamp(0, self.height);
    }

    /// Re-anchor on an absolute position reported by the compositor
    pub fn warp(&mut self, x: i32, y: i32) {
        self.x = x.clamp(0, self.width);
        self.y = y.clamp(0, self.height);
    }

    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn bounds(&self) -> (i32, i32) {
        (self.width, self.height)
    }
}
