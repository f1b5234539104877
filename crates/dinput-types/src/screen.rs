//! Sink screen geometry.

use serde::{Deserialize, Serialize};

/// A rectangle of the source screen that is rendered on the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenRect {
    pub offset_x: i32,
    pub offset_y: i32,
    pub width: u32,
    pub height: u32,
}

impl ScreenRect {
    #[must_use]
    pub fn new(offset_x: i32, offset_y: i32, width: u32, height: u32) -> Self {
        Self {
            offset_x,
            offset_y,
            width,
            height,
        }
    }

    /// Half-open containment: `offset <= coord < offset + extent` on both axes.
    #[must_use]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        let (x, y) = (i64::from(x), i64::from(y));
        let left = i64::from(self.offset_x);
        let top = i64::from(self.offset_y);
        let right = left + i64::from(self.width);
        let bottom = top + i64::from(self.height);
        (left..right).contains(&x) && (top..bottom).contains(&y)
    }
}
