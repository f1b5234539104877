//! Sink screen geometry cache and the touch forwarding filter.

use std::sync::Mutex;

use dinput_types::{ScreenRect, TouchEvent};
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::registry::lock;

/// The most recent set of sink screen rectangles.
///
/// A touch inside any rectangle is already rendered on the sink and must not
/// be forwarded. Updates replace the whole set; a payload that fails to parse
/// leaves the previous set in place.
#[derive(Default)]
pub struct ScreenFilter {
    rects: Mutex<Vec<ScreenRect>>,
}

impl ScreenFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached rectangles from a JSON payload.
    ///
    /// The payload is an array of `[offsetX, offsetY, width, height]` integer
    /// tuples. Returns the number of rectangles now cached.
    pub fn update(&self, payload: &str) -> Result<usize, ClientError> {
        let rects = match parse_screen_infos(payload) {
            Ok(rects) => rects,
            Err(e) => {
                warn!(error = %e, "rejected sink screen infos, keeping previous");
                return Err(e);
            }
        };
        let count = rects.len();
        *lock(&self.rects) = rects;
        debug!(count, "sink screen infos updated");
        Ok(count)
    }

    /// Whether a captured touch falls inside a cached sink rectangle.
    pub fn is_touch_event_need_filter_out(&self, event: &TouchEvent) -> bool {
        lock(&self.rects)
            .iter()
            .any(|rect| rect.contains(event.abs_x, event.abs_y))
    }

    pub fn rects(&self) -> Vec<ScreenRect> {
        lock(&self.rects).clone()
    }

    pub fn clear(&self) {
        lock(&self.rects).clear();
    }
}

/// Parse a screen-info payload without touching any cache.
pub fn parse_screen_infos(payload: &str) -> Result<Vec<ScreenRect>, ClientError> {
    let raw: Vec<[i64; 4]> = serde_json::from_str(payload)?;
    raw.into_iter()
        .map(|[x, y, width, height]| {
            let offset_x = i32::try_from(x)
                .map_err(|_| ClientError::InvalidPayload(format!("offsetX {x} out of range")))?;
            let offset_y = i32::try_from(y)
                .map_err(|_| ClientError::InvalidPayload(format!("offsetY {y} out of range")))?;
            let width = u32::try_from(width)
                .map_err(|_| ClientError::InvalidPayload(format!("width {width} out of range")))?;
            let height = u32::try_from(height).map_err(|_| {
                ClientError::InvalidPayload(format!("height {height} out of range"))
            })?;
            Ok(ScreenRect::new(offset_x, offset_y, width, height))
        })
        .collect()
}
