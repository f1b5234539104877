//! Captured events consulted by the forwarding filters.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// An absolute touchscreen contact captured on the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchEvent {
    pub abs_x: i32,
    pub abs_y: i32,
}

impl TouchEvent {
    #[must_use]
    pub fn new(abs_x: i32, abs_y: i32) -> Self {
        Self { abs_x, abs_y }
    }
}

/// A key or button transition together with the keys held at the time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessEvent {
    /// Keys already held down when `key_code` changed state.
    pub pressed_keys: Vec<i32>,
    pub key_code: i32,
    pub key_action: i32,
}

impl BusinessEvent {
    /// The whitelist entry this event would match.
    #[must_use]
    pub fn combination(&self) -> KeyCombination {
        KeyCombination::new(
            self.pressed_keys.iter().copied(),
            self.key_code,
            self.key_action,
        )
    }
}

/// One whitelist item. Held keys compare as a set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyCombination {
    pub pressed_keys: BTreeSet<i32>,
    pub key_code: i32,
    pub key_action: i32,
}

impl KeyCombination {
    #[must_use]
    pub fn new(
        pressed_keys: impl IntoIterator<Item = i32>,
        key_code: i32,
        key_action: i32,
    ) -> Self {
        Self {
            pressed_keys: pressed_keys.into_iter().collect(),
            key_code,
            key_action,
        }
    }
}
