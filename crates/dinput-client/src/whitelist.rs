//! Per-device key whitelists and the key forwarding filter.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use dinput_types::{BusinessEvent, DeviceId, KeyCombination};
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::registry::lock;

/// Key combinations each sink device has asked to receive.
///
/// A device without a whitelist, or with an empty one, filters nothing.
#[derive(Default)]
pub struct WhiteListStore {
    lists: Mutex<HashMap<DeviceId, HashSet<KeyCombination>>>,
}

impl WhiteListStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a JSON whitelist into the device's set.
    ///
    /// The payload is an array of `[[heldKeys...], keyCode, keyAction]`
    /// entries. Adding an entry twice has no further effect. Returns the size
    /// of the device's whitelist afterwards.
    pub fn add(&self, device_id: &DeviceId, payload: &str) -> Result<usize, ClientError> {
        if device_id.is_empty() {
            return Err(ClientError::PreconditionFailed(
                "whitelist device id is empty".to_string(),
            ));
        }
        let entries = match parse_white_list(payload) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(device = %device_id, error = %e, "rejected whitelist");
                return Err(e);
            }
        };
        let mut lists = lock(&self.lists);
        let list = lists.entry(device_id.clone()).or_default();
        list.extend(entries);
        debug!(device = %device_id, size = list.len(), "whitelist updated");
        Ok(list.len())
    }

    /// Drop the device's whitelist. Returns whether one existed.
    pub fn remove(&self, device_id: &DeviceId) -> bool {
        let removed = lock(&self.lists).remove(device_id).is_some();
        if removed {
            debug!(device = %device_id, "whitelist removed");
        }
        removed
    }

    /// Whether a key event on `device_id` must stay local.
    ///
    /// True only when the device has a non-empty whitelist and the event's
    /// combination is not on it.
    pub fn is_need_filter_out(&self, device_id: &DeviceId, event: &BusinessEvent) -> bool {
        match lock(&self.lists).get(device_id) {
            Some(list) if !list.is_empty() => !list.contains(&event.combination()),
            _ => false,
        }
    }

    pub fn len(&self, device_id: &DeviceId) -> usize {
        lock(&self.lists).get(device_id).map_or(0, HashSet::len)
    }

    pub fn clear(&self) {
        lock(&self.lists).clear();
    }
}

/// Parse a whitelist payload.
pub fn parse_white_list(payload: &str) -> Result<Vec<KeyCombination>, ClientError> {
    let raw: Vec<(Vec<i32>, i32, i32)> = serde_json::from_str(payload)?;
    Ok(raw
        .into_iter()
        .map(|(held, key_code, key_action)| KeyCombination::new(held, key_code, key_action))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(held: &[i32], key_code: i32, key_action: i32) -> BusinessEvent {
        BusinessEvent {
            pressed_keys: held.to_vec(),
            key_code,
            key_action,
        }
    }

    #[test]
    fn no_whitelist_filters_nothing() {
        let store = WhiteListStore::new();
        let dev = DeviceId::new("sink");
        assert!(!store.is_need_filter_out(&dev, &event(&[], 2017, 2)));
    }

    #[test]
    fn empty_whitelist_filters_nothing() {
        let store = WhiteListStore::new();
        let dev = DeviceId::new("sink");
        store.add(&dev, "[]").unwrap();
        assert!(!store.is_need_filter_out(&dev, &event(&[], 2017, 2)));
    }

    #[test]
    fn listed_combination_is_forwarded() {
        let store = WhiteListStore::new();
        let dev = DeviceId::new("sink");
        store.add(&dev, "[[[2072,2045],2017,2]]").unwrap();

        assert!(!store.is_need_filter_out(&dev, &event(&[2045, 2072], 2017, 2)));
        assert!(store.is_need_filter_out(&dev, &event(&[2072], 2017, 2)));
        assert!(store.is_need_filter_out(&dev, &event(&[2072, 2045], 2017, 3)));
    }

    #[test]
    fn whitelists_are_per_device() {
        let store = WhiteListStore::new();
        store
            .add(&DeviceId::new("a"), "[[[],2017,2]]")
            .unwrap();
        assert!(!store.is_need_filter_out(&DeviceId::new("b"), &event(&[], 1, 1)));
        assert!(store.is_need_filter_out(&DeviceId::new("a"), &event(&[], 1, 1)));
    }

    #[test]
    fn add_is_additive_and_idempotent() {
        let store = WhiteListStore::new();
        let dev = DeviceId::new("sink");
        assert_eq!(store.add(&dev, "[[[],1,2]]").unwrap(), 1);
        assert_eq!(store.add(&dev, "[[[],1,2]]").unwrap(), 1);
        assert_eq!(store.add(&dev, "[[[],3,2]]").unwrap(), 2);
    }

    #[test]
    fn malformed_payload_leaves_state() {
        let store = WhiteListStore::new();
        let dev = DeviceId::new("sink");
        store.add(&dev, "[[[],1,2]]").unwrap();
        assert!(store.add(&dev, "[[1,2]]").is_err());
        assert!(store.add(&dev, "garbage").is_err());
        assert_eq!(store.len(&dev), 1);
    }

    #[test]
    fn remove_missing_is_noop() {
        let store = WhiteListStore::new();
        let dev = DeviceId::new("sink");
        assert!(!store.remove(&dev));
        store.add(&dev, "[[[],1,2]]").unwrap();
        assert!(store.remove(&dev));
        assert!(!store.is_need_filter_out(&dev, &event(&[], 9, 9)));
    }

    #[test]
    fn empty_device_rejected() {
        let store = WhiteListStore::new();
        assert!(matches!(
            store.add(&DeviceId::new(""), "[]"),
            Err(ClientError::PreconditionFailed(_))
        ));
    }
}
