//! The set of local dhIds currently shared to a sink.

use std::collections::HashSet;
use std::sync::Mutex;

use dinput_types::DhId;
use tracing::debug;

use crate::registry::lock;

#[derive(Default)]
pub struct SharingDhIds {
    ids: Mutex<HashSet<DhId>>,
}

impl SharingDhIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `dh_id` as shared. Returns whether it was newly added.
    pub fn on_sharing(&self, dh_id: &DhId) -> bool {
        let added = lock(&self.ids).insert(dh_id.clone());
        debug!(dh_id = %dh_id, added, "sharing");
        added
    }

    /// Mark `dh_id` as no longer shared. Returns whether it was present.
    pub fn on_no_sharing(&self, dh_id: &DhId) -> bool {
        let removed = lock(&self.ids).remove(dh_id);
        debug!(dh_id = %dh_id, removed, "no longer sharing");
        removed
    }

    pub fn contains(&self, dh_id: &DhId) -> bool {
        lock(&self.ids).contains(dh_id)
    }

    pub fn len(&self) -> usize {
        lock(&self.ids).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.ids).clear();
    }
}
